//! Remote process scans against an in-process host.

use crate::common::data_file;
use crate::common::golden;
use crate::common::test_utils::{high_entropy_elf, low_entropy_elf, FakeHost};
use entroscan::hashing::DigestAlgorithm;
use entroscan::remote::protocol::LIST_PIDS_COMMAND;
use entroscan::remote::{AuthMethod, RemoteHost};
use entroscan::scan::{self, ScanInput};
use entroscan::{RemoteConfig, ResultSink, ScanConfig, ScanError, ScheduleMode};
use std::sync::Arc;
use std::time::Duration;

fn remote_config() -> RemoteConfig {
    RemoteConfig {
        timeout: Duration::from_secs(5),
        pool_capacity: 4,
        ..RemoteConfig::new("192.0.2.10", "root")
    }
    .with_auth(AuthMethod::Password("hunter2".into()))
}

fn fake_host() -> FakeHost {
    let hello = std::fs::read(data_file(golden::HELLO_ELF)).unwrap();
    FakeHost::new()
        .respond(LIST_PIDS_COMMAND, "1 22 333 444 555 ")
        .process(1, "/usr/lib/systemd/systemd", &hello)
        .process(22, "/tmp/.x/kworker", &high_entropy_elf(32 * 1024, 7))
        .process(333, "/usr/bin/sleep", &low_entropy_elf(8 * 1024))
        .process(444, "/usr/bin/python3", b"#!/usr/bin/python3\n")
        // 555 exited after listing: nothing answers for it.
}

fn scan_remote(config: &ScanConfig) -> (scan::ScanStats, Vec<entroscan::AnalysisResult>, Arc<FakeHost>) {
    let factory = Arc::new(fake_host());
    let host = RemoteHost::establish(&remote_config(), Arc::clone(&factory)).unwrap();
    let sink = ResultSink::new();
    let stats = scan::run(config, &ScanInput::RemoteProcesses, &sink, Some(&host)).unwrap();
    host.close().unwrap();

    let mut results = sink.into_results();
    results.sort_by(|a, b| a.path.cmp(&b.path));
    (stats, results, factory)
}

#[test]
fn test_remote_scan_reports_resolved_paths() {
    let (stats, results, factory) = scan_remote(&ScanConfig::default());

    assert_eq!(stats.dispatched, 5);
    assert_eq!(stats.reported, 2);
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.failures[0].target, "remote:/proc/555/exe");

    let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/tmp/.x/kworker", "/usr/lib/systemd/systemd"]);

    let systemd = &results[1];
    assert_eq!(systemd.name, "systemd");
    assert_eq!(systemd.entropy, golden::ENTROPY);
    assert_eq!(systemd.digest(DigestAlgorithm::Sha256), Some(golden::SHA256));

    // Every session is used once and closed, including prewarmed ones.
    assert_eq!(factory.counters.opened(), factory.counters.closed());
}

#[test]
fn test_remote_scan_parallel_matches_synchronous() {
    let (_, serial, _) = scan_remote(&ScanConfig::default());
    let (stats, parallel, _) = scan_remote(&ScanConfig {
        mode: ScheduleMode::Parallel { workers: 3 },
        ..ScanConfig::default()
    });
    assert_eq!(stats.reported, 2);
    assert_eq!(serial, parallel);
}

#[test]
fn test_closed_host_is_fatal() {
    let host = RemoteHost::establish(&remote_config(), Arc::new(fake_host())).unwrap();
    host.close().unwrap();
    // Closing twice is harmless.
    host.close().unwrap();
    assert!(host.to_string().ends_with("(closed)"));

    let sink = ResultSink::new();
    let err = scan::run(
        &ScanConfig::default(),
        &ScanInput::RemoteProcesses,
        &sink,
        Some(&host),
    )
    .unwrap_err();
    assert!(matches!(err, ScanError::SessionPoolClosed(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_connection_drop_aborts_scan() {
    for mode in [ScheduleMode::Synchronous, ScheduleMode::Parallel { workers: 3 }] {
        let factory = Arc::new(fake_host().sever_after(LIST_PIDS_COMMAND));
        let host = RemoteHost::establish(&remote_config(), Arc::clone(&factory)).unwrap();
        let sink = ResultSink::new();
        let config = ScanConfig {
            mode,
            ..ScanConfig::default()
        };

        let err = scan::run(&config, &ScanInput::RemoteProcesses, &sink, Some(&host)).unwrap_err();
        assert!(err.is_fatal(), "{mode:?}: {err}");
        assert!(sink.is_empty());
        host.close().unwrap();
    }
}

#[test]
fn test_parallel_scan_stays_within_channel_limit() {
    let pids: Vec<u32> = (100..140).collect();
    let listing: String = pids.iter().map(|pid| format!("{pid} ")).collect();
    let mut fake = FakeHost::new()
        .respond(LIST_PIDS_COMMAND, listing)
        .max_channels(4);
    for &pid in &pids {
        fake = fake.process(pid, &format!("/opt/agent/worker-{pid}"), &high_entropy_elf(4096, pid));
    }

    let factory = Arc::new(fake);
    let remote = RemoteConfig {
        pool_capacity: 2,
        ..remote_config()
    };
    let host = RemoteHost::establish(&remote, Arc::clone(&factory)).unwrap();
    let sink = ResultSink::new();
    let config = ScanConfig {
        mode: ScheduleMode::Parallel { workers: 4 },
        ..ScanConfig::default()
    };
    let stats = scan::run(&config, &ScanInput::RemoteProcesses, &sink, Some(&host)).unwrap();
    host.close().unwrap();

    assert_eq!(stats.dispatched, 40);
    assert_eq!(stats.failed(), 0, "{:?}", stats.failures);
    assert_eq!(stats.reported, 40);
    assert_eq!(sink.len(), 40);
    assert!(factory.counters.live_max() <= 2);
    assert_eq!(factory.counters.refused(), 0);
    assert_eq!(factory.counters.opened(), factory.counters.closed());
}
