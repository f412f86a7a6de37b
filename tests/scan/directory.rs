//! Directory scans in both scheduling modes.

use crate::common::test_utils::{high_entropy_elf, low_entropy_elf, write_file};
use entroscan::scan::{self, ScanInput};
use entroscan::{AnalysisResult, ResultSink, ScanConfig, ScheduleMode};
use std::path::Path;

fn populate(dir: &Path) {
    for i in 0..20 {
        write_file(dir, &format!("bin/packed-{i}"), &high_entropy_elf(16 * 1024, i));
    }
    write_file(dir, "bin/plain", &low_entropy_elf(16 * 1024));
    write_file(dir, "etc/script.sh", b"#!/bin/sh\nexit 0\n");
    write_file(dir, "etc/random.bin", &high_entropy_elf(4096, 99)[4..]);
    write_file(dir, "tiny", b"\x7fE");
    write_file(dir, "empty", b"");
}

fn scan_dir(dir: &Path, config: &ScanConfig) -> (scan::ScanStats, Vec<AnalysisResult>) {
    let sink = ResultSink::new();
    let stats = scan::run(config, &ScanInput::Directory(dir.to_path_buf()), &sink, None).unwrap();
    let mut results = sink.into_results();
    results.sort_by(|a, b| a.path.cmp(&b.path));
    (stats, results)
}

#[test]
fn test_directory_scan_reports_packed_elves() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());

    let (stats, results) = scan_dir(dir.path(), &ScanConfig::default());
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|r| r.elf && r.entropy >= 5.0));
    assert!(results.iter().all(|r| r.digests.len() == 4));
    assert!(results.iter().all(|r| r.name.starts_with("packed-")));

    // The script and the headerless blob are filtered; the plain ELF is
    // analyzed but stays below the threshold.
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.analyzed, 21);
    // Truncated and empty files fail individually without stopping the scan.
    assert_eq!(stats.failed(), 2);
}

#[test]
fn test_directory_scan_without_elf_filter() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());

    let config = ScanConfig {
        elf_only: false,
        ..ScanConfig::default()
    };
    let (stats, results) = scan_dir(dir.path(), &config);
    assert_eq!(stats.filtered, 0);
    let blob = results
        .iter()
        .find(|r| r.name == "random.bin")
        .expect("high entropy non-ELF file reported");
    assert!(!blob.elf);
    assert!(results.iter().all(|r| r.name != "script.sh"));
}

#[test]
fn test_parallel_scan_matches_synchronous() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());

    let serial = ScanConfig::default();
    let parallel = ScanConfig {
        mode: ScheduleMode::Parallel { workers: 4 },
        ..ScanConfig::default()
    };

    let (serial_stats, serial_results) = scan_dir(dir.path(), &serial);
    let (parallel_stats, parallel_results) = scan_dir(dir.path(), &parallel);

    assert_eq!(serial_results, parallel_results);
    assert_eq!(serial_stats.reported, parallel_stats.reported);
    assert_eq!(serial_stats.filtered, parallel_stats.filtered);
    assert_eq!(serial_stats.failed(), parallel_stats.failed());
}

#[test]
fn test_missing_directory_aborts() {
    let sink = ResultSink::new();
    let err = scan::run(
        &ScanConfig::default(),
        &ScanInput::Directory("/definitely/not/here".into()),
        &sink,
        None,
    )
    .unwrap_err();
    assert!(err.is_fatal());
}
