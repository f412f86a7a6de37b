//! Scan driver: targets, enumeration, scheduling and run statistics.

pub mod enumerate;
pub mod scheduler;
pub mod target;

pub use self::enumerate::{Enumerator, ScanInput};
pub use self::scheduler::Scheduler;
pub use self::target::Target;

use crate::analysis::{Analyzer, RemoteProcessTable};
use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::results::ResultSink;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// A target that failed analysis without stopping the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Counters for one completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Targets handed to the analyzer.
    pub dispatched: usize,
    /// Targets that produced a result, reported or not.
    pub analyzed: usize,
    /// Results at or above the threshold.
    pub reported: usize,
    /// Targets dropped by ELF-only mode.
    pub filtered: usize,
    /// Processes that exited before they could be read.
    pub vanished: usize,
    /// Targets skipped by self-exclusion.
    pub excluded: usize,
    pub failures: Vec<TargetFailure>,
}

impl ScanStats {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn log_summary(&self) {
        info!(
            dispatched = self.dispatched,
            analyzed = self.analyzed,
            reported = self.reported,
            filtered = self.filtered,
            vanished = self.vanished,
            excluded = self.excluded,
            failed = self.failed(),
            elapsed_ms = self.elapsed().num_milliseconds(),
            "Scan complete"
        );
    }
}

/// Effective UID from the contents of `/proc/<pid>/status`.
///
/// The `Uid:` line lists real, effective, saved and filesystem UIDs.
pub fn parse_effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1))
        .and_then(|euid| euid.parse().ok())
}

/// Fails unless the current process runs with effective UID 0.
pub fn ensure_root() -> Result<()> {
    let status = std::fs::read_to_string("/proc/self/status").map_err(|e| {
        ScanError::InvalidConfig(format!("couldn't read /proc/self/status: {e}"))
    })?;
    match parse_effective_uid(&status) {
        Some(0) => Ok(()),
        Some(euid) => Err(ScanError::InvalidConfig(format!(
            "process scanning requires root (effective uid is {euid})"
        ))),
        None => Err(ScanError::InvalidConfig(
            "couldn't determine effective uid from /proc/self/status".into(),
        )),
    }
}

/// Validates the configuration, enumerates `input` and analyzes every target,
/// adding reportable results to `sink`.
pub fn run<'a>(
    config: &'a ScanConfig,
    input: &ScanInput,
    sink: &ResultSink,
    remote: Option<&'a dyn RemoteProcessTable>,
) -> Result<ScanStats> {
    config.validate()?;
    if *input == ScanInput::LocalProcesses {
        ensure_root()?;
    }

    let mut analyzer = Analyzer::new(config);
    if let Some(remote) = remote {
        analyzer = analyzer.with_remote(remote);
    }
    let mut targets = Enumerator::new(input, config, remote)?;

    let stats = Scheduler::new(&analyzer, sink).run(&mut targets)?;
    if stats.failed() > 0 {
        warn!(failed = stats.failed(), "Some targets couldn't be analyzed");
    }
    stats.log_summary();
    Ok(stats)
}
