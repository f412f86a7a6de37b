//! Scan configuration.
//!
//! A [`ScanConfig`] is built once at startup, validated, then shared by
//! reference with every component. Nothing reads configuration from global
//! state.

use crate::error::{Result, ScanError};
use crate::hashing::DigestSet;
use crate::io::MAX_TARGET_SIZE;
use crate::remote::auth::AuthMethod;
use crate::scan::target::Target;
use crate::timeout::DEFAULT_TIMEOUT_SECONDS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default entropy threshold for reporting.
pub const DEFAULT_THRESHOLD: f64 = 5.0;
/// Highest possible byte entropy.
pub const MAX_ENTROPY: f64 = 8.0;
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_VERSION: &str = "SSH-2.0-SF";
/// Sessions open at once on the connection, queued or running. OpenSSH
/// allows 10 per connection by default.
pub const DEFAULT_POOL_CAPACITY: usize = 8;
pub const DEFAULT_DELIMITER: &str = ",";

/// How targets are driven through the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// One target at a time, in enumeration order.
    #[default]
    Synchronous,
    /// A fixed pool of workers fed from a bounded queue.
    Parallel { workers: usize },
}

impl ScheduleMode {
    /// Parallel mode sized to the available logical parallelism.
    pub fn parallel() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        ScheduleMode::Parallel { workers }
    }

    pub fn workers(self) -> usize {
        match self {
            ScheduleMode::Synchronous => 1,
            ScheduleMode::Parallel { workers } => workers,
        }
    }
}

/// Parameters shared read-only by every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Report targets whose entropy is greater than or equal to this.
    pub threshold: f64,
    /// Skip targets without the ELF magic.
    pub elf_only: bool,
    pub digests: DigestSet,
    pub mode: ScheduleMode,
    /// Leave this process out of process scans.
    pub ignore_self: bool,
    #[serde(skip, default = "current_pid")]
    pub self_pid: u32,
    pub max_target_size: u64,
    pub remote: Option<RemoteConfig>,
}

fn current_pid() -> u32 {
    std::process::id()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            elf_only: true,
            digests: DigestSet::all(),
            mode: ScheduleMode::Synchronous,
            ignore_self: true,
            self_pid: current_pid(),
            max_target_size: MAX_TARGET_SIZE,
            remote: None,
        }
    }
}

impl ScanConfig {
    /// Checks ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold > MAX_ENTROPY {
            return Err(ScanError::InvalidConfig(format!(
                "max entropy value is {MAX_ENTROPY:.1} (got {})",
                self.threshold
            )));
        }
        if self.threshold < 0.0 {
            return Err(ScanError::InvalidConfig(format!(
                "min entropy value is 0.0 (got {})",
                self.threshold
            )));
        }
        if self.mode.workers() == 0 {
            return Err(ScanError::InvalidConfig(
                "parallel mode needs at least one worker".into(),
            ));
        }
        if self.max_target_size == 0 || self.max_target_size > MAX_TARGET_SIZE {
            return Err(ScanError::InvalidConfig(format!(
                "target size limit must be between 1 and {MAX_TARGET_SIZE} bytes"
            )));
        }
        if let Some(remote) = &self.remote {
            remote.validate()?;
        }
        Ok(())
    }

    /// True when `target` must not be scanned. Evaluated once per target by
    /// the enumerator, whichever scheduling mode runs afterwards.
    pub fn excludes(&self, target: &Target) -> bool {
        self.ignore_self && matches!(target, Target::Process(pid) if *pid == self.self_pid)
    }
}

/// Connection parameters for agentless remote scanning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    pub port: u16,
    /// Client identification string sent during the handshake.
    pub version: String,
    /// Credentials are supplied at runtime and never serialized.
    #[serde(skip)]
    pub auth: Vec<AuthMethod>,
    /// Bounds connecting, session acquisition and every remote command.
    pub timeout: Duration,
    /// Upper bound on open sessions; idle ones are kept ready.
    pub pool_capacity: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            port: DEFAULT_SSH_PORT,
            version: DEFAULT_SSH_VERSION.to_string(),
            auth: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, method: AuthMethod) -> Self {
        self.auth.push(method);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ScanError::InvalidConfig("ssh-user requires ssh-host".into()));
        }
        if self.user.is_empty() {
            return Err(ScanError::InvalidConfig("ssh-host requires ssh-user".into()));
        }
        if self.auth.is_empty() {
            return Err(ScanError::InvalidConfig(
                "ssh mode requires ssh-key, ssh-pass, or ssh-agent".into(),
            ));
        }
        // Every remote target runs two commands at once.
        if self.pool_capacity < 2 {
            return Err(ScanError::InvalidConfig(
                "session pool capacity must be at least 2".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ScanError::InvalidConfig("ssh timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// `host:port` for the TCP connection.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Structured report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Csv,
    Json,
}

/// Where and how results are emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv: bool,
    pub json: bool,
    pub delimiter: String,
    /// Write the report here instead of stdout.
    pub output_file: Option<PathBuf>,
    /// Print interim records even when a report format is selected.
    pub print_interim: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv: false,
            json: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
            output_file: None,
            print_interim: false,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<()> {
        self.report_format().map(|_| ())
    }

    /// The selected structured format, if any.
    pub fn report_format(&self) -> Result<Option<ReportFormat>> {
        match (self.csv, self.json) {
            (true, true) => Err(ScanError::InvalidConfig(
                "csv and json output are mutually exclusive".into(),
            )),
            (true, false) => Ok(Some(ReportFormat::Csv)),
            (false, true) => Ok(Some(ReportFormat::Json)),
            (false, false) => Ok(None),
        }
    }

    /// Interim records are printed when no report is requested, or on demand.
    pub fn prints_interim(&self) -> bool {
        self.print_interim || (!self.csv && !self.json)
    }
}
