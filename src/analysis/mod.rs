//! Per-target analysis pipeline.
//!
//! Each target goes through the same sequential, gated pipeline:
//!
//! 1. classify by magic number (ELF-only mode drops non-ELF targets here)
//! 2. stream the bytes through a histogram for Shannon entropy
//! 3. stop unless the entropy reaches the threshold
//! 4. compute every enabled digest concurrently over one snapshot
//! 5. resolve a display name
//!
//! Local and remote targets share the pipeline; only the byte source differs.

pub mod classify;

use crate::config::ScanConfig;
use crate::entropy::stream_entropy;
use crate::error::{Result, ScanError};
use crate::hashing::MultiDigest;
use crate::io::pool::BufferPool;
use crate::io::{LocalSource, MemorySource, TargetSource, ENTROPY_CHUNK};
use crate::results::AnalysisResult;
use crate::scan::target::Target;
use crate::span_trace;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Display name used when a link target can't be resolved.
pub const UNKNOWN_NAME: &str = "unknown";
/// Idle whole-target snapshots kept between digest runs.
const SNAPSHOT_IDLE: usize = 2;
/// Snapshots of larger targets are freed as soon as their digests are done.
const SNAPSHOT_MAX_RETAINED: usize = 8 * 1024 * 1024;

/// An executable fetched from a remote process table.
#[derive(Debug, Clone)]
pub struct RemoteImage {
    /// Canonical executable path on the remote host.
    pub path: String,
    pub data: Bytes,
}

/// Read access to a remote host's process table.
pub trait RemoteProcessTable: Sync {
    /// PIDs whose executables are readable by the remote user.
    fn list_pids(&self) -> Result<Vec<u32>>;

    /// Resolves and fetches the executable of `pid`, refusing images larger
    /// than `limit` bytes.
    fn read_process(&self, pid: u32, limit: u64) -> Result<RemoteImage>;
}

/// Runs the analysis pipeline for one target at a time.
///
/// Shared by reference between workers; the only interior state is the
/// buffer pools. Entropy scratch buffers are small and fixed-size; digest
/// snapshots hold whole targets and keep little idle.
pub struct Analyzer<'a> {
    config: &'a ScanConfig,
    scratch: BufferPool,
    snapshots: BufferPool,
    remote: Option<&'a dyn RemoteProcessTable>,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a ScanConfig) -> Self {
        Self {
            config,
            scratch: BufferPool::default(),
            snapshots: BufferPool::new(SNAPSHOT_IDLE)
                .with_max_retained_capacity(SNAPSHOT_MAX_RETAINED),
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: &'a dyn RemoteProcessTable) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        self.config
    }

    /// Analyzes one target.
    ///
    /// Returns `Ok(None)` when ELF-only mode filtered the target out. A result
    /// below the threshold carries no digests.
    pub fn analyze(&self, target: &Target) -> Result<Option<AnalysisResult>> {
        let span = span_trace!("analyze", target = %target);
        let _guard = span.enter();

        match target {
            Target::Path(path) => self.analyze_local(path),
            Target::Process(pid) => self.analyze_local(&Target::proc_exe(*pid)),
            Target::RemoteProcess(pid) => {
                let remote = self.remote.ok_or_else(|| {
                    ScanError::InvalidConfig(format!(
                        "{target} needs a remote connection, but none is configured"
                    ))
                })?;
                let image = remote.read_process(*pid, self.config.max_target_size)?;
                let name = base_name(Path::new(&image.path));
                let mut source =
                    MemorySource::new(image.path, image.data, self.config.max_target_size)?;
                self.run(&mut source, || name)
            }
        }
    }

    fn analyze_local(&self, path: &Path) -> Result<Option<AnalysisResult>> {
        let mut source = LocalSource::open(path, self.config.max_target_size)?;
        self.run(&mut source, || display_name(path))
    }

    fn run(
        &self,
        source: &mut dyn TargetSource,
        name: impl FnOnce() -> String,
    ) -> Result<Option<AnalysisResult>> {
        let elf = classify::classify(source)?;
        if self.config.elf_only && !elf {
            debug!(path = %source.path().display(), "Skipping non-ELF target");
            return Ok(None);
        }

        let entropy = {
            let mut scratch = self.scratch.checkout_zeroed(ENTROPY_CHUNK);
            stream_entropy(source, &mut scratch)?
        };

        let mut result = AnalysisResult {
            path: source.path().to_string_lossy().into_owned(),
            name: String::new(),
            entropy,
            elf,
            digests: BTreeMap::new(),
        };

        if entropy >= self.config.threshold && !self.config.digests.is_empty() {
            let snapshot = source.snapshot(&self.snapshots)?;
            result.digests =
                MultiDigest::compute(&snapshot, self.config.digests).into_result(&result.path)?;
        }

        result.name = name();
        debug!(
            path = %result.path,
            name = %result.name,
            entropy,
            elf,
            digests = result.digests.len(),
            "Analyzed target"
        );
        Ok(Some(result))
    }
}

/// Base name of the link target when `path` is a symbolic link (every
/// `/proc/<pid>/exe` is), otherwise the base name of `path` itself.
pub fn display_name(path: &Path) -> String {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => match std::fs::read_link(path) {
            Ok(dest) => base_name(&dest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Couldn't read link");
                UNKNOWN_NAME.to_string()
            }
        },
        _ => base_name(path),
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
