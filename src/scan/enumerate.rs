//! Target enumeration.
//!
//! Turns a scan input into a lazy sequence of [`Target`]s. Self-exclusion is
//! applied here, once per target, so every scheduling mode sees the same
//! sequence.

use crate::analysis::RemoteProcessTable;
use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::scan::target::{Target, MAX_PID, MIN_PID};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// What to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanInput {
    /// One file.
    File(PathBuf),
    /// Every regular file below a directory.
    Directory(PathBuf),
    /// Every live local process.
    LocalProcesses,
    /// Every readable process on the connected remote host.
    RemoteProcesses,
}

/// Lazy target sequence with self-exclusion applied.
///
/// Yields `Err` only for conditions that end the scan, such as an unreadable
/// scan root; the sequence stops after it.
pub struct Enumerator<'a> {
    inner: Box<dyn Iterator<Item = Result<Target>> + 'a>,
    config: &'a ScanConfig,
    excluded: usize,
    done: bool,
}

impl<'a> Enumerator<'a> {
    pub fn new(
        input: &ScanInput,
        config: &'a ScanConfig,
        remote: Option<&'a dyn RemoteProcessTable>,
    ) -> Result<Self> {
        let inner: Box<dyn Iterator<Item = Result<Target>> + 'a> = match input {
            ScanInput::File(path) => Box::new(std::iter::once(Ok(Target::Path(path.clone())))),
            ScanInput::Directory(root) => Box::new(walk(root)),
            ScanInput::LocalProcesses => Box::new((MIN_PID..MAX_PID).map(|pid| Ok(Target::Process(pid)))),
            ScanInput::RemoteProcesses => {
                let remote = remote.ok_or_else(|| {
                    ScanError::InvalidConfig("remote process scan without a remote host".into())
                })?;
                let pids = remote.list_pids()?;
                debug!(count = pids.len(), "Enumerated remote processes");
                Box::new(pids.into_iter().map(|pid| Ok(Target::RemoteProcess(pid))))
            }
        };
        Ok(Self {
            inner,
            config,
            excluded: 0,
            done: false,
        })
    }

    /// Enumerates a fixed list of targets.
    pub fn from_targets<I>(targets: I, config: &'a ScanConfig) -> Self
    where
        I: IntoIterator<Item = Target>,
        I::IntoIter: 'a,
    {
        Self {
            inner: Box::new(targets.into_iter().map(Ok)),
            config,
            excluded: 0,
            done: false,
        }
    }

    /// Targets skipped by self-exclusion so far.
    pub fn excluded(&self) -> usize {
        self.excluded
    }
}

impl Iterator for Enumerator<'_> {
    type Item = Result<Target>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.inner.next()? {
                Ok(target) if self.config.excludes(&target) => {
                    trace!(target = %target, "Excluding own process");
                    self.excluded += 1;
                }
                Ok(target) => return Some(Ok(target)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Regular files below `root`. Directories, devices, sockets and links are
/// skipped; unreadable entries are logged and skipped. An unreadable root
/// aborts the walk.
fn walk(root: &Path) -> impl Iterator<Item = Result<Target>> {
    let root_display = root.display().to_string();
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(Ok(Target::Path(entry.into_path()))),
            Ok(entry) => {
                trace!(path = %entry.path().display(), "Skipping non-regular entry");
                None
            }
            Err(e) if e.depth() == 0 => Some(Err(ScanError::ScanAborted(format!(
                "error walking directory ({root_display}): {e}"
            )))),
            Err(e) => {
                warn!(
                    path = %e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    error = %e,
                    "Skipping unreadable entry"
                );
                None
            }
        })
}
