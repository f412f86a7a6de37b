//! The unit of work handed from the enumerator to the analyzer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lowest local PID probed in process mode.
pub const MIN_PID: u32 = 1;
/// Exclusive upper bound on local PIDs (2^22, the 64-bit Linux `pid_max` ceiling).
pub const MAX_PID: u32 = 4_194_304;

/// Exactly one thing to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Target {
    /// A local filesystem path.
    Path(PathBuf),
    /// A live local process, read through `/proc/<pid>/exe`.
    Process(u32),
    /// A process on the connected remote host.
    RemoteProcess(u32),
}

impl Target {
    /// `/proc/<pid>/exe` for a process id.
    pub fn proc_exe(pid: u32) -> PathBuf {
        PathBuf::from(format!("/proc/{pid}/exe"))
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Target::Path(_) => None,
            Target::Process(pid) | Target::RemoteProcess(pid) => Some(*pid),
        }
    }

    /// The local path read for this target, if it is local.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            Target::Path(path) => Some(path.clone()),
            Target::Process(pid) => Some(Self::proc_exe(*pid)),
            Target::RemoteProcess(_) => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Target::RemoteProcess(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Path(path) => write!(f, "{}", path.display()),
            Target::Process(pid) => write!(f, "/proc/{pid}/exe"),
            Target::RemoteProcess(pid) => write!(f, "remote:/proc/{pid}/exe"),
        }
    }
}
