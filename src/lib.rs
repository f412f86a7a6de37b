//! Entropy scanner for packed or encrypted executables.
//!
//! Targets are single files, directory trees, the local process table, or the
//! process table of a remote Linux host reached over SSH without installing
//! anything there. Every target gets a Shannon entropy score; those at or
//! above the threshold also get their cryptographic digests, and are reported
//! as interim text, CSV or JSON.

pub mod analysis;
pub mod config;
pub mod entropy;
pub mod error;
pub mod hashing;
pub mod io;
pub mod logging;
pub mod output;
pub mod remote;
pub mod results;
pub mod scan;
pub mod timeout;

pub use analysis::{Analyzer, RemoteProcessTable};
pub use config::{OutputConfig, RemoteConfig, ReportFormat, ScanConfig, ScheduleMode};
pub use error::{Result, ScanError};
pub use hashing::{DigestAlgorithm, DigestSet};
pub use results::{AnalysisResult, ResultSink};
pub use scan::{ScanInput, ScanStats, Target};
