//! Error types for the entropy scanner.
//!
//! Per-target failures (a file that cannot be read, a process that cannot be
//! fetched) are contained by the scheduler and logged. Connection-level and
//! configuration failures are fatal and abort the whole run; see
//! [`ScanError::is_fatal`].

use crate::hashing::DigestAlgorithm;
use crate::io::error::IoError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Main error type for scan operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Byte-source failures: not a regular file, too large, empty, truncated.
    #[error(transparent)]
    Io(#[from] IoError),

    /// A digest algorithm name that is not part of the supported set.
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    /// One or more digest algorithms failed; the others still completed.
    #[error("{} digest(s) failed for '{path}': {}", failures.len(), DisplayFailures(failures))]
    PartialDigestFailure {
        path: String,
        failures: Vec<DigestFailure>,
        completed: usize,
    },

    /// The remote session pool was closed while a session was requested.
    #[error("session pool for {0} is closed")]
    SessionPoolClosed(String),

    /// None of the configured authentication methods were accepted.
    #[error("authentication exhausted for {user}@{host} (tried: {})", attempted.join(", "))]
    AuthenticationExhausted {
        user: String,
        host: String,
        attempted: Vec<String>,
    },

    /// A remote acquisition or command exceeded the connection timeout.
    #[error("remote {operation} timed out after {after:?}")]
    RemoteTimeout {
        operation: String,
        after: Duration,
    },

    /// A remote command ran but exited unsuccessfully.
    #[error("remote command `{command}` exited with status {status}: {stderr}")]
    RemoteCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Failure establishing the TCP connection or SSH handshake.
    #[error("couldn't connect to {target}: {message}")]
    Connect { target: String, message: String },

    /// The established connection dropped; nothing more can run on it.
    #[error("connection lost during {operation}: {message}")]
    ConnectionLost { operation: String, message: String },

    /// Error reported by the SSH library after the connection was established.
    #[error("ssh error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// Invalid or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure closing pooled remote sessions; every error is kept.
    #[error("closing sessions for {target} failed: {}", errors.join("; "))]
    SessionClose { target: String, errors: Vec<String> },

    /// A report could not be encoded.
    #[error("couldn't encode report: {0}")]
    Json(#[from] serde_json::Error),

    /// The enumerator could not continue (e.g. the scan root is unreadable).
    #[error("scan aborted: {0}")]
    ScanAborted(String),
}

/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// libssh2 codes meaning the transport itself is gone, as opposed to one
/// channel or command failing.
const TRANSPORT_FAILURES: &[i32] = &[
    -1,  // LIBSSH2_ERROR_SOCKET_NONE
    -2,  // LIBSSH2_ERROR_BANNER_RECV
    -3,  // LIBSSH2_ERROR_BANNER_SEND
    -7,  // LIBSSH2_ERROR_SOCKET_SEND
    -13, // LIBSSH2_ERROR_SOCKET_DISCONNECT
    -14, // LIBSSH2_ERROR_PROTO
    -43, // LIBSSH2_ERROR_SOCKET_RECV
    -44, // LIBSSH2_ERROR_ENCRYPT
    -45, // LIBSSH2_ERROR_BAD_SOCKET
];

/// Whether an SSH error means the whole connection is lost.
pub fn is_transport_failure(e: &ssh2::Error) -> bool {
    matches!(e.code(), ssh2::ErrorCode::Session(code) if TRANSPORT_FAILURES.contains(&code))
}

/// A single algorithm's failure inside a multi-digest computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestFailure {
    pub algorithm: DigestAlgorithm,
    pub reason: String,
}

impl fmt::Display for DigestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.algorithm, self.reason)
    }
}

struct DisplayFailures<'a>(&'a [DigestFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl ScanError {
    /// Errors that must terminate the whole run rather than a single target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::SessionPoolClosed(_)
                | ScanError::AuthenticationExhausted { .. }
                | ScanError::Connect { .. }
                | ScanError::ConnectionLost { .. }
                | ScanError::InvalidConfig(_)
                | ScanError::ScanAborted(_)
        ) || matches!(self, ScanError::Ssh(e) if is_transport_failure(e))
    }

    /// The target disappeared between enumeration and read (an exited process).
    pub fn is_vanished(&self) -> bool {
        matches!(self, ScanError::Io(e) if e.is_not_found())
    }

    pub(crate) fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        ScanError::RemoteTimeout {
            operation: operation.into(),
            after,
        }
    }
}
