//! Custom error types for the I/O module.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("'{}' is not a regular file", path.display())]
    NotRegularFile { path: PathBuf },

    #[error(
        "size of '{}' is too large ({found} bytes) to calculate entropy (max allowed: {limit} bytes)",
        path.display()
    )]
    FileTooLarge { path: PathBuf, limit: u64, found: u64 },

    #[error("'{}' is zero size", path.display())]
    ZeroSizeTarget { path: PathBuf },

    #[error("'{}' is too small to classify ({found} of 4 magic bytes readable)", path.display())]
    TruncatedMagicRead { path: PathBuf, found: usize },

    #[error("couldn't read '{}': {source}", path.display())]
    StdIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IoError {
    pub(crate) fn std(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IoError::StdIo {
            path: path.into(),
            source,
        }
    }

    /// True when the underlying OS error is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IoError::StdIo { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, IoError>;
