//! Centralized module for cryptographic hashing algorithms.
//!
//! The enabled algorithms are a [`DigestSet`] bitmask. All enabled digests of
//! a target are computed concurrently over one in-memory snapshot, and each
//! algorithm succeeds or fails on its own.

use crate::error::{DigestFailure, Result, ScanError};
use bitflags::bitflags;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// One supported digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Every supported algorithm, in reporting order.
    pub const ALL: [DigestAlgorithm; 4] = [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha512,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn flag(self) -> DigestSet {
        match self {
            DigestAlgorithm::Md5 => DigestSet::MD5,
            DigestAlgorithm::Sha1 => DigestSet::SHA1,
            DigestAlgorithm::Sha256 => DigestSet::SHA256,
            DigestAlgorithm::Sha512 => DigestSet::SHA512,
        }
    }

    /// Computes this algorithm's digest of `data` as a lowercase hex string.
    ///
    /// An empty input is refused: a digest of nothing would look like a real
    /// fingerprint in the report.
    pub fn digest(self, data: &[u8]) -> std::result::Result<String, String> {
        if data.is_empty() {
            return Err("no data written".to_string());
        }
        Ok(match self {
            DigestAlgorithm::Md5 => md5_digest(data),
            DigestAlgorithm::Sha1 => sha1_digest(data),
            DigestAlgorithm::Sha256 => sha256_digest(data),
            DigestAlgorithm::Sha512 => sha512_digest(data),
        })
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        DigestAlgorithm::ALL
            .into_iter()
            .find(|algo| algo.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ScanError::UnsupportedDigestAlgorithm(s.to_string()))
    }
}

bitflags! {
    /// The set of enabled digest algorithms.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DigestSet: u8 {
        const MD5 = 1 << 0;
        const SHA1 = 1 << 1;
        const SHA256 = 1 << 2;
        const SHA512 = 1 << 3;
    }
}

impl DigestSet {
    /// Parses a list of algorithm names, e.g. from `--digest md5,sha256`.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(DigestSet::empty(), |set, name| {
            Ok(set | name.as_ref().parse::<DigestAlgorithm>()?.flag())
        })
    }

    /// Enabled algorithms in reporting order.
    pub fn algorithms(self) -> impl Iterator<Item = DigestAlgorithm> {
        DigestAlgorithm::ALL
            .into_iter()
            .filter(move |algo| self.contains(algo.flag()))
    }
}

impl Default for DigestSet {
    fn default() -> Self {
        DigestSet::all()
    }
}

/// Outcome of computing several digests over one snapshot.
#[derive(Debug, Default)]
pub struct MultiDigest {
    pub digests: BTreeMap<DigestAlgorithm, String>,
    pub failures: Vec<DigestFailure>,
}

impl MultiDigest {
    /// Computes every algorithm in `set` concurrently over `data`.
    pub fn compute(data: &[u8], set: DigestSet) -> Self {
        let algorithms: Vec<DigestAlgorithm> = set.algorithms().collect();
        let outcomes: Vec<_> = algorithms
            .into_par_iter()
            .map(|algorithm| (algorithm, algorithm.digest(data)))
            .collect();

        let mut out = MultiDigest::default();
        for (algorithm, outcome) in outcomes {
            match outcome {
                Ok(hex) => {
                    trace!(%algorithm, digest = %hex, "Computed digest");
                    out.digests.insert(algorithm, hex);
                }
                Err(reason) => out.failures.push(DigestFailure { algorithm, reason }),
            }
        }
        out
    }

    /// All digests, or one composite error naming every failed algorithm.
    pub fn into_result(self, path: &str) -> Result<BTreeMap<DigestAlgorithm, String>> {
        if self.failures.is_empty() {
            return Ok(self.digests);
        }
        Err(ScanError::PartialDigestFailure {
            path: path.to_string(),
            completed: self.digests.len(),
            failures: self.failures,
        })
    }
}

/// Computes the MD5 digest of the given data and returns it as a hex string.
pub fn md5_digest(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Computes the SHA-1 digest of the given data and returns it as a hex string.
pub fn sha1_digest(data: &[u8]) -> String {
    let mut hasher = sha1::Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Computes the SHA-512 digest of the given data and returns it as a hex string.
pub fn sha512_digest(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
