//! Collected analysis results.
//!
//! A [`ResultSink`] is the only shared mutable state of a scan. One mutex
//! guards both the result list and the interim console stream, so parallel
//! completions neither lose records nor interleave their printed output.

pub mod schema;

use crate::error::{Result, ScanError};
use crate::hashing::{DigestAlgorithm, DigestSet};
use crate::io::error::IoError;
use crate::output::write_interim;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// Analysis outcome for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub path: String,
    /// Display name: base name of the resolved executable.
    pub name: String,
    /// Shannon entropy, rounded to two decimals.
    pub entropy: f64,
    pub elf: bool,
    /// Hex digests, present only when the entropy passed the threshold.
    #[serde(
        rename = "checksums",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub digests: BTreeMap<DigestAlgorithm, String>,
}

impl AnalysisResult {
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.digests.get(&algorithm).map(String::as_str)
    }
}

/// Interim console stream plus the algorithms it lists for each record.
pub struct InterimPrinter {
    out: Box<dyn Write + Send>,
    algorithms: DigestSet,
}

impl InterimPrinter {
    pub fn new(out: Box<dyn Write + Send>, algorithms: DigestSet) -> Self {
        Self { out, algorithms }
    }

    pub fn stdout(algorithms: DigestSet) -> Self {
        Self::new(Box::new(std::io::stdout()), algorithms)
    }
}

struct SinkState {
    results: Vec<AnalysisResult>,
    interim: Option<InterimPrinter>,
}

/// Append-only, thread-safe result collection.
pub struct ResultSink {
    state: Mutex<SinkState>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::with_interim(None)
    }

    pub fn with_interim(interim: Option<InterimPrinter>) -> Self {
        Self {
            state: Mutex::new(SinkState {
                results: Vec::new(),
                interim,
            }),
        }
    }

    /// Appends a result and, if enabled, prints its interim record while
    /// still holding the lock.
    pub fn add(&self, result: AnalysisResult) -> Result<()> {
        let mut state = self.state.lock();
        let SinkState { results, interim } = &mut *state;
        if let Some(printer) = interim {
            write_interim(&mut printer.out, &result, printer.algorithms)
                .and_then(|()| printer.out.flush())
                .map_err(|e| ScanError::Io(IoError::std("<stdout>", e)))?;
        }
        results.push(result);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the results collected so far, in insertion order.
    pub fn snapshot(&self) -> Vec<AnalysisResult> {
        self.state.lock().results.clone()
    }

    pub fn into_results(self) -> Vec<AnalysisResult> {
        self.state.into_inner().results
    }
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new()
    }
}

/// The structured JSON report: `{"files": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub files: Vec<AnalysisResult>,
}

impl Report {
    pub fn new(files: Vec<AnalysisResult>) -> Self {
        Self { files }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
