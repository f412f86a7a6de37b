//! Declarative tabular schema.
//!
//! A schema is an ordered list of columns, each a header label paired with a
//! typed extraction function. Custom column sets and delimiters need no new
//! rendering code.

use crate::config::DEFAULT_DELIMITER;
use crate::hashing::DigestAlgorithm;
use crate::results::AnalysisResult;
use std::borrow::Cow;

/// Pulls one field out of a result, already formatted.
pub type Extract = fn(&AnalysisResult) -> Cow<'_, str>;

/// One tabular column.
#[derive(Clone, Copy)]
pub struct Column {
    pub header: &'static str,
    pub extract: Extract,
}

impl Column {
    pub const fn new(header: &'static str, extract: Extract) -> Self {
        Self { header, extract }
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Column").field(&self.header).finish()
    }
}

pub fn filename(r: &AnalysisResult) -> Cow<'_, str> {
    Cow::Borrowed(&r.name)
}

pub fn path(r: &AnalysisResult) -> Cow<'_, str> {
    Cow::Borrowed(&r.path)
}

pub fn entropy(r: &AnalysisResult) -> Cow<'_, str> {
    Cow::Owned(format!("{:.2}", r.entropy))
}

pub fn elf_file(r: &AnalysisResult) -> Cow<'_, str> {
    Cow::Borrowed(if r.elf { "true" } else { "false" })
}

// A missing digest is an empty field.
fn digest_of(r: &AnalysisResult, algorithm: DigestAlgorithm) -> Cow<'_, str> {
    Cow::Borrowed(r.digest(algorithm).unwrap_or(""))
}

pub fn md5(r: &AnalysisResult) -> Cow<'_, str> {
    digest_of(r, DigestAlgorithm::Md5)
}

pub fn sha1(r: &AnalysisResult) -> Cow<'_, str> {
    digest_of(r, DigestAlgorithm::Sha1)
}

pub fn sha256(r: &AnalysisResult) -> Cow<'_, str> {
    digest_of(r, DigestAlgorithm::Sha256)
}

pub fn sha512(r: &AnalysisResult) -> Cow<'_, str> {
    digest_of(r, DigestAlgorithm::Sha512)
}

/// `filename, path, entropy, elf_file, md5, sha1, sha256, sha512`
pub const DEFAULT_COLUMNS: [Column; 8] = [
    Column::new("filename", filename),
    Column::new("path", path),
    Column::new("entropy", entropy),
    Column::new("elf_file", elf_file),
    Column::new("md5", md5),
    Column::new("sha1", sha1),
    Column::new("sha256", sha256),
    Column::new("sha512", sha512),
];

/// Ordered columns plus the field delimiter.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    delimiter: String,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn header(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.header)
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }

    pub fn row(&self, result: &AnalysisResult) -> String {
        self.columns
            .iter()
            .map(|c| (c.extract)(result))
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }

    /// Header line followed by one line per result, each newline-terminated.
    pub fn render(&self, results: &[AnalysisResult]) -> String {
        let mut out = self.header();
        out.push('\n');
        for result in results {
            out.push_str(&self.row(result));
            out.push('\n');
        }
        out
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMNS.to_vec())
    }
}
