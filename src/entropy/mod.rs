//! Streaming Shannon entropy over target byte sources.
//!
//! Targets are read in [`ENTROPY_CHUNK`](crate::io::ENTROPY_CHUNK)-sized pieces through a caller-owned
//! scratch buffer; only the 256-bucket histogram is kept between chunks.

pub mod core;

pub use self::core::{round2, shannon_entropy, Histogram};

use crate::io::error::Result;
use crate::io::TargetSource;
use tracing::trace;

/// Computes the entropy of a whole target, rounded to two decimals.
///
/// `scratch` is the read buffer; callers pass a pooled buffer of
/// [`ENTROPY_CHUNK`](crate::io::ENTROPY_CHUNK) bytes so no allocation happens per target.
pub fn stream_entropy(source: &mut dyn TargetSource, scratch: &mut [u8]) -> Result<f64> {
    let mut hist = Histogram::new();
    source.stream(scratch, &mut |chunk| hist.update(chunk))?;
    let entropy = round2(hist.entropy());
    trace!(path = %source.path().display(), bytes = hist.len(), entropy, "Computed entropy");
    Ok(entropy)
}
