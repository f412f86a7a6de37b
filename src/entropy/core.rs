//! Byte-frequency histogram and Shannon entropy.
//!
//! A [`Histogram`] accumulates byte frequencies across any number of chunks,
//! so the entropy of a large target can be computed without holding it in
//! memory.

/// Shannon entropy of `data` in bits per byte, unrounded.
///
/// 0.0 for a stream of one repeated byte value, 8.0 when all 256 values occur
/// equally often. Empty input scores 0.0.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    let mut hist = Histogram::new();
    hist.update(data);
    hist.entropy()
}

/// Two decimal places, the precision every score is reported with.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Frequency table of the 256 byte values seen so far.
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: [u64; 256],
    seen: u64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: [0; 256],
            seen: 0,
        }
    }

    /// Folds one chunk of the stream into the table.
    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            self.buckets[usize::from(byte)] += 1;
        }
        self.seen += chunk.len() as u64;
    }

    /// Entropy of everything recorded so far, unrounded.
    pub fn entropy(&self) -> f64 {
        if self.seen == 0 {
            return 0.0;
        }
        let n = self.seen as f64;
        let bits = self
            .buckets
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / n;
                -p * p.log2()
            })
            .sum::<f64>();
        // a single-valued stream sums to -0.0
        bits.max(0.0)
    }

    /// Bytes recorded.
    pub fn len(&self) -> u64 {
        self.seen
    }

    pub fn is_empty(&self) -> bool {
        self.seen == 0
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
