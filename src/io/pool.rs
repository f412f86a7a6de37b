//! Reusable byte buffers shared by concurrent analyses.
//!
//! Buffers are checked out per target and handed back on drop. A returned
//! buffer is always cleared, so nothing leaks from one target into the next.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Buffers larger than this are released instead of being kept idle.
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// A pool of byte buffers safe for concurrent checkout.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    max_retained_capacity: usize,
}

impl BufferPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            max_retained_capacity: DEFAULT_MAX_RETAINED_CAPACITY,
        }
    }

    pub fn with_max_retained_capacity(mut self, bytes: usize) -> Self {
        self.max_retained_capacity = bytes;
        self
    }

    /// Takes an empty buffer from the pool, allocating one if none is idle.
    pub fn checkout(&self) -> PooledBuffer<'_> {
        let buf = self.idle.lock().pop().unwrap_or_default();
        debug_assert!(buf.is_empty());
        PooledBuffer { buf, pool: self }
    }

    /// Takes a buffer and sizes it to `len` zeroed bytes.
    pub fn checkout_zeroed(&self, len: usize) -> PooledBuffer<'_> {
        let mut buf = self.checkout();
        buf.resize(len, 0);
        buf
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.max_retained_capacity {
            return;
        }
        buf.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self::new(workers * 2)
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuffer<'p> {
    buf: Vec<u8>,
    pool: &'p BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}
