//! Bounded byte sources for target analysis.
//!
//! A target's bytes come either from a local file (opened once, size-checked
//! from metadata before the first read) or from an in-memory buffer fetched
//! from a remote host. Both enforce the same [`MAX_TARGET_SIZE`] ceiling and
//! the same zero-size and short-magic rules, so a target is rejected the same
//! way regardless of where it lives.

pub mod error;
pub mod pool;

use crate::io::error::{IoError, Result};
use crate::io::pool::{BufferPool, PooledBuffer};
use bytes::Bytes;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Largest target accepted for analysis (2 GiB).
pub const MAX_TARGET_SIZE: u64 = 2 * 1024 * 1024 * 1024;
/// Chunk size used when streaming a target through the entropy histogram.
pub const ENTROPY_CHUNK: usize = 256_000;
/// Number of leading bytes needed for classification.
pub const MAGIC_LEN: usize = 4;

/// Access to one target's bytes.
///
/// Implementations stream from the start of the target every time, so the
/// pipeline can classify, stream and snapshot the same source in sequence.
pub trait TargetSource {
    /// Path reported for this target.
    fn path(&self) -> &Path;

    /// Size in bytes, known before any byte is read.
    fn size(&self) -> u64;

    /// Reads the first [`MAGIC_LEN`] bytes.
    fn read_magic(&mut self) -> Result<[u8; MAGIC_LEN]>;

    /// Streams every byte through `sink` using `scratch` as the read buffer.
    /// Returns the number of bytes streamed.
    fn stream(&mut self, scratch: &mut [u8], sink: &mut dyn FnMut(&[u8])) -> Result<u64>;

    /// Takes one in-memory copy of the complete target.
    fn snapshot<'p>(&mut self, pool: &'p BufferPool) -> Result<Snapshot<'p>>;
}

/// The complete bytes of a target, held once for all digest algorithms.
pub enum Snapshot<'p> {
    Pooled(PooledBuffer<'p>),
    Shared(Bytes),
}

impl Deref for Snapshot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Snapshot::Pooled(buf) => buf.as_slice(),
            Snapshot::Shared(bytes) => bytes,
        }
    }
}

/// A local file target. Symbolic links (including `/proc/<pid>/exe`) are
/// followed when opening.
#[derive(Debug)]
pub struct LocalSource {
    path: PathBuf,
    file: File,
    size: u64,
    limit: u64,
}

impl LocalSource {
    /// Opens `path` and validates it before any byte is read.
    pub fn open<P: AsRef<Path>>(path: P, limit: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IoError::std(path, e))?;
        let metadata = file.metadata().map_err(|e| IoError::std(path, e))?;

        if !metadata.is_file() {
            return Err(IoError::NotRegularFile {
                path: path.to_path_buf(),
            });
        }

        let size = metadata.len();
        check_size(path, size, limit)?;

        debug!(path = %path.display(), size, "Opened local target");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            limit,
        })
    }

    fn rewind(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map(|_| ())
            .map_err(|e| IoError::std(&self.path, e))
    }
}

impl TargetSource for LocalSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_magic(&mut self) -> Result<[u8; MAGIC_LEN]> {
        self.rewind()?;
        let mut head = Vec::with_capacity(MAGIC_LEN);
        (&mut self.file)
            .take(MAGIC_LEN as u64)
            .read_to_end(&mut head)
            .map_err(|e| IoError::std(&self.path, e))?;
        magic_from(&self.path, &head)
    }

    fn stream(&mut self, scratch: &mut [u8], sink: &mut dyn FnMut(&[u8])) -> Result<u64> {
        self.rewind()?;
        let mut total = 0u64;
        loop {
            let n = match self.file.read(scratch) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoError::std(&self.path, e)),
            };
            total += n as u64;
            // The file may have grown since it was opened.
            if total > self.limit {
                return Err(IoError::FileTooLarge {
                    path: self.path.clone(),
                    limit: self.limit,
                    found: total,
                });
            }
            sink(&scratch[..n]);
        }
        trace!(path = %self.path.display(), bytes = total, "Streamed local target");
        Ok(total)
    }

    fn snapshot<'p>(&mut self, pool: &'p BufferPool) -> Result<Snapshot<'p>> {
        self.rewind()?;
        let mut buf = pool.checkout();
        buf.reserve(self.size as usize);
        read_bounded_into(&mut self.file, &mut buf, self.limit, &self.path)?;
        Ok(Snapshot::Pooled(buf))
    }
}

/// A target already held in memory, e.g. an executable read over SSH.
#[derive(Debug, Clone)]
pub struct MemorySource {
    path: PathBuf,
    data: Bytes,
}

impl MemorySource {
    pub fn new(path: impl Into<PathBuf>, data: Bytes, limit: u64) -> Result<Self> {
        let path = path.into();
        check_size(&path, data.len() as u64, limit)?;
        Ok(Self { path, data })
    }
}

impl TargetSource for MemorySource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_magic(&mut self) -> Result<[u8; MAGIC_LEN]> {
        let end = self.data.len().min(MAGIC_LEN);
        magic_from(&self.path, &self.data[..end])
    }

    fn stream(&mut self, scratch: &mut [u8], sink: &mut dyn FnMut(&[u8])) -> Result<u64> {
        // Already in memory: feed chunk-sized slices without copying.
        for chunk in self.data.chunks(scratch.len().max(1)) {
            sink(chunk);
        }
        Ok(self.data.len() as u64)
    }

    fn snapshot<'p>(&mut self, _pool: &'p BufferPool) -> Result<Snapshot<'p>> {
        Ok(Snapshot::Shared(self.data.clone()))
    }
}

/// Reads `reader` to the end, failing as soon as more than `limit` bytes arrive.
///
/// Never holds more than `limit + 1` bytes, so an oversized remote stream is
/// rejected without being buffered in full.
pub fn read_bounded<R: Read>(reader: R, limit: u64, path: &Path) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    read_bounded_into(reader, &mut out, limit, path)?;
    Ok(out)
}

fn read_bounded_into<R: Read>(reader: R, out: &mut Vec<u8>, limit: u64, path: &Path) -> Result<()> {
    let read = reader
        .take(limit.saturating_add(1))
        .read_to_end(out)
        .map_err(|e| IoError::std(path, e))?;
    if read as u64 > limit {
        out.clear();
        return Err(IoError::FileTooLarge {
            path: path.to_path_buf(),
            limit,
            found: read as u64,
        });
    }
    Ok(())
}

fn check_size(path: &Path, size: u64, limit: u64) -> Result<()> {
    if size == 0 {
        return Err(IoError::ZeroSizeTarget {
            path: path.to_path_buf(),
        });
    }
    if size > limit {
        return Err(IoError::FileTooLarge {
            path: path.to_path_buf(),
            limit,
            found: size,
        });
    }
    Ok(())
}

fn magic_from(path: &Path, head: &[u8]) -> Result<[u8; MAGIC_LEN]> {
    head.try_into().map_err(|_| IoError::TruncatedMagicRead {
        path: path.to_path_buf(),
        found: head.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content).unwrap();
        temp_file
    }

    #[test]
    fn open_file_successfully() {
        let file = create_temp_file(b"hello world");
        let source = LocalSource::open(file.path(), MAX_TARGET_SIZE).unwrap();
        assert_eq!(source.size(), 11);
    }

    #[test]
    fn open_file_too_large() {
        let file = create_temp_file(&[0; 100]);
        let result = LocalSource::open(file.path(), 50);
        assert!(matches!(
            result,
            Err(IoError::FileTooLarge {
                limit: 50,
                found: 100,
                ..
            })
        ));
    }

    #[test]
    fn open_empty_file() {
        let file = create_temp_file(b"");
        let result = LocalSource::open(file.path(), MAX_TARGET_SIZE);
        assert!(matches!(result, Err(IoError::ZeroSizeTarget { .. })));
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let err = LocalSource::open("/definitely/not/here", MAX_TARGET_SIZE).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn open_directory_is_not_regular() {
        let dir = tempfile::tempdir().unwrap();
        let result = LocalSource::open(dir.path(), MAX_TARGET_SIZE);
        assert!(matches!(result, Err(IoError::NotRegularFile { .. })));
    }

    #[test]
    fn read_magic_short_file() {
        let file = create_temp_file(&[0x7f, b'E']);
        let mut source = LocalSource::open(file.path(), MAX_TARGET_SIZE).unwrap();
        assert!(matches!(
            source.read_magic(),
            Err(IoError::TruncatedMagicRead { found: 2, .. })
        ));
    }

    #[test]
    fn stream_visits_every_byte_in_chunks() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let file = create_temp_file(&data);
        let mut source = LocalSource::open(file.path(), MAX_TARGET_SIZE).unwrap();

        let mut scratch = [0u8; 64];
        let mut seen = Vec::new();
        let mut calls = 0;
        let total = source
            .stream(&mut scratch, &mut |chunk| {
                calls += 1;
                seen.extend_from_slice(chunk);
            })
            .unwrap();

        assert_eq!(total, 1000);
        assert_eq!(seen, data);
        assert!(calls >= 16);
    }

    #[test]
    fn magic_then_stream_starts_from_zero() {
        let file = create_temp_file(b"\x7fELFrest");
        let mut source = LocalSource::open(file.path(), MAX_TARGET_SIZE).unwrap();
        assert_eq!(&source.read_magic().unwrap(), b"\x7fELF");

        let mut scratch = [0u8; 3];
        let mut seen = Vec::new();
        source.stream(&mut scratch, &mut |c| seen.extend_from_slice(c)).unwrap();
        assert_eq!(seen, b"\x7fELFrest");
    }

    #[test]
    fn snapshot_local_uses_pool() {
        let file = create_temp_file(b"snapshot me");
        let pool = BufferPool::new(1);
        let mut source = LocalSource::open(file.path(), MAX_TARGET_SIZE).unwrap();
        {
            let snap = source.snapshot(&pool).unwrap();
            assert_eq!(&*snap, b"snapshot me");
        }
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn memory_source_limits_match_local() {
        let err = MemorySource::new("/proc/1/exe", Bytes::from_static(&[1u8; 100]), 50).unwrap_err();
        assert!(matches!(err, IoError::FileTooLarge { found: 100, .. }));

        let err = MemorySource::new("/proc/1/exe", Bytes::new(), 50).unwrap_err();
        assert!(matches!(err, IoError::ZeroSizeTarget { .. }));

        let mut small = MemorySource::new("/proc/1/exe", Bytes::from_static(b"ab"), 50).unwrap();
        assert!(matches!(
            small.read_magic(),
            Err(IoError::TruncatedMagicRead { found: 2, .. })
        ));
    }

    #[test]
    fn read_bounded_rejects_oversized_stream() {
        let data = vec![7u8; 33];
        let err = read_bounded(&data[..], 32, Path::new("remote")).unwrap_err();
        assert!(matches!(err, IoError::FileTooLarge { limit: 32, found: 33, .. }));

        let ok = read_bounded(&data[..], 33, Path::new("remote")).unwrap();
        assert_eq!(ok.len(), 33);
    }
}
