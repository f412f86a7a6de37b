//! File-type classification by magic number.

use crate::io::error::Result;
use crate::io::{TargetSource, MAGIC_LEN};

/// `0x7F 'E' 'L' 'F'`
pub const ELF_MAGIC: [u8; MAGIC_LEN] = [0x7f, b'E', b'L', b'F'];

#[inline]
pub fn is_elf_magic(magic: &[u8; MAGIC_LEN]) -> bool {
    *magic == ELF_MAGIC
}

/// Classifies the start of a buffer. `None` when fewer than four bytes are
/// available, since a short prefix can't be told apart from a non-ELF one.
pub fn classify_prefix(head: &[u8]) -> Option<bool> {
    let magic: &[u8; MAGIC_LEN] = head.get(..MAGIC_LEN)?.try_into().ok()?;
    Some(is_elf_magic(magic))
}

/// Reads the target's magic and reports whether it is an ELF image.
pub fn classify(source: &mut dyn TargetSource) -> Result<bool> {
    Ok(is_elf_magic(&source.read_magic()?))
}
