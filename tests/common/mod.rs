//! Common test utilities and helpers.
//!
//! Shared by every integration test module: golden sample locations, scratch
//! file builders and an in-process remote host.

#![allow(dead_code)]

pub mod test_utils;

use std::path::{Path, PathBuf};

/// Directory holding checked-in test fixtures.
pub fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data")
}

/// Get the full path to a fixture file
pub fn data_file<P: AsRef<Path>>(relative_path: P) -> PathBuf {
    data_dir().join(relative_path)
}

/// Known values for the golden ELF sample.
pub mod golden {
    pub const HELLO_ELF: &str = "hello.elf";
    pub const SIZE: u64 = 5520;
    pub const ENTROPY: f64 = 7.28;
    pub const MD5: &str = "2eb2551fcf5cee81b0f646b74cab600f";
    pub const SHA1: &str = "9314ae92b4181697a4dd21034d0253a942034168";
    pub const SHA256: &str = "e3ac3dacd6141d711255a8aaac09b41e68e0b10b8eb836e0c3355e361ff12dfe";
    pub const SHA512: &str = "6493cee41a2eb14446a73c7ad5bcca3f727563ecd0ff50a8581c20813d4b6960\
                              ff1d11a3265cbd97a6bc95948e676d805465a8a059fe5698b6bb5e34d7893a4a";
}
