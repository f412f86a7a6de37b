#![no_main]
use bytes::Bytes;
use entroscan::analysis::classify::{classify, classify_prefix, is_elf_magic};
use entroscan::io::MemorySource;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let prefix = classify_prefix(data);
    assert_eq!(prefix.is_some(), data.len() >= 4);
    if let Ok(mut source) = MemorySource::new("fuzz", Bytes::copy_from_slice(data), 1 << 20) {
        if let Ok(elf) = classify(&mut source) {
            assert_eq!(Some(elf), prefix);
            assert_eq!(elf, is_elf_magic(&[data[0], data[1], data[2], data[3]]));
        }
    }
});
