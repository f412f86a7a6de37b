#![no_main]
use bytes::Bytes;
use entroscan::entropy::{shannon_entropy, stream_entropy};
use entroscan::io::{MemorySource, MAX_TARGET_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, rest)) = data.split_first() else {
        return;
    };
    let Ok(mut source) = MemorySource::new("fuzz", Bytes::copy_from_slice(rest), MAX_TARGET_SIZE)
    else {
        return;
    };
    let mut scratch = vec![0u8; chunk as usize + 1];
    if let Ok(streamed) = stream_entropy(&mut source, &mut scratch) {
        assert!((0.0..=8.0).contains(&streamed));
        assert!((streamed - shannon_entropy(rest)).abs() < 0.006);
    }
});
