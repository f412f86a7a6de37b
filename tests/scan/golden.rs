//! Golden sample checks: entropy, classification and every digest.

use crate::common::{data_file, golden};
use entroscan::entropy::{shannon_entropy, stream_entropy};
use entroscan::hashing::{DigestAlgorithm, DigestSet, MultiDigest};
use entroscan::io::{LocalSource, TargetSource, MAX_TARGET_SIZE};
use entroscan::scan::{self, ScanInput};
use entroscan::{ResultSink, ScanConfig};

#[test]
fn test_golden_elf_scan() {
    let path = data_file(golden::HELLO_ELF);
    let config = ScanConfig::default();
    let sink = ResultSink::new();

    let stats = scan::run(&config, &ScanInput::File(path.clone()), &sink, None).unwrap();
    assert_eq!(stats.reported, 1);
    assert!(stats.failures.is_empty());

    let results = sink.into_results();
    let result = &results[0];
    assert_eq!(result.name, golden::HELLO_ELF);
    assert_eq!(result.path, path.to_string_lossy());
    assert_eq!(result.entropy, golden::ENTROPY);
    assert!(result.elf);
    assert_eq!(result.digest(DigestAlgorithm::Md5), Some(golden::MD5));
    assert_eq!(result.digest(DigestAlgorithm::Sha1), Some(golden::SHA1));
    assert_eq!(result.digest(DigestAlgorithm::Sha256), Some(golden::SHA256));
    assert_eq!(result.digest(DigestAlgorithm::Sha512), Some(golden::SHA512));
}

#[test]
fn test_golden_elf_streamed_in_small_chunks() {
    let path = data_file(golden::HELLO_ELF);
    let mut source = LocalSource::open(&path, MAX_TARGET_SIZE).unwrap();
    assert_eq!(source.size(), golden::SIZE);

    // Chunking must not change the result.
    let mut scratch = vec![0u8; 7];
    let streamed = stream_entropy(&mut source, &mut scratch).unwrap();
    let whole = shannon_entropy(&std::fs::read(&path).unwrap());
    assert_eq!(streamed, golden::ENTROPY);
    assert!((whole - 7.28).abs() < 0.005);
}

#[test]
fn test_golden_digests_subset() {
    let data = std::fs::read(data_file(golden::HELLO_ELF)).unwrap();
    let digests = MultiDigest::compute(&data, DigestSet::SHA1 | DigestSet::SHA512)
        .into_result("hello.elf")
        .unwrap();
    assert_eq!(digests.len(), 2);
    assert_eq!(digests[&DigestAlgorithm::Sha1], golden::SHA1);
    assert_eq!(digests[&DigestAlgorithm::Sha512], golden::SHA512);
}

#[test]
fn test_golden_elf_above_threshold_only() {
    let path = data_file(golden::HELLO_ELF);
    let config = ScanConfig {
        threshold: 7.29,
        ..ScanConfig::default()
    };
    let sink = ResultSink::new();
    let stats = scan::run(&config, &ScanInput::File(path), &sink, None).unwrap();
    assert_eq!(stats.analyzed, 1);
    assert_eq!(stats.reported, 0);
    assert!(sink.is_empty());
}
