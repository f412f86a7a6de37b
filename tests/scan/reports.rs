//! Report rendering from real scans.

use crate::common::{data_file, golden};
use entroscan::output;
use entroscan::results::InterimPrinter;
use entroscan::scan::{self, ScanInput};
use entroscan::{DigestSet, OutputConfig, ResultSink, ScanConfig};
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn scan_golden(sink: &ResultSink) {
    let input = ScanInput::File(data_file(golden::HELLO_ELF));
    scan::run(&ScanConfig::default(), &input, sink, None).unwrap();
}

#[test]
fn test_csv_report_written_to_file() {
    let sink = ResultSink::new();
    scan_golden(&sink);

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("report.csv");
    let config = OutputConfig {
        csv: true,
        delimiter: ";".into(),
        output_file: Some(out.clone()),
        ..OutputConfig::default()
    };
    output::emit(&sink.into_results(), &config).unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("filename;path;entropy;elf_file;md5;sha1;sha256;sha512")
    );
    let row: Vec<&str> = lines.next().unwrap().split(';').collect();
    assert_eq!(row[0], golden::HELLO_ELF);
    assert_eq!(row[2], "7.28");
    assert_eq!(row[3], "true");
    assert_eq!(row[4], golden::MD5);
    assert_eq!(row[7], golden::SHA512);
    assert!(lines.next().is_none());
}

#[test]
fn test_json_report_shape() {
    let sink = ResultSink::new();
    scan_golden(&sink);

    let config = OutputConfig {
        json: true,
        ..OutputConfig::default()
    };
    let rendered = output::render_report(&sink.into_results(), &config)
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&rendered).unwrap();
    let file = &value["files"][0];
    assert_eq!(file["name"], golden::HELLO_ELF);
    assert_eq!(file["entropy"], golden::ENTROPY);
    assert_eq!(file["elf"], true);
    assert_eq!(file["checksums"]["sha1"], golden::SHA1);
}

#[test]
fn test_interim_records_printed_during_scan() {
    let buf = SharedBuf::default();
    let printer = InterimPrinter::new(Box::new(buf.clone()), DigestSet::MD5);
    let sink = ResultSink::with_interim(Some(printer));
    scan_golden(&sink);

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let path = data_file(golden::HELLO_ELF);
    assert_eq!(
        text,
        format!(
            "filename: hello.elf\npath: {}\nentropy: 7.28\nelf: true\nmd5: {}\n\n",
            path.display(),
            golden::MD5
        )
    );
}

#[test]
fn test_csv_and_json_together_rejected() {
    let config = OutputConfig {
        csv: true,
        json: true,
        ..OutputConfig::default()
    };
    let err = output::emit(&[], &config).unwrap_err();
    assert!(err.is_fatal());
}
