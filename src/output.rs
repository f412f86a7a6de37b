//! Result rendering: interim console records and the final CSV/JSON report.

use crate::config::{OutputConfig, ReportFormat};
use crate::error::Result;
use crate::hashing::DigestSet;
use crate::io::error::IoError;
use crate::results::schema::Schema;
use crate::results::{AnalysisResult, Report};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes one human-readable record followed by a blank line:
///
/// ```text
/// filename: <name>
/// path: <path>
/// entropy: <0.00>
/// elf: <true|false>
/// <algorithm>: <hex digest>   (one line per enabled algorithm)
/// ```
pub fn write_interim<W: Write + ?Sized>(
    out: &mut W,
    result: &AnalysisResult,
    algorithms: DigestSet,
) -> std::io::Result<()> {
    let mut record = format!(
        "filename: {}\npath: {}\nentropy: {:.2}\nelf: {}\n",
        result.name, result.path, result.entropy, result.elf
    );
    for algorithm in algorithms.algorithms() {
        record.push_str(&format!(
            "{}: {}\n",
            algorithm,
            result.digest(algorithm).unwrap_or("")
        ));
    }
    record.push('\n');
    out.write_all(record.as_bytes())
}

/// Renders the structured report selected in `config`, if any.
pub fn render_report(results: &[AnalysisResult], config: &OutputConfig) -> Result<Option<Vec<u8>>> {
    let rendered = match config.report_format()? {
        Some(ReportFormat::Csv) => Schema::default()
            .with_delimiter(config.delimiter.as_str())
            .render(results)
            .into_bytes(),
        Some(ReportFormat::Json) => Report::new(results.to_vec()).to_json()?.into_bytes(),
        None => return Ok(None),
    };
    Ok(Some(rendered))
}

/// Writes the report to the configured file, or to stdout.
pub fn emit(results: &[AnalysisResult], config: &OutputConfig) -> Result<()> {
    let Some(report) = render_report(results, config)? else {
        return Ok(());
    };
    if report.is_empty() {
        return Ok(());
    }
    match &config.output_file {
        Some(path) => {
            write_file(path, &report)?;
            info!(path = %path.display(), records = results.len(), "Wrote report");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&report)
                .and_then(|()| stdout.flush())
                .map_err(|e| IoError::std("<stdout>", e))?;
        }
    }
    Ok(())
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).map_err(|e| IoError::std(path, e))?;
    Ok(())
}
