//! Streaming reader and writer for JSON-lines routing records.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::types::RoutingRecord;

/// Records read from one file, plus how many lines were unusable
#[derive(Debug, Default)]
pub struct RecordBatch {
    pub records: Vec<RoutingRecord>,
    pub malformed: usize,
}

/// Read every record from a JSON-lines file.
///
/// Blank lines are ignored. Lines that fail to parse are logged and counted
/// rather than aborting the run.
pub fn read_records(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open routes file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut batch = RecordBatch::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<RoutingRecord>(trimmed) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                log::warn!("{}:{}: skipping malformed record: {}", path.display(), index + 1, e);
                batch.malformed += 1;
            }
        }
    }

    log::info!(
        "Read {} routing records from {} ({} malformed)",
        batch.records.len(),
        path.display(),
        batch.malformed
    );
    Ok(batch)
}

/// Write records as JSON lines, in the order given
pub fn write_records(path: &Path, records: &[RoutingRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record).context("Failed to serialize record")?;
        writer.write_all(b"\n")?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}
