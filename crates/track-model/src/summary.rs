//! Summary report rows for likelihood masking audits.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One `(file, landmark)` line of the summary report.
///
/// Threshold rules fill `masked_fraction`; percentile rules fill `cutoff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub file: String,
    pub landmark: String,
    /// `threshold` or `percentile`.
    pub rule: String,
    pub masked_frames: usize,
    pub total_frames: usize,
    pub masked_fraction: Option<f64>,
    pub cutoff: Option<f64>,
}

/// Write summary rows as CSV with a header line.
pub fn write_summary<W: Write>(rows: &[SummaryRow], writer: W) -> Result<(), ModelError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write summary rows to a CSV file.
pub fn write_summary_file(rows: &[SummaryRow], path: &Path) -> Result<(), ModelError> {
    let file = File::create(path).map_err(|e| ModelError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_summary(rows, BufWriter::new(file))
}
