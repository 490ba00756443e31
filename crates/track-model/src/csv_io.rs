//! CSV reading and writing for track tables.
//!
//! Two header layouts are accepted on input:
//!
//! - **Flat:** one header row with `{landmark}_x`, `{landmark}_y`,
//!   `{landmark}_likelihood` columns.
//! - **Tracker:** the multi-row header written by DeepLabCut-style trackers
//!   (`scorer` / optional `individuals` / `bodyparts` / `coords`), with a
//!   frame index in the first column. Multi-animal files name their
//!   landmarks `{individual}_{bodypart}`.
//!
//! Columns outside any landmark triple are carried through as text. A tracker
//! frame index becomes `bodyparts_coords`.
//!
//! Output is always flat. Every column is written back at its source
//! position, with missing cells left empty.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use csv::StringRecord;

use crate::error::ModelError;
use crate::table::{
    is_missing, ColumnRef, Coord, Landmark, PassthroughColumn, TrackTable, MISSING,
};

/// Read a track table from any CSV source.
pub fn read_table<R: Read>(reader: R) -> Result<TrackTable, ModelError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let records = rdr.records().collect::<Result<Vec<_>, _>>()?;
    if records.is_empty() {
        return TrackTable::new(vec![]);
    }

    let layout = HeaderLayout::detect(&records);
    let header_rows = layout.header_rows();
    if records.len() < header_rows {
        return Err(ModelError::schema(format!(
            "tracker header needs {header_rows} rows, found {}",
            records.len()
        )));
    }

    let classes = layout.classify(&records);
    let frames = records.len() - header_rows;

    let mut passthrough = Vec::new();
    let mut column_layout = Vec::with_capacity(classes.len());
    for (index, class) in classes.iter().enumerate() {
        match class {
            Some((name, coord, _)) => {
                column_layout.push(ColumnRef::landmark(name.as_str(), *coord));
            }
            None => {
                column_layout.push(ColumnRef::Passthrough(passthrough.len()));
                let values = records[header_rows..]
                    .iter()
                    .map(|r| r.get(index).unwrap_or("").to_string())
                    .collect();
                passthrough.push(PassthroughColumn::new(
                    layout.column_label(&records, index),
                    values,
                ));
            }
        }
    }

    let columns = assemble_columns(classes)?;

    let mut landmarks = Vec::with_capacity(columns.len());
    for column in columns {
        let mut values: [Vec<f64>; 3] = std::array::from_fn(|_| Vec::with_capacity(frames));
        for (row, record) in records[header_rows..].iter().enumerate() {
            for (slot, &(index, ref label)) in column.indices.iter().enumerate() {
                let raw = record.get(index).unwrap_or("");
                let value = parse_cell(raw).ok_or_else(|| ModelError::InvalidCell {
                    row,
                    column: label.clone(),
                    value: raw.to_string(),
                })?;
                values[slot].push(value);
            }
        }
        let [x, y, likelihood] = values;
        landmarks.push(Landmark::new(column.name, x, y, likelihood));
    }

    tracing::debug!(
        layout = ?layout,
        landmarks = landmarks.len(),
        passthrough = passthrough.len(),
        frames,
        "Parsed track table"
    );
    TrackTable::new(landmarks)?.with_passthrough(passthrough, column_layout)
}

/// Read a track table from a CSV file.
pub fn read_table_file(path: &Path) -> Result<TrackTable, ModelError> {
    let file = File::open(path).map_err(|e| ModelError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_table(file)
}

/// Write a track table as flat CSV.
pub fn write_table<W: Write>(table: &TrackTable, writer: W) -> Result<(), ModelError> {
    enum Source<'a> {
        Numeric(&'a [f64]),
        Text(&'a [String]),
    }

    let sources: Vec<Source<'_>> = table
        .output_columns()
        .into_iter()
        .filter_map(|column| match column {
            ColumnRef::Landmark { name, coord } => {
                table.landmark(&name).map(|l| Source::Numeric(l.column(coord)))
            }
            ColumnRef::Passthrough(i) => table
                .passthrough()
                .get(i)
                .map(|c| Source::Text(c.values.as_slice())),
        })
        .collect();

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.column_names())?;

    for frame in 0..table.frame_count() {
        let row = sources.iter().map(|source| match source {
            Source::Numeric(values) => format_cell(values[frame]),
            Source::Text(values) => values[frame].clone(),
        });
        wtr.write_record(row)?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write a track table to a CSV file, creating parent directories.
pub fn write_table_file(table: &TrackTable, path: &Path) -> Result<(), ModelError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ModelError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let file = File::create(path).map_err(|e| ModelError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_table(table, BufWriter::new(file))
}

/// Parse one cell. Empty and NaN-like markers map to [`MISSING`].
fn parse_cell(raw: &str) -> Option<f64> {
    const MISSING_MARKERS: [&str; 6] = ["", "nan", "na", "n/a", "null", "<na>"];
    let raw = raw.trim();
    if MISSING_MARKERS.iter().any(|m| raw.eq_ignore_ascii_case(m)) {
        return Some(MISSING);
    }
    raw.parse::<f64>().ok()
}

fn format_cell(value: f64) -> String {
    if is_missing(value) {
        String::new()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderLayout {
    Flat,
    Tracker { rows: usize },
}

/// A classified column: `(landmark name, coord, label for error messages)`.
type ColumnClass = Option<(String, Coord, String)>;

impl HeaderLayout {
    fn detect(records: &[StringRecord]) -> Self {
        let first_cell = |row: usize| records.get(row).and_then(|r| r.get(0));
        if first_cell(0).is_some_and(|c| c.eq_ignore_ascii_case("scorer")) {
            let rows = if first_cell(1).is_some_and(|c| c.eq_ignore_ascii_case("individuals")) {
                4
            } else {
                3
            };
            HeaderLayout::Tracker { rows }
        } else {
            HeaderLayout::Flat
        }
    }

    /// Header label of a non-landmark column.
    fn column_label(self, records: &[StringRecord], col: usize) -> String {
        match self {
            HeaderLayout::Flat => records[0].get(col).unwrap_or("").to_string(),
            HeaderLayout::Tracker { rows } => {
                let bodypart = records[rows - 2].get(col).unwrap_or("");
                let coord = records[rows - 1].get(col).unwrap_or("");
                format!("{bodypart}_{coord}")
            }
        }
    }

    fn header_rows(self) -> usize {
        match self {
            HeaderLayout::Flat => 1,
            HeaderLayout::Tracker { rows } => rows,
        }
    }

    fn classify(self, records: &[StringRecord]) -> Vec<ColumnClass> {
        match self {
            HeaderLayout::Flat => records[0]
                .iter()
                .map(|name| {
                    let (base, suffix) = name.rsplit_once('_')?;
                    let coord = Coord::from_suffix(suffix)?;
                    (!base.is_empty()).then(|| (base.to_string(), coord, name.to_string()))
                })
                .collect(),
            HeaderLayout::Tracker { rows } => {
                let bodyparts = &records[rows - 2];
                let coords = &records[rows - 1];
                let individuals = (rows == 4).then(|| &records[1]);

                (0..coords.len())
                    .map(|col| {
                        // First column holds the frame index.
                        if col == 0 {
                            return None;
                        }
                        let coord = Coord::from_suffix(coords.get(col)?)?;
                        let bodypart = bodyparts.get(col)?;
                        let name = match individuals.and_then(|r| r.get(col)) {
                            Some(ind) if !ind.is_empty() => format!("{ind}_{bodypart}"),
                            _ => bodypart.to_string(),
                        };
                        let label = format!("{name}_{}", coord.suffix());
                        Some((name, coord, label))
                    })
                    .collect()
            }
        }
    }
}

struct LandmarkColumns {
    name: String,
    /// `(csv column index, label)` for x, y, likelihood.
    indices: [(usize, String); 3],
}

fn assemble_columns(classes: Vec<ColumnClass>) -> Result<Vec<LandmarkColumns>, ModelError> {
    let mut partial: Vec<(String, [Option<(usize, String)>; 3])> = Vec::new();

    for (index, class) in classes.into_iter().enumerate() {
        let Some((name, coord, label)) = class else {
            continue;
        };
        let slot = coord.index();

        let pos = match partial.iter().position(|(n, _)| *n == name) {
            Some(pos) => pos,
            None => {
                partial.push((name.clone(), [None, None, None]));
                partial.len() - 1
            }
        };

        let entry = &mut partial[pos].1[slot];
        if entry.is_some() {
            return Err(ModelError::schema(format!("duplicate column {label}")));
        }
        *entry = Some((index, label));
    }

    partial
        .into_iter()
        .map(|(name, [x, y, likelihood])| match (x, y, likelihood) {
            (Some(x), Some(y), Some(likelihood)) => Ok(LandmarkColumns {
                name,
                indices: [x, y, likelihood],
            }),
            (x, y, likelihood) => {
                let missing: Vec<&str> = [
                    (x.is_none(), "x"),
                    (y.is_none(), "y"),
                    (likelihood.is_none(), "likelihood"),
                ]
                .into_iter()
                .filter_map(|(absent, suffix)| absent.then_some(suffix))
                .collect();
                Err(ModelError::schema(format!(
                    "landmark '{name}' is missing its {} column(s)",
                    missing.join("/")
                )))
            }
        })
        .collect()
}
