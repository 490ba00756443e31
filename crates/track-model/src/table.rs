//! In-memory track table.
//!
//! A table holds `N` frames for a fixed, ordered set of landmarks. Each
//! landmark owns three aligned columns (`x`, `y`, `likelihood`). A missing
//! cell is NaN; no other value is treated as missing.
//!
//! Columns that belong to no landmark (frame index, `bodyparts_coords`) are
//! kept verbatim as [`PassthroughColumn`]s. A column layout records where
//! each column sat in the source so it can be written back in place.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Sentinel stored in a missing cell.
pub const MISSING: f64 = f64::NAN;

/// Whether a cell value is the missing sentinel.
#[inline]
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// Column kind within a landmark triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coord {
    X,
    Y,
    Likelihood,
}

impl Coord {
    pub const ALL: [Coord; 3] = [Coord::X, Coord::Y, Coord::Likelihood];

    /// Suffix used in flat column names (`{landmark}_{suffix}`).
    pub fn suffix(self) -> &'static str {
        match self {
            Coord::X => "x",
            Coord::Y => "y",
            Coord::Likelihood => "likelihood",
        }
    }

    /// Position within a `[x, y, likelihood]` triple.
    pub fn index(self) -> usize {
        match self {
            Coord::X => 0,
            Coord::Y => 1,
            Coord::Likelihood => 2,
        }
    }

    /// Parse a column suffix, case-insensitively.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let suffix = suffix.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.suffix().eq_ignore_ascii_case(suffix))
    }
}

/// One tracked point and its per-frame samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub likelihood: Vec<f64>,
}

impl Landmark {
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>, likelihood: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            likelihood,
        }
    }

    /// Frame count (length of the `x` column).
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// A pair counts as missing when either coordinate is missing.
    #[inline]
    pub fn is_pair_missing(&self, frame: usize) -> bool {
        is_missing(self.x[frame]) || is_missing(self.y[frame])
    }

    /// Set both coordinates of a frame to missing.
    #[inline]
    pub fn mask_pair(&mut self, frame: usize) {
        self.x[frame] = MISSING;
        self.y[frame] = MISSING;
    }

    /// `(x, y)` at a frame, or `None` when the pair is missing.
    pub fn pair(&self, frame: usize) -> Option<(f64, f64)> {
        if self.is_pair_missing(frame) {
            None
        } else {
            Some((self.x[frame], self.y[frame]))
        }
    }

    /// Number of frames whose pair is missing.
    pub fn missing_pairs(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_pair_missing(i)).count()
    }

    /// Non-missing likelihood values in frame order.
    pub fn valid_likelihoods(&self) -> Vec<f64> {
        self.likelihood
            .iter()
            .copied()
            .filter(|v| !is_missing(*v))
            .collect()
    }

    pub fn column(&self, coord: Coord) -> &[f64] {
        match coord {
            Coord::X => &self.x,
            Coord::Y => &self.y,
            Coord::Likelihood => &self.likelihood,
        }
    }

    fn columns_aligned(&self) -> bool {
        self.x.len() == self.y.len() && self.x.len() == self.likelihood.len()
    }

    fn retain_frames(&mut self, keep: &[bool]) {
        for column in [&mut self.x, &mut self.y, &mut self.likelihood] {
            let mut flags = keep.iter();
            column.retain(|_| flags.next().copied().unwrap_or(true));
        }
    }
}

/// A non-landmark column, stored as raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughColumn {
    pub name: String,
    pub values: Vec<String>,
}

impl PassthroughColumn {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    fn retain_frames(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        self.values.retain(|_| flags.next().copied().unwrap_or(true));
    }
}

/// One output column position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRef {
    Landmark { name: String, coord: Coord },
    /// Index into the table's passthrough columns.
    Passthrough(usize),
}

impl ColumnRef {
    pub fn landmark(name: impl Into<String>, coord: Coord) -> Self {
        Self::Landmark {
            name: name.into(),
            coord,
        }
    }
}

/// Ordered frames for a fixed set of landmarks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackTable {
    landmarks: Vec<Landmark>,
    frame_count: usize,
    #[serde(default)]
    passthrough: Vec<PassthroughColumn>,
    #[serde(default)]
    layout: Vec<ColumnRef>,
}

impl TrackTable {
    /// Build a table, checking column alignment and name uniqueness.
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self, ModelError> {
        let frame_count = landmarks.first().map(Landmark::len).unwrap_or(0);
        let mut seen = HashSet::new();

        for landmark in &landmarks {
            if !seen.insert(landmark.name.as_str()) {
                return Err(ModelError::schema(format!(
                    "landmark '{}' appears more than once",
                    landmark.name
                )));
            }
            if !landmark.columns_aligned() || landmark.len() != frame_count {
                return Err(ModelError::schema(format!(
                    "landmark '{}' has columns of length x={}, y={}, likelihood={} (expected {frame_count})",
                    landmark.name,
                    landmark.x.len(),
                    landmark.y.len(),
                    landmark.likelihood.len()
                )));
            }
        }

        Ok(Self {
            landmarks,
            frame_count,
            passthrough: vec![],
            layout: vec![],
        })
    }

    /// Attach non-landmark columns and the source column order.
    ///
    /// Every passthrough column must have one value per frame. When the
    /// table has no landmarks the frame count is taken from the columns.
    pub fn with_passthrough(
        mut self,
        columns: Vec<PassthroughColumn>,
        layout: Vec<ColumnRef>,
    ) -> Result<Self, ModelError> {
        if self.landmarks.is_empty() {
            self.frame_count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        }
        if let Some(bad) = columns.iter().find(|c| c.values.len() != self.frame_count) {
            return Err(ModelError::schema(format!(
                "column '{}' has {} values (expected {})",
                bad.name,
                bad.values.len(),
                self.frame_count
            )));
        }
        if let Some(ColumnRef::Passthrough(index)) = layout
            .iter()
            .find(|c| matches!(c, ColumnRef::Passthrough(i) if *i >= columns.len()))
        {
            return Err(ModelError::schema(format!(
                "column layout refers to passthrough column {index}, only {} exist",
                columns.len()
            )));
        }
        self.passthrough = columns;
        self.layout = layout;
        Ok(self)
    }

    pub fn passthrough(&self) -> &[PassthroughColumn] {
        &self.passthrough
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn landmark_count(&self) -> usize {
        self.landmarks.len()
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Mutable access to the landmark columns.
    ///
    /// Callers must keep every column at `frame_count` entries.
    pub fn landmarks_mut(&mut self) -> &mut [Landmark] {
        &mut self.landmarks
    }

    pub fn landmark(&self, name: &str) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.name == name)
    }

    pub fn landmark_mut(&mut self, name: &str) -> Option<&mut Landmark> {
        self.landmarks.iter_mut().find(|l| l.name == name)
    }

    pub fn landmark_names(&self) -> impl Iterator<Item = &str> {
        self.landmarks.iter().map(|l| l.name.as_str())
    }

    /// Look up a landmark that a stage depends on.
    pub fn require_landmark(&self, name: &str) -> Result<&Landmark, ModelError> {
        self.landmark(name).ok_or_else(|| {
            ModelError::schema(format!(
                "no {name}_x/{name}_y/{name}_likelihood columns in table"
            ))
        })
    }

    /// Columns in output order.
    ///
    /// Follows the source layout, skipping removed landmarks. Passthrough
    /// columns missing from the layout lead; landmark columns missing from
    /// it trail.
    pub fn output_columns(&self) -> Vec<ColumnRef> {
        let mut columns: Vec<ColumnRef> = (0..self.passthrough.len())
            .map(ColumnRef::Passthrough)
            .filter(|c| !self.layout.contains(c))
            .collect();

        columns.extend(self.layout.iter().cloned().filter(|c| match c {
            ColumnRef::Landmark { name, .. } => self.landmark(name).is_some(),
            ColumnRef::Passthrough(_) => true,
        }));

        for landmark in &self.landmarks {
            for coord in Coord::ALL {
                let column = ColumnRef::landmark(landmark.name.as_str(), coord);
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        columns
    }

    /// Flat column names in output order.
    pub fn column_names(&self) -> Vec<String> {
        self.output_columns()
            .into_iter()
            .map(|c| match c {
                ColumnRef::Landmark { name, coord } => format!("{name}_{}", coord.suffix()),
                ColumnRef::Passthrough(i) => self.passthrough[i].name.clone(),
            })
            .collect()
    }

    /// Keep only the frames whose flag is `true`, preserving order.
    ///
    /// Frames past the end of `keep` are kept.
    pub fn retain_frames(&mut self, keep: &[bool]) {
        for landmark in &mut self.landmarks {
            landmark.retain_frames(keep);
        }
        for column in &mut self.passthrough {
            column.retain_frames(keep);
        }
        self.frame_count = (0..self.frame_count)
            .filter(|&i| keep.get(i).copied().unwrap_or(true))
            .count();
    }

    /// Remove landmarks by name. Returns the names that were removed.
    pub fn remove_landmarks(&mut self, names: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        self.landmarks.retain(|l| {
            if names.iter().any(|n| n == &l.name) {
                removed.push(l.name.clone());
                false
            } else {
                true
            }
        });
        if self.landmarks.is_empty() && self.passthrough.is_empty() {
            self.frame_count = 0;
        }
        removed
    }

    /// Total missing pairs across all landmarks.
    pub fn missing_pairs(&self) -> usize {
        self.landmarks.iter().map(Landmark::missing_pairs).sum()
    }

    /// Cell-wise equality where two missing cells compare equal.
    pub fn same_values(&self, other: &TrackTable) -> bool {
        fn column_eq(a: &[f64], b: &[f64]) -> bool {
            a.len() == b.len()
                && a
                    .iter()
                    .zip(b)
                    .all(|(p, q)| (is_missing(*p) && is_missing(*q)) || p == q)
        }

        self.frame_count == other.frame_count
            && self.passthrough == other.passthrough
            && self.landmarks.len() == other.landmarks.len()
            && self.landmarks.iter().zip(&other.landmarks).all(|(a, b)| {
                a.name == b.name
                    && column_eq(&a.x, &b.x)
                    && column_eq(&a.y, &b.y)
                    && column_eq(&a.likelihood, &b.likelihood)
            })
    }
}
