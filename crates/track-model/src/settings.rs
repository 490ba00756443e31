//! Pipeline settings as stored in JSON configuration files.
//!
//! These are the raw, user-facing options. Method and metric names stay as
//! strings here; `trackrefine-core` validates them and resolves the typed
//! stage rules before any table is processed.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Settings for a full refinement run. Absent stages are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub normalize: Option<NormalizeSettings>,
    pub likelihood: Option<LikelihoodSettings>,
    pub position: Option<PositionSettings>,
    pub interpolate: Option<InterpolateSettings>,
}

/// Coordinate normalization options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    /// Negate every y coordinate.
    pub invert_y: bool,

    /// Landmarks removed from the table.
    pub exclude: Vec<String>,
}

/// Likelihood masking options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LikelihoodSettings {
    /// Fixed cutoff in `[0, 1]` applied to every landmark.
    pub global_threshold: Option<f64>,

    /// Percentile in `[0, 100]` computed per landmark.
    pub global_percentile: Option<f64>,

    pub per_landmark_threshold: BTreeMap<String, f64>,
    pub per_landmark_percentile: BTreeMap<String, f64>,
}

/// Positional outlier options. Exactly one rule field must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSettings {
    /// `euclidean`, `x`, or `y`.
    pub metric: String,

    pub fixed_threshold: Option<f64>,
    pub mad_multiplier: Option<f64>,
    pub iqr_multiplier: Option<f64>,
    pub std_multiplier: Option<f64>,
}

/// Gap interpolation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolateSettings {
    /// `linear`, `nearest`, `zero`, `slinear`, `quadratic`, or `cubic`.
    pub method: String,

    /// Longest run of missing frames that will be filled.
    pub max_gap: usize,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            invert_y: true,
            exclude: vec![],
        }
    }
}

impl Default for PositionSettings {
    fn default() -> Self {
        Self {
            metric: "euclidean".to_string(),
            fixed_threshold: None,
            mad_multiplier: None,
            iqr_multiplier: None,
            std_multiplier: None,
        }
    }
}

impl Default for InterpolateSettings {
    fn default() -> Self {
        Self {
            method: "linear".to_string(),
            max_gap: 5,
        }
    }
}

impl PipelineSettings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ModelError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save settings as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ModelError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ModelError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Whether any stage is enabled.
    pub fn has_stages(&self) -> bool {
        self.normalize.is_some()
            || self.likelihood.is_some()
            || self.position.is_some()
            || self.interpolate.is_some()
    }
}
