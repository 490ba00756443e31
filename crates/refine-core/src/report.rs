//! Structured results returned alongside each refined table.

use std::fmt;

use serde::{Deserialize, Serialize};
use trackrefine_model::SummaryRow;

use crate::interpolate::InterpolationReport;
use crate::likelihood::LikelihoodReport;
use crate::normalize::NormalizeReport;
use crate::position::PositionReport;

/// Pipeline stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    Likelihood,
    Position,
    Interpolate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Normalize => "normalize",
            Stage::Likelihood => "likelihood",
            Stage::Position => "position",
            Stage::Interpolate => "interpolate",
        };
        f.write_str(name)
    }
}

/// Recoverable conditions recorded while refining a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefineWarning {
    /// Too little data for the requested operation; the landmark was left
    /// unchanged by this stage.
    InsufficientData {
        stage: Stage,
        landmark: String,
        detail: String,
    },

    /// Both a threshold and a percentile override were given for one
    /// landmark. The threshold is applied.
    PrecedenceConflict {
        landmark: String,
        threshold: f64,
        percentile: f64,
    },

    /// An excluded landmark name did not match any table column.
    UnknownExclusion { landmark: String },
}

impl fmt::Display for RefineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefineWarning::InsufficientData {
                stage,
                landmark,
                detail,
            } => write!(f, "[{stage}] {landmark}: insufficient data ({detail})"),
            RefineWarning::PrecedenceConflict {
                landmark,
                threshold,
                percentile,
            } => write!(
                f,
                "{landmark}: threshold {threshold} overrides percentile {percentile}"
            ),
            RefineWarning::UnknownExclusion { landmark } => {
                write!(f, "excluded landmark '{landmark}' not found in table")
            }
        }
    }
}

impl RefineWarning {
    pub(crate) fn insufficient(
        stage: Stage,
        landmark: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InsufficientData {
            stage,
            landmark: landmark.into(),
            detail: detail.into(),
        }
    }

    /// Emit this warning through `tracing`.
    pub fn log(&self) {
        tracing::warn!("{self}");
    }
}

/// Everything the pipeline learned about one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefineReport {
    pub normalize: Option<NormalizeReport>,
    pub likelihood: Option<LikelihoodReport>,
    pub position: Option<PositionReport>,
    pub interpolate: Option<InterpolationReport>,

    /// Warnings from every stage, in the order they were raised.
    pub warnings: Vec<RefineWarning>,
}

impl RefineReport {
    /// Summary report rows for this table, one per likelihood-masked landmark.
    pub fn summary_rows(&self, file: &str) -> Vec<SummaryRow> {
        self.likelihood
            .as_ref()
            .map(|report| report.summary_rows(file))
            .unwrap_or_default()
    }
}
