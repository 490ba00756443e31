//! Likelihood masking.
//!
//! Sets a landmark's `(x, y)` pair to missing wherever the tracker's
//! confidence fails the landmark's criterion. Likelihood values themselves
//! are never modified.
//!
//! # Criterion resolution
//!
//! Resolved once per landmark when the masker is built:
//!
//! 1. per-landmark threshold
//! 2. per-landmark percentile
//! 3. global threshold
//! 4. global percentile
//!
//! A landmark with both overrides uses its threshold and raises a
//! [`RefineWarning::PrecedenceConflict`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use trackrefine_common::{RefineError, RefineResult};
use trackrefine_model::{is_missing, LikelihoodSettings, SummaryRow, TrackTable};

use crate::report::{RefineWarning, Stage};
use crate::stats;

/// A likelihood rule for one landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum Criterion {
    /// Fails when `likelihood < t`, `t` in `[0, 1]`.
    Threshold(f64),
    /// Fails when `likelihood <= P_p(likelihood)`, `p` in `[0, 100]`.
    Percentile(f64),
}

impl Criterion {
    /// Rule family name used in summary reports.
    pub fn family(&self) -> &'static str {
        match self {
            Criterion::Threshold(_) => "threshold",
            Criterion::Percentile(_) => "percentile",
        }
    }

    fn validate(self, scope: &str) -> RefineResult<Self> {
        match self {
            Criterion::Threshold(t) if !(0.0..=1.0).contains(&t) => Err(RefineError::config(
                format!("{scope} threshold {t} is outside [0, 1]"),
            )),
            Criterion::Percentile(p) if !(0.0..=100.0).contains(&p) => Err(RefineError::config(
                format!("{scope} percentile {p} is outside [0, 100]"),
            )),
            valid => Ok(valid),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Threshold(t) => write!(f, "threshold {t}"),
            Criterion::Percentile(p) => write!(f, "percentile {p}"),
        }
    }
}

/// Likelihood masking stage.
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodMasker {
    global: Option<Criterion>,
    overrides: BTreeMap<String, Criterion>,
    conflicts: Vec<RefineWarning>,
}

/// Per-landmark outcome of likelihood masking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkLikelihood {
    pub landmark: String,
    pub criterion: Criterion,
    /// Likelihood value below (threshold) or at-or-below (percentile)
    /// which frames were masked.
    pub cutoff: f64,
    pub masked_frames: usize,
    pub total_frames: usize,
}

impl LandmarkLikelihood {
    pub fn masked_fraction(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.masked_frames as f64 / self.total_frames as f64
        }
    }
}

/// Result of likelihood masking over one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodReport {
    pub landmarks: Vec<LandmarkLikelihood>,
    pub warnings: Vec<RefineWarning>,
}

impl LikelihoodReport {
    pub fn landmark(&self, name: &str) -> Option<&LandmarkLikelihood> {
        self.landmarks.iter().find(|l| l.landmark == name)
    }

    /// Threshold rules report the masked fraction, percentile rules the
    /// computed cutoff.
    pub fn summary_rows(&self, file: &str) -> Vec<SummaryRow> {
        self.landmarks
            .iter()
            .map(|l| {
                let (masked_fraction, cutoff) = match l.criterion {
                    Criterion::Threshold(_) => (Some(l.masked_fraction()), None),
                    Criterion::Percentile(_) => (None, Some(l.cutoff)),
                };
                SummaryRow {
                    file: file.to_string(),
                    landmark: l.landmark.clone(),
                    rule: l.criterion.family().to_string(),
                    masked_frames: l.masked_frames,
                    total_frames: l.total_frames,
                    masked_fraction,
                    cutoff,
                }
            })
            .collect()
    }
}

impl LikelihoodMasker {
    /// Build a masker from a global rule and per-landmark overrides.
    pub fn new(
        global: Option<Criterion>,
        overrides: BTreeMap<String, Criterion>,
    ) -> RefineResult<Self> {
        if global.is_none() && overrides.is_empty() {
            return Err(RefineError::config(
                "no likelihood criterion configured: set a global threshold or percentile, \
                 or at least one per-landmark override",
            ));
        }

        let global = global.map(|c| c.validate("global")).transpose()?;
        let overrides = overrides
            .into_iter()
            .map(|(name, c)| {
                let scope = format!("landmark '{name}'");
                c.validate(&scope).map(|c| (name, c))
            })
            .collect::<RefineResult<BTreeMap<_, _>>>()?;

        Ok(Self {
            global,
            overrides,
            conflicts: vec![],
        })
    }

    /// Build a masker from raw settings, resolving override precedence.
    pub fn from_settings(settings: &LikelihoodSettings) -> RefineResult<Self> {
        let global = match (settings.global_threshold, settings.global_percentile) {
            (Some(_), Some(_)) => {
                return Err(RefineError::config(
                    "global threshold and global percentile are mutually exclusive",
                ))
            }
            (Some(t), None) => Some(Criterion::Threshold(t)),
            (None, Some(p)) => Some(Criterion::Percentile(p)),
            (None, None) => None,
        };

        let mut overrides: BTreeMap<String, Criterion> = settings
            .per_landmark_percentile
            .iter()
            .map(|(name, p)| (name.clone(), Criterion::Percentile(*p)))
            .collect();

        let mut conflicts = Vec::new();
        for (name, t) in &settings.per_landmark_threshold {
            if let Some(Criterion::Percentile(p)) = overrides.get(name) {
                let warning = RefineWarning::PrecedenceConflict {
                    landmark: name.clone(),
                    threshold: *t,
                    percentile: *p,
                };
                warning.log();
                conflicts.push(warning);
            }
            overrides.insert(name.clone(), Criterion::Threshold(*t));
        }

        let mut masker = Self::new(global, overrides)?;
        masker.conflicts = conflicts;
        Ok(masker)
    }

    /// The rule applied to a landmark, if any.
    pub fn criterion_for(&self, landmark: &str) -> Option<Criterion> {
        self.overrides.get(landmark).copied().or(self.global)
    }

    /// Precedence conflicts found while resolving overrides.
    pub fn conflicts(&self) -> &[RefineWarning] {
        &self.conflicts
    }

    pub fn apply(&self, mut table: TrackTable) -> RefineResult<(TrackTable, LikelihoodReport)> {
        for name in self.overrides.keys() {
            table.require_landmark(name)?;
        }

        let mut report = LikelihoodReport {
            warnings: self.conflicts.clone(),
            ..Default::default()
        };

        for landmark in table.landmarks_mut() {
            let Some(criterion) = self.criterion_for(&landmark.name) else {
                tracing::debug!("{}: no likelihood criterion, left unmasked", landmark.name);
                continue;
            };

            // Percentile cutoffs are inclusive, thresholds are not.
            let (cutoff, inclusive) = match criterion {
                Criterion::Threshold(t) => (t, false),
                Criterion::Percentile(p) => {
                    match stats::percentile(&landmark.likelihood, p) {
                        Some(cut) => (cut, true),
                        None => {
                            let warning = RefineWarning::insufficient(
                                Stage::Likelihood,
                                &landmark.name,
                                "no non-missing likelihood values for percentile",
                            );
                            warning.log();
                            report.warnings.push(warning);
                            continue;
                        }
                    }
                }
            };

            let mut masked = 0;
            for i in 0..landmark.len() {
                let value = landmark.likelihood[i];
                let fails = if inclusive {
                    value <= cutoff
                } else {
                    value < cutoff
                };
                if !is_missing(value) && fails {
                    landmark.mask_pair(i);
                    masked += 1;
                }
            }

            let entry = LandmarkLikelihood {
                landmark: landmark.name.clone(),
                criterion,
                cutoff,
                masked_frames: masked,
                total_frames: landmark.len(),
            };
            tracing::debug!(
                "{}: {} → cutoff {:.4}, masked {}/{} ({:.2}%)",
                entry.landmark,
                criterion,
                cutoff,
                masked,
                entry.total_frames,
                entry.masked_fraction() * 100.0
            );
            report.landmarks.push(entry);
        }

        Ok((table, report))
    }
}
