//! Positional outlier masking.
//!
//! Flags frames whose frame-to-frame displacement is implausibly large and
//! sets their `(x, y)` pair to missing.
//!
//! # Algorithm
//!
//! 1. **Displacement** from frame `i - 1` to `i` under the chosen metric.
//!    Frame 0 has none; neither does a frame whose own pair or whose
//!    predecessor's pair is already missing.
//! 2. **Cutoff** computed once per landmark from all defined displacements:
//!    - fixed: `d`
//!    - MAD: `median + k * MAD / 0.6745`
//!    - IQR: `Q3 + m * (Q3 - Q1)`
//!    - STD: `mean + s * std`
//! 3. **Mask** every frame whose displacement exceeds the cutoff, in a single
//!    pass over the precomputed displacements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trackrefine_common::{RefineError, RefineResult};
use trackrefine_model::{Landmark, PositionSettings, TrackTable};

use crate::report::{RefineWarning, Stage};
use crate::stats;

/// Scale factor relating MAD to the standard deviation of a normal
/// distribution.
pub const MAD_NORMAL_SCALE: f64 = 0.6745;

/// How consecutive positions are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementMetric {
    /// `sqrt(dx² + dy²)`
    Euclidean,
    /// `|dx|`
    X,
    /// `|dy|`
    Y,
}

impl FromStr for DisplacementMetric {
    type Err = RefineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            other => Err(RefineError::config(format!(
                "unknown displacement metric '{other}' (expected euclidean, x, or y)"
            ))),
        }
    }
}

impl fmt::Display for DisplacementMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Euclidean => "euclidean",
            Self::X => "x",
            Self::Y => "y",
        })
    }
}

impl DisplacementMetric {
    fn between(self, from: (f64, f64), to: (f64, f64)) -> f64 {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        match self {
            Self::Euclidean => (dx * dx + dy * dy).sqrt(),
            Self::X => dx.abs(),
            Self::Y => dy.abs(),
        }
    }
}

/// Outlier rule, applied uniformly to every landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum PositionRule {
    /// Flag displacements above a fixed distance.
    Fixed(f64),
    /// Flag displacements above `median + k * MAD / 0.6745`.
    Mad(f64),
    /// Flag displacements above `Q3 + m * IQR`.
    Iqr(f64),
    /// Flag displacements above `mean + s * std`.
    Std(f64),
}

impl fmt::Display for PositionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(d) => write!(f, "fixed threshold {d}"),
            Self::Mad(k) => write!(f, "MAD x{k}"),
            Self::Iqr(m) => write!(f, "IQR x{m}"),
            Self::Std(s) => write!(f, "STD x{s}"),
        }
    }
}

impl PositionRule {
    fn validate(self) -> RefineResult<Self> {
        let (name, value, allow_infinite) = match self {
            Self::Fixed(d) => ("fixed threshold", d, true),
            Self::Mad(k) => ("MAD multiplier", k, false),
            Self::Iqr(m) => ("IQR multiplier", m, false),
            Self::Std(s) => ("STD multiplier", s, false),
        };
        let finite_ok = allow_infinite || value.is_finite();
        if value > 0.0 && finite_ok {
            Ok(self)
        } else {
            Err(RefineError::config(format!(
                "{name} must be a positive number, got {value}"
            )))
        }
    }

    /// Cutoff over the defined displacements of one landmark.
    ///
    /// Returns `None` when a statistical rule has no displacements to work
    /// with. A fixed rule always has a cutoff.
    pub fn cutoff(&self, displacements: &[f64]) -> Option<f64> {
        match *self {
            Self::Fixed(d) => Some(d),
            _ if displacements.is_empty() => None,
            Self::Mad(k) => {
                let med = stats::median(displacements)?;
                let mad = stats::median_absolute_deviation(displacements)?;
                Some(med + k * floor_eps(mad) / MAD_NORMAL_SCALE)
            }
            Self::Iqr(m) => {
                let (q1, q3) = stats::quartiles(displacements)?;
                Some(q3 + m * (q3 - q1))
            }
            Self::Std(s) => {
                let mean = stats::mean(displacements)?;
                let std = stats::std_dev(displacements)?;
                Some(mean + s * floor_eps(std))
            }
        }
    }
}

/// Spread floored to machine epsilon.
fn floor_eps(spread: f64) -> f64 {
    if spread > 0.0 {
        spread
    } else {
        f64::EPSILON
    }
}

/// Positional outlier masking stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOutlierMasker {
    metric: DisplacementMetric,
    rule: PositionRule,
}

/// Per-landmark outcome of positional masking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPosition {
    pub landmark: String,
    pub cutoff: f64,
    /// Frames with a defined displacement.
    pub evaluated_frames: usize,
    pub masked_frames: usize,
}

/// Result of positional masking over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub metric: DisplacementMetric,
    pub rule: PositionRule,
    pub landmarks: Vec<LandmarkPosition>,
    pub warnings: Vec<RefineWarning>,
}

impl PositionReport {
    pub fn landmark(&self, name: &str) -> Option<&LandmarkPosition> {
        self.landmarks.iter().find(|l| l.landmark == name)
    }
}

impl PositionOutlierMasker {
    pub fn new(metric: DisplacementMetric, rule: PositionRule) -> RefineResult<Self> {
        Ok(Self {
            metric,
            rule: rule.validate()?,
        })
    }

    /// Build from raw settings. Exactly one rule field must be set.
    pub fn from_settings(settings: &PositionSettings) -> RefineResult<Self> {
        let metric: DisplacementMetric = settings.metric.parse()?;

        let candidates = [
            settings.fixed_threshold.map(PositionRule::Fixed),
            settings.mad_multiplier.map(PositionRule::Mad),
            settings.iqr_multiplier.map(PositionRule::Iqr),
            settings.std_multiplier.map(PositionRule::Std),
        ];
        let mut configured = candidates.into_iter().flatten();

        let rule = match (configured.next(), configured.next()) {
            (Some(rule), None) => rule,
            (None, _) => {
                return Err(RefineError::config(
                    "no position rule configured: set one of fixed_threshold, \
                     mad_multiplier, iqr_multiplier, std_multiplier",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(RefineError::config(
                    "position rules are mutually exclusive: set only one of fixed_threshold, \
                     mad_multiplier, iqr_multiplier, std_multiplier",
                ))
            }
        };

        Self::new(metric, rule)
    }

    pub fn metric(&self) -> DisplacementMetric {
        self.metric
    }

    pub fn rule(&self) -> PositionRule {
        self.rule
    }

    /// Displacement into each frame. `None` at frame 0 and wherever either
    /// endpoint pair is missing.
    pub fn displacements(&self, landmark: &Landmark) -> Vec<Option<f64>> {
        (0..landmark.len())
            .map(|i| {
                if i == 0 {
                    return None;
                }
                let prev = landmark.pair(i - 1)?;
                let curr = landmark.pair(i)?;
                Some(self.metric.between(prev, curr))
            })
            .collect()
    }

    pub fn apply(&self, mut table: TrackTable) -> (TrackTable, PositionReport) {
        let mut report = PositionReport {
            metric: self.metric,
            rule: self.rule,
            landmarks: vec![],
            warnings: vec![],
        };

        for landmark in table.landmarks_mut() {
            let displacements = self.displacements(landmark);
            let defined: Vec<f64> = displacements.iter().flatten().copied().collect();

            let Some(cutoff) = self.rule.cutoff(&defined) else {
                let warning = RefineWarning::insufficient(
                    Stage::Position,
                    &landmark.name,
                    "no consecutive non-missing frames to measure displacement",
                );
                warning.log();
                report.warnings.push(warning);
                continue;
            };

            let flagged: Vec<usize> = displacements
                .iter()
                .enumerate()
                .filter_map(|(i, d)| d.filter(|d| *d > cutoff).map(|_| i))
                .collect();
            for &i in &flagged {
                landmark.mask_pair(i);
            }

            tracing::debug!(
                "{}: cutoff {:.4} ({}), removed {} outlier frames",
                landmark.name,
                cutoff,
                self.rule,
                flagged.len()
            );
            report.landmarks.push(LandmarkPosition {
                landmark: landmark.name.clone(),
                cutoff,
                evaluated_frames: defined.len(),
                masked_frames: flagged.len(),
            });
        }

        (table, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackrefine_model::MISSING;

    fn single(name: &str, x: Vec<f64>, y: Vec<f64>) -> TrackTable {
        let n = x.len();
        TrackTable::new(vec![Landmark::new(name, x, y, vec![1.0; n])]).unwrap()
    }

    fn masked_frames(table: &TrackTable, name: &str) -> Vec<usize> {
        let l = table.landmark(name).unwrap();
        (0..l.len()).filter(|&i| l.is_pair_missing(i)).collect()
    }

    #[test]
    fn test_fixed_threshold_scenario() {
        // Displacements along x: [_, 1, 2, 1, 50, 2]
        let table = single(
            "paw",
            vec![0.0, 1.0, 3.0, 4.0, 54.0, 56.0],
            vec![0.0; 6],
        );
        let masker =
            PositionOutlierMasker::new(DisplacementMetric::Euclidean, PositionRule::Fixed(10.0))
                .unwrap();
        let (out, report) = masker.apply(table);

        assert_eq!(masked_frames(&out, "paw"), vec![4]);
        assert_eq!(report.landmark("paw").unwrap().masked_frames, 1);
        assert_eq!(out.landmark("paw").unwrap().likelihood, vec![1.0; 6]);
    }

    #[test]
    fn test_euclidean_x_and_y_metrics() {
        let rule = PositionRule::Fixed(5.0);

        let euclid = PositionOutlierMasker::new(DisplacementMetric::Euclidean, rule).unwrap();
        let (out, _) = euclid.apply(single("p", vec![10.0, 12.0, 20.0], vec![20.0, 24.0, 30.0]));
        assert_eq!(masked_frames(&out, "p"), vec![2]);

        let x = PositionOutlierMasker::new(DisplacementMetric::X, rule).unwrap();
        let (out, _) = x.apply(single("p", vec![10.0, 16.0, 20.0], vec![20.0, 21.0, 22.0]));
        assert_eq!(masked_frames(&out, "p"), vec![1]);

        let y = PositionOutlierMasker::new(DisplacementMetric::Y, rule).unwrap();
        let (out, _) = y.apply(single("p", vec![10.0, 12.0, 15.0], vec![20.0, 27.0, 35.0]));
        assert_eq!(masked_frames(&out, "p"), vec![1, 2]);
    }

    #[test]
    fn test_missing_predecessor_is_not_evaluated() {
        let table = single(
            "paw",
            vec![0.0, MISSING, 100.0, 101.0],
            vec![0.0, MISSING, 0.0, 0.0],
        );
        let masker =
            PositionOutlierMasker::new(DisplacementMetric::Euclidean, PositionRule::Fixed(10.0))
                .unwrap();
        let displacements = masker.displacements(table.landmark("paw").unwrap());
        assert_eq!(displacements, vec![None, None, None, Some(1.0)]);

        let (out, _) = masker.apply(table);
        // Frame 2 jumped 100 from frame 0, but frame 1 was missing.
        assert_eq!(masked_frames(&out, "paw"), vec![1]);
    }

    #[test]
    fn test_mad_rule_cutoff() {
        // Displacements: [1, 1, 2, 2, 4, 6, 9] → median 2, MAD 1.
        let d = [1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0];
        let cutoff = PositionRule::Mad(3.0).cutoff(&d).unwrap();
        assert!((cutoff - (2.0 + 3.0 / MAD_NORMAL_SCALE)).abs() < 1e-12);
    }

    #[test]
    fn test_iqr_rule_cutoff() {
        let d = [1.0, 2.0, 3.0, 4.0, 5.0];
        let cutoff = PositionRule::Iqr(1.5).cutoff(&d).unwrap();
        assert!((cutoff - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_std_rule_cutoff() {
        let d = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let cutoff = PositionRule::Std(2.0).cutoff(&d).unwrap();
        assert!((cutoff - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_spread_uses_epsilon() {
        let d = [1.0, 1.0, 1.0];
        let cutoff = PositionRule::Mad(3.5).cutoff(&d).unwrap();
        assert!(cutoff > 1.0);
        assert!(cutoff < 1.0 + 1e-12);
    }

    #[test]
    fn test_mad_masks_single_jump() {
        // Displacements [1, 2, 1, 2, 1, 35, 2, 1]: median 1.5, MAD 0.5,
        // cutoff ≈ 4.09.
        let x = vec![0.0, 1.0, 3.0, 4.0, 6.0, 7.0, 42.0, 44.0, 45.0];
        let table = single("snout", x, vec![0.0; 9]);
        let masker =
            PositionOutlierMasker::new(DisplacementMetric::X, PositionRule::Mad(3.5)).unwrap();
        let (out, _) = masker.apply(table);
        assert_eq!(masked_frames(&out, "snout"), vec![6]);
    }

    #[test]
    fn test_statistics_are_not_recomputed_after_masking() {
        // Frame 2 is an outlier; masking it must not turn frame 3 into one.
        let table = single("tail", vec![0.0, 1.0, 30.0, 31.0, 32.0], vec![0.0; 5]);
        let masker =
            PositionOutlierMasker::new(DisplacementMetric::X, PositionRule::Fixed(10.0)).unwrap();
        let (out, _) = masker.apply(table);
        assert_eq!(masked_frames(&out, "tail"), vec![2]);
    }

    #[test]
    fn test_landmark_without_displacements_warns() {
        let table = single("ear", vec![MISSING, 1.0, MISSING], vec![MISSING, 1.0, MISSING]);
        let masker =
            PositionOutlierMasker::new(DisplacementMetric::Euclidean, PositionRule::Std(3.0))
                .unwrap();
        let (out, report) = masker.apply(table.clone());
        assert!(out.same_values(&table));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.landmark("ear").is_none());
    }

    #[test]
    fn test_fixed_rule_without_displacements_is_silent() {
        let table = single("ear", vec![4.0], vec![2.0]);
        let masker =
            PositionOutlierMasker::new(DisplacementMetric::Euclidean, PositionRule::Fixed(10.0))
                .unwrap();
        let (out, report) = masker.apply(table.clone());
        assert!(out.same_values(&table));
        assert!(report.warnings.is_empty());

        let ear = report.landmark("ear").unwrap();
        assert_eq!(ear.cutoff, 10.0);
        assert_eq!(ear.evaluated_frames, 0);
        assert_eq!(ear.masked_frames, 0);
        assert_eq!(PositionRule::Fixed(10.0).cutoff(&[]), Some(10.0));
        assert_eq!(PositionRule::Mad(3.0).cutoff(&[]), None);
    }

    #[test]
    fn test_settings_require_exactly_one_rule() {
        let none = PositionSettings::default();
        assert!(PositionOutlierMasker::from_settings(&none)
            .unwrap_err()
            .is_config());

        let two = PositionSettings {
            fixed_threshold: Some(10.0),
            iqr_multiplier: Some(1.5),
            ..Default::default()
        };
        let err = PositionOutlierMasker::from_settings(&two).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));

        let one = PositionSettings {
            metric: "Y".to_string(),
            std_multiplier: Some(3.0),
            ..Default::default()
        };
        let masker = PositionOutlierMasker::from_settings(&one).unwrap();
        assert_eq!(masker.metric(), DisplacementMetric::Y);
        assert_eq!(masker.rule(), PositionRule::Std(3.0));
    }

    #[test]
    fn test_invalid_parameters_are_config_errors() {
        let m = DisplacementMetric::Euclidean;
        assert!(PositionOutlierMasker::new(m, PositionRule::Fixed(0.0)).is_err());
        assert!(PositionOutlierMasker::new(m, PositionRule::Mad(-1.0)).is_err());
        assert!(PositionOutlierMasker::new(m, PositionRule::Iqr(f64::NAN)).is_err());
        assert!(PositionOutlierMasker::new(m, PositionRule::Std(f64::INFINITY)).is_err());
        assert!(PositionOutlierMasker::new(m, PositionRule::Fixed(f64::INFINITY)).is_ok());
        assert!("manhattan".parse::<DisplacementMetric>().is_err());
    }
}
