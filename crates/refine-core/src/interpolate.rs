//! Gap-bounded interpolation.
//!
//! A gap is a maximal run of frames whose `(x, y)` pair is missing. Only
//! interior gaps (a complete pair on both sides) no longer than `max_gap`
//! frames are filled; edge gaps and long gaps stay missing. The abscissa is
//! the frame index and the anchors are the frames with a complete pair.
//! Only missing cells are written, so a half-present pair keeps its present
//! coordinate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trackrefine_common::{RefineError, RefineResult};
use trackrefine_model::{is_missing, InterpolateSettings, Landmark, TrackTable};

use crate::report::{RefineWarning, Stage};
use crate::spline::SplineBasis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    Linear,
    /// Nearest anchor; ties go to the preceding one.
    Nearest,
    /// Hold the preceding anchor's value.
    Zero,
    /// First-order spline. Identical to `Linear`.
    Slinear,
    Quadratic,
    Cubic,
}

impl FromStr for InterpolationMethod {
    type Err = RefineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "nearest" => Ok(Self::Nearest),
            "zero" => Ok(Self::Zero),
            "slinear" => Ok(Self::Slinear),
            "quadratic" => Ok(Self::Quadratic),
            "cubic" => Ok(Self::Cubic),
            other => Err(RefineError::config(format!(
                "unknown interpolation method '{other}' \
                 (expected linear, nearest, zero, slinear, quadratic, or cubic)"
            ))),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linear => "linear",
            Self::Nearest => "nearest",
            Self::Zero => "zero",
            Self::Slinear => "slinear",
            Self::Quadratic => "quadratic",
            Self::Cubic => "cubic",
        })
    }
}

impl InterpolationMethod {
    /// Degree of the global spline, for methods that fit one.
    pub fn spline_order(self) -> Option<usize> {
        match self {
            Self::Quadratic => Some(2),
            Self::Cubic => Some(3),
            _ => None,
        }
    }

    /// Fewest anchors the method can work from.
    pub fn min_anchors(self) -> usize {
        self.spline_order().map(|k| k + 1).unwrap_or(2)
    }
}

/// A run of frames with a missing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start: usize,
    pub len: usize,
}

impl Gap {
    /// One past the last missing frame.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Bounded by present frames on both sides of a table of `frames` rows.
    pub fn is_interior(&self, frames: usize) -> bool {
        self.start > 0 && self.end() < frames
    }
}

/// Maximal runs of pair-missing frames, in frame order.
pub fn find_gaps(landmark: &Landmark) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut run_start = None;
    for i in 0..landmark.len() {
        match (landmark.is_pair_missing(i), run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                gaps.push(Gap {
                    start,
                    len: i - start,
                });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        gaps.push(Gap {
            start,
            len: landmark.len() - start,
        });
    }
    gaps
}

/// Per-landmark outcome of interpolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkInterpolation {
    pub landmark: String,
    /// All gaps found, including edge and long ones.
    pub gaps: usize,
    pub filled_gaps: usize,
    pub filled_frames: usize,
    /// Frames whose pair is still missing afterwards.
    pub remaining_missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolationReport {
    pub method: InterpolationMethod,
    pub max_gap: usize,
    pub landmarks: Vec<LandmarkInterpolation>,
    pub warnings: Vec<RefineWarning>,
}

impl InterpolationReport {
    pub fn landmark(&self, name: &str) -> Option<&LandmarkInterpolation> {
        self.landmarks.iter().find(|l| l.landmark == name)
    }

    pub fn filled_frames(&self) -> usize {
        self.landmarks.iter().map(|l| l.filled_frames).sum()
    }
}

/// Gap filling stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapBoundedInterpolator {
    method: InterpolationMethod,
    max_gap: usize,
}

impl GapBoundedInterpolator {
    /// `max_gap == 0` is valid and fills nothing.
    pub fn new(method: InterpolationMethod, max_gap: usize) -> Self {
        Self { method, max_gap }
    }

    pub fn from_settings(settings: &InterpolateSettings) -> RefineResult<Self> {
        Ok(Self::new(settings.method.parse()?, settings.max_gap))
    }

    pub fn method(&self) -> InterpolationMethod {
        self.method
    }

    pub fn max_gap(&self) -> usize {
        self.max_gap
    }

    pub fn apply(&self, mut table: TrackTable) -> (TrackTable, InterpolationReport) {
        let frames = table.frame_count();
        let mut report = InterpolationReport {
            method: self.method,
            max_gap: self.max_gap,
            landmarks: vec![],
            warnings: vec![],
        };

        for landmark in table.landmarks_mut() {
            let gaps = find_gaps(landmark);
            let fillable: Vec<Gap> = gaps
                .iter()
                .copied()
                .filter(|g| g.is_interior(frames) && g.len <= self.max_gap)
                .collect();

            let mut filled_gaps = 0;
            let mut filled_frames = 0;
            if !fillable.is_empty() {
                match self.fill_landmark(landmark, &fillable) {
                    Ok(()) => {
                        filled_gaps = fillable.len();
                        filled_frames = fillable.iter().map(|g| g.len).sum();
                    }
                    Err(warning) => {
                        warning.log();
                        report.warnings.push(warning);
                    }
                }
            }

            let remaining_missing = landmark.missing_pairs();
            tracing::debug!(
                "{}: {} gaps, filled {} frames, {} still missing",
                landmark.name,
                gaps.len(),
                filled_frames,
                remaining_missing
            );
            report.landmarks.push(LandmarkInterpolation {
                landmark: landmark.name.clone(),
                gaps: gaps.len(),
                filled_gaps,
                filled_frames,
                remaining_missing,
            });
        }

        (table, report)
    }

    fn fill_landmark(&self, landmark: &mut Landmark, gaps: &[Gap]) -> Result<(), RefineWarning> {
        let Some(order) = self.method.spline_order() else {
            for gap in gaps {
                // Interior gaps are bracketed by complete pairs.
                let left = gap.start - 1;
                let right = gap.end();
                for frame in gap.start..gap.end() {
                    let x = self.local_value(left, right, frame, &landmark.x);
                    let y = self.local_value(left, right, frame, &landmark.y);
                    fill_cell(&mut landmark.x[frame], x);
                    fill_cell(&mut landmark.y[frame], y);
                }
            }
            return Ok(());
        };

        let anchors: Vec<usize> = (0..landmark.len())
            .filter(|&i| !landmark.is_pair_missing(i))
            .collect();
        if anchors.len() < self.method.min_anchors() {
            return Err(RefineWarning::insufficient(
                Stage::Interpolate,
                &landmark.name,
                format!(
                    "{} interpolation needs {} anchor frames, found {}",
                    self.method,
                    self.method.min_anchors(),
                    anchors.len()
                ),
            ));
        }

        let sites: Vec<f64> = anchors.iter().map(|&i| i as f64).collect();
        let xs: Vec<f64> = anchors.iter().map(|&i| landmark.x[i]).collect();
        let ys: Vec<f64> = anchors.iter().map(|&i| landmark.y[i]).collect();
        let singular = || {
            RefineWarning::insufficient(
                Stage::Interpolate,
                &landmark.name,
                format!("{} spline fit is singular", self.method),
            )
        };
        let basis = SplineBasis::new(&sites, order).ok_or_else(singular)?;
        let x_spline = basis.fit(&xs).ok_or_else(singular)?;
        let y_spline = basis.fit(&ys).ok_or_else(singular)?;

        for gap in gaps {
            for frame in gap.start..gap.end() {
                let t = frame as f64;
                fill_cell(&mut landmark.x[frame], x_spline.evaluate(t));
                fill_cell(&mut landmark.y[frame], y_spline.evaluate(t));
            }
        }
        Ok(())
    }

    /// Value at `frame` from the anchors bracketing its gap.
    fn local_value(&self, left: usize, right: usize, frame: usize, column: &[f64]) -> f64 {
        let (a, b) = (column[left], column[right]);
        match self.method {
            InterpolationMethod::Zero => a,
            InterpolationMethod::Nearest => {
                if frame - left <= right - frame {
                    a
                } else {
                    b
                }
            }
            _ => {
                let t = (frame - left) as f64 / (right - left) as f64;
                a + (b - a) * t
            }
        }
    }
}

fn fill_cell(cell: &mut f64, value: f64) {
    if is_missing(*cell) {
        *cell = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackrefine_model::MISSING;

    const NAN: f64 = MISSING;

    fn single(x: Vec<f64>, y: Vec<f64>) -> TrackTable {
        let n = x.len();
        TrackTable::new(vec![Landmark::new("paw", x, y, vec![0.9; n])]).unwrap()
    }

    fn xs(table: &TrackTable) -> &[f64] {
        &table.landmark("paw").unwrap().x
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            if e.is_nan() {
                assert!(a.is_nan(), "frame {i}: expected missing, got {a}");
            } else {
                assert!((a - e).abs() < 1e-9, "frame {i}: expected {e}, got {a}");
            }
        }
    }

    #[test]
    fn test_linear_fills_short_interior_gap() {
        let table = single(vec![10.0, NAN, NAN, 40.0], vec![0.0, NAN, NAN, 3.0]);
        let interp = GapBoundedInterpolator::new(InterpolationMethod::Linear, 2);
        let (out, report) = interp.apply(table);

        assert_close(xs(&out), &[10.0, 20.0, 30.0, 40.0]);
        assert_close(&out.landmark("paw").unwrap().y, &[0.0, 1.0, 2.0, 3.0]);
        let entry = report.landmark("paw").unwrap();
        assert_eq!(entry.filled_frames, 2);
        assert_eq!(entry.remaining_missing, 0);
    }

    #[test]
    fn test_gap_longer_than_max_gap_is_untouched() {
        let table = single(vec![10.0, NAN, NAN, 40.0], vec![0.0, NAN, NAN, 3.0]);
        let interp = GapBoundedInterpolator::new(InterpolationMethod::Linear, 1);
        let (out, report) = interp.apply(table.clone());

        assert!(out.same_values(&table));
        assert_eq!(report.landmark("paw").unwrap().filled_gaps, 0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_edge_gaps_are_not_extrapolated() {
        let table = single(
            vec![NAN, 1.0, NAN, 3.0, NAN, NAN],
            vec![NAN, 1.0, NAN, 3.0, NAN, NAN],
        );
        let (out, report) =
            GapBoundedInterpolator::new(InterpolationMethod::Linear, 5).apply(table);

        assert_close(xs(&out), &[NAN, 1.0, 2.0, 3.0, NAN, NAN]);
        let entry = report.landmark("paw").unwrap();
        assert_eq!(entry.gaps, 3);
        assert_eq!(entry.filled_gaps, 1);
        assert_eq!(entry.remaining_missing, 3);
    }

    #[test]
    fn test_zero_and_nearest() {
        let x = vec![0.0, NAN, NAN, NAN, 8.0];
        let zero = GapBoundedInterpolator::new(InterpolationMethod::Zero, 3)
            .apply(single(x.clone(), x.clone()))
            .0;
        assert_close(xs(&zero), &[0.0, 0.0, 0.0, 0.0, 8.0]);

        let nearest = GapBoundedInterpolator::new(InterpolationMethod::Nearest, 3)
            .apply(single(x.clone(), x.clone()))
            .0;
        // Frame 2 is equidistant and takes the preceding anchor.
        assert_close(xs(&nearest), &[0.0, 0.0, 0.0, 8.0, 8.0]);
    }

    #[test]
    fn test_slinear_matches_linear() {
        let x = vec![2.0, NAN, NAN, NAN, 10.0];
        let linear = GapBoundedInterpolator::new(InterpolationMethod::Linear, 3)
            .apply(single(x.clone(), x.clone()))
            .0;
        let slinear = GapBoundedInterpolator::new(InterpolationMethod::Slinear, 3)
            .apply(single(x.clone(), x))
            .0;
        assert!(linear.same_values(&slinear));
    }

    #[test]
    fn test_cubic_reproduces_cubic_motion() {
        let f = |t: f64| 0.1 * t.powi(3) - t * t + 2.0 * t + 5.0;
        let full: Vec<f64> = (0..10).map(|t| f(t as f64)).collect();
        let mut x = full.clone();
        for i in [3, 4, 7] {
            x[i] = NAN;
        }
        let (out, _) =
            GapBoundedInterpolator::new(InterpolationMethod::Cubic, 2).apply(single(x.clone(), x));
        assert_close(xs(&out), &full);
    }

    #[test]
    fn test_quadratic_reproduces_quadratic_motion() {
        let f = |t: f64| 0.5 * t * t - 3.0 * t + 1.0;
        let full: Vec<f64> = (0..8).map(|t| f(t as f64)).collect();
        let mut x = full.clone();
        x[2] = NAN;
        x[5] = NAN;
        let (out, _) = GapBoundedInterpolator::new(InterpolationMethod::Quadratic, 1)
            .apply(single(x.clone(), x));
        assert_close(xs(&out), &full);
    }

    #[test]
    fn test_spline_with_too_few_anchors_warns_and_leaves_gaps() {
        let table = single(vec![0.0, NAN, 2.0, 3.0], vec![0.0, NAN, 2.0, 3.0]);
        let (out, report) =
            GapBoundedInterpolator::new(InterpolationMethod::Cubic, 3).apply(table.clone());

        assert!(out.same_values(&table));
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            RefineWarning::InsufficientData { stage: Stage::Interpolate, .. }
        ));
    }

    #[test]
    fn test_no_warning_without_fillable_gaps() {
        let table = single(vec![0.0, 1.0, NAN], vec![0.0, 1.0, NAN]);
        let (_, report) = GapBoundedInterpolator::new(InterpolationMethod::Cubic, 3).apply(table);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_half_present_pair_keeps_present_coordinate() {
        let table = single(vec![0.0, 7.0, 2.0], vec![0.0, NAN, 2.0]);
        let (out, _) = GapBoundedInterpolator::new(InterpolationMethod::Linear, 1).apply(table);
        let paw = out.landmark("paw").unwrap();
        assert_eq!(paw.x[1], 7.0);
        assert_eq!(paw.y[1], 1.0);
    }

    #[test]
    fn test_likelihood_is_untouched() {
        let table = TrackTable::new(vec![Landmark::new(
            "paw",
            vec![0.0, NAN, 2.0],
            vec![0.0, NAN, 2.0],
            vec![0.9, 0.1, 0.8],
        )])
        .unwrap();
        let (out, _) = GapBoundedInterpolator::new(InterpolationMethod::Linear, 1).apply(table);
        assert_eq!(out.landmark("paw").unwrap().likelihood, vec![0.9, 0.1, 0.8]);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let x = vec![1.0, NAN, 3.0, 4.0, NAN, NAN, NAN, 9.0, 10.0, NAN];
        let interp = GapBoundedInterpolator::new(InterpolationMethod::Cubic, 2);
        let (once, _) = interp.apply(single(x.clone(), x));
        let (twice, _) = interp.apply(once.clone());
        assert!(once.same_values(&twice));
    }

    #[test]
    fn test_find_gaps() {
        let l = Landmark::new(
            "p",
            vec![NAN, 0.0, NAN, NAN, 0.0, NAN],
            vec![0.0; 6],
            vec![1.0; 6],
        );
        assert_eq!(
            find_gaps(&l),
            vec![
                Gap { start: 0, len: 1 },
                Gap { start: 2, len: 2 },
                Gap { start: 5, len: 1 },
            ]
        );
        assert!(!Gap { start: 0, len: 1 }.is_interior(6));
        assert!(Gap { start: 2, len: 2 }.is_interior(6));
        assert!(!Gap { start: 5, len: 1 }.is_interior(6));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "Cubic".parse::<InterpolationMethod>().unwrap(),
            InterpolationMethod::Cubic
        );
        assert!("spline".parse::<InterpolationMethod>().unwrap_err().is_config());
        let settings = InterpolateSettings {
            method: "nearest".into(),
            max_gap: 4,
        };
        let interp = GapBoundedInterpolator::from_settings(&settings).unwrap();
        assert_eq!(interp.method(), InterpolationMethod::Nearest);
        assert_eq!(interp.max_gap(), 4);
    }
}
