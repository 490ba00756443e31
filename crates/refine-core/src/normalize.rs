//! Coordinate normalization ahead of the refinement stages.
//!
//! Flips the vertical axis, drops degenerate all-zero frames, and removes
//! landmarks the caller does not want refined.

use serde::{Deserialize, Serialize};
use trackrefine_model::{NormalizeSettings, TrackTable};

use crate::report::RefineWarning;

/// Normalizer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateNormalizer {
    invert_y: bool,
    exclude: Vec<String>,
}

/// What normalization changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub y_inverted: bool,
    pub rows_removed: usize,
    pub excluded: Vec<String>,
    pub warnings: Vec<RefineWarning>,
}

impl Default for CoordinateNormalizer {
    fn default() -> Self {
        Self {
            invert_y: true,
            exclude: vec![],
        }
    }
}

impl CoordinateNormalizer {
    pub fn new(invert_y: bool, exclude: Vec<String>) -> Self {
        let exclude = exclude
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self { invert_y, exclude }
    }

    pub fn from_settings(settings: &NormalizeSettings) -> Self {
        Self::new(settings.invert_y, settings.exclude.clone())
    }

    pub fn apply(&self, mut table: TrackTable) -> (TrackTable, NormalizeReport) {
        let mut report = NormalizeReport {
            y_inverted: self.invert_y,
            ..Default::default()
        };

        if self.invert_y {
            for landmark in table.landmarks_mut() {
                for y in &mut landmark.y {
                    *y = -*y;
                }
            }
        }

        let keep = non_degenerate_frames(&table);
        let before = table.frame_count();
        table.retain_frames(&keep);
        report.rows_removed = before - table.frame_count();
        if report.rows_removed > 0 {
            tracing::info!("Removed {} all-zero rows", report.rows_removed);
        }

        if !self.exclude.is_empty() {
            report.excluded = table.remove_landmarks(&self.exclude);
            for name in &self.exclude {
                if !report.excluded.contains(name) {
                    let warning = RefineWarning::UnknownExclusion {
                        landmark: name.clone(),
                    };
                    warning.log();
                    report.warnings.push(warning);
                }
            }
            tracing::debug!("Excluded landmarks: {:?}", report.excluded);
        }

        (table, report)
    }
}

/// `true` for frames that carry at least one non-zero cell.
fn non_degenerate_frames(table: &TrackTable) -> Vec<bool> {
    if table.landmark_count() == 0 {
        return vec![true; table.frame_count()];
    }
    (0..table.frame_count())
        .map(|i| {
            table
                .landmarks()
                .iter()
                .any(|l| l.x[i] != 0.0 || l.y[i] != 0.0 || l.likelihood[i] != 0.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackrefine_model::{Landmark, MISSING};

    fn table() -> TrackTable {
        TrackTable::new(vec![
            Landmark::new(
                "nose",
                vec![1.0, 0.0, 3.0, 0.0],
                vec![2.0, 0.0, 4.0, 0.0],
                vec![0.9, 0.0, 0.8, 0.0],
            ),
            Landmark::new(
                "tail",
                vec![5.0, 0.0, 7.0, MISSING],
                vec![6.0, 0.0, 8.0, 0.0],
                vec![0.5, 0.0, 0.6, 0.0],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_inverts_y_and_drops_zero_rows() {
        let (out, report) = CoordinateNormalizer::default().apply(table());

        // Row 1 is all zero; row 3 has a missing cell so it is kept.
        assert_eq!(report.rows_removed, 1);
        assert_eq!(out.frame_count(), 3);
        let nose = out.landmark("nose").unwrap();
        assert_eq!(nose.x, vec![1.0, 3.0, 0.0]);
        assert_eq!(nose.y, vec![-2.0, -4.0, -0.0]);
        assert_eq!(nose.likelihood, vec![0.9, 0.8, 0.0]);
    }

    #[test]
    fn test_no_inversion_when_disabled() {
        let (out, report) = CoordinateNormalizer::new(false, vec![]).apply(table());
        assert!(!report.y_inverted);
        assert_eq!(out.landmark("tail").unwrap().y[0], 6.0);
    }

    #[test]
    fn test_excludes_landmarks_and_reports_unknown() {
        let normalizer =
            CoordinateNormalizer::new(true, vec!["tail".to_string(), " ear ".to_string()]);
        let (out, report) = normalizer.apply(table());

        assert_eq!(out.landmark_names().collect::<Vec<_>>(), vec!["nose"]);
        assert_eq!(report.excluded, vec!["tail"]);
        assert_eq!(
            report.warnings,
            vec![RefineWarning::UnknownExclusion {
                landmark: "ear".to_string()
            }]
        );
    }
}
