//! Stage composition.
//!
//! Stages always run in the order normalize → likelihood → position →
//! interpolate. Any of them may be absent, but at least one must be present.
//! Every stage is validated when the pipeline is built, so a bad setting
//! fails before any table is read.

use serde::{Deserialize, Serialize};
use trackrefine_common::{RefineError, RefineResult};
use trackrefine_model::{PipelineSettings, TrackTable};

use crate::interpolate::GapBoundedInterpolator;
use crate::likelihood::LikelihoodMasker;
use crate::normalize::CoordinateNormalizer;
use crate::position::PositionOutlierMasker;
use crate::report::{RefineReport, Stage};

/// A refined table and what happened to it.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub table: TrackTable,
    pub report: RefineReport,
}

/// Ordered set of configured stages.
#[derive(Debug, Clone, Default)]
pub struct RefinePipeline {
    normalize: Option<CoordinateNormalizer>,
    likelihood: Option<LikelihoodMasker>,
    position: Option<PositionOutlierMasker>,
    interpolate: Option<GapBoundedInterpolator>,
}

/// Frame and missing-pair counts around a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub frames: usize,
    pub landmarks: usize,
    pub missing_pairs: usize,
}

impl TableStats {
    pub fn of(table: &TrackTable) -> Self {
        Self {
            frames: table.frame_count(),
            landmarks: table.landmark_count(),
            missing_pairs: table.missing_pairs(),
        }
    }
}

impl RefinePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalizer(mut self, stage: CoordinateNormalizer) -> Self {
        self.normalize = Some(stage);
        self
    }

    pub fn with_likelihood(mut self, stage: LikelihoodMasker) -> Self {
        self.likelihood = Some(stage);
        self
    }

    pub fn with_position(mut self, stage: PositionOutlierMasker) -> Self {
        self.position = Some(stage);
        self
    }

    pub fn with_interpolation(mut self, stage: GapBoundedInterpolator) -> Self {
        self.interpolate = Some(stage);
        self
    }

    /// Validate and build every configured stage.
    pub fn from_settings(settings: &PipelineSettings) -> RefineResult<Self> {
        if !settings.has_stages() {
            return Err(RefineError::config(
                "no refinement stage configured: enable at least one of \
                 normalize, likelihood, position, interpolate",
            ));
        }

        Ok(Self {
            normalize: settings
                .normalize
                .as_ref()
                .map(CoordinateNormalizer::from_settings),
            likelihood: settings
                .likelihood
                .as_ref()
                .map(LikelihoodMasker::from_settings)
                .transpose()?,
            position: settings
                .position
                .as_ref()
                .map(PositionOutlierMasker::from_settings)
                .transpose()?,
            interpolate: settings
                .interpolate
                .as_ref()
                .map(GapBoundedInterpolator::from_settings)
                .transpose()?,
        })
    }

    /// Stages that will run, in order.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if self.normalize.is_some() {
            stages.push(Stage::Normalize);
        }
        if self.likelihood.is_some() {
            stages.push(Stage::Likelihood);
        }
        if self.position.is_some() {
            stages.push(Stage::Position);
        }
        if self.interpolate.is_some() {
            stages.push(Stage::Interpolate);
        }
        stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages().is_empty()
    }

    /// Run every configured stage over `table`.
    ///
    /// Only a schema mismatch in the likelihood stage can fail here; every
    /// other problem is recorded as a warning in the report.
    pub fn run(&self, table: TrackTable) -> RefineResult<RefineOutcome> {
        if self.is_empty() {
            return Err(RefineError::config("pipeline has no stages"));
        }

        let mut report = RefineReport::default();
        let mut table = table;

        if let Some(stage) = &self.normalize {
            let (next, stage_report) = stage.apply(table);
            tracing::info!(
                "normalize: {} rows removed, {} landmarks excluded",
                stage_report.rows_removed,
                stage_report.excluded.len()
            );
            report.warnings.extend(stage_report.warnings.iter().cloned());
            report.normalize = Some(stage_report);
            table = next;
        }

        if let Some(stage) = &self.likelihood {
            let (next, stage_report) = stage.apply(table)?;
            let masked: usize = stage_report.landmarks.iter().map(|l| l.masked_frames).sum();
            tracing::info!(
                "likelihood: masked {} frames across {} landmarks",
                masked,
                stage_report.landmarks.len()
            );
            report.warnings.extend(stage_report.warnings.iter().cloned());
            report.likelihood = Some(stage_report);
            table = next;
        }

        if let Some(stage) = &self.position {
            let (next, stage_report) = stage.apply(table);
            let masked: usize = stage_report.landmarks.iter().map(|l| l.masked_frames).sum();
            tracing::info!(
                "position: masked {} outlier frames ({}, {})",
                masked,
                stage_report.metric,
                stage_report.rule
            );
            report.warnings.extend(stage_report.warnings.iter().cloned());
            report.position = Some(stage_report);
            table = next;
        }

        if let Some(stage) = &self.interpolate {
            let (next, stage_report) = stage.apply(table);
            tracing::info!(
                "interpolate: filled {} frames ({}, max gap {})",
                stage_report.filled_frames(),
                stage_report.method,
                stage_report.max_gap
            );
            report.warnings.extend(stage_report.warnings.iter().cloned());
            report.interpolate = Some(stage_report);
            table = next;
        }

        Ok(RefineOutcome { table, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use trackrefine_model::{
        InterpolateSettings, Landmark, LikelihoodSettings, NormalizeSettings, PositionSettings,
    };

    use crate::interpolate::InterpolationMethod;
    use crate::likelihood::Criterion;
    use crate::report::RefineWarning;

    fn table() -> TrackTable {
        TrackTable::new(vec![
            Landmark::new(
                "knee",
                vec![10.0, 11.0, 12.0, 13.0, 14.0],
                vec![5.0; 5],
                vec![0.95, 0.40, 0.88, 0.10, 0.99],
            ),
            Landmark::new(
                "hip",
                vec![0.0, 1.0, 2.0, 3.0, 4.0],
                vec![0.0; 5],
                vec![0.9; 5],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_settings_without_stages_fail() {
        let err = RefinePipeline::from_settings(&PipelineSettings::default()).unwrap_err();
        assert!(err.is_config());
        assert!(RefinePipeline::new().run(table()).unwrap_err().is_config());
    }

    #[test]
    fn test_invalid_stage_fails_at_build_time() {
        let settings = PipelineSettings {
            interpolate: Some(InterpolateSettings {
                method: "akima".into(),
                max_gap: 3,
            }),
            ..Default::default()
        };
        assert!(RefinePipeline::from_settings(&settings).unwrap_err().is_config());
    }

    #[test]
    fn test_mask_then_fill() {
        let settings = PipelineSettings {
            likelihood: Some(LikelihoodSettings {
                global_threshold: Some(0.6),
                ..Default::default()
            }),
            interpolate: Some(InterpolateSettings {
                method: "linear".into(),
                max_gap: 1,
            }),
            ..Default::default()
        };
        let pipeline = RefinePipeline::from_settings(&settings).unwrap();
        assert_eq!(pipeline.stages(), vec![Stage::Likelihood, Stage::Interpolate]);

        let outcome = pipeline.run(table()).unwrap();
        let knee = outcome.table.landmark("knee").unwrap();
        // Frames 1 and 3 fall below 0.6 and are refilled from their neighbours.
        assert_eq!(knee.x, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
        assert_eq!(
            outcome.report.likelihood.as_ref().unwrap().landmark("knee").unwrap().masked_frames,
            2
        );
        assert_eq!(outcome.report.interpolate.as_ref().unwrap().filled_frames(), 2);
        assert!(outcome.report.position.is_none());
    }

    #[test]
    fn test_warnings_are_collected_in_order() {
        let settings = PipelineSettings {
            normalize: Some(NormalizeSettings {
                invert_y: false,
                exclude: vec!["tail".into()],
            }),
            position: Some(PositionSettings {
                mad_multiplier: Some(3.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut t = table();
        for i in 0..5 {
            t.landmark_mut("hip").unwrap().mask_pair(i);
        }
        let outcome = RefinePipeline::from_settings(&settings).unwrap().run(t).unwrap();

        assert_eq!(outcome.report.warnings.len(), 2);
        assert!(matches!(
            outcome.report.warnings[0],
            RefineWarning::UnknownExclusion { .. }
        ));
        assert!(matches!(
            outcome.report.warnings[1],
            RefineWarning::InsufficientData { stage: Stage::Position, .. }
        ));
    }

    #[test]
    fn test_unknown_override_is_schema_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert("elbow".to_string(), Criterion::Threshold(0.5));
        let pipeline =
            RefinePipeline::new().with_likelihood(LikelihoodMasker::new(None, overrides).unwrap());
        let err = pipeline.run(table()).unwrap_err();
        assert!(matches!(err, RefineError::Schema { .. }));
    }

    #[test]
    fn test_builder_runs_single_stage() {
        let pipeline = RefinePipeline::new()
            .with_interpolation(GapBoundedInterpolator::new(InterpolationMethod::Linear, 2));
        let mut t = table();
        t.landmark_mut("hip").unwrap().mask_pair(2);
        let before = TableStats::of(&t);
        let outcome = pipeline.run(t).unwrap();
        let after = TableStats::of(&outcome.table);

        assert_eq!(before.missing_pairs, 1);
        assert_eq!(after.missing_pairs, 0);
        assert_eq!(after.frames, 5);
        assert_eq!(outcome.table.landmark("hip").unwrap().x[2], 2.0);
        assert!(!outcome.table.landmark("knee").unwrap().x[2].is_nan());
    }
}
