//! trackrefine core: the refinement stages
//!
//! Cleans pose-estimation tracks in four optional stages:
//! - **Normalize:** Flip the vertical axis, drop all-zero frames, exclude landmarks
//! - **Likelihood:** Mask frames whose detection confidence is too low
//! - **Position:** Mask frames whose frame-to-frame jump is an outlier
//! - **Interpolate:** Fill short interior gaps from the surrounding frames
//!
//! This crate is pure computation with no I/O and no platform dependencies.
//! Tables go in, tables and reports come out.

pub mod interpolate;
pub mod likelihood;
pub mod normalize;
pub mod pipeline;
pub mod position;
pub mod report;
pub mod spline;
pub mod stats;

pub use interpolate::{GapBoundedInterpolator, InterpolationMethod, InterpolationReport};
pub use likelihood::{Criterion, LikelihoodMasker, LikelihoodReport};
pub use normalize::{CoordinateNormalizer, NormalizeReport};
pub use pipeline::{RefineOutcome, RefinePipeline, TableStats};
pub use position::{DisplacementMetric, PositionOutlierMasker, PositionReport, PositionRule};
pub use report::{RefineReport, RefineWarning, Stage};
