//! Run the full refinement pipeline.

use std::path::PathBuf;

use anyhow::Context;
use trackrefine_common::config::AppConfig;
use trackrefine_core::RefinePipeline;
use trackrefine_model::PipelineSettings;

use crate::args::{InterpolateArgs, IoArgs, LikelihoodArgs, NormalizeArgs, PositionArgs};
use crate::batch;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    io: IoArgs,
    config: Option<PathBuf>,
    normalize: bool,
    normalize_args: NormalizeArgs,
    likelihood: LikelihoodArgs,
    position: PositionArgs,
    interpolate: InterpolateArgs,
    app: &AppConfig,
) -> anyhow::Result<()> {
    let base = match &config {
        Some(path) => PipelineSettings::load(path)
            .with_context(|| format!("Failed to load settings {}", path.display()))?,
        None => PipelineSettings::default(),
    };

    let settings = merge_overrides(
        base,
        normalize,
        &normalize_args,
        &likelihood,
        &position,
        &interpolate,
    );
    tracing::debug!("Effective settings: {settings:?}");

    let pipeline = RefinePipeline::from_settings(&settings).context("Invalid pipeline settings")?;
    batch::execute("run", pipeline, &io, app).await
}

/// Overlay command-line flags onto loaded settings. A stage absent from the
/// file is enabled when any of its flags is given.
pub fn merge_overrides(
    mut settings: PipelineSettings,
    normalize: bool,
    normalize_args: &NormalizeArgs,
    likelihood: &LikelihoodArgs,
    position: &PositionArgs,
    interpolate: &InterpolateArgs,
) -> PipelineSettings {
    if normalize || normalize_args.is_set() || settings.normalize.is_some() {
        settings.normalize = Some(normalize_args.overlay(settings.normalize.take()));
    }
    if likelihood.is_set() {
        settings.likelihood = Some(likelihood.overlay(settings.likelihood.take()));
    }
    if position.is_set() {
        settings.position = Some(position.overlay(settings.position.take()));
    }
    if interpolate.is_set() {
        settings.interpolate = Some(interpolate.overlay(settings.interpolate.take()));
    }
    settings
}
