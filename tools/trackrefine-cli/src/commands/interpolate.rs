//! Fill short gaps.

use anyhow::Context;
use trackrefine_common::config::AppConfig;
use trackrefine_core::RefinePipeline;
use trackrefine_model::PipelineSettings;

use crate::args::{InterpolateArgs, IoArgs};
use crate::batch;

pub async fn run(io: IoArgs, args: InterpolateArgs, app: &AppConfig) -> anyhow::Result<()> {
    let settings = PipelineSettings {
        interpolate: Some(args.overlay(None)),
        ..Default::default()
    };
    let pipeline =
        RefinePipeline::from_settings(&settings).context("Invalid interpolation options")?;
    batch::execute("interpolate", pipeline, &io, app).await
}
