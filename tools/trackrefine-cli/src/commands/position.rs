//! Mask positional outliers.

use anyhow::Context;
use trackrefine_common::config::AppConfig;
use trackrefine_core::RefinePipeline;
use trackrefine_model::PipelineSettings;

use crate::args::{IoArgs, PositionArgs};
use crate::batch;

pub async fn run(io: IoArgs, args: PositionArgs, app: &AppConfig) -> anyhow::Result<()> {
    let settings = PipelineSettings {
        position: Some(args.overlay(None)),
        ..Default::default()
    };
    let pipeline = RefinePipeline::from_settings(&settings).context("Invalid position options")?;
    batch::execute("position", pipeline, &io, app).await
}
