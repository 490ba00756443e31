//! Normalize coordinates of one file or a directory of files.

use anyhow::Context;
use trackrefine_common::config::AppConfig;
use trackrefine_core::RefinePipeline;
use trackrefine_model::PipelineSettings;

use crate::args::{IoArgs, NormalizeArgs};
use crate::batch;

pub async fn run(io: IoArgs, args: NormalizeArgs, app: &AppConfig) -> anyhow::Result<()> {
    let settings = PipelineSettings {
        normalize: Some(args.overlay(None)),
        ..Default::default()
    };
    let pipeline = RefinePipeline::from_settings(&settings).context("Invalid normalize options")?;
    batch::execute("normalize", pipeline, &io, app).await
}
