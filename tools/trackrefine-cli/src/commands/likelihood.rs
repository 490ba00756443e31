//! Mask low-likelihood frames.

use anyhow::Context;
use trackrefine_common::config::AppConfig;
use trackrefine_core::RefinePipeline;
use trackrefine_model::PipelineSettings;

use crate::args::{IoArgs, LikelihoodArgs};
use crate::batch;

pub async fn run(io: IoArgs, args: LikelihoodArgs, app: &AppConfig) -> anyhow::Result<()> {
    let settings = PipelineSettings {
        likelihood: Some(args.overlay(None)),
        ..Default::default()
    };
    let pipeline =
        RefinePipeline::from_settings(&settings).context("Invalid likelihood options")?;
    batch::execute("likelihood", pipeline, &io, app).await
}
