//! Validate a pipeline settings file.

use std::path::PathBuf;

use trackrefine_core::RefinePipeline;
use trackrefine_model::PipelineSettings;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating settings at: {}", path.display());

    let settings = PipelineSettings::load(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?;
    let pipeline = RefinePipeline::from_settings(&settings)
        .map_err(|e| anyhow::anyhow!("Invalid settings: {e}"))?;

    let stages: Vec<String> = pipeline.stages().iter().map(|s| s.to_string()).collect();
    println!("  Stages: {}", stages.join(" -> "));
    if let Some(interpolate) = &settings.interpolate {
        println!(
            "  Interpolation: {} (max gap {})",
            interpolate.method, interpolate.max_gap
        );
    }
    println!("\nSettings are valid.");

    Ok(())
}
