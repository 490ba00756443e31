//! Show table information.

use std::path::PathBuf;

use trackrefine_core::interpolate::find_gaps;
use trackrefine_core::stats;
use trackrefine_model::read_table_file;

pub fn run(path: PathBuf, max_gap: usize) -> anyhow::Result<()> {
    let table = read_table_file(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load table {}: {e}", path.display()))?;
    let frames = table.frame_count();

    println!("Table: {}", path.display());
    println!("  Frames: {frames}");
    println!("  Landmarks: {}", table.landmark_count());
    println!("  Missing pairs: {}", table.missing_pairs());
    println!();

    println!("Landmarks:");
    for landmark in table.landmarks() {
        let gaps = find_gaps(landmark);
        let fillable = gaps
            .iter()
            .filter(|g| g.is_interior(frames) && g.len <= max_gap)
            .count();
        let longest = gaps.iter().map(|g| g.len).max().unwrap_or(0);

        println!("  {}", landmark.name);
        println!(
            "    Missing: {} of {frames} frames, {} gap(s), longest {longest}, {fillable} fillable at max gap {max_gap}",
            landmark.missing_pairs(),
            gaps.len()
        );

        let likelihood = landmark.valid_likelihoods();
        match (
            stats::mean(&likelihood),
            stats::median(&likelihood),
            stats::percentile(&likelihood, 5.0),
        ) {
            (Some(mean), Some(median), Some(p5)) => println!(
                "    Likelihood: mean {mean:.3}, median {median:.3}, 5th percentile {p5:.3}"
            ),
            _ => println!("    Likelihood: no values"),
        }
    }

    Ok(())
}
