use std::path::PathBuf;

use trackrefine_core::{LikelihoodMasker, RefinePipeline, RefineReport};
use trackrefine_model::{
    read_table_file, write_summary, write_table, LikelihoodSettings, PipelineSettings, TrackTable,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join(name)
}

fn load_fixture_table(name: &str) -> TrackTable {
    read_table_file(&fixture(name)).expect("fixture table should parse")
}

fn assert_series(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < 1e-9, "frame {i}: expected {e}, got {a}");
    }
}

fn summary_csv(report: &RefineReport, file: &str) -> String {
    let mut out = Vec::new();
    write_summary(&report.summary_rows(file), &mut out).expect("summary should serialize");
    String::from_utf8(out).expect("summary should be utf-8")
}

#[test]
fn full_pipeline_recovers_open_field_track() {
    let settings =
        PipelineSettings::load(&fixture("pipeline.json")).expect("fixture settings should load");
    let pipeline = RefinePipeline::from_settings(&settings).expect("settings should validate");

    let table = load_fixture_table("mouse_open_field.csv");
    assert_eq!(table.frame_count(), 10);
    assert_eq!(table.landmark_names().collect::<Vec<_>>(), vec!["snout", "tail"]);

    let outcome = pipeline.run(table).expect("pipeline should run");
    let report = &outcome.report;
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    // The trailing all-zero row is dropped.
    assert_eq!(report.normalize.as_ref().unwrap().rows_removed, 1);
    assert_eq!(outcome.table.frame_count(), 9);

    let likelihood = report.likelihood.as_ref().unwrap();
    assert_eq!(likelihood.landmark("snout").unwrap().masked_frames, 2);
    assert_eq!(likelihood.landmark("tail").unwrap().masked_frames, 2);

    // The spike at frame 6 produces two large displacements.
    let position = report.position.as_ref().unwrap();
    assert_eq!(position.landmark("snout").unwrap().masked_frames, 2);
    assert_eq!(position.landmark("tail").unwrap().masked_frames, 0);

    let interpolate = report.interpolate.as_ref().unwrap();
    assert_eq!(interpolate.landmark("snout").unwrap().filled_frames, 4);
    assert_eq!(interpolate.landmark("tail").unwrap().filled_frames, 2);
    assert_eq!(outcome.table.missing_pairs(), 0);

    let snout = outcome.table.landmark("snout").unwrap();
    let expected_x: Vec<f64> = (10..19).map(f64::from).collect();
    let expected_y: Vec<f64> = (100..109).map(|v| -f64::from(v)).collect();
    assert_series(&snout.x, &expected_x);
    assert_series(&snout.y, &expected_y);

    let tail = outcome.table.landmark("tail").unwrap();
    let expected_x: Vec<f64> = (50..59).map(f64::from).collect();
    assert_series(&tail.x, &expected_x);
    assert_eq!(tail.likelihood[6], 0.10);

    // The frame index survives, minus the dropped row.
    let mut out = Vec::new();
    write_table(&outcome.table, &mut out).expect("table should serialize");
    let written = String::from_utf8(out).expect("output should be utf-8");
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(
        lines[0],
        "bodyparts_coords,snout_x,snout_y,snout_likelihood,tail_x,tail_y,tail_likelihood"
    );
    let index: Vec<&str> = lines[1..]
        .iter()
        .map(|l| l.split(',').next().unwrap_or(""))
        .collect();
    assert_eq!(index, vec!["0", "1", "2", "3", "4", "5", "6", "7", "8"]);
}

#[test]
fn knee_threshold_masks_and_reports() {
    let settings = LikelihoodSettings {
        global_threshold: Some(0.5),
        ..Default::default()
    };
    let pipeline = RefinePipeline::new()
        .with_likelihood(LikelihoodMasker::from_settings(&settings).expect("valid settings"));

    let outcome = pipeline
        .run(load_fixture_table("knee_flat.csv"))
        .expect("pipeline should run");

    let knee = outcome.table.landmark("knee").unwrap();
    let masked: Vec<usize> = (0..knee.len()).filter(|&i| knee.is_pair_missing(i)).collect();
    assert_eq!(masked, vec![1, 3]);
    assert_eq!(knee.likelihood, vec![0.9, 0.4, 0.95, 0.2, 0.91]);

    let csv = summary_csv(&outcome.report, "knee_flat.csv");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "file,landmark,rule,masked_frames,total_frames,masked_fraction,cutoff"
    );
    assert_eq!(lines[1], "knee_flat.csv,knee,threshold,2,5,0.4,");
    assert_eq!(lines[2], "knee_flat.csv,hip,threshold,2,5,0.4,");
}

#[test]
fn percentile_summary_reports_cutoff() {
    let settings = PipelineSettings {
        likelihood: Some(LikelihoodSettings {
            global_percentile: Some(50.0),
            ..Default::default()
        }),
        ..Default::default()
    };
    let outcome = RefinePipeline::from_settings(&settings)
        .unwrap()
        .run(load_fixture_table("knee_flat.csv"))
        .unwrap();

    // Median of [0.9, 0.4, 0.95, 0.2, 0.91] is 0.9; values at or below it fail.
    let knee = outcome.report.likelihood.as_ref().unwrap().landmark("knee").unwrap();
    assert!((knee.cutoff - 0.9).abs() < 1e-12);
    assert_eq!(knee.masked_frames, 3);

    let csv = summary_csv(&outcome.report, "knee_flat.csv");
    assert!(csv.lines().any(|l| l == "knee_flat.csv,knee,percentile,3,5,,0.9"));
}
