//! Job planning and concurrent execution of a pipeline over CSV files.
//!
//! Each file runs on the blocking pool; a semaphore bounds how many run at
//! once. A failing file is recorded and never stops the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use trackrefine_common::config::{AppConfig, BatchDefaults};
use trackrefine_core::{RefinePipeline, RefineReport, Stage, TableStats};
use trackrefine_model::{read_table_file, write_summary_file, write_table_file, SummaryRow};

use crate::args::IoArgs;

/// Suffix used for a single output file when none is configured.
const DEFAULT_SINGLE_SUFFIX: &str = "_refined";

/// Subdirectory used for batch output when no directory is given.
const DEFAULT_OUTPUT_SUBDIR: &str = "refined";

/// One input file and where its refined table goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// The jobs of one invocation plus where the run summary is written.
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub jobs: Vec<FileJob>,
    /// Set in batch mode only.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Refined {
        before: TableStats,
        after: TableStats,
        report: RefineReport,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }

    /// Name used for this file in summary reports.
    pub fn file_label(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        match &self.status {
            FileStatus::Refined { report, .. } => report.summary_rows(&self.file_label()),
            FileStatus::Failed { .. } => vec![],
        }
    }
}

/// Written as JSON into the output directory after a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<Stage>,
    pub jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub files: Vec<FileOutcome>,
}

/// Resolve input and output paths for single-file or directory mode.
pub fn plan_jobs(io: &IoArgs, batch: &BatchDefaults) -> anyhow::Result<JobPlan> {
    if let Some(input) = &io.source.input {
        if !input.is_file() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        let output = match &io.output {
            Some(path) => path.clone(),
            None => {
                let suffix = if batch.output_suffix.is_empty() {
                    DEFAULT_SINGLE_SUFFIX
                } else {
                    batch.output_suffix.as_str()
                };
                input.with_file_name(output_file_name(input, suffix))
            }
        };
        ensure_distinct(input, &output)?;
        return Ok(JobPlan {
            jobs: vec![FileJob {
                input: input.clone(),
                output,
            }],
            output_dir: None,
        });
    }

    let Some(input_dir) = &io.source.input_dir else {
        anyhow::bail!("Either --input or --input-dir is required");
    };
    if !input_dir.is_dir() {
        anyhow::bail!("Input directory not found: {}", input_dir.display());
    }
    let output_dir = io
        .output_dir
        .clone()
        .unwrap_or_else(|| input_dir.join(DEFAULT_OUTPUT_SUBDIR));

    let jobs = discover_csv_files(input_dir)?
        .into_iter()
        .map(|input| {
            let output = output_dir.join(output_file_name(&input, &batch.output_suffix));
            ensure_distinct(&input, &output)?;
            Ok(FileJob { input, output })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if jobs.is_empty() {
        anyhow::bail!("No CSV files found in {}", input_dir.display());
    }

    Ok(JobPlan {
        jobs,
        output_dir: Some(output_dir),
    })
}

fn output_file_name(input: &Path, suffix: &str) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    format!("{stem}{suffix}.csv")
}

fn ensure_distinct(input: &Path, output: &Path) -> anyhow::Result<()> {
    if input == output {
        anyhow::bail!(
            "Output would overwrite input {}; choose another output path or suffix",
            input.display()
        );
    }
    Ok(())
}

/// CSV files directly inside `dir`, sorted by path.
pub fn discover_csv_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read, refine, and write one file.
pub fn refine_file(pipeline: &RefinePipeline, job: &FileJob) -> anyhow::Result<FileStatus> {
    let table = read_table_file(&job.input)
        .with_context(|| format!("Failed to read {}", job.input.display()))?;
    let before = TableStats::of(&table);

    let outcome = pipeline
        .run(table)
        .with_context(|| format!("Failed to refine {}", job.input.display()))?;
    let after = TableStats::of(&outcome.table);

    write_table_file(&outcome.table, &job.output)
        .with_context(|| format!("Failed to write {}", job.output.display()))?;

    Ok(FileStatus::Refined {
        before,
        after,
        report: outcome.report,
    })
}

/// Run every job, at most `concurrency` at a time. Outcomes keep job order.
pub async fn run_jobs(
    pipeline: Arc<RefinePipeline>,
    jobs: Vec<FileJob>,
    concurrency: usize,
) -> Vec<FileOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for (index, job) in jobs.into_iter().enumerate() {
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let started = Instant::now();
            let input = job.input.clone();
            let output = job.output.clone();

            tracing::debug!("Refining {}", input.display());
            let status =
                match tokio::task::spawn_blocking(move || refine_file(&pipeline, &job)).await {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => FileStatus::Failed {
                        error: format!("{e:#}"),
                    },
                    Err(e) => FileStatus::Failed {
                        error: format!("Worker task failed: {e}"),
                    },
                };

            let outcome = FileOutcome {
                input,
                output,
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                status,
            };
            (index, outcome)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(entry) => outcomes.push(entry),
            Err(e) => tracing::error!("Batch task failed: {e}"),
        }
    }
    outcomes.sort_by_key(|(index, _)| *index);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Run `pipeline` over the planned files and report the outcomes.
///
/// Fails after all files were attempted if any of them failed.
pub async fn execute(
    command: &str,
    pipeline: RefinePipeline,
    io: &IoArgs,
    app: &AppConfig,
) -> anyhow::Result<()> {
    let plan = plan_jobs(io, &app.batch)?;
    let batch = BatchDefaults {
        jobs: io.jobs.unwrap_or(app.batch.jobs),
        ..app.batch.clone()
    };
    let concurrency = batch.effective_jobs();
    let stages = pipeline.stages();

    tracing::info!(
        "{command}: {} file(s), stages {:?}, {} concurrent",
        plan.jobs.len(),
        stages,
        concurrency
    );

    let started_at = Utc::now();
    let outcomes = run_jobs(Arc::new(pipeline), plan.jobs, concurrency).await;
    let finished_at = Utc::now();

    for outcome in &outcomes {
        match &outcome.status {
            FileStatus::Refined { after, report, .. } => {
                println!(
                    "  ok      {} -> {} ({} frames, {} missing, {} warning(s))",
                    outcome.input.display(),
                    outcome.output.display(),
                    after.frames,
                    after.missing_pairs,
                    report.warnings.len()
                );
            }
            FileStatus::Failed { error } => {
                println!("  FAILED  {}: {error}", outcome.input.display());
            }
        }
    }

    if let Some(path) = &io.summary {
        let rows: Vec<SummaryRow> = outcomes.iter().flat_map(FileOutcome::summary_rows).collect();
        write_summary_file(&rows, path)
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
        println!("Summary: {} ({} rows)", path.display(), rows.len());
    }

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    let total = outcomes.len();

    if let Some(dir) = &plan.output_dir {
        let summary = RunSummary {
            command: command.to_string(),
            started_at,
            finished_at,
            stages,
            jobs: concurrency,
            succeeded: total - failed,
            failed,
            files: outcomes,
        };
        let path = dir.join(&batch.run_summary_file);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write run summary {}", path.display()))?;
        println!("Run summary: {}", path.display());
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} file(s) failed");
    }
    println!("\nRefined {total} file(s).");
    Ok(())
}
