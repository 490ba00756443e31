//! trackrefine CLI: refine pose-tracking CSV files.
//!
//! Usage:
//!   trackrefine normalize [IO]      Invert y, drop all-zero rows, exclude landmarks
//!   trackrefine likelihood [IO]     Mask low-confidence frames
//!   trackrefine position [IO]       Mask positional outliers
//!   trackrefine interpolate [IO]    Fill short gaps
//!   trackrefine run [IO]            Run the full pipeline from a settings file
//!   trackrefine info <CSV>          Show table information
//!   trackrefine validate-config <JSON>  Check a pipeline settings file
//!   trackrefine config [--init]     Show or create the application config
//!
//! Every refining command takes either `--input <CSV>` or `--input-dir <DIR>`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trackrefine_common::config::{AppConfig, LoggingConfig};

mod args;
mod batch;
mod commands;

use args::{InterpolateArgs, IoArgs, LikelihoodArgs, NormalizeArgs, PositionArgs};

#[derive(Parser)]
#[command(
    name = "trackrefine",
    about = "Likelihood masking, outlier removal, and gap interpolation for pose tracks",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invert the y axis, drop all-zero rows, and remove excluded landmarks
    Normalize {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        normalize: NormalizeArgs,
    },

    /// Mask frames whose likelihood fails a threshold or percentile rule
    Likelihood {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        likelihood: LikelihoodArgs,
    },

    /// Mask frames whose frame-to-frame displacement is an outlier
    Position {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        position: PositionArgs,
    },

    /// Fill interior gaps no longer than --max-gap frames
    Interpolate {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        interpolate: InterpolateArgs,
    },

    /// Run every configured stage in order
    Run {
        #[command(flatten)]
        io: IoArgs,

        /// Pipeline settings file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable normalization with default options
        #[arg(long)]
        normalize: bool,

        #[command(flatten)]
        normalize_args: NormalizeArgs,

        #[command(flatten)]
        likelihood: LikelihoodArgs,

        #[command(flatten)]
        position: PositionArgs,

        #[command(flatten)]
        interpolate: InterpolateArgs,
    },

    /// Show landmarks, frame count, and missing data of a CSV file
    Info {
        /// Path to the CSV file
        path: PathBuf,

        /// Gap length used to classify gaps as fillable
        #[arg(long, default_value = "5")]
        max_gap: usize,
    },

    /// Validate a pipeline settings file
    ValidateConfig {
        /// Path to the settings file
        path: PathBuf,
    },

    /// Show the application config, or write the defaults with --init
    Config {
        /// Create the config file with default values if it does not exist
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::load();

    // Initialize logging
    let logging = LoggingConfig {
        level: if cli.verbose {
            "debug".to_string()
        } else {
            app_config.logging.level.clone()
        },
        json: cli.log_json || app_config.logging.json,
        file: app_config.logging.file.clone(),
    };
    trackrefine_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Normalize { io, normalize } => {
            commands::normalize::run(io, normalize, &app_config).await
        }
        Commands::Likelihood { io, likelihood } => {
            commands::likelihood::run(io, likelihood, &app_config).await
        }
        Commands::Position { io, position } => {
            commands::position::run(io, position, &app_config).await
        }
        Commands::Interpolate { io, interpolate } => {
            commands::interpolate::run(io, interpolate, &app_config).await
        }
        Commands::Run {
            io,
            config,
            normalize,
            normalize_args,
            likelihood,
            position,
            interpolate,
        } => {
            commands::run::run(
                io,
                config,
                normalize,
                normalize_args,
                likelihood,
                position,
                interpolate,
                &app_config,
            )
            .await
        }
        Commands::Info { path, max_gap } => commands::info::run(path, max_gap),
        Commands::ValidateConfig { path } => commands::validate::run(path),
        Commands::Config { init } => commands::config::run(init, &app_config),
    }
}
