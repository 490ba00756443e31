//! Argument groups shared by the refining commands.
//!
//! Each stage group can overlay its flags onto stage settings loaded from a
//! file. A flag that is not given leaves the loaded value alone.

use std::path::PathBuf;

use clap::Args;
use trackrefine_model::{
    InterpolateSettings, LikelihoodSettings, NormalizeSettings, PositionSettings,
};

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct InputSource {
    /// Input CSV file
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory of input CSV files (batch mode)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct IoArgs {
    #[command(flatten)]
    pub source: InputSource,

    /// Output CSV file (default: `<input stem>_refined.csv` next to the input)
    #[arg(short, long, conflicts_with = "input_dir")]
    pub output: Option<PathBuf>,

    /// Output directory for batch mode (default: `<input-dir>/refined`)
    #[arg(long, conflicts_with = "input")]
    pub output_dir: Option<PathBuf>,

    /// Files refined concurrently in batch mode (0 = one per CPU)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write the per-landmark likelihood summary CSV to this path
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NormalizeArgs {
    /// Keep y coordinates as they are instead of negating them
    #[arg(long)]
    pub no_invert_y: bool,

    /// Landmarks to drop (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
}

impl NormalizeArgs {
    pub fn is_set(&self) -> bool {
        self.no_invert_y || !self.exclude.is_empty()
    }

    pub fn overlay(&self, base: Option<NormalizeSettings>) -> NormalizeSettings {
        let mut settings = base.unwrap_or_default();
        if self.no_invert_y {
            settings.invert_y = false;
        }
        if !self.exclude.is_empty() {
            settings.exclude = self.exclude.clone();
        }
        settings
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct LikelihoodArgs {
    /// Global likelihood threshold in [0, 1]; frames below it are masked
    #[arg(long, conflicts_with = "percentile")]
    pub threshold: Option<f64>,

    /// Global likelihood percentile in [0, 100]; frames at or below it are masked
    #[arg(long)]
    pub percentile: Option<f64>,

    /// Per-landmark threshold, as `name=value` (repeatable)
    #[arg(long = "landmark-threshold", value_name = "NAME=VALUE", value_parser = parse_landmark_value)]
    pub landmark_threshold: Vec<(String, f64)>,

    /// Per-landmark percentile, as `name=value` (repeatable)
    #[arg(long = "landmark-percentile", value_name = "NAME=VALUE", value_parser = parse_landmark_value)]
    pub landmark_percentile: Vec<(String, f64)>,
}

impl LikelihoodArgs {
    pub fn is_set(&self) -> bool {
        self.threshold.is_some()
            || self.percentile.is_some()
            || !self.landmark_threshold.is_empty()
            || !self.landmark_percentile.is_empty()
    }

    pub fn overlay(&self, base: Option<LikelihoodSettings>) -> LikelihoodSettings {
        let mut settings = base.unwrap_or_default();
        // A global rule from the command line replaces the loaded one.
        if let Some(t) = self.threshold {
            settings.global_threshold = Some(t);
            settings.global_percentile = None;
        }
        if let Some(p) = self.percentile {
            settings.global_percentile = Some(p);
            settings.global_threshold = None;
        }
        for (name, t) in &self.landmark_threshold {
            settings.per_landmark_threshold.insert(name.clone(), *t);
        }
        for (name, p) in &self.landmark_percentile {
            settings.per_landmark_percentile.insert(name.clone(), *p);
        }
        settings
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct PositionArgs {
    /// Displacement metric: euclidean|x|y
    #[arg(long)]
    pub metric: Option<String>,

    /// Mask displacements above this distance
    #[arg(long, group = "position_rule")]
    pub fixed_threshold: Option<f64>,

    /// Mask displacements above median + k * MAD / 0.6745
    #[arg(long, value_name = "K", group = "position_rule")]
    pub mad: Option<f64>,

    /// Mask displacements above Q3 + m * IQR
    #[arg(long, value_name = "M", group = "position_rule")]
    pub iqr: Option<f64>,

    /// Mask displacements above mean + s * std
    #[arg(long, value_name = "S", group = "position_rule")]
    pub std: Option<f64>,
}

impl PositionArgs {
    pub fn is_set(&self) -> bool {
        self.metric.is_some() || self.has_rule()
    }

    fn has_rule(&self) -> bool {
        self.fixed_threshold.is_some()
            || self.mad.is_some()
            || self.iqr.is_some()
            || self.std.is_some()
    }

    pub fn overlay(&self, base: Option<PositionSettings>) -> PositionSettings {
        let mut settings = base.unwrap_or_default();
        if let Some(metric) = &self.metric {
            settings.metric = metric.clone();
        }
        if self.has_rule() {
            settings.fixed_threshold = self.fixed_threshold;
            settings.mad_multiplier = self.mad;
            settings.iqr_multiplier = self.iqr;
            settings.std_multiplier = self.std;
        }
        settings
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct InterpolateArgs {
    /// Interpolation method: linear|nearest|zero|slinear|quadratic|cubic
    #[arg(long)]
    pub method: Option<String>,

    /// Longest gap, in frames, that will be filled
    #[arg(long)]
    pub max_gap: Option<usize>,
}

impl InterpolateArgs {
    pub fn is_set(&self) -> bool {
        self.method.is_some() || self.max_gap.is_some()
    }

    pub fn overlay(&self, base: Option<InterpolateSettings>) -> InterpolateSettings {
        let mut settings = base.unwrap_or_default();
        if let Some(method) = &self.method {
            settings.method = method.clone();
        }
        if let Some(max_gap) = self.max_gap {
            settings.max_gap = max_gap;
        }
        settings
    }
}

/// Parse `name=value` into a landmark name and a number.
pub fn parse_landmark_value(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing landmark name in '{raw}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid number in '{raw}': {e}"))?;
    Ok((name.to_string(), value))
}
