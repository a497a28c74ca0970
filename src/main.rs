use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use pose_forecast_rs::config::{InitialState, OutputMode, PipelineConfig};
use pose_forecast_rs::TraceAggregator;

#[derive(Parser, Debug)]
#[command(name = "pose_forecast")]
#[command(
    about = "Kalman-filter pose traces and write filtered poses plus forecasts",
    long_about = None
)]
struct Args {
    /// Directory of input trace CSVs (PosX..QuatZ)
    input_dir: PathBuf,

    /// Directory for <name>_filtered.csv and <name>_future_predictions.csv
    output_dir: PathBuf,

    /// JSON config; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Time step between rows [s]
    #[arg(long)]
    dt: Option<f64>,

    /// Forecast horizon [s], a whole multiple of dt
    #[arg(long)]
    pred_window: Option<f64>,

    /// Measurement noise scale (diagonal of R)
    #[arg(long)]
    measurement_noise: Option<f64>,

    /// Process noise scale (diagonal of Q)
    #[arg(long)]
    process_noise: Option<f64>,

    /// Initial covariance scale
    #[arg(long)]
    initial_uncertainty: Option<f64>,

    #[arg(long, value_enum)]
    initial_state: Option<InitialState>,

    #[arg(long, value_enum)]
    output_mode: Option<OutputMode>,

    /// Traces processed concurrently
    #[arg(long)]
    workers: Option<usize>,

    /// Extra attempts for failed reads/writes
    #[arg(long)]
    io_retries: Option<u32>,

    /// Stop at the first failing trace
    #[arg(long, default_value_t = false)]
    abort_on_first_failure: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.dt {
            config.dt = v;
        }
        if let Some(v) = self.pred_window {
            config.pred_window = v;
        }
        if let Some(v) = self.measurement_noise {
            config.measurement_noise = v;
        }
        if let Some(v) = self.process_noise {
            config.process_noise = v;
        }
        if let Some(v) = self.initial_uncertainty {
            config.initial_uncertainty = v;
        }
        if let Some(v) = self.initial_state {
            config.initial_state = v;
        }
        if let Some(v) = self.output_mode {
            config.output_mode = v;
        }
        if let Some(v) = self.workers {
            config.workers = v;
        }
        if let Some(v) = self.io_retries {
            config.io_retries = v;
        }
        config.abort_on_first_failure |= self.abort_on_first_failure;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.pipeline_config().context("invalid configuration")?;
    info!(
        "dt={} pred_window={} r={} q={} k={} mode={:?}",
        config.dt,
        config.pred_window,
        config.measurement_noise,
        config.process_noise,
        config.initial_uncertainty,
        config.output_mode
    );

    let cancel = AtomicBool::new(false);
    let aggregator = TraceAggregator::new(&config)?;
    let report = aggregator
        .process_directory(&args.input_dir, &args.output_dir, &cancel)
        .map_err(|failure| {
            error!("Aborted: {failure}");
            anyhow::Error::new(failure)
        })?;

    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    if !report.failures.is_empty() {
        anyhow::bail!("{} trace(s) failed", report.failures.len());
    }
    Ok(())
}
