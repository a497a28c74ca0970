use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use pose_forecast_rs::config::{OutputMode, PipelineConfig};
use pose_forecast_rs::{ErrorEvaluator, EulerSequence, Evaluation, PredictionKind};

#[derive(Parser, Debug)]
#[command(name = "evaluate")]
#[command(
    about = "Score filtered or forecast poses against ground truth",
    long_about = None
)]
struct Args {
    /// Directory of ground-truth trace CSVs
    truth_dir: PathBuf,

    /// Directory holding the processor output
    predicted_dir: PathBuf,

    /// Which output to score
    #[arg(long, value_enum, default_value = "forecast")]
    kind: PredictionKind,

    /// Forecast lead compared against ground truth (1 = next row)
    #[arg(long, default_value_t = 1)]
    lead: usize,

    /// Euler decomposition used by the angular metric
    #[arg(long, value_enum, default_value = "intrinsic-xyz")]
    euler: EulerSequence,

    /// JSON config the output was produced with (dt, pred_window, output_mode)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    dt: Option<f64>,

    #[arg(long)]
    pred_window: Option<f64>,

    #[arg(long, value_enum)]
    output_mode: Option<OutputMode>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(v) = args.dt {
        config.dt = v;
    }
    if let Some(v) = args.pred_window {
        config.pred_window = v;
    }
    if let Some(v) = args.output_mode {
        config.output_mode = v;
    }
    config.validate().context("invalid configuration")?;

    let evaluator = ErrorEvaluator::new(args.euler, args.lead);
    let evaluation = Evaluation::new(evaluator, args.kind, &config)?;
    info!(
        "Scoring {:?} output, lead {}, {:?}, {} row(s) per timestep",
        args.kind, args.lead, args.euler, evaluation.rows_per_timestep
    );

    let report = evaluation.evaluate_directories(
        &args.truth_dir,
        &args.predicted_dir,
        &AtomicBool::new(false),
    )?;
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    if !report.failures.is_empty() {
        anyhow::bail!("{} trace(s) could not be scored", report.failures.len());
    }
    Ok(())
}
