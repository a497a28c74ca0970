use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoseError, Result};

/// Upper bound on `pred_window / dt`; every input row stores this many forecast rows
pub const MAX_FORECAST_STEPS: usize = 10_000;

/// How the filter mean is seeded before the first measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InitialState {
    /// All-zero mean (poses and rates)
    Zero,
    /// Pose part taken from the first measurement, rates zero
    FirstMeasurement,
}

/// What the trajectory processor persists per timestep
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Whole `steps`-long forecast batch
    FullForecast,
    /// Only the one-step-ahead prediction
    NextStateOnly,
}

/// Numeric and batch parameters for a pipeline run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Time step between rows [seconds]
    pub dt: f64,

    /// Forecast horizon [seconds]; `pred_window / dt` must be a positive integer
    pub pred_window: f64,

    /// Diagonal of R
    pub measurement_noise: f64,

    /// Diagonal of Q
    pub process_noise: f64,

    /// Diagonal of the initial P
    pub initial_uncertainty: f64,

    pub initial_state: InitialState,
    pub output_mode: OutputMode,

    /// Extra attempts for a failed read/write of a trace file
    pub io_retries: u32,

    pub abort_on_first_failure: bool,

    /// Traces processed concurrently (1 = sequential)
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            pred_window: 1.0,
            measurement_noise: 5.0,
            process_noise: 0.1,
            initial_uncertainty: 1000.0,
            initial_state: InitialState::Zero,
            output_mode: OutputMode::FullForecast,
            io_retries: 2,
            abort_on_first_failure: false,
            workers: 1,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PoseError::io(path, e))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PoseError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(PoseError::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        positive("measurement_noise", self.measurement_noise)?;
        positive("process_noise", self.process_noise)?;
        positive("initial_uncertainty", self.initial_uncertainty)?;
        if self.workers == 0 {
            return Err(PoseError::InvalidConfig("workers must be at least 1".into()));
        }
        self.forecast_steps().map(|_| ())
    }

    /// `pred_window / dt`, rejected unless it is a positive integer no
    /// larger than [`MAX_FORECAST_STEPS`].
    pub fn forecast_steps(&self) -> Result<usize> {
        positive("pred_window", self.pred_window)?;
        let ratio = self.pred_window / self.dt;
        let rounded = ratio.round();
        if rounded < 1.0 || (ratio - rounded).abs() > 1e-9 * rounded.max(1.0) {
            return Err(PoseError::InvalidConfig(format!(
                "pred_window / dt = {} / {} = {ratio} is not a positive integer",
                self.pred_window, self.dt
            )));
        }
        if rounded > MAX_FORECAST_STEPS as f64 {
            return Err(PoseError::InvalidConfig(format!(
                "pred_window / dt = {rounded} exceeds the limit of {MAX_FORECAST_STEPS} steps"
            )));
        }
        Ok(rounded as usize)
    }

    /// Forecast rows written per input row.
    pub fn rows_per_timestep(&self) -> Result<usize> {
        match self.output_mode {
            OutputMode::FullForecast => self.forecast_steps(),
            OutputMode::NextStateOnly => Ok(1),
        }
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PoseError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
