use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{OutputMode, PipelineConfig};
use crate::error::{PoseError, Result, RowError};
use crate::filters::PoseEstimator;
use crate::types::Pose;

/// Flat forecast rows, `rows_per_timestep` consecutive rows per origin timestep.
///
/// Row `t * rows_per_timestep + (k - 1)` is the lead-`k` prediction made at
/// timestep `t`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutput {
    rows_per_timestep: usize,
    rows: Vec<Pose>,
}

impl ForecastOutput {
    pub fn new(rows_per_timestep: usize) -> Self {
        Self {
            rows_per_timestep,
            rows: Vec::new(),
        }
    }

    /// Regroup flat rows read back from disk.
    pub fn from_rows(rows_per_timestep: usize, rows: Vec<Pose>) -> Result<Self> {
        if rows_per_timestep == 0 || rows.len() % rows_per_timestep != 0 {
            return Err(PoseError::Schema(format!(
                "{} forecast rows cannot be split into batches of {}",
                rows.len(),
                rows_per_timestep
            )));
        }
        Ok(Self {
            rows_per_timestep,
            rows,
        })
    }

    fn push_batch(&mut self, batch: impl IntoIterator<Item = Pose>) {
        let before = self.rows.len();
        self.rows.extend(batch);
        debug_assert_eq!(self.rows.len() - before, self.rows_per_timestep);
    }

    pub fn rows_per_timestep(&self) -> usize {
        self.rows_per_timestep
    }

    /// Number of origin timesteps.
    pub fn timesteps(&self) -> usize {
        self.rows.len() / self.rows_per_timestep.max(1)
    }

    pub fn rows(&self) -> &[Pose] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Forecast batch made at timestep `t`.
    pub fn batch(&self, t: usize) -> Option<&[Pose]> {
        let start = t.checked_mul(self.rows_per_timestep)?;
        self.rows.get(start..start + self.rows_per_timestep)
    }

    /// `(origin timestep, batch)` pairs in order.
    pub fn batches(&self) -> impl Iterator<Item = (usize, &[Pose])> {
        self.rows.chunks_exact(self.rows_per_timestep.max(1)).enumerate()
    }

    /// Prediction made at timestep `t` for `lead` steps ahead (1-based).
    pub fn at_lead(&self, t: usize, lead: usize) -> Option<&Pose> {
        if lead == 0 || lead > self.rows_per_timestep {
            return None;
        }
        self.batch(t).map(|b| &b[lead - 1])
    }
}

/// Filter + forecast output for one trace
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedTrace {
    /// One corrected pose per input row
    pub filtered: Vec<Pose>,
    pub forecasts: ForecastOutput,
}

/// Drives one trace through a fresh estimator
#[derive(Clone, Debug)]
pub struct TrajectoryProcessor {
    config: PipelineConfig,
    steps: usize,
}

impl TrajectoryProcessor {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let steps = match config.output_mode {
            OutputMode::FullForecast => config.forecast_steps()?,
            OutputMode::NextStateOnly => 1,
        };
        Ok(Self {
            config: config.clone(),
            steps,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Forecast rows produced per input row.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Per row: predict, update, record the corrected pose, then forecast
    /// from a snapshot of the corrected state.
    pub fn process(&self, measurements: &[Pose]) -> std::result::Result<ProcessedTrace, RowError> {
        let mut estimator = PoseEstimator::initialize(&self.config)
            .map_err(|error| RowError { row: 0, error })?;

        let mut filtered = Vec::with_capacity(measurements.len());
        let mut forecasts = ForecastOutput::new(self.steps);

        for (row, measurement) in measurements.iter().enumerate() {
            estimator.predict();
            estimator
                .update(measurement)
                .map_err(|error| RowError { row, error })?;
            filtered.push(estimator.state().pose());

            let snapshot = estimator.snapshot();
            let batch = estimator
                .model()
                .forecast(&snapshot, self.steps)
                .map(|state| state.pose());
            forecasts.push_batch(batch);
        }

        debug!(
            "processed {} rows, {} forecast rows ({} per row)",
            filtered.len(),
            forecasts.rows().len(),
            self.steps
        );

        Ok(ProcessedTrace {
            filtered,
            forecasts,
        })
    }
}
