//! Forecast / filter scoring against ground truth
//!
//! Position error is the Euclidean distance in meters. Angular error is the
//! norm of the Euler-angle vector [degrees] of the relative rotation
//! `predicted * actual^-1`. That is an approximation of angular distance, not
//! the geodesic angle and not a metric: near gimbal lock (middle angle at
//! +/-90 degrees) the decomposition is degenerate and the value can jump
//! non-monotonically as the rotation changes smoothly.

pub mod rotation;
pub mod summary;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{PoseError, Result};
use crate::trajectory::ForecastOutput;
use crate::types::{Pose, Quaternion};

pub use rotation::{euler_angles, to_unit_quaternion, EulerSequence};
pub use summary::ErrorDistribution;

/// Euclidean distance between two positions [meters].
pub fn position_error(actual: &Vector3<f64>, predicted: &Vector3<f64>) -> f64 {
    (predicted - actual).norm()
}

/// Angular error [degrees] using the intrinsic X-Y-Z decomposition.
pub fn angular_error(actual: &Quaternion, predicted: &Quaternion) -> Result<f64> {
    angular_error_with(actual, predicted, EulerSequence::IntrinsicXyz)
}

/// Angular error [degrees] with an explicit Euler sequence.
pub fn angular_error_with(
    actual: &Quaternion,
    predicted: &Quaternion,
    sequence: EulerSequence,
) -> Result<f64> {
    let actual = to_unit_quaternion(actual)?;
    let predicted = to_unit_quaternion(predicted)?;
    let relative = predicted * actual.inverse();
    let angles = euler_angles(&relative, sequence);
    Ok(Vector3::from(angles).norm().to_degrees())
}

/// Errors at one timestep
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Ground-truth row the prediction is compared against
    pub row: usize,
    pub position_m: f64,
    pub angular_deg: f64,
}

/// Scores one trace at a time
#[derive(Clone, Copy, Debug)]
pub struct ErrorEvaluator {
    pub sequence: EulerSequence,
    /// Forecast lead compared against truth (1 = one step ahead)
    pub lead: usize,
}

impl Default for ErrorEvaluator {
    fn default() -> Self {
        Self {
            sequence: EulerSequence::IntrinsicXyz,
            lead: 1,
        }
    }
}

impl ErrorEvaluator {
    pub fn new(sequence: EulerSequence, lead: usize) -> Self {
        Self { sequence, lead }
    }

    pub fn score(&self, row: usize, actual: &Pose, predicted: &Pose) -> Result<ErrorRecord> {
        let angular_deg =
            angular_error_with(&actual.quaternion, &predicted.quaternion, self.sequence)
                .map_err(|e| match e {
                    PoseError::InvalidQuaternion(msg) => {
                        PoseError::InvalidQuaternion(format!("row {row}: {msg}"))
                    }
                    other => other,
                })?;
        Ok(ErrorRecord {
            row,
            position_m: position_error(&actual.position(), &predicted.position()),
            angular_deg,
        })
    }

    /// Row-for-row comparison of a filtered trace with its ground truth.
    pub fn evaluate_filtered(&self, truth: &[Pose], filtered: &[Pose]) -> Result<Vec<ErrorRecord>> {
        if truth.len() != filtered.len() {
            return Err(PoseError::PairingMismatch(format!(
                "ground truth has {} rows, filtered trace has {}",
                truth.len(),
                filtered.len()
            )));
        }
        truth
            .iter()
            .zip(filtered)
            .enumerate()
            .map(|(row, (actual, predicted))| self.score(row, actual, predicted))
            .collect()
    }

    /// Compare the lead-`self.lead` prediction of every origin timestep `t`
    /// with truth row `t + lead`. Origins whose target lies past the end of
    /// the trace are skipped.
    pub fn evaluate_forecast(
        &self,
        truth: &[Pose],
        forecast: &ForecastOutput,
    ) -> Result<Vec<ErrorRecord>> {
        if self.lead == 0 || self.lead > forecast.rows_per_timestep() {
            return Err(PoseError::InvalidConfig(format!(
                "lead {} outside 1..={}",
                self.lead,
                forecast.rows_per_timestep()
            )));
        }
        if forecast.timesteps() != truth.len() {
            return Err(PoseError::PairingMismatch(format!(
                "ground truth has {} rows, forecast covers {} timesteps ({} rows each)",
                truth.len(),
                forecast.timesteps(),
                forecast.rows_per_timestep()
            )));
        }

        let origins = truth.len().saturating_sub(self.lead);
        let mut records = Vec::with_capacity(origins);
        for t in 0..origins {
            let target = t + self.lead;
            let predicted = forecast.at_lead(t, self.lead).ok_or_else(|| {
                PoseError::PairingMismatch(format!(
                    "no lead-{} forecast at timestep {t}",
                    self.lead
                ))
            })?;
            records.push(self.score(target, &truth[target], predicted)?);
        }
        Ok(records)
    }
}

/// Per-trace error sample and its summaries
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceErrors {
    pub trace_id: String,
    pub position_m: Vec<f64>,
    pub angular_deg: Vec<f64>,
}

impl TraceErrors {
    pub fn from_records(trace_id: impl Into<String>, records: &[ErrorRecord]) -> Self {
        Self {
            trace_id: trace_id.into(),
            position_m: records.iter().map(|r| r.position_m).collect(),
            angular_deg: records.iter().map(|r| r.angular_deg).collect(),
        }
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            trace_id: self.trace_id.clone(),
            position_m: ErrorDistribution::from_samples(&self.position_m),
            angular_deg: ErrorDistribution::from_samples(&self.angular_deg),
        }
    }
}

/// Distribution summaries for one trace
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub position_m: Option<ErrorDistribution>,
    pub angular_deg: Option<ErrorDistribution>,
}
