//! 14-Dimensional Linear Kalman Filter (constant-velocity pose model)
//!
//! State Vector (14D):
//! [0-2]:   Position (X, Y, Z) [meters]
//! [3-6]:   Quaternion components (qw, qx, qy, qz), filtered as plain scalars
//! [7-13]:  Rate of change of each of the seven pose components [unit/s]
//!
//! Measurement (7D): the pose part of the state, same order.
//!
//! `KalmanModel` holds the fixed matrices and maps `FilterState -> FilterState`
//! without touching its input. `PoseEstimator` wraps a model and one
//! authoritative state for row-by-row use.

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

use crate::config::{InitialState, PipelineConfig};
use crate::error::{PoseError, Result};
use crate::types::{
    KalmanGain, MeasureMat, MeasureVec, Pose, ProjectionMat, StateMat, StateVec, POSE_DIM,
};

/// Smallest accepted ratio between the extreme Cholesky pivots of S, squared
const MIN_RCOND: f64 = 1e-12;

/// Mean and covariance of the filter at one instant
#[derive(Clone, Debug, PartialEq)]
pub struct FilterState {
    pub mean: StateVec,
    pub covariance: StateMat,
}

impl FilterState {
    /// Zero mean with `initial_uncertainty * I` covariance.
    pub fn zero(initial_uncertainty: f64) -> Self {
        Self {
            mean: StateVec::zeros(),
            covariance: StateMat::identity() * initial_uncertainty,
        }
    }

    /// Pose part seeded from `pose`, rates zero.
    pub fn from_pose(pose: &Pose, initial_uncertainty: f64) -> Self {
        let mut state = Self::zero(initial_uncertainty);
        state
            .mean
            .fixed_rows_mut::<POSE_DIM>(0)
            .copy_from(&pose.to_measurement());
        state
    }

    /// First seven state components.
    pub fn pose(&self) -> Pose {
        Pose::from_state(&self.mean)
    }

    /// Rate-of-change half of the state.
    pub fn rates(&self) -> [f64; POSE_DIM] {
        let mut rates = [0.0; POSE_DIM];
        for (i, slot) in rates.iter_mut().enumerate() {
            *slot = self.mean[POSE_DIM + i];
        }
        rates
    }

    pub fn covariance_trace(&self) -> f64 {
        self.covariance.trace()
    }

    pub fn is_finite(&self) -> bool {
        self.mean.iter().all(|v| v.is_finite()) && self.covariance.iter().all(|v| v.is_finite())
    }
}

/// Fixed matrices of the constant-velocity model
#[derive(Clone, Debug)]
pub struct KalmanModel {
    /// Time step [seconds]
    pub dt: f64,

    /// Transition matrix F [14x14]
    pub transition: StateMat,

    /// Measurement projection H [7x14]
    pub projection: ProjectionMat,

    /// Process noise Q [14x14]
    pub process_noise: StateMat,

    /// Measurement noise R [7x7]
    pub measurement_noise: MeasureMat,
}

impl KalmanModel {
    /// Model with `Q = q * I` and `R = r * I`.
    pub fn new(dt: f64, process_noise: f64, measurement_noise: f64) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PoseError::InvalidConfig(format!(
                "dt must be positive, got {dt}"
            )));
        }
        Ok(Self {
            dt,
            transition: Self::build_transition(dt),
            projection: Self::build_projection(),
            process_noise: StateMat::identity() * process_noise,
            measurement_noise: MeasureMat::identity() * measurement_noise,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.dt, config.process_noise, config.measurement_noise)
    }

    /// Identity plus `F[i, i+7] = dt`: `pose_{t+1} = pose_t + dt * rate_t`.
    pub fn build_transition(dt: f64) -> StateMat {
        let mut f = StateMat::identity();
        for i in 0..POSE_DIM {
            f[(i, i + POSE_DIM)] = dt;
        }
        f
    }

    /// Selects the seven pose components.
    pub fn build_projection() -> ProjectionMat {
        let mut h = ProjectionMat::zeros();
        for i in 0..POSE_DIM {
            h[(i, i)] = 1.0;
        }
        h
    }

    /// `x' = F x`, `P' = F P F^T + Q`.
    pub fn predict(&self, state: &FilterState) -> FilterState {
        let f = &self.transition;
        FilterState {
            mean: f * state.mean,
            covariance: f * state.covariance * f.transpose() + self.process_noise,
        }
    }

    /// Measurement correction.
    ///
    /// Fails with `NumericalInstability` when the innovation covariance
    /// `S = H P H^T + R` is not positive definite or is ill-conditioned, or
    /// when the corrected state is not finite.
    pub fn update(&self, state: &FilterState, measurement: &MeasureVec) -> Result<FilterState> {
        if !measurement.iter().all(|v| v.is_finite()) {
            return Err(PoseError::NumericalInstability(
                "measurement contains non-finite values".into(),
            ));
        }

        let h = &self.projection;
        let innovation = measurement - h * state.mean;

        // S = H * P * H^T + R
        let hp = h * state.covariance;
        let s = hp * h.transpose() + self.measurement_noise;

        let chol = s.cholesky().ok_or_else(|| {
            PoseError::NumericalInstability(
                "innovation covariance is not positive definite".into(),
            )
        })?;
        let pivots = chol.l_dirty().diagonal();
        let (min_pivot, max_pivot) = (pivots.min(), pivots.max());
        if !(max_pivot > 0.0) || (min_pivot / max_pivot).powi(2) < MIN_RCOND {
            return Err(PoseError::NumericalInstability(format!(
                "innovation covariance is ill-conditioned (pivots {min_pivot:e}..{max_pivot:e})"
            )));
        }

        // K = P * H^T * S^-1 = (S^-1 * H * P)^T for symmetric P and S
        let gain: KalmanGain = chol.solve(&hp).transpose();

        let mean = state.mean + gain * innovation;
        let covariance = (StateMat::identity() - gain * h) * state.covariance;

        let updated = FilterState { mean, covariance };
        if !updated.is_finite() {
            return Err(PoseError::NumericalInstability(
                "non-finite value in updated state or covariance".into(),
            ));
        }
        Ok(updated)
    }

    /// Lazy `steps`-long forecast starting from a private copy of `state`.
    pub fn forecast(&self, state: &FilterState, steps: usize) -> Forecast<'_> {
        Forecast {
            model: self,
            state: state.clone(),
            remaining: steps,
        }
    }
}

/// Pure-prediction rollout; each item is the state one more step ahead.
///
/// Owns its own copy of the starting state, so consuming it never touches
/// the filter it was created from.
pub struct Forecast<'a> {
    model: &'a KalmanModel,
    state: FilterState,
    remaining: usize,
}

impl Iterator for Forecast<'_> {
    type Item = FilterState;

    fn next(&mut self) -> Option<FilterState> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.state = self.model.predict(&self.state);
        Some(self.state.clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Forecast<'_> {}

impl FusedIterator for Forecast<'_> {}

/// Serializable snapshot of the estimator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EstimatorSnapshot {
    /// Filtered pose (position + quaternion)
    pub pose: Pose,

    /// Rates of change of the pose components
    pub rates: [f64; POSE_DIM],

    /// Covariance trace for uncertainty
    pub covariance_trace: f64,

    /// Update counters
    pub predictions: u64,
    pub updates: u64,
}

/// Stateful facade: one model plus the authoritative filter state
pub struct PoseEstimator {
    model: KalmanModel,
    state: FilterState,
    initial_state: InitialState,
    initial_uncertainty: f64,
    seeded: bool,
    predictions: u64,
    updates: u64,
}

impl PoseEstimator {
    /// Build F, H, P, Q, R from the configuration.
    pub fn initialize(config: &PipelineConfig) -> Result<Self> {
        let model = KalmanModel::from_config(config)?;
        Ok(Self::with_model(
            model,
            config.initial_state,
            config.initial_uncertainty,
        ))
    }

    pub fn with_model(
        model: KalmanModel,
        initial_state: InitialState,
        initial_uncertainty: f64,
    ) -> Self {
        Self {
            model,
            state: FilterState::zero(initial_uncertainty),
            initial_state,
            initial_uncertainty,
            seeded: initial_state == InitialState::Zero,
            predictions: 0,
            updates: 0,
        }
    }

    pub fn model(&self) -> &KalmanModel {
        &self.model
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Copy of the current state, independent of later filtering.
    pub fn snapshot(&self) -> FilterState {
        self.state.clone()
    }

    pub fn predict(&mut self) {
        self.state = self.model.predict(&self.state);
        self.predictions += 1;
    }

    /// Correct with a pose measurement. On failure the state is left unchanged.
    pub fn update(&mut self, measurement: &Pose) -> Result<()> {
        let z = measurement.to_measurement();
        self.state = if self.seeded {
            self.model.update(&self.state, &z)?
        } else {
            // First measurement seeds the pose part before the usual correction
            let mut prior = FilterState::from_pose(measurement, self.initial_uncertainty);
            prior.covariance = self.state.covariance;
            self.model.update(&prior, &z)?
        };
        self.seeded = true;
        self.updates += 1;
        Ok(())
    }

    /// Forecast from a snapshot of the current state; `&self` keeps the
    /// authoritative state untouched for as long as the forecast lives.
    pub fn forecast(&self, steps: usize) -> Forecast<'_> {
        self.model.forecast(&self.state, steps)
    }

    pub fn get_state(&self) -> EstimatorSnapshot {
        EstimatorSnapshot {
            pose: self.state.pose(),
            rates: self.state.rates(),
            covariance_trace: self.state.covariance_trace(),
            predictions: self.predictions,
            updates: self.updates,
        }
    }

    /// Back to the initial mean/covariance, keeping the model.
    pub fn reset(&mut self) {
        *self = Self::with_model(
            self.model.clone(),
            self.initial_state,
            self.initial_uncertainty,
        );
    }
}
