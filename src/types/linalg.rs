//! Linear algebra type system for the pose filter
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the constant-velocity Kalman filter.

use nalgebra::{SMatrix, SVector};

// ===== Dimensions =====
pub const POSE_DIM: usize = 7; // (x, y, z, qw, qx, qy, qz)
pub const STATE_DIM: usize = 2 * POSE_DIM; // pose + rate of change
pub const MEASURE_DIM: usize = POSE_DIM;

// ===== State Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

// ===== Measurement Types =====
pub type MeasureVec = SVector<f64, MEASURE_DIM>;
pub type MeasureMat = SMatrix<f64, MEASURE_DIM, MEASURE_DIM>;

// Projection H: 7×14
pub type ProjectionMat = SMatrix<f64, MEASURE_DIM, STATE_DIM>;

// Kalman gain K: 14×7
pub type KalmanGain = SMatrix<f64, STATE_DIM, MEASURE_DIM>;
