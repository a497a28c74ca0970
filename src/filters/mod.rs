pub mod linear_kf;

pub use linear_kf::{EstimatorSnapshot, FilterState, Forecast, KalmanModel, PoseEstimator};
