//! Constant-velocity Kalman filtering and short-horizon forecasting of 6-DoF
//! pose traces, plus scoring of the forecasts against ground truth.

pub mod batch;
pub mod config;
pub mod csv_io;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod pairing;
pub mod retry;
pub mod trajectory;
pub mod types;

pub use batch::{process_directory, BatchReport, Evaluation, PredictionKind, TraceAggregator};
pub use config::{InitialState, OutputMode, PipelineConfig};
pub use error::{PoseError, Result, TraceFailure};
pub use filters::{FilterState, KalmanModel, PoseEstimator};
pub use metrics::{angular_error, position_error, ErrorEvaluator, EulerSequence};
pub use trajectory::{ForecastOutput, ProcessedTrace, TrajectoryProcessor};
pub use types::{Pose, Quaternion};
