//! Synthetic constant-velocity traces for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pose_forecast_rs::csv_io::{self, CsvSchema};
use pose_forecast_rs::{Pose, Quaternion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Noise-free ground truth and its noisy measurements
pub struct SyntheticTrace {
    pub truth: Vec<Pose>,
    pub measured: Vec<Pose>,
}

/// Seeded trace generator with Gaussian measurement noise
pub struct TraceGenerator {
    rng: SmallRng,
    pub dt: f64,
    /// Position noise std [m]
    pub position_sigma: f64,
    /// Per-component quaternion noise std
    pub quaternion_sigma: f64,
}

impl TraceGenerator {
    pub fn new(seed: u64, dt: f64, position_sigma: f64, quaternion_sigma: f64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            dt,
            position_sigma,
            quaternion_sigma,
        }
    }

    fn gaussian(&mut self, sigma: f64) -> f64 {
        let n: f64 = self.rng.sample(StandardNormal);
        n * sigma
    }

    /// Straight-line motion with a slow constant yaw rate.
    pub fn constant_velocity(&mut self, steps: usize) -> SyntheticTrace {
        let start: [f64; 3] = [
            self.rng.gen_range(-5.0..5.0),
            self.rng.gen_range(-5.0..5.0),
            self.rng.gen_range(-5.0..5.0),
        ];
        let velocity: [f64; 3] = [
            self.rng.gen_range(-2.0..2.0),
            self.rng.gen_range(-2.0..2.0),
            self.rng.gen_range(-2.0..2.0),
        ];
        let yaw_rate: f64 = self.rng.gen_range(-0.2..0.2);

        let mut truth = Vec::with_capacity(steps);
        let mut measured = Vec::with_capacity(steps);
        for i in 0..steps {
            let t = i as f64 * self.dt;
            let position = (
                start[0] + velocity[0] * t,
                start[1] + velocity[1] * t,
                start[2] + velocity[2] * t,
            );
            let q = Quaternion::from_axis_angle((0.0, 0.0, 1.0), yaw_rate * t);
            truth.push(Pose::new(position, q));

            let p_sigma = self.position_sigma;
            let q_sigma = self.quaternion_sigma;
            let noisy_position = (
                position.0 + self.gaussian(p_sigma),
                position.1 + self.gaussian(p_sigma),
                position.2 + self.gaussian(p_sigma),
            );
            let noisy_q = Quaternion::new(
                q.w + self.gaussian(q_sigma),
                q.x + self.gaussian(q_sigma),
                q.y + self.gaussian(q_sigma),
                q.z + self.gaussian(q_sigma),
            );
            measured.push(Pose::new(noisy_position, noisy_q));
        }
        SyntheticTrace { truth, measured }
    }
}

pub fn write_trace(dir: &Path, name: &str, poses: &[Pose]) -> PathBuf {
    let path = dir.join(name);
    csv_io::write_trace(&path, CsvSchema::Trace, poses).expect("write synthetic trace");
    path
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
