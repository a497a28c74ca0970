pub mod linalg;

pub use linalg::*;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Orientation quaternion, stored scalar-first as (w, x, y, z).
///
/// The four components always travel together. Any boundary using the
/// scalar-last (x, y, z, w) convention must go through [`Quaternion::from_xyzw`]
/// and [`Quaternion::to_xyzw`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Build from a scalar-last array `[x, y, z, w]`.
    pub fn from_xyzw(q: [f64; 4]) -> Self {
        Self::new(q[3], q[0], q[1], q[2])
    }

    /// Scalar-last array `[x, y, z, w]`.
    pub fn to_xyzw(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Scalar-first array `[w, x, y, z]`.
    pub fn to_wxyz(&self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn negated(&self) -> Self {
        Self::new(-self.w, -self.x, -self.y, -self.z)
    }

    /// Rotation by `angle_rad` about `axis` (need not be unit length).
    pub fn from_axis_angle(axis: (f64, f64, f64), angle_rad: f64) -> Self {
        let n = (axis.0 * axis.0 + axis.1 * axis.1 + axis.2 * axis.2).sqrt();
        if n < 1e-12 {
            return Self::IDENTITY;
        }
        let half = 0.5 * angle_rad;
        let s = half.sin() / n;
        Self::new(half.cos(), axis.0 * s, axis.1 * s, axis.2 * s)
    }
}

/// One pose sample: position [meters] and orientation.
///
/// Column / vector order is fixed: `PosX, PosY, PosZ, QuatW, QuatX, QuatY, QuatZ`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub quaternion: Quaternion,
}

impl Pose {
    pub fn new(position: (f64, f64, f64), quaternion: Quaternion) -> Self {
        Self {
            x: position.0,
            y: position.1,
            z: position.2,
            quaternion,
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn to_array(&self) -> [f64; POSE_DIM] {
        let q = &self.quaternion;
        [self.x, self.y, self.z, q.w, q.x, q.y, q.z]
    }

    pub fn from_array(v: [f64; POSE_DIM]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
            quaternion: Quaternion::new(v[3], v[4], v[5], v[6]),
        }
    }

    /// Measurement vector aligned with the filter's projection matrix.
    pub fn to_measurement(&self) -> MeasureVec {
        MeasureVec::from(self.to_array())
    }

    /// Pose part (first 7 components) of a filter state vector.
    pub fn from_state(state: &StateVec) -> Self {
        let mut v = [0.0; POSE_DIM];
        for (i, slot) in v.iter_mut().enumerate() {
            *slot = state[i];
        }
        Self::from_array(v)
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_order() {
        let pose = Pose::new((1.0, 2.0, 3.0), Quaternion::new(0.4, 0.5, 0.6, 0.7));
        let z = pose.to_measurement();
        assert_eq!(z.as_slice(), &[1.0, 2.0, 3.0, 0.4, 0.5, 0.6, 0.7]);
    }

    #[test]
    fn test_from_state_takes_pose_part() {
        let mut state = StateVec::zeros();
        for i in 0..STATE_DIM {
            state[i] = i as f64;
        }
        let pose = Pose::from_state(&state);
        assert_eq!(pose.to_array(), [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(pose.quaternion.w, 3.0);
        assert_eq!(pose.quaternion.z, 6.0);
    }

    #[test]
    fn test_scalar_last_conversion() {
        let q = Quaternion::new(0.1, 0.2, 0.3, 0.4);
        assert_eq!(q.to_xyzw(), [0.2, 0.3, 0.4, 0.1]);
        assert_eq!(Quaternion::from_xyzw(q.to_xyzw()), q);
        // A scalar-first array read as scalar-last is a different quaternion
        assert_ne!(Quaternion::from_xyzw(q.to_wxyz()), q);
    }

    #[test]
    fn test_axis_angle_unit_norm() {
        let q = Quaternion::from_axis_angle((0.0, 0.0, 2.0), 1.2);
        assert!((q.norm() - 1.0).abs() < 1e-12);
        assert!((q.w - 0.6f64.cos()).abs() < 1e-12);
        assert!((q.z - 0.6f64.sin()).abs() < 1e-12);
    }
}
