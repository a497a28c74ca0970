//! Quaternion boundary conversion and Euler decomposition
//!
//! Internally quaternions are (w, x, y, z). nalgebra's constructor is also
//! scalar-first, but its storage (`coords`) is (x, y, z, w); everything that
//! crosses into nalgebra goes through [`to_unit_quaternion`].

use nalgebra::{Quaternion as NaQuaternion, Rotation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::error::{PoseError, Result};
use crate::types::Quaternion;

/// Below this norm a quaternion carries no usable rotation
const MIN_QUAT_NORM: f64 = 1e-9;

/// Axis order used to decompose a rotation into three angles
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EulerSequence {
    /// R = Rx(a) * Ry(b) * Rz(c), rotations about the moving axes
    #[default]
    IntrinsicXyz,
    /// R = Rz(c) * Ry(b) * Rx(a), rotations about the fixed axes
    ExtrinsicXyz,
}

/// Normalised nalgebra rotation for a (w, x, y, z) quaternion.
///
/// Filter output is generally not unit length; it is normalised here. A zero
/// or non-finite quaternion is rejected.
pub fn to_unit_quaternion(q: &Quaternion) -> Result<UnitQuaternion<f64>> {
    let norm = q.norm();
    if !norm.is_finite() || norm < MIN_QUAT_NORM {
        return Err(PoseError::InvalidQuaternion(format!(
            "cannot normalise (w={}, x={}, y={}, z={})",
            q.w, q.x, q.y, q.z
        )));
    }
    Ok(UnitQuaternion::from_quaternion(NaQuaternion::new(
        q.w, q.x, q.y, q.z,
    )))
}

/// Three angles [radians] of `rotation` in the given sequence, ordered
/// (about X, about Y, about Z).
pub fn euler_angles(rotation: &UnitQuaternion<f64>, sequence: EulerSequence) -> [f64; 3] {
    match sequence {
        EulerSequence::ExtrinsicXyz => {
            let (roll, pitch, yaw) = rotation.euler_angles();
            [roll, pitch, yaw]
        }
        EulerSequence::IntrinsicXyz => intrinsic_xyz(&rotation.to_rotation_matrix()),
    }
}

fn intrinsic_xyz(r: &Rotation3<f64>) -> [f64; 3] {
    let m = r.matrix();
    let sin_b = m[(0, 2)].clamp(-1.0, 1.0);
    let b = sin_b.asin();
    if (1.0 - sin_b.abs()) < 1e-12 {
        // Gimbal lock: only a +/- c is observable, put it all in a
        let a = m[(2, 1)].atan2(m[(1, 1)]);
        return [a, b, 0.0];
    }
    let a = (-m[(1, 2)]).atan2(m[(2, 2)]);
    let c = (-m[(0, 1)]).atan2(m[(0, 0)]);
    [a, b, c]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_boundary_component_order() {
        let q = Quaternion::new(0.5, 0.5, -0.5, 0.5);
        let unit = to_unit_quaternion(&q).unwrap();
        assert_relative_eq!(unit.w, 0.5, epsilon = 1e-12);
        assert_relative_eq!(unit.i, 0.5, epsilon = 1e-12);
        assert_relative_eq!(unit.j, -0.5, epsilon = 1e-12);
        assert_relative_eq!(unit.k, 0.5, epsilon = 1e-12);
        // nalgebra stores the scalar last
        assert_relative_eq!(unit.coords[3], 0.5, epsilon = 1e-12);
        assert_relative_eq!(unit.coords[1], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_rotates_about_expected_axis() {
        // 90 degrees about Z must map +X to +Y
        let q = Quaternion::from_axis_angle((0.0, 0.0, 1.0), FRAC_PI_2);
        let unit = to_unit_quaternion(&q).unwrap();
        let v = unit * nalgebra::Vector3::x();
        assert_relative_eq!(v, nalgebra::Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_normalises() {
        let unit = to_unit_quaternion(&Quaternion::new(2.0, 0.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(unit.w, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_quaternion_rejected() {
        let err = to_unit_quaternion(&Quaternion::new(0.0, 0.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, PoseError::InvalidQuaternion(_)));
        assert!(to_unit_quaternion(&Quaternion::new(f64::NAN, 0.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn test_single_axis_angles() {
        for sequence in [EulerSequence::IntrinsicXyz, EulerSequence::ExtrinsicXyz] {
            let rx = UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0);
            let ry = UnitQuaternion::from_euler_angles(0.0, -0.4, 0.0);
            let rz = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5);
            let ax = euler_angles(&rx, sequence);
            let ay = euler_angles(&ry, sequence);
            let az = euler_angles(&rz, sequence);
            assert_relative_eq!(ax[0], 0.3, epsilon = 1e-12);
            assert_relative_eq!(ay[1], -0.4, epsilon = 1e-12);
            assert_relative_eq!(az[2], 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_intrinsic_round_trip() {
        let (a, b, c) = (0.2, -0.7, 1.1);
        let rx = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::x_axis(), a);
        let ry = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::y_axis(), b);
        let rz = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::z_axis(), c);
        let angles = euler_angles(&(rx * ry * rz), EulerSequence::IntrinsicXyz);
        assert_relative_eq!(angles[0], a, epsilon = 1e-10);
        assert_relative_eq!(angles[1], b, epsilon = 1e-10);
        assert_relative_eq!(angles[2], c, epsilon = 1e-10);
    }

    #[test]
    fn test_extrinsic_round_trip() {
        let (a, b, c) = (0.2, -0.7, 1.1);
        let rx = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::x_axis(), a);
        let ry = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::y_axis(), b);
        let rz = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::z_axis(), c);
        let angles = euler_angles(&(rz * ry * rx), EulerSequence::ExtrinsicXyz);
        assert_relative_eq!(angles[0], a, epsilon = 1e-10);
        assert_relative_eq!(angles[1], b, epsilon = 1e-10);
        assert_relative_eq!(angles[2], c, epsilon = 1e-10);
    }

    #[test]
    fn test_gimbal_lock_is_finite() {
        let ry = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::y_axis(), FRAC_PI_2);
        let rx = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::x_axis(), 0.3);
        let angles = euler_angles(&(rx * ry), EulerSequence::IntrinsicXyz);
        assert!(angles.iter().all(|a| a.is_finite()));
        assert_relative_eq!(angles[1], FRAC_PI_2, epsilon = 1e-6);
    }
}
