//! Homogeneous transform helpers for the kinematic chain.

use nalgebra::Matrix4;

/// Rotation about X by `angle` radians
pub fn rot_x(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, c, -s, 0.0, //
        0.0, s, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about Y by `angle` radians
pub fn rot_y(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        c, 0.0, s, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        -s, 0.0, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about Z by `angle` radians
pub fn rot_z(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        c, -s, 0.0, 0.0, //
        s, c, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Pure translation
pub fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m[(0, 3)] = x;
    m[(1, 3)] = y;
    m[(2, 3)] = z;
    m
}

/// URDF-style fixed transform: translation then intrinsic Z-Y-X rotation
pub fn urdf_transform(xyz: (f64, f64, f64), rpy: (f64, f64, f64)) -> Matrix4<f64> {
    translation(xyz.0, xyz.1, xyz.2) * rot_z(rpy.2) * rot_y(rpy.1) * rot_x(rpy.0)
}

/// Extract the 5-DOF pose `(x, y, z, pitch, roll)` from a transform.
///
/// Pitch and roll follow the Z-Y-X Euler convention with yaw discarded;
/// near pitch = ±90 degrees roll becomes ill-conditioned, as usual.
pub fn pose_from_matrix(m: &Matrix4<f64>) -> [f64; 5] {
    let pitch = (-m[(2, 0)]).atan2((m[(0, 0)].powi(2) + m[(1, 0)].powi(2)).sqrt());
    let roll = m[(2, 1)].atan2(m[(2, 2)]);
    [m[(0, 3)], m[(1, 3)], m[(2, 3)], pitch, roll]
}

/// Wrap an angle to [-pi, pi]
pub fn wrap_angle(angle: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let wrapped = angle.rem_euclid(two_pi);
    if wrapped > std::f64::consts::PI {
        wrapped - two_pi
    } else {
        wrapped
    }
}
