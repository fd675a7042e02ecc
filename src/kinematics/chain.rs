//! Serial revolute kinematic chain.

use super::transforms::{pose_from_matrix, rot_x, rot_y, rot_z, wrap_angle};
use crate::error::{Error, Result};
use nalgebra::{DMatrix, Matrix4};

/// Rotation axis of a revolute joint, in the joint's local frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn rotation(&self, angle: f64) -> Matrix4<f64> {
        match self {
            Axis::X => rot_x(angle),
            Axis::Y => rot_y(angle),
            Axis::Z => rot_z(angle),
        }
    }
}

/// One revolute joint: fixed transform from the parent link, then a
/// rotation about `axis` by the joint angle.
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub name: String,
    /// Fixed transform from the parent link frame to this joint's frame
    pub parent_to_joint: Matrix4<f64>,
    pub axis: Axis,
    /// Lower position limit in radians
    pub lower_limit: f64,
    /// Upper position limit in radians
    pub upper_limit: f64,
}

/// Serial chain of revolute joints plus a fixed end-effector transform
#[derive(Debug, Clone)]
pub struct KinematicChain {
    joints: Vec<RevoluteJoint>,
    end_effector: Matrix4<f64>,
}

impl KinematicChain {
    /// Build a chain. Fails if there are no joints or any joint has an
    /// empty limit interval.
    pub fn new(joints: Vec<RevoluteJoint>, end_effector: Matrix4<f64>) -> Result<Self> {
        if joints.is_empty() {
            return Err(Error::InvalidParameter(
                "kinematic chain needs at least one joint".to_string(),
            ));
        }
        for joint in &joints {
            if joint.lower_limit >= joint.upper_limit {
                return Err(Error::InvalidParameter(format!(
                    "joint '{}' has empty limit interval [{}, {}]",
                    joint.name, joint.lower_limit, joint.upper_limit
                )));
            }
        }
        Ok(KinematicChain {
            joints,
            end_effector,
        })
    }

    /// Number of joints
    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    /// Joint names in chain order
    pub fn joint_names(&self) -> Vec<&str> {
        self.joints.iter().map(|j| j.name.as_str()).collect()
    }

    /// Joint limits in chain order, radians
    pub fn limits(&self) -> Vec<(f64, f64)> {
        self.joints
            .iter()
            .map(|j| (j.lower_limit, j.upper_limit))
            .collect()
    }

    /// Full end-effector transform for the given joint angles (radians)
    pub fn forward_kinematics_matrix(&self, q: &[f64]) -> Result<Matrix4<f64>> {
        if q.len() != self.joints.len() {
            return Err(Error::Dimension {
                expected: self.joints.len(),
                actual: q.len(),
            });
        }
        let mut transform: Matrix4<f64> = Matrix4::identity();
        for (joint, &angle) in self.joints.iter().zip(q) {
            transform = transform * joint.parent_to_joint * joint.axis.rotation(angle);
        }
        Ok(transform * self.end_effector)
    }

    /// End-effector pose `(x, y, z, pitch, roll)` for the given angles
    pub fn forward_kinematics(&self, q: &[f64]) -> Result<[f64; 5]> {
        Ok(pose_from_matrix(&self.forward_kinematics_matrix(q)?))
    }

    /// Numerical Jacobian of the 5-DOF pose, central differences.
    ///
    /// The angular rows are wrapped to [-pi, pi] before differencing so a
    /// pose crossing the branch cut does not blow up the derivative.
    pub fn jacobian(&self, q: &[f64], delta: f64) -> Result<DMatrix<f64>> {
        let n = self.joints.len();
        let mut jac = DMatrix::zeros(5, n);
        let mut probe = q.to_vec();
        for j in 0..n {
            probe[j] = q[j] + delta;
            let forward = self.forward_kinematics(&probe)?;
            probe[j] = q[j] - delta;
            let backward = self.forward_kinematics(&probe)?;
            probe[j] = q[j];
            for i in 0..5 {
                let diff = if i < 3 {
                    forward[i] - backward[i]
                } else {
                    wrap_angle(forward[i] - backward[i])
                };
                jac[(i, j)] = diff / (2.0 * delta);
            }
        }
        Ok(jac)
    }

    /// Clamp joint angles into `[lower + margin, upper - margin]`
    pub fn clamp_to_limits(&self, q: &mut [f64], margin: f64) {
        for (angle, joint) in q.iter_mut().zip(&self.joints) {
            *angle = angle.clamp(joint.lower_limit + margin, joint.upper_limit - margin);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::kinematics::transforms::translation;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    /// Two z-axis joints in the XY plane, links 0.1 and 0.2, ee 0.15
    pub(crate) fn planar_two_joint() -> KinematicChain {
        KinematicChain::new(
            vec![
                RevoluteJoint {
                    name: "base".to_string(),
                    parent_to_joint: translation(0.1, 0.0, 0.0),
                    axis: Axis::Z,
                    lower_limit: -3.0,
                    upper_limit: 3.0,
                },
                RevoluteJoint {
                    name: "elbow".to_string(),
                    parent_to_joint: translation(0.2, 0.0, 0.0),
                    axis: Axis::Z,
                    lower_limit: -3.0,
                    upper_limit: 3.0,
                },
            ],
            translation(0.15, 0.0, 0.0),
        )
        .unwrap()
    }

    #[test]
    fn test_planar_chain_at_zero() {
        let chain = planar_two_joint();
        let pose = chain.forward_kinematics(&[0.0, 0.0]).unwrap();
        assert_relative_eq!(pose[0], 0.45, epsilon = 1e-12);
        assert_relative_eq!(pose[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_planar_chain_first_joint_quarter_turn() {
        let chain = planar_two_joint();
        let pose = chain.forward_kinematics(&[FRAC_PI_2, 0.0]).unwrap();
        assert_relative_eq!(pose[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(pose[1], 0.35, epsilon = 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let chain = planar_two_joint();
        match chain.forward_kinematics(&[0.0]) {
            Err(Error::Dimension { expected: 2, actual: 1 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(KinematicChain::new(vec![], Matrix4::identity()).is_err());
    }

    #[test]
    fn test_bad_limits_rejected() {
        let result = KinematicChain::new(
            vec![RevoluteJoint {
                name: "j".to_string(),
                parent_to_joint: Matrix4::identity(),
                axis: Axis::X,
                lower_limit: 1.0,
                upper_limit: 1.0,
            }],
            Matrix4::identity(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_jacobian_matches_analytic_planar() {
        let chain = planar_two_joint();
        let q = [0.3, -0.7];
        let jac = chain.jacobian(&q, 1e-6).unwrap();

        // Analytic planar Jacobian for x and y
        let l1 = 0.2;
        let l2 = 0.15;
        // positions measured from joint 1 (base offset 0.1 is constant)
        let dx_dq1 = -l1 * q[0].sin() - l2 * (q[0] + q[1]).sin();
        let dx_dq2 = -l2 * (q[0] + q[1]).sin();
        let dy_dq1 = l1 * q[0].cos() + l2 * (q[0] + q[1]).cos();
        let dy_dq2 = l2 * (q[0] + q[1]).cos();
        assert_relative_eq!(jac[(0, 0)], dx_dq1, epsilon = 1e-6);
        assert_relative_eq!(jac[(0, 1)], dx_dq2, epsilon = 1e-6);
        assert_relative_eq!(jac[(1, 0)], dy_dq1, epsilon = 1e-6);
        assert_relative_eq!(jac[(1, 1)], dy_dq2, epsilon = 1e-6);
    }

    #[test]
    fn test_clamp_to_limits() {
        let chain = planar_two_joint();
        let mut q = [5.0, -5.0];
        chain.clamp_to_limits(&mut q, 0.01);
        assert_relative_eq!(q[0], 2.99);
        assert_relative_eq!(q[1], -2.99);
    }
}
