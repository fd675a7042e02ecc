//! Chain definitions for supported arms.

use super::chain::{Axis, KinematicChain, RevoluteJoint};
use super::transforms::translation;
use crate::error::Result;

/// SO-101 5-DOF arm, link offsets taken from its URDF
pub fn so101() -> Result<KinematicChain> {
    let joints = vec![
        RevoluteJoint {
            name: "shoulder_pan".to_string(),
            parent_to_joint: translation(0.0388, 0.0, 0.0624),
            axis: Axis::Y,
            lower_limit: -1.91986,
            upper_limit: 1.91986,
        },
        RevoluteJoint {
            name: "shoulder_lift".to_string(),
            parent_to_joint: translation(-0.0304, -0.0183, -0.0542),
            axis: Axis::X,
            lower_limit: -1.74533,
            upper_limit: 1.74533,
        },
        RevoluteJoint {
            name: "elbow_flex".to_string(),
            parent_to_joint: translation(-0.11257, -0.028, 0.0),
            axis: Axis::X,
            lower_limit: -1.69,
            upper_limit: 1.69,
        },
        RevoluteJoint {
            name: "wrist_flex".to_string(),
            parent_to_joint: translation(-0.1349, 0.0052, 0.0),
            axis: Axis::X,
            lower_limit: -1.65806,
            upper_limit: 1.65806,
        },
        RevoluteJoint {
            name: "wrist_roll".to_string(),
            parent_to_joint: translation(0.0, -0.0611, 0.0181),
            axis: Axis::Y,
            lower_limit: -2.74385,
            upper_limit: 2.84121,
        },
    ];
    KinematicChain::new(joints, translation(-0.0079, 0.0, -0.0981))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::ik::{solve, IkConfig};
    use approx::assert_relative_eq;

    #[test]
    fn test_so101_shape() {
        let chain = so101().unwrap();
        assert_eq!(chain.dof(), 5);
        assert_eq!(
            chain.joint_names(),
            vec!["shoulder_pan", "shoulder_lift", "elbow_flex", "wrist_flex", "wrist_roll"]
        );
    }

    #[test]
    fn test_so101_zero_pose_is_link_sum() {
        let chain = so101().unwrap();
        let pose = chain.forward_kinematics(&[0.0; 5]).unwrap();
        // All joints at zero: the pose is the sum of the fixed translations
        assert_relative_eq!(pose[0], 0.0388 - 0.0304 - 0.11257 - 0.1349 - 0.0079, epsilon = 1e-12);
        assert_relative_eq!(pose[1], -0.0183 - 0.028 + 0.0052 - 0.0611, epsilon = 1e-12);
        assert_relative_eq!(pose[2], 0.0624 - 0.0542 + 0.0181 - 0.0981, epsilon = 1e-12);
        assert_relative_eq!(pose[3], 0.0);
        assert_relative_eq!(pose[4], 0.0);
    }

    #[test]
    fn test_so101_ik_round_trip() {
        let chain = so101().unwrap();
        let config = IkConfig {
            max_iterations: 300,
            ..IkConfig::default()
        };
        // Joint vectors inside 50% of the limits
        let samples = [
            [0.2, -0.5, 0.4, 0.3, -0.6],
            [-0.8, 0.6, -0.7, 0.1, 0.9],
            [0.0, 0.0, 0.5, -0.5, 0.0],
        ];
        for q in samples {
            let target = chain.forward_kinematics(&q).unwrap();
            let guess: Vec<f64> = q.iter().map(|v| v + 0.2).collect();
            let result = solve(&chain, &target, &guess, &config).unwrap();
            let reached = chain.forward_kinematics(&result.joint_angles).unwrap();
            let dist = ((reached[0] - target[0]).powi(2)
                + (reached[1] - target[1]).powi(2)
                + (reached[2] - target[2]).powi(2))
            .sqrt();
            assert!(dist < 5e-3, "q={:?} residual {}", q, dist);
        }
    }
}
