//! Damped least squares inverse kinematics.
//!
//! Iterates a weighted, damped pseudo-inverse step toward a 5-DOF target
//! pose. Non-convergence is not an error: the caller gets the best joint
//! vector found plus the residuals and decides what to do with it.

use super::chain::KinematicChain;
use super::transforms::wrap_angle;
use crate::error::Result;
use nalgebra::{DMatrix, DVector};

/// Solver parameters
#[derive(Debug, Clone, Copy)]
pub struct IkConfig {
    pub max_iterations: usize,
    /// Convergence threshold on position error, meters
    pub position_tolerance: f64,
    /// Convergence threshold on orientation error, radians
    pub orientation_tolerance: f64,
    /// Damping factor lambda
    pub damping: f64,
    /// Fraction of each raw step actually taken
    pub step_scale: f64,
    pub position_weight: f64,
    pub orientation_weight: f64,
    /// Solutions stay this far inside the joint limits, radians
    pub joint_limit_margin: f64,
}

impl Default for IkConfig {
    fn default() -> Self {
        IkConfig {
            max_iterations: 100,
            position_tolerance: 1e-4,
            orientation_tolerance: 1e-3,
            damping: 0.05,
            step_scale: 0.5,
            position_weight: 1.0,
            orientation_weight: 0.1,
            joint_limit_margin: 0.01,
        }
    }
}

/// Solver output. Always populated; check `converged`.
#[derive(Debug, Clone)]
pub struct IkResult {
    /// Best joint angles found, radians, inside the margin-shrunk limits
    pub joint_angles: Vec<f64>,
    pub converged: bool,
    /// Iterations actually run
    pub iterations: usize,
    /// Final position error, meters
    pub position_error: f64,
    /// Final orientation error, radians
    pub orientation_error: f64,
}

/// Solve for joint angles reaching `target` = `(x, y, z, pitch, roll)`.
///
/// `initial` seeds the iteration, normally the current joint state so the
/// solver tracks continuously during teleoperation.
pub fn solve(
    chain: &KinematicChain,
    target: &[f64; 5],
    initial: &[f64],
    config: &IkConfig,
) -> Result<IkResult> {
    let mut q = initial.to_vec();
    chain.clamp_to_limits(&mut q, config.joint_limit_margin);

    let mut position_error = f64::INFINITY;
    let mut orientation_error = f64::INFINITY;
    let mut iterations = 0;

    for iteration in 0..config.max_iterations {
        iterations = iteration + 1;
        let pose = chain.forward_kinematics(&q)?;

        let mut error = DVector::zeros(5);
        for i in 0..3 {
            error[i] = target[i] - pose[i];
        }
        for i in 3..5 {
            error[i] = wrap_angle(target[i] - pose[i]);
        }
        position_error = (error[0].powi(2) + error[1].powi(2) + error[2].powi(2)).sqrt();
        orientation_error = (error[3].powi(2) + error[4].powi(2)).sqrt();

        if position_error < config.position_tolerance
            && orientation_error < config.orientation_tolerance
        {
            return Ok(IkResult {
                joint_angles: q,
                converged: true,
                iterations,
                position_error,
                orientation_error,
            });
        }

        let jacobian = chain.jacobian(&q, 1e-6)?;

        // Row weights: position rows vs orientation rows
        let mut weighted_jacobian = jacobian.clone();
        let mut weighted_error = error.clone();
        for row in 0..5 {
            let w = if row < 3 {
                config.position_weight
            } else {
                config.orientation_weight
            };
            for col in 0..weighted_jacobian.ncols() {
                weighted_jacobian[(row, col)] *= w;
            }
            weighted_error[row] *= w;
        }

        // (J JT + lambda^2 I) y = e, dq = JT y
        let jjt = &weighted_jacobian * weighted_jacobian.transpose();
        let damped = jjt + DMatrix::identity(5, 5) * (config.damping * config.damping);
        let Some(y) = damped.lu().solve(&weighted_error) else {
            log::warn!("IK normal equations singular, stopping at iteration {}", iterations);
            break;
        };
        let dq = weighted_jacobian.transpose() * y;

        for (angle, delta) in q.iter_mut().zip(dq.iter()) {
            *angle += config.step_scale * delta;
        }
        chain.clamp_to_limits(&mut q, config.joint_limit_margin);
    }

    Ok(IkResult {
        joint_angles: q,
        converged: false,
        iterations,
        position_error,
        orientation_error,
    })
}
