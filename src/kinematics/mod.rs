//! Forward kinematics, Jacobians and inverse kinematics for serial
//! revolute arms. Radians everywhere; degrees exist only at the bus.

pub mod chain;
pub mod chains;
pub mod ik;
pub mod transforms;

pub use chain::{Axis, KinematicChain, RevoluteJoint};
pub use ik::{solve as solve_ik, IkConfig, IkResult};
