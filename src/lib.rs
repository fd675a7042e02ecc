//! armlink: leader/follower arm teleoperation and episode recording.
//!
//! The crate stacks four layers:
//! - `transport` and `motor`: serial servo buses with batched register
//!   access and position calibration,
//! - `kinematics`: forward kinematics and damped least squares IK for
//!   serial revolute arms,
//! - `sensors`: capture workers feeding single-slot frame buffers,
//! - `arm` and `session`: the leader/follower pairing, the dual-loop
//!   recording scheduler and non-blocking episode persistence.

pub mod arm;
pub mod config;
pub mod error;
pub mod kinematics;
pub mod motor;
pub mod sensors;
pub mod session;
pub mod transport;

pub use arm::{ArmObservation, ArmPair};
pub use config::AppConfig;
pub use error::{CommStatus, Error, Result};
pub use motor::{CalibrationEntry, CalibrationSet, Family, MotorBus, Register};
pub use session::{SchedulerConfig, SessionState, TeleopSession};
