//! Leader/follower arm pair on top of the motor buses.

mod pair;
pub mod presets;

pub use pair::{ArmObservation, ArmPair};
