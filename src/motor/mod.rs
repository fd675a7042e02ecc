//! Servo motor bus: control tables, wire framing, calibration and the
//! batched sync read/write transaction layer.

pub mod bus;
pub mod calibrate;
pub mod calibration;
pub mod control_table;
pub mod packet;
pub mod tables;

pub use bus::{MotorBus, MotorDescriptor};
pub use calibration::{CalibrationEntry, CalibrationSet};
pub use tables::{Family, Register, RetryPolicy};
