//! Ready-made arm rosters.

use super::pair::ArmPair;
use crate::motor::bus::MotorDescriptor;
use crate::motor::{Family, MotorBus};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// SO-101 joint names, in bus id order (ids 1..=6)
pub const SO101_MOTOR_NAMES: [&str; 6] = [
    "shoulder_pan",
    "shoulder_lift",
    "elbow_flex",
    "wrist_flex",
    "wrist_roll",
    "gripper",
];

/// Feetech bus baud rate both SO-101 arms run at
pub const SO101_BAUD: u32 = 1_000_000;

/// Motor roster shared by the SO-101 leader and follower
pub fn so101_motors() -> BTreeMap<String, MotorDescriptor> {
    SO101_MOTOR_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            (
                name.to_string(),
                MotorDescriptor::new((i + 1) as u8, Family::FeetechSts),
            )
        })
        .collect()
}

/// Bus for one SO-101 arm on the given serial port
pub fn so101_bus(port: &str) -> MotorBus {
    MotorBus::new(port, SO101_BAUD, Family::FeetechSts, so101_motors())
}

/// SO-101 leader/follower pair with the identity joint mapping
pub fn so101_pair(
    leader_port: &str,
    follower_port: &str,
    calibration_path: impl Into<PathBuf>,
) -> ArmPair {
    let mapping = SO101_MOTOR_NAMES
        .iter()
        .map(|n| (n.to_string(), n.to_string()))
        .collect();
    ArmPair::new(
        Some(so101_bus(leader_port)),
        so101_bus(follower_port),
        mapping,
        calibration_path,
    )
}

/// Follower-only SO-101 pair, driven through IK from an input device
pub fn so101_solo(follower_port: &str, calibration_path: impl Into<PathBuf>) -> ArmPair {
    ArmPair::new(
        None,
        so101_bus(follower_port),
        BTreeMap::new(),
        calibration_path,
    )
}
