//! Interactive two-pose calibration procedure.
//!
//! The arm is moved by hand to two known poses: the zero pose and a pose
//! with every joint rotated a quarter turn positive. The zero pose pins the
//! homing offsets (rounded to the nearest quarter turn, since a hand-held
//! pose is only approximate), the rotated pose reveals which joints count
//! against their mechanical direction.

use super::bus::MotorBus;
use super::calibration::CalibrationEntry;
use super::tables::Register;
use crate::error::Result;
use std::collections::BTreeMap;

/// Asks the operator to move the arm to a pose. Injected so the procedure
/// can run headless in tests.
pub trait CalibrationPrompt {
    /// Block until the arm is in the described pose
    fn request_pose(&mut self, instruction: &str) -> Result<()>;
}

/// Prompt on stdin/stdout
pub struct ConsolePrompt;

impl CalibrationPrompt for ConsolePrompt {
    fn request_pose(&mut self, instruction: &str) -> Result<()> {
        println!("{}", instruction);
        println!("Press Enter when ready...");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(())
    }
}

/// Run the two-pose procedure on a bus without calibration installed.
///
/// Torque is disabled so the arm can be moved by hand. Raw positions are
/// read at both poses; the result maps every motor name to its entry.
pub fn run_two_pose_calibration(
    bus: &mut MotorBus,
    prompt: &mut dyn CalibrationPrompt,
) -> Result<BTreeMap<String, CalibrationEntry>> {
    bus.torque_disable(&[])?;

    prompt.request_pose("Move the arm to the zero pose (all joints at their marked zero).")?;
    let names = bus.motor_names();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let zero = bus.sync_read(Register::PresentPosition, &name_refs)?;

    prompt.request_pose("Rotate every joint a quarter turn in its positive direction.")?;
    let rotated = bus.sync_read(Register::PresentPosition, &name_refs)?;

    let mut entries = BTreeMap::new();
    for name in &names {
        let (Some(&z), Some(&r)) = (zero.get(name), rotated.get(name)) else {
            log::warn!("Motor '{}' missing from a calibration pose read, skipping", name);
            continue;
        };
        let Some(resolution) = bus.motor_resolution(name) else {
            continue;
        };
        let entry = solve_two_pose(z as i32, r as i32, resolution);
        log::info!(
            "Calibrated '{}': offset {} steps, inverted {}",
            name,
            entry.homing_offset,
            entry.inverted
        );
        entries.insert(name.clone(), entry);
    }
    Ok(entries)
}

/// Derive one motor's calibration from its raw readings at the two poses.
///
/// A positive quarter turn that lowered the raw count means the joint is
/// inverted. The offset is then chosen so the rotated pose lands exactly on
/// +90 degrees, rounded to the nearest quarter turn to absorb hand error.
pub fn solve_two_pose(zero_raw: i32, rotated_raw: i32, resolution: u32) -> CalibrationEntry {
    let quarter = resolution as i32 / 4;
    let inverted = rotated_raw < zero_raw;
    let adjusted = if inverted { -rotated_raw } else { rotated_raw };
    let nearest = ((adjusted as f64 / f64::from(quarter)).round() as i32) * quarter;
    CalibrationEntry {
        homing_offset: quarter - nearest,
        inverted,
    }
}
