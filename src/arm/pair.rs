//! Leader/follower pairing and the teleoperation step.

use crate::error::Result;
use crate::motor::calibrate::{run_two_pose_calibration, CalibrationPrompt};
use crate::motor::{CalibrationSet, MotorBus, Register};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Calibration file role key for the leader arm
pub const LEADER_ROLE: &str = "leader";
/// Calibration file role key for the follower arm
pub const FOLLOWER_ROLE: &str = "follower";

/// Joint positions of both arms at one instant, in calibrated degrees.
/// Keys are follower motor names on both sides so rows line up in episodes.
#[derive(Debug, Clone, Default)]
pub struct ArmObservation {
    pub leader: BTreeMap<String, f64>,
    pub follower: BTreeMap<String, f64>,
}

/// A leader arm driving a follower arm.
///
/// The leader is optional: a pair without one is driven through IK from a
/// pointing device instead. Leader motor names map onto follower motor
/// names; the mapping is usually the identity but does not have to be.
pub struct ArmPair {
    leader: Option<MotorBus>,
    follower: MotorBus,
    /// leader motor name -> follower motor name
    mapping: BTreeMap<String, String>,
    calibration_path: PathBuf,
    connected: bool,
}

impl ArmPair {
    pub fn new(
        leader: Option<MotorBus>,
        follower: MotorBus,
        mapping: BTreeMap<String, String>,
        calibration_path: impl Into<PathBuf>,
    ) -> Self {
        ArmPair {
            leader,
            follower,
            mapping,
            calibration_path: calibration_path.into(),
            connected: false,
        }
    }

    /// Open both buses, install calibration (loading the file when present,
    /// running the interactive procedure otherwise), hold the follower stiff
    /// and leave the leader limp. Any failure tears everything back down.
    pub fn connect(&mut self, prompt: &mut dyn CalibrationPrompt) -> Result<()> {
        match self.connect_inner(prompt) {
            Ok(()) => {
                self.connected = true;
                log::info!("Arm pair connected");
                Ok(())
            }
            Err(e) => {
                log::error!("Arm pair connect failed: {}", e);
                self.disconnect();
                Err(e)
            }
        }
    }

    fn connect_inner(&mut self, prompt: &mut dyn CalibrationPrompt) -> Result<()> {
        self.follower.open()?;
        if let Some(leader) = self.leader.as_mut() {
            leader.open()?;
        }

        let mut calibration = if self.calibration_path.exists() {
            CalibrationSet::from_file(&self.calibration_path)?
        } else {
            CalibrationSet::new()
        };

        let mut dirty = false;
        if calibration.arm(FOLLOWER_ROLE).is_none() {
            log::info!("No follower calibration on file, running the two-pose procedure");
            let entries = run_two_pose_calibration(&mut self.follower, prompt)?;
            calibration.set_arm(FOLLOWER_ROLE, entries);
            dirty = true;
        }
        if let Some(leader) = self.leader.as_mut() {
            if calibration.arm(LEADER_ROLE).is_none() {
                log::info!("No leader calibration on file, running the two-pose procedure");
                let entries = run_two_pose_calibration(leader, prompt)?;
                calibration.set_arm(LEADER_ROLE, entries);
                dirty = true;
            }
        }
        if dirty {
            calibration.to_file(&self.calibration_path)?;
        }

        if let Some(entries) = calibration.arm(FOLLOWER_ROLE) {
            self.follower.set_calibration(entries.clone());
        }
        if let Some(leader) = self.leader.as_mut() {
            if let Some(entries) = calibration.arm(LEADER_ROLE) {
                leader.set_calibration(entries.clone());
            }
            // The leader is moved by hand
            leader.torque_disable(&[])?;
        }
        self.follower.torque_enable(&[])?;
        Ok(())
    }

    /// Best-effort teardown: torque off, ports released, never fails
    pub fn disconnect(&mut self) {
        if self.follower.is_open() {
            if let Err(e) = self.follower.torque_disable(&[]) {
                log::warn!("Failed to disable follower torque on disconnect: {}", e);
            }
        }
        self.follower.close();
        if let Some(leader) = self.leader.as_mut() {
            leader.close();
        }
        self.connected = false;
    }

    /// Whether `connect` has succeeded
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether this pair has a leader arm
    pub fn has_leader(&self) -> bool {
        self.leader.is_some()
    }

    /// Follower bus, for direct goal writes (IK control path)
    pub fn follower(&mut self) -> &mut MotorBus {
        &mut self.follower
    }

    /// Leader joint positions in degrees, keyed by follower motor name
    pub fn read_leader_positions(&mut self) -> Result<BTreeMap<String, f64>> {
        let leader = self
            .leader
            .as_mut()
            .ok_or_else(|| crate::error::Error::InvalidParameter("pair has no leader arm".to_string()))?;
        let names: Vec<String> = leader.motor_names();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let raw = leader.sync_read(Register::PresentPosition, &refs)?;
        Ok(self.map_to_follower(raw))
    }

    /// Follower joint positions in degrees
    pub fn read_follower_positions(&mut self) -> Result<BTreeMap<String, f64>> {
        let names: Vec<String> = self.follower.motor_names();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.follower.sync_read(Register::PresentPosition, &refs)
    }

    /// Send goal positions (degrees, follower motor names) to the follower
    pub fn write_follower_goals(&mut self, goals: &BTreeMap<String, f64>) -> Result<()> {
        self.follower.sync_write(Register::GoalPosition, goals)
    }

    /// One teleoperation tick: leader positions become follower goals.
    /// Returns both sides' positions for recording.
    pub fn teleop_step(&mut self) -> Result<ArmObservation> {
        let leader = self.read_leader_positions()?;
        self.write_follower_goals(&leader)?;
        let follower = self.read_follower_positions()?;
        Ok(ArmObservation { leader, follower })
    }

    /// Read both sides without commanding anything
    pub fn observation(&mut self) -> Result<ArmObservation> {
        let leader = if self.leader.is_some() {
            self.read_leader_positions()?
        } else {
            BTreeMap::new()
        };
        let follower = self.read_follower_positions()?;
        Ok(ArmObservation { leader, follower })
    }

    fn map_to_follower(&self, leader: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        leader
            .into_iter()
            .filter_map(|(name, value)| match self.mapping.get(&name) {
                Some(follower_name) => Some((follower_name.clone(), value)),
                None => {
                    log::debug!("Leader motor '{}' has no follower mapping, dropped", name);
                    None
                }
            })
            .collect()
    }
}
