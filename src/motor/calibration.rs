//! Position calibration: maps raw encoder counts to degrees and back.
//!
//! Each motor carries a homing offset and an inversion flag determined by
//! the interactive procedure in [`super::calibrate`]. Offsets are stored in
//! raw encoder steps; the degree scale uses half the encoder resolution per
//! 180 degrees, so a full revolution spans [-180, 180).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Calibration parameters for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    /// Offset in raw encoder steps, added after optional inversion
    pub homing_offset: i32,
    /// Whether the joint rotates against the encoder's positive direction
    pub inverted: bool,
}

impl CalibrationEntry {
    /// Raw encoder counts to calibrated degrees
    pub fn apply(&self, raw: i32, resolution: u32) -> f64 {
        let after_offset = if self.inverted {
            -raw + self.homing_offset
        } else {
            raw + self.homing_offset
        };
        f64::from(after_offset) / (f64::from(resolution) / 2.0) * 180.0
    }

    /// Calibrated degrees back to raw encoder counts
    pub fn revert(&self, degrees: f64, resolution: u32) -> i32 {
        let steps = (degrees / 180.0 * (f64::from(resolution) / 2.0)).round() as i32;
        let raw = steps - self.homing_offset;
        if self.inverted {
            -raw
        } else {
            raw
        }
    }
}

/// Calibration for every motor of every arm, persisted as TOML.
///
/// Keyed by arm role ("leader", "follower") and then by motor name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationSet {
    arms: BTreeMap<String, BTreeMap<String, CalibrationEntry>>,
}

impl CalibrationSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for one arm role, if calibrated
    pub fn arm(&self, role: &str) -> Option<&BTreeMap<String, CalibrationEntry>> {
        self.arms.get(role)
    }

    /// Replace the entries for one arm role
    pub fn set_arm(&mut self, role: &str, entries: BTreeMap<String, CalibrationEntry>) {
        self.arms.insert(role.to_string(), entries);
    }

    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Calibration(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Calibration(format!("failed to parse calibration: {}", e)))
    }

    /// Save to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Calibration(format!("failed to serialize calibration: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        log::info!("Saved calibration to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_apply_zero_offset() {
        let entry = CalibrationEntry {
            homing_offset: 0,
            inverted: false,
        };
        assert_relative_eq!(entry.apply(0, 4096), 0.0);
        assert_relative_eq!(entry.apply(1024, 4096), 90.0);
        assert_relative_eq!(entry.apply(-2048, 4096), -180.0);
    }

    #[test]
    fn test_apply_inverted() {
        let entry = CalibrationEntry {
            homing_offset: 0,
            inverted: true,
        };
        assert_relative_eq!(entry.apply(1024, 4096), -90.0);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let step_degrees = 180.0 / 2048.0;
        for &(offset, inverted) in &[(0, false), (512, false), (-300, true), (2048, true)] {
            let entry = CalibrationEntry {
                homing_offset: offset,
                inverted,
            };
            for raw in [-2048, -1, 0, 1, 777, 2047] {
                let degrees = entry.apply(raw, 4096);
                assert_eq!(entry.revert(degrees, 4096), raw);
                // and the degree round trip stays within one encoder step
                let back = entry.apply(entry.revert(degrees, 4096), 4096);
                assert!((back - degrees).abs() <= step_degrees);
            }
        }
    }

    #[test]
    fn test_file_round_trip() {
        let mut set = CalibrationSet::new();
        let mut entries = BTreeMap::new();
        entries.insert(
            "shoulder_pan".to_string(),
            CalibrationEntry {
                homing_offset: -1024,
                inverted: true,
            },
        );
        entries.insert(
            "gripper".to_string(),
            CalibrationEntry {
                homing_offset: 37,
                inverted: false,
            },
        );
        set.set_arm("follower", entries);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.toml");
        set.to_file(&path).unwrap();

        let loaded = CalibrationSet::from_file(&path).unwrap();
        let arm = loaded.arm("follower").unwrap();
        assert_eq!(arm.len(), 2);
        assert_eq!(
            arm["shoulder_pan"],
            CalibrationEntry {
                homing_offset: -1024,
                inverted: true
            }
        );
        assert!(loaded.arm("leader").is_none());
    }

    #[test]
    fn test_corrupt_file_is_calibration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        match CalibrationSet::from_file(&path) {
            Err(Error::Calibration(_)) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
