//! Application configuration, loaded from TOML.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a teleoperation rig
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Leader arm serial port; empty means no leader (IK control)
    #[serde(default = "default_leader_port")]
    pub leader_port: String,

    /// Follower arm serial port
    #[serde(default = "default_follower_port")]
    pub follower_port: String,

    /// Serial baud rate for both buses
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Control loop rate, Hz
    #[serde(default = "default_control_hz")]
    pub control_hz: u32,

    /// Recording rate, frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Writer threads in the save pool
    #[serde(default = "default_save_workers")]
    pub save_workers: usize,

    /// Where calibration is persisted
    #[serde(default = "default_calibration_file")]
    pub calibration_file: PathBuf,

    /// Directory episode files land in
    #[serde(default = "default_episode_dir")]
    pub episode_dir: PathBuf,
}

fn default_leader_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_follower_port() -> String {
    "/dev/ttyACM1".to_string()
}

fn default_baud() -> u32 {
    1_000_000
}

fn default_control_hz() -> u32 {
    100
}

fn default_fps() -> u32 {
    30
}

fn default_save_workers() -> usize {
    2
}

fn default_calibration_file() -> PathBuf {
    PathBuf::from("calibration.toml")
}

fn default_episode_dir() -> PathBuf {
    PathBuf::from("episodes")
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            leader_port: default_leader_port(),
            follower_port: default_follower_port(),
            baud: default_baud(),
            control_hz: default_control_hz(),
            fps: default_fps(),
            save_workers: default_save_workers(),
            calibration_file: default_calibration_file(),
            episode_dir: default_episode_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Connection(format!(
                "failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::InvalidParameter(format!("failed to parse config: {}", e)))
    }

    /// Write configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidParameter(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.control_hz, 100);
        assert_eq!(config.fps, 30);
        assert_eq!(config.baud, 1_000_000);
        assert_eq!(config.save_workers, 2);
    }

    #[test]
    fn test_round_trip() {
        let mut config = AppConfig::default();
        config.follower_port = "/dev/ttyUSB7".to_string();
        config.fps = 60;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.follower_port, "/dev/ttyUSB7");
        assert_eq!(loaded.fps, 60);
        assert_eq!(loaded.control_hz, 100);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fps = 15\n").unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.fps, 15);
        assert_eq!(loaded.control_hz, 100);
        assert_eq!(loaded.leader_port, "/dev/ttyACM0");
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::from_file("/nonexistent/config.toml").is_err());
    }
}
