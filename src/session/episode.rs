//! In-memory episode record.

use crate::arm::ArmObservation;
use crate::sensors::{Frame, FrameKind};
use std::collections::BTreeMap;

/// One sensor's frames over an episode. A `None` marks a capture that
/// missed its deadline; it becomes a zero frame on disk.
#[derive(Debug, Clone)]
pub struct SensorTrack {
    pub kind: FrameKind,
    pub shape: Vec<usize>,
    pub frames: Vec<Option<Frame>>,
}

/// Frame-indexed recording of one session.
///
/// Owned by the capture loop while recording, then handed to the save
/// worker by value and never touched again.
#[derive(Debug, Clone, Default)]
pub struct Episode {
    /// Joint column order for the arm rows
    pub joint_names: Vec<String>,
    /// Leader joint positions, degrees, frame by joint. Empty when the
    /// session has no leader arm.
    pub leader: Vec<Vec<f32>>,
    /// Follower joint positions, degrees, frame by joint
    pub follower: Vec<Vec<f32>>,
    /// Sensor tracks keyed by sensor name
    pub sensors: BTreeMap<String, SensorTrack>,
}

impl Episode {
    /// Empty episode; joint order fixes itself on the first frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a sensor track up front so every frame index lines up even
    /// if the first captures time out
    pub fn add_sensor(&mut self, name: &str, kind: FrameKind, shape: Vec<usize>) {
        self.sensors.insert(
            name.to_string(),
            SensorTrack {
                kind,
                shape,
                frames: Vec::new(),
            },
        );
    }

    /// Append one frame. Sensor frames must cover every declared track
    /// (use `None` for a missed capture).
    pub fn push_frame(
        &mut self,
        observation: &ArmObservation,
        sensor_frames: BTreeMap<String, Option<Frame>>,
    ) {
        if self.joint_names.is_empty() {
            self.joint_names = observation.follower.keys().cloned().collect();
        }
        if !observation.leader.is_empty() {
            let row = self.row(&observation.leader);
            self.leader.push(row);
        }
        let row = self.row(&observation.follower);
        self.follower.push(row);
        for (name, track) in &mut self.sensors {
            let frame = sensor_frames.get(name).cloned().flatten();
            track.frames.push(frame);
        }
    }

    /// Number of frames recorded so far
    pub fn frame_count(&self) -> usize {
        self.follower.len()
    }

    fn row(&self, positions: &BTreeMap<String, f64>) -> Vec<f32> {
        self.joint_names
            .iter()
            .map(|name| positions.get(name).copied().unwrap_or(f64::NAN) as f32)
            .collect()
    }
}
