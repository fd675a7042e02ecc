//! Sensor capture: trait, frames, the single-slot latest buffer and the
//! free-running capture worker.

mod latest;
mod worker;

pub use latest::LatestFrame;
pub use worker::SensorWorker;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a frame contains; decides where it lands in an episode file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    /// Image data, shape `[channels, height, width]`
    Camera,
    /// Tactile array, shape `[channels, rows, cols]`
    Tactile,
}

/// One dense sensor sample. Opaque to everything but the episode writer;
/// frames of equal shape stack along the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Frame {
    /// All-zero placeholder with the given shape, used when a capture
    /// misses its deadline
    pub fn zeros(kind: FrameKind, shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Frame {
            kind,
            shape: shape.to_vec(),
            data: vec![0.0; len],
        }
    }

    /// Element count implied by the shape
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the frame holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A capture device. Implementations block in `read`; `async_read` bounds
/// the wait and fails with `Error::Timeout` when the budget expires.
pub trait Sensor: Send {
    /// Stable name, used for episode dataset paths and thread names
    fn name(&self) -> &str;

    /// Shape of every frame this sensor produces
    fn frame_shape(&self) -> (FrameKind, Vec<usize>);

    fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Block until the next frame
    fn read(&mut self) -> Result<Frame>;

    /// Wait at most `timeout` for the next frame
    fn async_read(&mut self, timeout: Duration) -> Result<Frame>;
}

/// Deterministic in-process sensor for tests and bench rigs.
///
/// Produces frames whose every element equals the frame counter, after an
/// optional artificial capture latency.
pub struct MockSensor {
    name: String,
    kind: FrameKind,
    shape: Vec<usize>,
    latency: Duration,
    connected: bool,
    counter: u32,
}

impl MockSensor {
    pub fn new(name: &str, kind: FrameKind, shape: &[usize]) -> Self {
        MockSensor {
            name: name.to_string(),
            kind,
            shape: shape.to_vec(),
            latency: Duration::ZERO,
            connected: false,
            counter: 0,
        }
    }

    /// Simulate a slow device
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Frames produced so far
    pub fn frames_produced(&self) -> u32 {
        self.counter
    }
}

impl Sensor for MockSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_shape(&self) -> (FrameKind, Vec<usize>) {
        (self.kind, self.shape.clone())
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(Error::Connection(format!("sensor '{}' not connected", self.name)));
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        self.counter += 1;
        let len: usize = self.shape.iter().product();
        Ok(Frame {
            kind: self.kind,
            shape: self.shape.clone(),
            data: vec![self.counter as f32; len],
        })
    }

    fn async_read(&mut self, timeout: Duration) -> Result<Frame> {
        if self.latency > timeout {
            return Err(Error::Timeout("sensor frame"));
        }
        self.read()
    }
}
