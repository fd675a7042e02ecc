//! Single-slot frame buffer.

use super::Frame;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Holds at most one frame; a newer publish replaces the old one.
///
/// History is discarded deliberately: the capture loop only ever wants the
/// freshest frame, and an unbounded buffer would let a slow consumer fall
/// arbitrarily far behind the device.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Frame>>,
    available: Condvar,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents and wake one waiter
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.slot.lock();
        *slot = Some(frame);
        self.available.notify_one();
    }

    /// Take the current frame, waiting up to `timeout` for one to arrive.
    /// Returns `None` on expiry.
    pub fn take(&self, timeout: Duration) -> Option<Frame> {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            self.available.wait_for(&mut slot, timeout);
        }
        slot.take()
    }

    /// Take the current frame without waiting
    pub fn try_take(&self) -> Option<Frame> {
        self.slot.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::FrameKind;
    use std::sync::Arc;

    fn frame(value: f32) -> Frame {
        Frame {
            kind: FrameKind::Camera,
            shape: vec![1],
            data: vec![value],
        }
    }

    #[test]
    fn test_newer_publish_wins() {
        let latest = LatestFrame::new();
        latest.publish(frame(1.0));
        latest.publish(frame(2.0));
        assert_eq!(latest.try_take().unwrap().data, vec![2.0]);
        assert!(latest.try_take().is_none());
    }

    #[test]
    fn test_take_waits_for_publisher() {
        let latest = Arc::new(LatestFrame::new());
        let publisher = latest.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            publisher.publish(frame(7.0));
        });
        let taken = latest.take(Duration::from_millis(500));
        handle.join().unwrap();
        assert_eq!(taken.unwrap().data, vec![7.0]);
    }

    #[test]
    fn test_take_times_out_empty() {
        let latest = LatestFrame::new();
        assert!(latest.take(Duration::from_millis(5)).is_none());
    }
}
