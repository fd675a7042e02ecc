//! Free-running sensor capture thread.

use super::{Frame, LatestFrame, Sensor};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long shutdown waits for the capture thread before abandoning it
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs a sensor's blocking `read` on a dedicated thread and publishes
/// every frame into a [`LatestFrame`] slot. The capture loop then samples
/// the slot at its own rate without ever blocking on the device.
pub struct SensorWorker {
    name: String,
    kind: super::FrameKind,
    shape: Vec<usize>,
    latest: Arc<LatestFrame>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorWorker {
    /// Connect the sensor and start its capture thread
    pub fn spawn(mut sensor: Box<dyn Sensor>) -> Result<Self> {
        sensor.connect()?;
        let name = sensor.name().to_string();
        let (kind, shape) = sensor.frame_shape();
        let latest = Arc::new(LatestFrame::new());
        let stop = Arc::new(AtomicBool::new(false));

        let thread_latest = latest.clone();
        let thread_stop = stop.clone();
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("sensor-{}", name))
            .spawn(move || {
                let mut failures = 0u32;
                while !thread_stop.load(Ordering::Relaxed) {
                    match sensor.read() {
                        Ok(frame) => {
                            failures = 0;
                            thread_latest.publish(frame);
                        }
                        Err(e) => {
                            failures += 1;
                            if failures == 1 || failures % 100 == 0 {
                                log::warn!(
                                    "Sensor '{}' read failed ({} in a row): {}",
                                    thread_name,
                                    failures,
                                    e
                                );
                            }
                            // Back off so a dead device does not spin the CPU
                            std::thread::sleep(Duration::from_millis(10));
                        }
                    }
                }
                if let Err(e) = sensor.disconnect() {
                    log::warn!("Sensor '{}' disconnect failed: {}", thread_name, e);
                }
            })
            .map_err(|e| Error::Connection(format!("failed to spawn sensor thread: {}", e)))?;

        log::info!("Sensor worker '{}' started", name);
        Ok(SensorWorker {
            name,
            kind,
            shape,
            latest,
            stop,
            handle: Some(handle),
        })
    }

    /// Sensor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind and shape of the frames this worker publishes
    pub fn frame_shape(&self) -> (super::FrameKind, &[usize]) {
        (self.kind, &self.shape)
    }

    /// Newest frame within `timeout`, or `Error::Timeout`
    pub fn async_read(&self, timeout: Duration) -> Result<Frame> {
        self.latest
            .take(timeout)
            .ok_or(Error::Timeout("sensor frame"))
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return;
        };
        // The thread may be parked in a blocking device read; wait a bounded
        // time, then abandon it rather than hang the caller
        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if !handle.is_finished() {
            log::warn!(
                "Sensor worker '{}' did not stop within {:?}, abandoning it",
                self.name,
                JOIN_TIMEOUT
            );
            return;
        }
        if handle.join().is_err() {
            log::warn!("Sensor worker '{}' panicked", self.name);
        } else {
            log::info!("Sensor worker '{}' stopped", self.name);
        }
    }
}

impl Drop for SensorWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
