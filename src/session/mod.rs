//! Teleoperation sessions: the dual-loop scheduler, episode recording and
//! non-blocking persistence.

pub mod episode;
pub mod episode_file;
pub mod input;
pub mod save_worker;
pub mod scheduler;

pub use episode::Episode;
pub use input::{InputDevice, InputState, ScriptedInput};
pub use save_worker::SaveWorker;
pub use scheduler::{
    record, CartesianController, Controller, LeaderFollower, RecordingOutcome, SchedulerConfig,
};

use crate::arm::ArmPair;
use crate::error::{Error, Result};
use crate::kinematics::{IkConfig, KinematicChain};
use crate::motor::calibrate::CalibrationPrompt;
use crate::sensors::{Sensor, SensorWorker};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Teleoperating,
    Recording,
    Disconnected,
}

/// Counters from one recorded episode; the episode itself is already on
/// its way to disk.
#[derive(Debug, Clone, Copy)]
pub struct RecordingSummary {
    pub frames: usize,
    pub skipped_frames: u64,
    pub control_overruns: u64,
    pub control_steps: u64,
    pub step_failures: u64,
    pub dropped_observations: u64,
}

/// One arm pair, its sensors and a save worker pool, driven through a
/// connect / teleoperate / record / disconnect lifecycle.
pub struct TeleopSession {
    /// `None` while a controller owns the pair, or after a wedged control
    /// thread had to be abandoned with the pair still inside it
    pair: Option<ArmPair>,
    sensors: Vec<SensorWorker>,
    save_worker: Option<SaveWorker>,
    scheduler: SchedulerConfig,
    state: SessionState,
    cancel: Arc<AtomicBool>,
}

impl TeleopSession {
    pub fn new(pair: ArmPair, scheduler: SchedulerConfig, save_workers: usize) -> Result<Self> {
        Ok(TeleopSession {
            pair: Some(pair),
            sensors: Vec::new(),
            save_worker: Some(SaveWorker::new(save_workers)?),
            scheduler,
            state: SessionState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Flag observed by every loop in the session; set it from a signal
    /// handler or another thread to stop whatever is running
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Attach a sensor; its capture thread starts immediately
    pub fn add_sensor(&mut self, sensor: Box<dyn Sensor>) -> Result<()> {
        if matches!(self.state, SessionState::Teleoperating | SessionState::Recording) {
            return Err(Error::InvalidParameter(
                "cannot attach sensors while a loop is running".to_string(),
            ));
        }
        self.sensors.push(SensorWorker::spawn(sensor)?);
        Ok(())
    }

    /// Open the arms. `Idle -> Connected`.
    pub fn connect(&mut self, prompt: &mut dyn CalibrationPrompt) -> Result<()> {
        self.expect_state(SessionState::Idle, "connect")?;
        self.pair_mut()?.connect(prompt)?;
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Run plain teleoperation (no recording) for `duration`.
    /// `Connected -> Teleoperating -> Connected`.
    pub fn teleoperate(&mut self, duration: Duration) -> Result<u64> {
        self.expect_state(SessionState::Connected, "teleoperate")?;
        self.state = SessionState::Teleoperating;

        let period = Duration::from_secs_f64(1.0 / f64::from(self.scheduler.control_hz));
        let cancel = self.cancel.clone();
        let pair = match self.pair_mut() {
            Ok(pair) => pair,
            Err(e) => {
                self.state = SessionState::Connected;
                return Err(e);
            }
        };
        let deadline = Instant::now() + duration;
        let mut steps = 0u64;
        let mut failures = 0u64;
        while Instant::now() < deadline && !cancel.load(Ordering::Relaxed) {
            let tick_start = Instant::now();
            match pair.teleop_step() {
                Ok(_) => steps += 1,
                Err(e) => {
                    failures += 1;
                    if failures == 1 || failures % 100 == 0 {
                        log::warn!("Teleop step failed ({} so far): {}", failures, e);
                    }
                }
            }
            let elapsed = tick_start.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }

        self.state = SessionState::Connected;
        Ok(steps)
    }

    /// Record one leader-driven episode and queue it for saving.
    /// `Connected -> Recording -> Connected`.
    pub fn record_episode(&mut self, max_frames: usize, path: &Path) -> Result<RecordingSummary> {
        self.expect_state(SessionState::Connected, "record")?;
        let config = SchedulerConfig {
            max_frames,
            ..self.scheduler
        };
        config.validate()?;

        let pair = self.take_pair()?;
        self.state = SessionState::Recording;
        let controller = Box::new(LeaderFollower::new(pair));
        let outcome = record(controller, &self.sensors, &config, self.cancel.as_ref());
        self.state = SessionState::Connected;
        let mut outcome = outcome?;
        self.recover_pair(&mut outcome);

        self.finish_recording(outcome, path)
    }

    /// Record one episode driven by a pointing device through IK.
    pub fn record_episode_cartesian(
        &mut self,
        chain: KinematicChain,
        ik: IkConfig,
        input: Box<dyn InputDevice>,
        deadzone: f64,
        max_frames: usize,
        path: &Path,
    ) -> Result<RecordingSummary> {
        self.expect_state(SessionState::Connected, "record")?;
        let config = SchedulerConfig {
            max_frames,
            ..self.scheduler
        };
        config.validate()?;

        let pair = self.take_pair()?;
        self.state = SessionState::Recording;
        let controller = Box::new(CartesianController::new(pair, chain, ik, input, deadzone));
        let outcome = record(controller, &self.sensors, &config, self.cancel.as_ref());
        self.state = SessionState::Connected;
        let mut outcome = outcome?;
        self.recover_pair(&mut outcome);

        self.finish_recording(outcome, path)
    }

    fn pair_mut(&mut self) -> Result<&mut ArmPair> {
        self.pair
            .as_mut()
            .ok_or_else(|| Error::Connection("arm pair lost; reconnect required".to_string()))
    }

    fn take_pair(&mut self) -> Result<ArmPair> {
        self.pair
            .take()
            .ok_or_else(|| Error::Connection("arm pair lost; reconnect required".to_string()))
    }

    /// Put the arm pair back after a recording. An abandoned control
    /// thread keeps the pair; the session then needs a fresh connect.
    fn recover_pair(&mut self, outcome: &mut RecordingOutcome) {
        match outcome.controller.take().and_then(|c| c.into_pair()) {
            Some(pair) => self.pair = Some(pair),
            None => {
                log::error!("Arm pair lost with the abandoned control thread; reconnect required")
            }
        }
    }

    fn finish_recording(&self, outcome: RecordingOutcome, path: &Path) -> Result<RecordingSummary> {
        let summary = RecordingSummary {
            frames: outcome.episode.frame_count(),
            skipped_frames: outcome.skipped_frames,
            control_overruns: outcome.control_overruns,
            control_steps: outcome.control_steps,
            step_failures: outcome.step_failures,
            dropped_observations: outcome.dropped_observations,
        };
        let worker = self
            .save_worker
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("session already disconnected".to_string()))?;
        worker.enqueue(PathBuf::from(path), outcome.episode)?;
        log::info!(
            "Recorded {} frames ({} control steps, {} skipped, {} dropped)",
            summary.frames,
            summary.control_steps,
            summary.skipped_frames,
            summary.dropped_observations
        );
        Ok(summary)
    }

    /// Stop the sensors, release the arms and drain the save queue.
    /// Terminal; every queued episode is on disk when this returns.
    pub fn disconnect(&mut self) {
        for worker in self.sensors.drain(..) {
            worker.stop();
        }
        if let Some(pair) = self.pair.as_mut() {
            pair.disconnect();
        }
        if let Some(worker) = self.save_worker.take() {
            worker.shutdown();
        }
        self.state = SessionState::Disconnected;
    }

    fn expect_state(&self, want: SessionState, operation: &str) -> Result<()> {
        if self.state != want {
            return Err(Error::InvalidParameter(format!(
                "cannot {} in state {:?}",
                operation, self.state
            )));
        }
        Ok(())
    }
}

impl Drop for TeleopSession {
    fn drop(&mut self) {
        if self.state != SessionState::Disconnected {
            self.disconnect();
        }
    }
}
