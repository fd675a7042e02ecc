//! Dual-loop recording scheduler.
//!
//! The control loop runs on its own thread at `control_hz`, stepping the
//! controller and pushing observations into a bounded channel with
//! `try_send`; a full channel drops the observation rather than stall the
//! loop. The capture loop runs on the caller's thread at `fps`, drains the
//! channel to the newest observation, samples every sensor with a bounded
//! budget, and appends to the episode. Sensor timeouts and controller
//! hiccups degrade the recording instead of aborting it.

use super::episode::Episode;
use crate::arm::{ArmObservation, ArmPair};
use crate::error::{Error, Result};
use crate::kinematics::{solve_ik, IkConfig, KinematicChain};
use crate::sensors::SensorWorker;
use crate::session::input::{apply_deadzone, InputDevice};
use crossbeam_channel::{bounded, RecvTimeoutError, TrySendError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Produces one observation per control tick.
///
/// Controllers own the arm pair for the duration of a recording so the
/// control thread can be abandoned if it wedges; `into_pair` hands the
/// pair back once the thread has actually finished.
pub trait Controller: Send {
    fn step(&mut self) -> Result<ArmObservation>;

    /// Recover the arm pair after the loop exits. Controllers that do not
    /// own one return `None`.
    fn into_pair(self: Box<Self>) -> Option<ArmPair> {
        None
    }
}

/// Classic teleoperation: the leader arm drives the follower
pub struct LeaderFollower {
    pair: ArmPair,
}

impl LeaderFollower {
    pub fn new(pair: ArmPair) -> Self {
        LeaderFollower { pair }
    }
}

impl Controller for LeaderFollower {
    fn step(&mut self) -> Result<ArmObservation> {
        self.pair.teleop_step()
    }

    fn into_pair(self: Box<Self>) -> Option<ArmPair> {
        Some(self.pair)
    }
}

/// Pointing-device control: pose deltas integrate into a target pose,
/// inverse kinematics turns the target into follower goals.
pub struct CartesianController {
    pair: ArmPair,
    chain: KinematicChain,
    ik: IkConfig,
    input: Box<dyn InputDevice>,
    deadzone: f64,
    /// Degrees the gripper moves per tick while a button is held
    gripper_step: f64,
    target: Option<[f64; 5]>,
    current_q: Vec<f64>,
    gripper_goal: f64,
}

impl CartesianController {
    pub fn new(
        pair: ArmPair,
        chain: KinematicChain,
        ik: IkConfig,
        input: Box<dyn InputDevice>,
        deadzone: f64,
    ) -> Self {
        CartesianController {
            pair,
            chain,
            ik,
            input,
            deadzone,
            gripper_step: 2.0,
            target: None,
            current_q: Vec::new(),
            gripper_goal: 0.0,
        }
    }

    /// Seed the target pose and joint state from where the arm actually is
    fn initialize(&mut self, positions: &BTreeMap<String, f64>) -> Result<[f64; 5]> {
        let q: Vec<f64> = self
            .chain
            .joint_names()
            .iter()
            .map(|name| positions.get(*name).copied().unwrap_or(0.0).to_radians())
            .collect();
        let pose = self.chain.forward_kinematics(&q)?;
        self.gripper_goal = positions.get("gripper").copied().unwrap_or(0.0);
        self.current_q = q;
        Ok(pose)
    }
}

impl Controller for CartesianController {
    fn step(&mut self) -> Result<ArmObservation> {
        let follower = self.pair.read_follower_positions()?;
        let mut target = match self.target {
            Some(target) => target,
            None => self.initialize(&follower)?,
        };

        let state = apply_deadzone(self.input.poll()?, self.deadzone);
        for (axis, delta) in target.iter_mut().zip(state.delta) {
            *axis += delta;
        }
        self.target = Some(target);

        let result = solve_ik(&self.chain, &target, &self.current_q, &self.ik)?;
        if !result.converged {
            log::debug!(
                "IK did not converge (pos err {:.4}, ori err {:.4}), commanding best effort",
                result.position_error,
                result.orientation_error
            );
        }
        self.current_q = result.joint_angles;

        if state.gripper_open {
            self.gripper_goal += self.gripper_step;
        }
        if state.gripper_close {
            self.gripper_goal -= self.gripper_step;
        }

        let mut goals: BTreeMap<String, f64> = self
            .chain
            .joint_names()
            .iter()
            .zip(&self.current_q)
            .map(|(name, q)| (name.to_string(), q.to_degrees()))
            .collect();
        if follower.contains_key("gripper") {
            goals.insert("gripper".to_string(), self.gripper_goal);
        }
        self.pair.write_follower_goals(&goals)?;

        Ok(ArmObservation {
            leader: BTreeMap::new(),
            follower,
        })
    }

    fn into_pair(self: Box<Self>) -> Option<ArmPair> {
        Some(self.pair)
    }
}

/// Recording parameters
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Control loop rate, Hz
    pub control_hz: u32,
    /// Capture rate, frames per second; must not exceed `control_hz`
    pub fps: u32,
    /// Frames to record
    pub max_frames: usize,
    /// How long to wait for the control thread on shutdown
    pub join_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            control_hz: 100,
            fps: 30,
            max_frames: 0,
            join_timeout: Duration::from_secs(2),
        }
    }
}

impl SchedulerConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.control_hz == 0 || self.fps == 0 {
            return Err(Error::InvalidParameter(
                "control_hz and fps must be positive".to_string(),
            ));
        }
        if self.fps > self.control_hz {
            return Err(Error::InvalidParameter(format!(
                "fps {} exceeds control rate {}",
                self.fps, self.control_hz
            )));
        }
        Ok(())
    }

    /// Observation queue depth: two frames worth of control ticks,
    /// never less than 2
    fn queue_capacity(&self) -> usize {
        ((2 * self.control_hz / self.fps) as usize).max(2)
    }
}

/// What a recording produced, with its degradation counters
pub struct RecordingOutcome {
    pub episode: Episode,
    /// The controller, handed back by the control thread. `None` if the
    /// thread had to be abandoned; the arm pair inside it is then lost.
    pub controller: Option<Box<dyn Controller>>,
    /// Capture frames whose budget overran (no catch-up was attempted)
    pub skipped_frames: u64,
    /// Control ticks that missed their period
    pub control_overruns: u64,
    /// Control steps executed
    pub control_steps: u64,
    /// Control steps that returned an error
    pub step_failures: u64,
    /// Observations dropped because the queue was full
    pub dropped_observations: u64,
}

#[derive(Default)]
struct ControlStats {
    steps: AtomicU64,
    failures: AtomicU64,
    overruns: AtomicU64,
    dropped: AtomicU64,
}

/// Run the control loop until `stop` is set, pushing observations into
/// `tx` without ever blocking on it. Returns the controller so its arm
/// pair can be recovered.
fn run_control_loop(
    mut controller: Box<dyn Controller>,
    tx: crossbeam_channel::Sender<ArmObservation>,
    stop: Arc<AtomicBool>,
    period: Duration,
    stats: Arc<ControlStats>,
) -> Box<dyn Controller> {
    let mut next_tick = Instant::now() + period;
    while !stop.load(Ordering::Relaxed) {
        match controller.step() {
            Ok(observation) => {
                stats.steps.fetch_add(1, Ordering::Relaxed);
                match tx.try_send(observation) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Err(e) => {
                let failures = stats.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures == 1 || failures % 100 == 0 {
                    log::warn!("Controller step failed ({} so far): {}", failures, e);
                }
            }
        }
        let now = Instant::now();
        if now < next_tick {
            std::thread::sleep(next_tick - now);
            next_tick += period;
        } else {
            stats.overruns.fetch_add(1, Ordering::Relaxed);
            next_tick = now + period;
        }
    }
    controller
}

/// Record `config.max_frames` frames, driving the controller at
/// `control_hz` and capturing at `fps`.
///
/// The call returns when the frame budget is met or `cancel` is set. The
/// control thread is asked to stop and waited on for `join_timeout`; a
/// thread that fails to stop in time is logged and abandoned, never
/// joined, so a wedged controller cannot block the caller. The abandoned
/// thread keeps the controller (and its arm pair) with it.
pub fn record(
    controller: Box<dyn Controller>,
    sensors: &[SensorWorker],
    config: &SchedulerConfig,
    cancel: &AtomicBool,
) -> Result<RecordingOutcome> {
    config.validate()?;

    let control_period = Duration::from_secs_f64(1.0 / f64::from(config.control_hz));
    let frame_period = Duration::from_secs_f64(1.0 / f64::from(config.fps));
    let sensor_budget = frame_period / 2;

    let (tx, rx) = bounded::<ArmObservation>(config.queue_capacity());
    let stop = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(ControlStats::default());

    let mut episode = Episode::new();
    for worker in sensors {
        let (kind, shape) = worker.frame_shape();
        episode.add_sensor(worker.name(), kind, shape.to_vec());
    }
    let mut skipped_frames = 0u64;

    let control_thread = std::thread::Builder::new()
        .name("control-loop".to_string())
        .spawn({
            let stop = stop.clone();
            let stats = stats.clone();
            move || run_control_loop(controller, tx, stop, control_period, stats)
        })
        .map_err(|e| Error::Connection(format!("failed to spawn control thread: {}", e)))?;

    let mut frame_index = 0usize;
    while frame_index < config.max_frames && !cancel.load(Ordering::Relaxed) {
        let frame_deadline = Instant::now() + frame_period;

        let observation = match rx.recv_timeout(frame_period) {
            Ok(mut observation) => {
                // Drain to the newest; stale observations are useless
                while let Ok(newer) = rx.try_recv() {
                    observation = newer;
                }
                observation
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "No observation within {:?} at frame {}, retrying",
                    frame_period,
                    frame_index
                );
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut frames = BTreeMap::new();
        for worker in sensors {
            let frame = match worker.async_read(sensor_budget) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    log::debug!(
                        "Sensor '{}' missed frame {}: {}",
                        worker.name(),
                        frame_index,
                        e
                    );
                    None
                }
            };
            frames.insert(worker.name().to_string(), frame);
        }

        episode.push_frame(&observation, frames);
        frame_index += 1;

        let now = Instant::now();
        if now < frame_deadline {
            std::thread::sleep(frame_deadline - now);
        } else if frame_index < config.max_frames {
            skipped_frames += 1;
        }
    }

    stop.store(true, Ordering::Relaxed);
    let join_deadline = Instant::now() + config.join_timeout;
    while !control_thread.is_finished() && Instant::now() < join_deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    let controller = if control_thread.is_finished() {
        match control_thread.join() {
            Ok(controller) => Some(controller),
            Err(_) => {
                log::warn!("Control thread panicked");
                None
            }
        }
    } else {
        log::warn!(
            "Control thread did not stop within {:?}, abandoning it",
            config.join_timeout
        );
        None
    };

    Ok(RecordingOutcome {
        episode,
        controller,
        skipped_frames,
        control_overruns: stats.overruns.load(Ordering::Relaxed),
        control_steps: stats.steps.load(Ordering::Relaxed),
        step_failures: stats.failures.load(Ordering::Relaxed),
        dropped_observations: stats.dropped.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeController {
        counter: u64,
        fail_every: Option<u64>,
    }

    impl FakeController {
        fn new() -> Self {
            FakeController {
                counter: 0,
                fail_every: None,
            }
        }
    }

    impl Controller for FakeController {
        fn step(&mut self) -> Result<ArmObservation> {
            self.counter += 1;
            if let Some(n) = self.fail_every {
                if self.counter % n == 0 {
                    return Err(Error::Timeout("synthetic fault"));
                }
            }
            let mut follower = BTreeMap::new();
            follower.insert("j1".to_string(), self.counter as f64);
            Ok(ArmObservation {
                leader: BTreeMap::new(),
                follower,
            })
        }
    }

    #[test]
    fn test_control_loop_never_blocks_on_full_queue() {
        // Nobody drains the channel; the loop must keep stepping and exit
        // promptly when told to stop.
        let (tx, rx) = bounded::<ArmObservation>(2);
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ControlStats::default());

        let handle = std::thread::spawn({
            let stop = stop.clone();
            let stats = stats.clone();
            move || {
                run_control_loop(
                    Box::new(FakeController::new()),
                    tx,
                    stop,
                    Duration::from_millis(1),
                    stats,
                )
            }
        });
        std::thread::sleep(Duration::from_millis(100));
        stop.store(true, Ordering::Relaxed);
        let stopped_at = Instant::now();
        handle.join().unwrap();
        assert!(stopped_at.elapsed() < Duration::from_millis(100));

        let steps = stats.steps.load(Ordering::Relaxed);
        assert!(steps > 10, "only {} steps", steps);
        assert!(stats.dropped.load(Ordering::Relaxed) >= steps - 2);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_wedged_controller_is_abandoned_after_join_timeout() {
        // A controller stuck in a long blocking step must not hold the
        // caller past the join timeout.
        struct StuckController;
        impl Controller for StuckController {
            fn step(&mut self) -> Result<ArmObservation> {
                std::thread::sleep(Duration::from_secs(5));
                Ok(ArmObservation::default())
            }
        }

        let config = SchedulerConfig {
            control_hz: 100,
            fps: 20,
            max_frames: 1_000_000,
            join_timeout: Duration::from_millis(200),
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::Relaxed);
        });

        let start = Instant::now();
        let outcome = record(Box::new(StuckController), &[], &config, &cancel).unwrap();
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "record blocked for {:?}",
            start.elapsed()
        );
        // The thread was abandoned, so the controller never came back
        assert!(outcome.controller.is_none());
    }

    #[test]
    fn test_record_produces_exact_frame_count() {
        let config = SchedulerConfig {
            control_hz: 200,
            fps: 50,
            max_frames: 10,
            join_timeout: Duration::from_secs(1),
        };
        let cancel = AtomicBool::new(false);
        let outcome = record(Box::new(FakeController::new()), &[], &config, &cancel).unwrap();
        assert_eq!(outcome.episode.frame_count(), 10);
        assert!(outcome.control_steps >= 10);
        // The thread exited cleanly, so the controller came back
        assert!(outcome.controller.is_some());
    }

    #[test]
    fn test_step_failures_do_not_abort_recording() {
        let mut controller = FakeController::new();
        controller.fail_every = Some(3);
        let config = SchedulerConfig {
            control_hz: 200,
            fps: 50,
            max_frames: 5,
            join_timeout: Duration::from_secs(1),
        };
        let cancel = AtomicBool::new(false);
        let outcome = record(Box::new(controller), &[], &config, &cancel).unwrap();
        assert_eq!(outcome.episode.frame_count(), 5);
        assert!(outcome.step_failures > 0);
    }

    #[test]
    fn test_cancel_stops_early() {
        let config = SchedulerConfig {
            control_hz: 100,
            fps: 20,
            max_frames: 1_000_000,
            join_timeout: Duration::from_secs(1),
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            flag.store(true, Ordering::Relaxed);
        });
        let outcome = record(Box::new(FakeController::new()), &[], &config, &cancel).unwrap();
        assert!(outcome.episode.frame_count() < 1_000_000);
    }

    #[test]
    fn test_fps_must_not_exceed_control_rate() {
        let config = SchedulerConfig {
            control_hz: 10,
            fps: 30,
            max_frames: 1,
            join_timeout: Duration::from_secs(1),
        };
        let cancel = AtomicBool::new(false);
        assert!(record(Box::new(FakeController::new()), &[], &config, &cancel).is_err());
    }

    #[test]
    fn test_queue_capacity_floor() {
        let config = SchedulerConfig {
            control_hz: 30,
            fps: 30,
            max_frames: 1,
            join_timeout: Duration::from_secs(1),
        };
        assert_eq!(config.queue_capacity(), 2);
        let config = SchedulerConfig {
            control_hz: 100,
            fps: 30,
            ..config
        };
        assert_eq!(config.queue_capacity(), 6);
    }
}
