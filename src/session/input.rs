//! Pointing-device input for Cartesian control.

use crate::error::Result;

/// One poll of the input device: a 5-DOF pose delta plus gripper buttons.
/// Deltas are meters for x/y/z and radians for pitch/roll, already scaled
/// to "per control tick" by the device driver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub delta: [f64; 5],
    pub gripper_open: bool,
    pub gripper_close: bool,
}

/// A pose-delta input device (spacemouse, gamepad, keyboard teleop)
pub trait InputDevice: Send {
    /// Current device state; non-blocking
    fn poll(&mut self) -> Result<InputState>;
}

/// Zero out axis movement below the threshold so a resting device holds
/// the arm still
pub fn apply_deadzone(state: InputState, threshold: f64) -> InputState {
    let mut out = state;
    for axis in &mut out.delta {
        if axis.abs() < threshold {
            *axis = 0.0;
        }
    }
    out
}

/// Scripted input for tests: replays a fixed sequence of states, then
/// holds the last one
pub struct ScriptedInput {
    states: Vec<InputState>,
    cursor: usize,
}

impl ScriptedInput {
    pub fn new(states: Vec<InputState>) -> Self {
        ScriptedInput { states, cursor: 0 }
    }
}

impl InputDevice for ScriptedInput {
    fn poll(&mut self) -> Result<InputState> {
        let state = self
            .states
            .get(self.cursor)
            .or_else(|| self.states.last())
            .copied()
            .unwrap_or_default();
        if self.cursor < self.states.len() {
            self.cursor += 1;
        }
        Ok(state)
    }
}
