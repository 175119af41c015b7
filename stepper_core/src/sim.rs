//! Simulated board.
//!
//! Counts step pulses into a physical position per axis and derives the
//! reference inputs from switches placed at physical positions. Used by
//! the unit and integration tests and by the `stepper_sim` binary.
//!
//! | Input | Reads hit when |
//! |-------|----------------|
//! | min switch of an axis | physical position `<= at` |
//! | max switch of an axis | physical position `>= at` |
//! | unplaced input | never; reads the level from `set_reference_level` |
//!
//! A switch with `bounce > 0` chatters within `bounce` steps past `at`:
//! it reads hit only on even distances from the trigger point.

use crate::stepper::{REFERENCE_COUNT, reference_id};
use stepper_common::board::StepperBoard;
use stepper_common::consts::{LEVEL_OFF, MAX_AXES};
use stepper_common::machine::config::MachineConfig;
use stepper_common::types::{AxisArray, AxisMask, SDist};
use tracing::trace;

/// Level of an input without a switch.
pub const SWITCH_OPEN: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSwitch {
    /// Physical trigger position [steps].
    pub at: SDist,
    /// Level read while triggered.
    pub hit: u8,
    /// Chatter zone past `at` [steps].
    pub bounce: SDist,
}

#[derive(Debug, Clone)]
pub struct SimBoard {
    position: AxisArray<SDist>,
    direction: AxisMask,
    enable: AxisArray<u8>,
    levels: [u8; REFERENCE_COUNT],
    switches: [Option<(bool, SimSwitch)>; REFERENCE_COUNT],
    io_log: Vec<(u8, u16)>,
    direction_changes: u64,
    pulses: AxisArray<u64>,
    steps_while_disabled: u64,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            position: [0; MAX_AXES],
            direction: AxisMask::empty(),
            enable: [LEVEL_OFF; MAX_AXES],
            levels: [SWITCH_OPEN; REFERENCE_COUNT],
            switches: [None; REFERENCE_COUNT],
            io_log: Vec::new(),
            direction_changes: 0,
            pulses: [0; MAX_AXES],
            steps_while_disabled: 0,
        }
    }

    /// Board with a switch `margin` mm1000 outside both travel ends of
    /// every axis that has a hit level configured. The machine starts at
    /// physical 0. Axes with inverted direction get no switches.
    pub fn with_travel_switches(config: &MachineConfig, margin: i32) -> Self {
        let mut board = Self::new();
        for (axis, cfg) in config.axes.iter().enumerate().take(MAX_AXES) {
            if cfg.invert_direction {
                continue;
            }
            let outside = cfg.to_steps(margin).max(1);
            if let Some(hit) = cfg.reference_hit_min {
                board.place_switch(axis, true, -outside, hit);
            }
            if let Some(hit) = cfg.reference_hit_max {
                board.place_switch(axis, false, cfg.limit_max() + outside, hit);
            }
        }
        board
    }

    // ─── Switches ───────────────────────────────────────────────────

    /// Place the min (`to_min`) or max switch of `axis` at physical `at`.
    pub fn place_switch(&mut self, axis: usize, to_min: bool, at: SDist, hit: u8) {
        let id = reference_id(axis, to_min) as usize;
        if let Some(slot) = self.switches.get_mut(id) {
            *slot = Some((to_min, SimSwitch { at, hit, bounce: 0 }));
        }
    }

    pub fn set_switch_bounce(&mut self, axis: usize, to_min: bool, bounce: SDist) {
        let id = reference_id(axis, to_min) as usize;
        if let Some(Some((_, sw))) = self.switches.get_mut(id) {
            sw.bounce = bounce.abs();
        }
    }

    pub fn remove_switch(&mut self, axis: usize, to_min: bool) {
        let id = reference_id(axis, to_min) as usize;
        if let Some(slot) = self.switches.get_mut(id) {
            *slot = None;
        }
    }

    /// Level of an input that has no switch placed.
    pub fn set_reference_level(&mut self, reference_id: u8, level: u8) {
        if let Some(l) = self.levels.get_mut(reference_id as usize) {
            *l = level;
        }
    }

    fn switch_triggered(&self, to_min: bool, sw: &SimSwitch, position: SDist) -> bool {
        let past = if to_min { sw.at - position } else { position - sw.at };
        if past < 0 {
            return false;
        }
        past >= sw.bounce || past % 2 == 0
    }

    // ─── Physical State ─────────────────────────────────────────────

    /// Physical position [steps], counted in raw direction-line polarity.
    pub fn physical_position(&self) -> AxisArray<SDist> {
        self.position
    }

    pub fn set_physical_position(&mut self, axis: usize, position: SDist) {
        if let Some(p) = self.position.get_mut(axis) {
            *p = position;
        }
    }

    pub fn direction_lines(&self) -> AxisMask {
        self.direction
    }

    /// Number of `set_direction` calls that changed a line.
    pub fn direction_changes(&self) -> u64 {
        self.direction_changes
    }

    /// Step pulses emitted per axis.
    pub fn pulses(&self) -> AxisArray<u64> {
        self.pulses
    }

    /// Pulses emitted to an axis whose enable level was off.
    pub fn steps_while_disabled(&self) -> u64 {
        self.steps_while_disabled
    }

    pub fn io_log(&self) -> &[(u8, u16)] {
        &self.io_log
    }
}

impl StepperBoard for SimBoard {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn set_direction(&mut self, direction_up: AxisMask) {
        if direction_up != self.direction {
            self.direction_changes += 1;
        }
        self.direction = direction_up;
    }

    fn step(&mut self, steps: &AxisArray<u8>) {
        for (axis, &n) in steps.iter().enumerate() {
            if n == 0 {
                continue;
            }
            if self.enable[axis] == LEVEL_OFF {
                self.steps_while_disabled += n as u64;
            }
            self.pulses[axis] += n as u64;
            if self.direction.has_axis(axis) {
                self.position[axis] += n as SDist;
            } else {
                self.position[axis] -= n as SDist;
            }
        }
    }

    fn set_enable(&mut self, axis: usize, level: u8) {
        if let Some(e) = self.enable.get_mut(axis) {
            trace!("sim: axis {} enable {}", axis, level);
            *e = level;
        }
    }

    fn enable(&self, axis: usize) -> u8 {
        self.enable.get(axis).copied().unwrap_or(LEVEL_OFF)
    }

    fn reference_value(&self, reference_id: u8) -> u8 {
        let id = reference_id as usize;
        let axis = id / 2;
        if let Some(Some((to_min, sw))) = self.switches.get(id) {
            let position = self.position.get(axis).copied().unwrap_or_default();
            if self.switch_triggered(*to_min, sw, position) {
                return sw.hit;
            }
        }
        self.levels.get(id).copied().unwrap_or(SWITCH_OPEN)
    }

    fn io_control(&mut self, tool: u8, level: u16) {
        self.io_log.push((tool, level));
    }
}
