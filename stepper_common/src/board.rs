//! Board capability trait.
//!
//! One engine drives many boards. A board only translates the engine's
//! decisions to pins: direction lines, step pulses, enable lines, switch
//! inputs and auxiliary I/O.
//!
//! # Call Order per Tick
//!
//! | Step | Call | Notes |
//! |------|------|-------|
//! | 1 | `set_direction()` | Only when a direction bit changed; no steps in the same tick |
//! | 2 | `step()` | Next tick, after the settle interval elapsed |
//! | 3 | `reference_value()` | Polled while referencing or checking switches |
//!
//! # Timing Contracts
//!
//! | Operation | RT Constraint |
//! |-----------|---------------|
//! | `set_direction()` | **HARD**, tick context |
//! | `step()` | **HARD**, tick context |
//! | `reference_value()` | **HARD**, tick context |
//! | `set_enable()` | soft, main context |
//! | `io_control()` | soft, dispatched in queue order |

use crate::types::{AxisArray, AxisMask};

pub trait StepperBoard {
    /// Board identifier, e.g. "sim", "ramps14".
    fn name(&self) -> &'static str;

    /// Drive the direction lines. A set bit means "counting up".
    fn set_direction(&mut self, direction_up: AxisMask);

    /// Emit `steps[axis]` pulses per axis in the current direction.
    fn step(&mut self, steps: &AxisArray<u8>);

    /// Set the enable level of `axis` (0 = off, 255 = full).
    fn set_enable(&mut self, axis: usize, level: u8);

    /// Current enable level of `axis`.
    fn enable(&self, axis: usize) -> u8;

    /// Raw level of reference input `reference_id` (`axis * 2 + (min ? 0 : 1)`).
    fn reference_value(&self, reference_id: u8) -> u8;

    /// Auxiliary output from an I/O queue entry.
    fn io_control(&mut self, _tool: u8, _level: u16) {}
}
