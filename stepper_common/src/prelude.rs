//! Prelude module for common re-exports.
//!
//! ```rust
//! use stepper_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::machine::config::{
    AxisConfig, KinematicsKind, MachineConfig, OptimizePolicy, ReferenceType,
};

// ─── Faults & Events ────────────────────────────────────────────────
pub use crate::machine::error::{MotionError, StepperFault};
pub use crate::machine::event::{StepperEvent, WaitKind};

// ─── Board ──────────────────────────────────────────────────────────
pub use crate::board::StepperBoard;

// ─── Types & Constants ──────────────────────────────────────────────
pub use crate::consts::{MAX_AXES, TIMER_FREQUENCY};
pub use crate::types::{
    Axis, AxisArray, AxisMask, FeedRate, MDist, Mm1000, SDist, StepRate, Timer, UDist,
};
