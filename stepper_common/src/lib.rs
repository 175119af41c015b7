//! Stepper Common Library
//!
//! Shared constants, integer types, configuration records and the board
//! capability contract used by every crate of the stepper workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Timer, buffer and default motion constants
//! - [`types`] - Fixed-point type aliases and axis masks
//! - [`config`] - Configuration loading traits and types
//! - [`machine`] - Machine/axis configuration, faults and events
//! - [`board`] - `StepperBoard` capability trait
//! - [`lookup`] - Sorted-table linear interpolation
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use stepper_common::prelude::*;
//!
//! assert_eq!(Axis::Z.index(), 2);
//! ```

pub mod board;
pub mod config;
pub mod consts;
pub mod lookup;
pub mod machine;
pub mod prelude;
pub mod types;
