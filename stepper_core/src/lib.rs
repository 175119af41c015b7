//! # Stepper Core Library
//!
//! Step generation for up to six stepper axes: ramps, a look-ahead
//! movement queue, the `tick` step function, homing and kinematics.
//!
//! # Module Structure
//!
//! - [`queue`] - Fixed-capacity ring buffer
//! - [`ramp`] - Timer and ramp arithmetic
//! - [`movement`] - Movement records and step-buffer entries
//! - [`optimizer`] - Look-ahead junction optimizer
//! - [`stepper`] - `Stepper` engine and its `tick` step function
//! - [`reference`] - Reference (homing) moves
//! - [`kinematics`] - Cartesian and Delta transforms
//! - [`motion`] - Feed-rate, arc and split moves in mm1000
//! - [`sim`] - Simulated board
//! - [`config`] - Configuration loader
//! - [`program`] - Motion programs for `stepper_sim`
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        stepper_core                           │
//! │  ┌───────────────┐    ┌──────────────┐    ┌────────────────┐  │
//! │  │ MotionControl │───►│   Stepper    │───►│  StepperBoard  │  │
//! │  │  (mm1000)     │    │  (steps)     │    │  (trait)       │  │
//! │  └───────┬───────┘    └──────┬───────┘    └────────────────┘  │
//! │          │                   │                                │
//! │          ▼                   ▼                                │
//! │  ┌───────────────┐    ┌──────────────┐                        │
//! │  │  Transform    │    │  Optimizer   │                        │
//! │  │  (trait)      │    │  + ramps     │                        │
//! │  └───────────────┘    └──────────────┘                        │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod kinematics;
pub mod motion;
pub mod movement;
pub mod optimizer;
pub mod program;
pub mod queue;
pub mod ramp;
pub mod reference;
pub mod sim;
pub mod stepper;

// Re-export key types for convenience
pub use crate::motion::MotionControl;
pub use crate::sim::SimBoard;
pub use crate::stepper::Stepper;
