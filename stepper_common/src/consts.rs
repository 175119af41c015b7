//! Constants of the stepper workspace.
//!
//! Timer values are ticks of the step timer running at [`TIMER_FREQUENCY`].

use crate::types::{MDist, StepRate, Timer};
use static_assertions::const_assert;

/// Maximum number of axes a machine may drive.
pub const MAX_AXES: usize = 6;

// ─── Step Timer ─────────────────────────────────────────────────────

/// Step timer frequency [Hz].
pub const TIMER_FREQUENCY: u32 = 2_000_000;

/// Shortest interval the step timer accepts.
pub const TIMER_MIN: Timer = 40;

/// Longest interval the step timer accepts. Also the "stopped" marker.
pub const TIMER_MAX: Timer = 0xffff;

/// Fastest step rate representable by a movement.
pub const STEPRATE_MAX: StepRate = 65535;

/// Timer value of [`STEPRATE_MAX`].
pub const TIMER_VALUE_MAX_SPEED: Timer = TIMER_FREQUENCY / STEPRATE_MAX;

/// Poll interval while no movement is queued (31 Hz).
pub const IDLE_TIMER: Timer = TIMER_FREQUENCY / 31;

/// Tick interval of wait entries (100 Hz, one tick per 1/100 s).
pub const WAIT_TIMER: Timer = TIMER_FREQUENCY / 100;

// ─── Step Multiplier ────────────────────────────────────────────────

/// Maximum steps per axis bundled into one tick.
pub const MAX_STEP_MULTIPLIER: u8 = 7;

/// Rate above which a single step per tick no longer fits the timer.
pub const MAX_INTERRUPT_SPEED: StepRate = 65535 / MAX_STEP_MULTIPLIER as StepRate;

/// Lower step-rate bound of multiplier `n` (1-based).
#[inline]
pub const fn speed_multiplier(n: u8) -> StepRate {
    MAX_INTERRUPT_SPEED * (n as StepRate - 1)
}

// ─── Movement Limits ────────────────────────────────────────────────

/// Longest single movement; longer moves are split.
pub const MAX_STEPS_PER_MOVE: MDist = 0xffff;

/// Cap of the step count used for ramp length calculations.
pub const MAX_ACC_DEC_STEPS: MDist = 0x10000 / 4 - 10;

// ─── Buffers ────────────────────────────────────────────────────────

/// Capacity of the movement queue.
pub const MOVEMENT_BUFFER_SIZE: usize = 16;

/// Capacity of the precomputed step buffer.
pub const STEP_BUFFER_SIZE: usize = 16;

/// Step-buffer fill level above which wait and I/O entries are deferred.
pub const SYNC_STEP_BUFFER_COUNT: usize = 8;

const_assert!(MOVEMENT_BUFFER_SIZE >= 2 && MOVEMENT_BUFFER_SIZE <= 255);
const_assert!(STEP_BUFFER_SIZE > SYNC_STEP_BUFFER_COUNT);
const_assert!(MAX_AXES <= 8);

// ─── Timing ─────────────────────────────────────────────────────────

/// Axes are disabled after this idle time [ms].
pub const TIMEOUT_SET_IDLE_MS: u32 = 1000;

/// Reference switch must read stable for this long [ms].
pub const REFERENCE_STABLE_TIME_MS: u32 = 2;

// ─── Levels & Override ──────────────────────────────────────────────

/// Output level "fully on".
pub const LEVEL_MAX: u8 = 255;

/// Output level "off".
pub const LEVEL_OFF: u8 = 0;

/// Speed override level meaning 100 %.
pub const SPEED_OVERRIDE_100: u8 = 128;

// ─── Motion Defaults ────────────────────────────────────────────────

pub const DEFAULT_MAX_STEPRATE: StepRate = 28000;
pub const DEFAULT_ACC: StepRate = 350;
pub const DEFAULT_DEC: StepRate = 380;
pub const DEFAULT_JERK_SPEED: StepRate = 1000;
pub const DEFAULT_REFMOVE_STEPRATE: StepRate = 5000;

/// Distance moved off the switch after a reference move [mm1000].
pub const MOVE_AWAY_FROM_REF_MM1000: i32 = 500;

/// Direction pin setup time before the first step [timer ticks].
pub const DEFAULT_DIRECTION_SETTLE: Timer = 10;
