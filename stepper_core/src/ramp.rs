//! Step-rate and speed-ramp arithmetic.
//!
//! All values are integers. Speeds are expressed as timer intervals
//! (`TIMER_FREQUENCY / steprate`), so a *larger* timer means a *slower*
//! axis. Ramp lengths follow `v² = v0² + 2·a·s` with a 93/85 correction
//! factor that matches the integer timer recurrence used while stepping
//! (`Cn = Cn-1 ± 2·Cn-1 / (4n ± 1)`).
//!
//! ## Ramp Shape
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `timer_start` | Timer at the first step (entry speed) |
//! | `timer_run` | Cruise timer |
//! | `timer_stop` | Timer at the last step (exit speed) |
//! | `up_steps` | Length of the entry ramp |
//! | `down_start_at` | Step index where the exit ramp starts |
//! | `n_up_offset`/`n_down_offset` | Virtual steps already "done" when entering/leaving at speed |

use stepper_common::consts::{
    MAX_ACC_DEC_STEPS, MAX_STEP_MULTIPLIER, TIMER_FREQUENCY, TIMER_MAX, TIMER_VALUE_MAX_SPEED,
    speed_multiplier,
};
use stepper_common::types::{MDist, StepRate, Timer};

// ─── Conversions ────────────────────────────────────────────────────

/// Timer interval of `speed` steps/s; 0 means stopped ([`TIMER_MAX`]).
#[inline]
pub const fn speed_to_timer(speed: StepRate) -> Timer {
    if speed == 0 {
        return TIMER_MAX;
    }
    let timer = TIMER_FREQUENCY / speed;
    if timer > TIMER_MAX { TIMER_MAX } else { timer }
}

/// Step rate of a timer interval. The conversion is its own inverse.
#[inline]
pub const fn timer_to_speed(timer: Timer) -> StepRate {
    speed_to_timer(timer)
}

/// Acceleration reaching the speed of `timer` within one step: `(F/timer)²`.
#[inline]
pub const fn acceleration_from_timer(timer: Timer) -> u64 {
    let x = (TIMER_FREQUENCY / if timer == 0 { 1 } else { timer }) as u64;
    x * x
}

/// `round(value * mul / div)`.
#[inline]
pub const fn round_mul_div(value: u64, mul: u64, div: u64) -> u64 {
    if div == 0 {
        return 0;
    }
    (value * mul + div / 2) / div
}

/// Integer square root (floor).
pub fn isqrt(value: u64) -> u64 {
    if value < 2 {
        return value;
    }
    let mut x = (value as f64).sqrt() as u64;
    while x * x > value {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= value {
        x += 1;
    }
    x
}

/// Integer square root, rounded to nearest.
pub fn isqrt_round(value: u64) -> u64 {
    let x = isqrt(value);
    if value - x * x > x { x + 1 } else { x }
}

// ─── Ramp Timers ────────────────────────────────────────────────────

fn corrected_speed_timer(square: u64) -> Timer {
    let v = isqrt(square / 93 * 85);
    let v = v.min(StepRate::MAX as u64) as StepRate;
    speed_to_timer(v).saturating_add(1).min(TIMER_MAX)
}

#[inline]
fn capped(steps: MDist) -> u64 {
    steps.min(MAX_ACC_DEC_STEPS) as u64
}

/// Timer reached after accelerating from standstill over `steps`.
pub fn timer_for_steps(steps: MDist, timer_acc: Timer) -> Timer {
    let ad = 2 * acceleration_from_timer(timer_acc) * capped(steps);
    corrected_speed_timer(ad).max(TIMER_VALUE_MAX_SPEED)
}

/// Timer reached after accelerating from `timer_v0` over `steps`.
pub fn timer_accelerating(steps: MDist, timer_v0: Timer, timer_acc: Timer) -> Timer {
    let v0 = timer_to_speed(timer_v0) as u64;
    let ad = 2 * acceleration_from_timer(timer_acc) * capped(steps);
    corrected_speed_timer(v0 * v0 + ad).max(TIMER_VALUE_MAX_SPEED)
}

/// Timer reached after decelerating from `timer_v` over `steps`;
/// [`TIMER_MAX`] if the move comes to a stop before.
pub fn timer_decelerating(steps: MDist, timer_v: Timer, timer_dec: Timer) -> Timer {
    let v = timer_to_speed(timer_v) as u64;
    let ad = 2 * acceleration_from_timer(timer_dec) * capped(steps);
    if v * v < ad {
        return TIMER_MAX;
    }
    corrected_speed_timer(v * v - ad)
}

/// Steps needed to accelerate from standstill to `timer`.
pub fn acc_steps(timer: Timer, timer_acc: Timer) -> MDist {
    let timer = timer.max(2) as u64;
    let sq_a2 = timer * (timer - 1) * 2;
    let sq_b = (timer_acc as u64 * timer_acc as u64) * 93 / 85;
    (sq_b / sq_a2).min(MDist::MAX as u64) as MDist
}

/// Steps needed to decelerate from `timer` to standstill.
#[inline]
pub fn dec_steps(timer: Timer, timer_dec: Timer) -> MDist {
    acc_steps(timer, timer_dec)
}

/// Steps between two speeds; argument order does not matter.
pub fn acc_steps_between(timer1: Timer, timer2: Timer, timer_acc: Timer) -> MDist {
    let (slow, fast) = if timer1 < timer2 { (timer2, timer1) } else { (timer1, timer2) };
    acc_steps(fast, timer_acc).saturating_sub(acc_steps(slow, timer_acc))
}

/// Steps per tick needed to reach the speed of `timer_max`.
pub fn step_multiplier(timer_max: Timer) -> u8 {
    for n in 2..=MAX_STEP_MULTIPLIER {
        if timer_max >= speed_to_timer(speed_multiplier(n)) {
            return n - 1;
        }
    }
    MAX_STEP_MULTIPLIER
}

// ─── Ramp ───────────────────────────────────────────────────────────

/// Acc/dec timers of one movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RampTimers {
    pub acc: Timer,
    pub dec: Timer,
}

impl RampTimers {
    #[inline]
    fn pick(&self, acc: bool) -> Timer {
        if acc { self.acc } else { self.dec }
    }
}

/// Trapezoid of one movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ramp {
    pub timer_start: Timer,
    pub timer_run: Timer,
    pub timer_stop: Timer,
    pub up_steps: MDist,
    pub down_steps: MDist,
    pub down_start_at: MDist,
    pub n_up_offset: MDist,
    pub n_down_offset: MDist,
}

impl Ramp {
    /// Entry ramp from `timer_junction` to `timer_run`.
    pub fn ramp_up(&mut self, timers: RampTimers, timer_run: Timer, timer_junction: Timer) {
        self.timer_run = timer_run;
        if timer_junction >= timers.acc {
            // from standstill
            self.timer_start = timers.acc.max(timer_run);
            self.n_up_offset = 0;
            self.up_steps = acc_steps(timer_run, timers.acc);
        } else {
            self.timer_start = timer_junction;
            if self.timer_start >= timer_run {
                self.n_up_offset = acc_steps(self.timer_start, timers.acc);
                self.up_steps =
                    acc_steps(timer_run, timers.acc).saturating_sub(self.n_up_offset);
            } else {
                // entering faster than cruise: slow down to run
                self.n_up_offset = dec_steps(self.timer_start, timers.dec);
                self.up_steps =
                    self.n_up_offset.saturating_sub(dec_steps(timer_run, timers.dec));
            }
        }
    }

    /// Exit ramp from `timer_run` to `timer_junction`.
    pub fn ramp_down(&mut self, timers: RampTimers, steps: MDist, timer_junction: Timer) {
        if timer_junction >= timers.dec {
            // to standstill
            self.timer_stop = timers.dec.max(self.timer_run);
            self.down_steps = dec_steps(self.timer_run, timers.dec);
            self.down_start_at = steps.saturating_sub(self.down_steps);
            self.n_down_offset = 0;
        } else {
            self.timer_stop = timer_junction;
            if self.timer_stop >= self.timer_run {
                self.n_down_offset = dec_steps(self.timer_stop, timers.dec);
                self.down_steps = dec_steps(self.timer_run, timers.dec);
                self.down_start_at =
                    (steps + self.n_down_offset).saturating_sub(self.down_steps).min(steps);
            } else {
                // leaving faster than cruise: accelerate at the end
                self.n_down_offset = acc_steps(self.timer_stop, timers.acc);
                let accelerate =
                    self.n_down_offset.saturating_sub(acc_steps(self.timer_run, timers.acc));
                self.down_start_at = steps.saturating_sub(accelerate);
            }
            self.down_steps = steps - self.down_start_at;
        }
    }

    /// Cut the plateau if up and down ramps overlap ("triangle" profile).
    ///
    /// Excess steps are taken from both ramps proportional to their squared
    /// acc timers, so the meeting point keeps a constant acceleration.
    pub fn ramp_run(&mut self, timers: RampTimers, steps: MDist) {
        if self.up_steps <= steps && steps - self.up_steps >= self.down_steps {
            return;
        }

        let to_many = self.down_steps + self.up_steps - steps;
        let mut sub_up = if self.down_steps == 0 {
            to_many
        } else if self.up_steps == 0 {
            0
        } else {
            let up_timer = timers.pick(self.timer_start > self.timer_run) as u64;
            let down_timer = timers.pick(self.timer_stop < self.timer_run) as u64;
            let sq_up = up_timer * up_timer / 0x1000;
            let sq_down = down_timer * down_timer / 0x1000;
            round_mul_div(to_many as u64, sq_up, sq_up + sq_down) as MDist
        };

        if sub_up > self.up_steps || to_many - sub_up > self.down_steps {
            sub_up = self.up_steps.min(to_many);
        }

        self.up_steps -= sub_up;
        self.down_steps = self.down_steps.saturating_sub(to_many - sub_up).min(steps);
        self.down_start_at = steps - self.down_steps;
    }
}
