//! Movement records of the queue and the per-step state of the executing one.
//!
//! A [`Movement`] is one straight segment in step space (or a wait or I/O
//! entry). It owns its ramp; the optimizer rewrites junction timers while
//! it is queued and the engine turns it into step-buffer entries.

use crate::ramp::{
    Ramp, RampTimers, acc_steps, round_mul_div, speed_to_timer, step_multiplier,
    timer_accelerating, timer_for_steps, timer_to_speed,
};
use stepper_common::consts::{MAX_AXES, TIMER_MAX};
use stepper_common::types::{AxisArray, AxisMask, MDist, StepRate, Timer};

// ─── Axis Limits ────────────────────────────────────────────────────

/// Per-axis speed limits as timers, plus jerk speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisLimits {
    pub timer_max: AxisArray<Timer>,
    pub timer_acc: AxisArray<Timer>,
    pub timer_dec: AxisArray<Timer>,
    pub jerk: AxisArray<StepRate>,
}

impl AxisLimits {
    pub fn uniform(max: StepRate, acc: StepRate, dec: StepRate, jerk: StepRate) -> Self {
        Self {
            timer_max: [speed_to_timer(max); MAX_AXES],
            timer_acc: [speed_to_timer(acc); MAX_AXES],
            timer_dec: [speed_to_timer(dec); MAX_AXES],
            jerk: [jerk; MAX_AXES],
        }
    }
}

// ─── Movement State ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementState {
    #[default]
    Done,
    ReadyMove,
    ReadyWait,
    ReadyIo,
    /// Entry ramp, accelerating.
    UpAcc,
    /// Entry ramp, entered faster than cruise.
    UpDec,
    Run,
    /// Exit ramp, slowing down.
    DownDec,
    /// Exit ramp, leaving faster than cruise.
    DownAcc,
    Wait,
}

impl MovementState {
    #[inline]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::ReadyMove | Self::ReadyWait | Self::ReadyIo)
    }

    #[inline]
    pub const fn is_processing_move(self) -> bool {
        matches!(self, Self::UpAcc | Self::UpDec | Self::Run | Self::DownDec | Self::DownAcc)
    }

    #[inline]
    pub const fn is_active_move(self) -> bool {
        matches!(self, Self::ReadyMove) || self.is_processing_move()
    }

    #[inline]
    pub const fn is_up_move(self) -> bool {
        matches!(self, Self::UpAcc | Self::UpDec)
    }

    #[inline]
    pub const fn is_down_move(self) -> bool {
        matches!(self, Self::DownDec | Self::DownAcc)
    }

    #[inline]
    pub const fn is_run_or_down_move(self) -> bool {
        matches!(self, Self::Run) || self.is_down_move()
    }

    #[inline]
    pub const fn is_active_wait(self) -> bool {
        matches!(self, Self::ReadyWait | Self::Wait)
    }
}

// ─── Payloads ───────────────────────────────────────────────────────

/// Speed profile of a travel movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveProfile {
    /// Fastest timer allowed by the request and every axis.
    pub timer_max: Timer,
    /// Cruise timer after look-ahead limits.
    pub timer_run: Timer,
    pub timers: RampTimers,
    /// Fastest exit reachable from the entry speed.
    pub timer_end_possible: Timer,
    /// Agreed entry speed (junction with the previous movement).
    pub timer_junction_to_prev: Timer,
    /// Fastest junction the jerk limits allow.
    pub timer_max_junction: Timer,
    /// Fastest timer every moving axis allows at its own maximum rate,
    /// regardless of the requested feed.
    pub timer_axis_limit: Timer,
    pub ramp: Ramp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitSpec {
    pub timer: Timer,
    /// Absolute end time [ms]; 0 = none.
    pub end_ms: u64,
    /// Ends as soon as neither pause nor conditional wait is active.
    pub conditional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoSpec {
    pub tool: u8,
    pub level: u16,
}

// ─── Movement ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Movement {
    /// Main-axis steps (ticks without multiplier).
    pub steps: MDist,
    pub distance: AxisArray<MDist>,
    pub direction_up: AxisMask,
    pub state: MovementState,
    /// Backlash compensation: steps are not counted.
    pub backlash: bool,
    pub profile: MoveProfile,
    pub wait: WaitSpec,
    pub io: IoSpec,
}

/// One step-buffer record: what a single tick emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepEntry {
    pub steps: AxisArray<u8>,
    pub direction_up: AxisMask,
    pub timer: Timer,
    pub no_count: bool,
    pub state: MovementState,
}

impl StepEntry {
    /// Axes with at least one step.
    pub fn stepping(&self) -> AxisMask {
        let mut mask = AxisMask::empty();
        for (axis, &count) in self.steps.iter().enumerate() {
            mask.set_axis(axis, count > 0);
        }
        mask
    }
}

/// Timer correction of the first tick for multiplier 2..=6.
const MULTIPLIER_START_CORRECTION: [(u64, u64); 5] =
    [(1300, 1402), (611, 709), (322, 400), (307, 405), (289, 403)];

impl Movement {
    /// Travel movement of `steps` ticks. `prev` is the movement queued before.
    pub fn new_move(
        limits: &AxisLimits,
        prev: Option<&Movement>,
        steps: MDist,
        distance: AxisArray<MDist>,
        direction_up: AxisMask,
        timer_max: Timer,
    ) -> Self {
        let mut mv = Movement { steps, distance, direction_up, ..Default::default() };
        let p = &mut mv.profile;
        p.timer_max = timer_max;

        let steps64 = steps.max(1) as u64;
        for (i, &d) in distance.iter().enumerate() {
            if d == 0 {
                continue;
            }
            let d64 = d as u64;
            let limit = (limits.timer_max[i] as u64 * d64 / steps64) as Timer;
            p.timer_axis_limit = p.timer_axis_limit.max(limit);
            let axis_timer = p.timer_max as u64 * steps64 / d64;
            if axis_timer < limits.timer_max[i] as u64 {
                p.timer_max = p.timer_max.max(limit);
            }
            let acc = (limits.timer_acc[i] as u64 * d64 / steps64) as Timer;
            let dec = (limits.timer_dec[i] as u64 * d64 / steps64) as Timer;
            p.timers.acc = p.timers.acc.max(acc);
            p.timers.dec = p.timers.dec.max(dec);
        }
        p.timers.acc = p.timers.acc.max(1);
        p.timers.dec = p.timers.dec.max(1);

        p.timer_run = p.timer_max;
        p.ramp.timer_start = p.timers.acc.max(p.timer_run);
        p.ramp.timer_stop = p.timers.dec.max(p.timer_run);
        p.timer_junction_to_prev = TIMER_MAX;
        mv.state = MovementState::ReadyMove;

        match prev {
            Some(prev) if prev.state.is_active_move() => {
                mv.calc_max_junction_speed(prev, &limits.jerk);
                mv.profile.timer_end_possible = TIMER_MAX;
            }
            _ => {
                mv.profile.timer_end_possible = timer_for_steps(steps, mv.profile.timers.acc);
            }
        }

        let (timers, run) = (mv.profile.timers, mv.profile.timer_run);
        mv.profile.ramp.ramp_up(timers, run, TIMER_MAX);
        mv.profile.ramp.ramp_down(timers, steps, TIMER_MAX);
        mv.profile.ramp.ramp_run(timers, steps);
        mv
    }

    /// Timed or conditional wait of `steps` ticks of `timer`.
    pub fn new_wait(steps: MDist, timer: Timer, end_ms: u64, conditional: bool) -> Self {
        Movement {
            steps,
            state: MovementState::ReadyWait,
            wait: WaitSpec { timer, end_ms, conditional },
            ..Default::default()
        }
    }

    pub fn new_io(tool: u8, level: u16) -> Self {
        Movement { state: MovementState::ReadyIo, io: IoSpec { tool, level }, ..Default::default() }
    }

    /// Deceleration to standstill from `timer`, in the direction of `current`.
    pub fn new_stop(current: &Movement, timer: Timer, timer_dec: Timer) -> Self {
        let mut mv = *current;
        let down_steps = acc_steps(timer, timer_dec).max(1);
        let steps = current.steps.max(1) as u64;
        for d in mv.distance.iter_mut() {
            *d = round_mul_div(*d as u64, down_steps as u64, steps) as MDist;
        }
        mv.state = MovementState::ReadyMove;
        mv.steps = down_steps;
        mv.backlash = false;
        let p = &mut mv.profile;
        p.timers.dec = timer_dec;
        p.timer_run = timer;
        p.ramp.ramp_up(p.timers, timer, timer);
        p.ramp.ramp_down(p.timers, down_steps, TIMER_MAX);
        mv
    }

    #[inline]
    pub fn is_skip_for_optimizing(&self) -> bool {
        self.state == MovementState::ReadyIo
    }

    pub fn is_finished(&self) -> bool {
        self.state == MovementState::Done
    }

    // ─── Junctions ──────────────────────────────────────────────────

    /// Fastest junction to `prev` without exceeding any axis jerk speed.
    ///
    /// An axis moving at full length in both segments and the same
    /// direction is the main axis; it sets no jerk limit. Without a main
    /// axis, a reversal on any axis forces a stop.
    pub fn calc_max_junction_speed(&mut self, prev: &Movement, jerk: &AxisArray<StepRate>) {
        let prev_max = prev.profile.timer_max;
        let this_max = self.profile.timer_max;
        let acc_limit = prev.profile.timers.acc;
        let (s1, s2) = (prev.steps.max(1), self.steps.max(1));

        self.profile.timer_max_junction = prev_max.min(this_max);

        let main_axis = (0..MAX_AXES).find(|&i| {
            s1 == prev.distance[i]
                && s2 == self.distance[i]
                && prev.direction_up.has_axis(i) == self.direction_up.has_axis(i)
        });
        if main_axis.is_some() {
            self.profile.timer_max_junction = (prev_max + this_max) / 2;
        }

        let move_junction = self.profile.timer_max_junction;
        for i in 0..MAX_AXES {
            if Some(i) == main_axis {
                continue;
            }
            let (d1, d2) = (prev.distance[i], self.distance[i]);
            let mut v1 = timer_to_speed(prev_max) as u64;
            let mut v2 = timer_to_speed(this_max) as u64;
            if d1 != s1 {
                v1 = round_mul_div(v1, d1 as u64, s1 as u64);
            }
            if d2 != s2 {
                v2 = round_mul_div(v2, d2 as u64, s2 as u64);
            }

            let same_direction = prev.direction_up.has_axis(i) == self.direction_up.has_axis(i);
            let v_diff = if v1 == 0 || v2 == 0 || same_direction {
                v1.abs_diff(v2)
            } else if main_axis.is_none() {
                self.profile.timer_max_junction = acc_limit;
                continue;
            } else {
                v1 + v2
            };

            if v_diff > jerk[i] as u64 {
                let v = round_mul_div(timer_to_speed(move_junction) as u64, jerk[i] as u64, v_diff);
                let timer = speed_to_timer(v as StepRate);
                self.profile.timer_max_junction =
                    self.profile.timer_max_junction.max(timer.min(acc_limit));
            }
        }
    }

    /// Recompute the ramp with the current junctions.
    ///
    /// `executing_n` is the step index of the head movement. Returns false
    /// if the movement already passed the point where the new ramp differs.
    pub fn apply_ramp(&mut self, next_junction: Option<Timer>, executing_n: MDist) -> bool {
        if self.state.is_down_move() {
            return false;
        }
        let p = &self.profile;
        let mut ramp = p.ramp;
        ramp.ramp_up(p.timers, p.timer_run, p.timer_junction_to_prev);
        ramp.ramp_down(p.timers, self.steps, next_junction.unwrap_or(p.timers.dec));
        ramp.ramp_run(p.timers, self.steps);

        let apply = self.state == MovementState::ReadyMove
            || (self.state.is_up_move() && executing_n < ramp.up_steps)
            || (self.state == MovementState::Run && executing_n < ramp.down_start_at);
        if apply {
            self.profile.ramp = ramp;
        }
        apply
    }

    /// Head-to-tail pass: propagate the reachable exit speed forward.
    pub fn adjust_junction_speed_h2t(
        &mut self,
        prev: Option<&Movement>,
        next: Option<&mut Movement>,
        executing_n: MDist,
    ) {
        if !self.state.is_active_move() {
            return;
        }
        let acc = self.profile.timers.acc;
        match prev {
            Some(prev) if !self.state.is_run_or_down_move() => {
                let entry = if prev.state.is_active_move() {
                    if prev.state.is_processing_move() {
                        prev.profile.ramp.timer_stop
                    } else {
                        prev.profile.timer_end_possible
                    }
                } else {
                    TIMER_MAX
                };
                let p = &mut self.profile;
                p.timer_end_possible = timer_accelerating(self.steps, entry, acc);
                if p.timer_end_possible > p.timer_max {
                    p.timer_run = p.timer_end_possible.max(p.timer_run);
                }
            }
            _ => {
                let p = &mut self.profile;
                p.timer_end_possible = match self.state {
                    MovementState::Run => p.ramp.timer_run,
                    s if s.is_up_move() || s == MovementState::ReadyMove => {
                        timer_accelerating(self.steps, p.ramp.timer_start, acc)
                    }
                    _ => p.ramp.timer_stop,
                };
            }
        }

        let mut next = next;
        if let Some(next) = next.as_deref_mut() {
            let np = &mut next.profile;
            np.timer_junction_to_prev = np
                .timer_max_junction
                .max(self.profile.timer_end_possible.max(np.timer_junction_to_prev));
            self.profile.timer_end_possible = np.timer_junction_to_prev;
        }

        let next_junction = next.as_deref().map(|n| n.profile.timer_junction_to_prev);
        if !self.apply_ramp(next_junction, executing_n) {
            let stop = self.profile.ramp.timer_stop;
            self.profile.timer_end_possible = stop;
            if let Some(next) = next {
                next.profile.timer_junction_to_prev = stop;
            }
        }
    }

    /// Tail-to-head pass: propagate the speed from which a stop is still
    /// possible backward. Returns true when nothing before this entry can
    /// change, so the pass may stop.
    pub fn adjust_junction_speed_t2h(
        &mut self,
        prev: Option<&Movement>,
        has_next: bool,
        start_possible: &mut Timer,
    ) -> bool {
        if !self.state.is_active_move() {
            return !self.is_skip_for_optimizing();
        }
        let dec = self.profile.timers.dec;
        *start_possible = if has_next {
            timer_accelerating(self.steps, *start_possible, dec)
        } else {
            timer_for_steps(self.steps, dec)
        };

        let Some(prev) = prev else {
            return false;
        };
        let p = &mut self.profile;
        p.timer_run = p.timer_max;
        if !prev.state.is_active_move() {
            return true;
        }
        let junction = p.timer_max_junction.max(*start_possible);
        if junction == p.timer_junction_to_prev {
            return true;
        }
        p.timer_junction_to_prev = junction;
        *start_possible = junction;
        false
    }

    // ─── Stepping ───────────────────────────────────────────────────

    /// Produce the next step-buffer entry and advance `exec`.
    ///
    /// `end_wait` ends an executing wait immediately.
    pub fn next_step(&mut self, exec: &mut ExecState, end_wait: bool) -> StepEntry {
        let n = exec.n;
        let mut count = exec.count.max(1) as MDist;
        if count > 1 && self.steps - n <= count {
            count = self.steps - n;
        }

        let mut entry = StepEntry {
            direction_up: self.direction_up,
            no_count: self.backlash,
            ..Default::default()
        };
        let steps = self.steps.max(1) as u64;
        for i in 0..MAX_AXES {
            exec.add[i] += self.distance[i] as u64 * count as u64;
            entry.steps[i] = (exec.add[i] / steps) as u8;
            exec.add[i] %= steps;
        }

        let mut n_next = n;
        let ramp = &mut self.profile.ramp;
        match self.state {
            MovementState::ReadyMove => {
                if exec.timer == ramp.timer_run {
                    self.state = MovementState::Run;
                } else {
                    self.state = if exec.timer > ramp.timer_run {
                        MovementState::UpAcc
                    } else {
                        MovementState::UpDec
                    };
                    if exec.count > 1 && ramp.n_up_offset == 0 {
                        let idx = (exec.count as usize - 2).min(MULTIPLIER_START_CORRECTION.len() - 1);
                        let (mul, div) = MULTIPLIER_START_CORRECTION[idx];
                        exec.timer = (exec.timer as u64 * mul / div) as Timer;
                    } else if exec.count <= 1
                        && ramp.n_up_offset == 0
                        && self.state == MovementState::UpDec
                    {
                        // keeps `n_up_offset - n` from underflowing
                        ramp.n_up_offset = 1;
                    }
                }
            }
            MovementState::Wait => {
                if end_wait {
                    n_next = self.steps;
                }
            }
            _ => {
                if matches!(self.state, MovementState::UpAcc | MovementState::UpDec | MovementState::Run)
                    && n >= ramp.down_start_at
                {
                    exec.rest = 0;
                    self.state = if ramp.timer_stop > exec.timer {
                        MovementState::DownDec
                    } else {
                        MovementState::DownAcc
                    };
                }
                let cnt = exec.count as u64;
                match self.state {
                    MovementState::UpAcc => {
                        if exec.calc_timer_acc(ramp.timer_run, n + ramp.n_up_offset, cnt) {
                            self.state = MovementState::Run;
                        }
                    }
                    MovementState::UpDec => {
                        if exec.calc_timer_dec(
                            ramp.timer_run,
                            ramp.n_up_offset.saturating_sub(n),
                            cnt,
                        ) {
                            self.state = MovementState::Run;
                        }
                    }
                    MovementState::DownDec => {
                        exec.calc_timer_dec(
                            ramp.timer_stop,
                            self.steps - n + ramp.n_down_offset,
                            cnt,
                        );
                    }
                    MovementState::DownAcc => {
                        exec.calc_timer_acc(
                            ramp.timer_stop,
                            ramp.n_down_offset.saturating_sub(self.steps - n - 1),
                            cnt,
                        );
                    }
                    _ => {}
                }
            }
        }

        entry.timer = exec.timer.saturating_mul(count).min(TIMER_MAX);
        entry.state = self.state;
        exec.n = if n_next != n { n_next } else { (n + count).min(self.steps) };
        entry
    }
}

// ─── Execution State ────────────────────────────────────────────────

/// Stepping state of the head movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecState {
    /// Main-axis steps already emitted.
    pub n: MDist,
    /// Steps bundled per tick.
    pub count: u8,
    pub timer: Timer,
    /// Bresenham accumulators.
    pub add: AxisArray<u64>,
    /// Remainder of the timer recurrence.
    pub rest: u64,
}

impl ExecState {
    pub fn init(&mut self, mv: &Movement) {
        if mv.state == MovementState::ReadyMove {
            self.count = step_multiplier(mv.profile.timer_max);
            self.timer = mv.profile.ramp.timer_start;
        } else {
            self.count = 1;
            self.timer = mv.wait.timer;
        }
        self.add = [(mv.steps / 2) as u64; MAX_AXES];
        self.n = 0;
        self.rest = 0;
    }

    /// `Cn = Cn-1 - 2·cnt·Cn-1 / (4n + 2 - cnt)`; true once `max_timer` is reached.
    pub fn calc_timer_acc(&mut self, max_timer: Timer, n: MDist, cnt: u64) -> bool {
        if max_timer >= self.timer {
            return false;
        }
        let divisor = 4 * n as i64 + 2 - cnt as i64;
        if divisor <= 0 {
            self.timer = max_timer;
            return true;
        }
        let dividend = self.timer as u64 * 2 * cnt + self.rest;
        let quot = dividend / divisor as u64;
        self.rest = dividend % divisor as u64;
        let timer = (self.timer as u64).saturating_sub(quot);
        if max_timer as u64 >= timer {
            self.timer = max_timer;
            return true;
        }
        self.timer = timer as Timer;
        false
    }

    /// `Cn = Cn-1 + 2·cnt·Cn-1 / (4n - 1 - cnt)`; true once `min_timer` is reached.
    pub fn calc_timer_dec(&mut self, min_timer: Timer, n: MDist, cnt: u64) -> bool {
        if min_timer <= self.timer {
            return false;
        }
        let divisor = 4 * n as i64 - 1 - cnt as i64;
        if n <= 1 || divisor <= 0 {
            self.timer = min_timer;
            return true;
        }
        let dividend = self.timer as u64 * 2 * cnt + self.rest;
        let quot = dividend / divisor as u64;
        self.rest = dividend % divisor as u64;
        let timer = self.timer as u64 + quot;
        if min_timer as u64 <= timer {
            self.timer = min_timer;
            return true;
        }
        self.timer = timer as Timer;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepper_common::consts::WAIT_TIMER;

    fn limits() -> AxisLimits {
        AxisLimits::uniform(5000, 1000, 1500, 500)
    }

    fn dist(x: MDist, y: MDist) -> AxisArray<MDist> {
        let mut d = [0; MAX_AXES];
        d[0] = x;
        d[1] = y;
        d
    }

    fn run_to_end(mv: &mut Movement) -> Vec<StepEntry> {
        let mut exec = ExecState::default();
        exec.init(mv);
        let mut entries = Vec::new();
        while exec.n < mv.steps {
            entries.push(mv.next_step(&mut exec, false));
        }
        entries
    }

    // ── Construction ──

    #[test]
    fn new_move_uses_slowest_axis_limits() {
        let mut l = limits();
        l.timer_max[1] = speed_to_timer(1000);
        let mv = Movement::new_move(&l, None, 1000, dist(1000, 1000), AxisMask::X, speed_to_timer(5000));
        assert_eq!(mv.profile.timer_max, speed_to_timer(1000));
        assert_eq!(mv.state, MovementState::ReadyMove);
        assert_eq!(mv.profile.timer_junction_to_prev, TIMER_MAX);
    }

    #[test]
    fn ramp_fits_into_the_move() {
        for steps in [1u32, 3, 10, 100, 1000, 20_000] {
            let mv = Movement::new_move(&limits(), None, steps, dist(steps, steps / 2), AxisMask::X, speed_to_timer(5000));
            let r = mv.profile.ramp;
            assert!(r.up_steps + r.down_steps <= steps, "steps {steps}");
        }
    }

    // ── Stepping ──

    #[test]
    fn bresenham_emits_exact_distances() {
        let mut mv = Movement::new_move(&limits(), None, 999, dist(999, 333), AxisMask::X | AxisMask::Y, speed_to_timer(3000));
        let entries = run_to_end(&mut mv);
        let x: u32 = entries.iter().map(|e| e.steps[0] as u32).sum();
        let y: u32 = entries.iter().map(|e| e.steps[1] as u32).sum();
        assert_eq!((x, y), (999, 333));
        assert!(entries.iter().all(|e| e.direction_up == AxisMask::X | AxisMask::Y));
    }

    #[test]
    fn multiplier_bundles_steps_without_drift() {
        let l = AxisLimits::uniform(60_000, 2000, 2000, 1000);
        let mut mv = Movement::new_move(&l, None, 10_001, dist(10_001, 7), AxisMask::X, speed_to_timer(50_000));
        let entries = run_to_end(&mut mv);
        assert!(entries.iter().any(|e| e.steps[0] > 1));
        assert!(entries.iter().all(|e| e.steps[0] <= 7));
        let x: u32 = entries.iter().map(|e| e.steps[0] as u32).sum();
        let y: u32 = entries.iter().map(|e| e.steps[1] as u32).sum();
        assert_eq!((x, y), (10_001, 7));
    }

    #[test]
    fn profile_accelerates_cruises_and_decelerates() {
        let mut mv = Movement::new_move(&limits(), None, 20_000, dist(20_000, 0), AxisMask::X, speed_to_timer(2000));
        let entries = run_to_end(&mut mv);
        let first = entries.first().unwrap().timer;
        let min = entries.iter().map(|e| e.timer).min().unwrap();
        let last = entries.last().unwrap().timer;
        assert!(first > min && last > min);
        assert_eq!(min, speed_to_timer(2000));
        let acc = entries.iter().filter(|e| e.state == MovementState::UpAcc).count();
        let dec = entries.iter().filter(|e| e.state.is_down_move()).count();
        assert!(acc + dec <= 20_000);
        assert!(entries.iter().any(|e| e.state == MovementState::Run));
    }

    #[test]
    fn wait_entry_emits_no_steps() {
        let mut mv = Movement::new_wait(5, WAIT_TIMER, 0, false);
        let mut exec = ExecState::default();
        exec.init(&mv);
        mv.state = MovementState::Wait;
        let e = mv.next_step(&mut exec, false);
        assert_eq!(e.steps, [0; MAX_AXES]);
        assert_eq!(e.timer, WAIT_TIMER);
        let _ = mv.next_step(&mut exec, true);
        assert_eq!(exec.n, 5);
    }

    // ── Junctions ──

    #[test]
    fn colinear_junction_is_fast() {
        let l = limits();
        let a = Movement::new_move(&l, None, 1000, dist(1000, 0), AxisMask::X, speed_to_timer(4000));
        let b = Movement::new_move(&l, Some(&a), 1000, dist(1000, 0), AxisMask::X, speed_to_timer(4000));
        assert_eq!(b.profile.timer_max_junction, speed_to_timer(4000));
    }

    #[test]
    fn reversal_without_main_axis_stops() {
        let l = limits();
        let a = Movement::new_move(&l, None, 1000, dist(1000, 500), AxisMask::X | AxisMask::Y, speed_to_timer(4000));
        let b = Movement::new_move(&l, Some(&a), 1000, dist(500, 1000), AxisMask::X, speed_to_timer(4000));
        assert_eq!(b.profile.timer_max_junction, a.profile.timers.acc);
    }

    #[test]
    fn corner_junction_limited_by_jerk() {
        let l = limits();
        let a = Movement::new_move(&l, None, 1000, dist(1000, 0), AxisMask::X, speed_to_timer(4000));
        let b = Movement::new_move(&l, Some(&a), 1000, dist(0, 1000), AxisMask::Y, speed_to_timer(4000));
        let j = b.profile.timer_max_junction;
        assert!(j > speed_to_timer(4000));
        assert!(j <= a.profile.timers.acc);
    }

    // ── Timer Recurrence ──

    #[test]
    fn timer_recurrence_reaches_target() {
        let mut exec = ExecState { timer: 10_000, count: 1, ..Default::default() };
        let mut n = 1;
        while !exec.calc_timer_acc(400, n, 1) {
            n += 1;
            assert!(n < 100_000);
        }
        assert_eq!(exec.timer, 400);

        let mut n = 500;
        while !exec.calc_timer_dec(10_000, n, 1) {
            n -= 1;
        }
        assert_eq!(exec.timer, 10_000);
    }
}
