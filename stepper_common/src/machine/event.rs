//! Events reported by the stepper engine to the control layer.
//!
//! Handlers run synchronously, some from the tick path: keep them short.

use crate::machine::error::MotionError;
use crate::types::Timer;

/// Reason the engine is waiting in a blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// Movement queue full; caller blocked until a slot frees.
    MovementQueueFull,
    /// `wait_busy` draining the queue.
    WaitBusyCall,
    /// Time-critical section; handler must return immediately.
    WaitTimeCritical,
    /// Reference move polling the switch.
    WaitReference,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepperEvent {
    /// Step timer started from idle.
    Start,
    /// Step timer idle; `elapsed` timer ticks since the last idle poll.
    Idle { elapsed: Timer },
    /// Axis disabled after the idle timeout.
    Disable { axis: usize },
    Wait(WaitKind),
    Error(MotionError),
    /// Fatal error latched; motion blocked.
    Fatal(MotionError),
    Warning(&'static str),
    Info(&'static str),
    /// I/O entry reached the head of the queue.
    Io { tool: u8, level: u16 },
}
