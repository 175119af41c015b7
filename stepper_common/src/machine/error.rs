//! Fault flags and operation errors of the motion core.
//!
//! `StepperFault` is the compact form kept in the engine and checked in the
//! tick path. `MotionError` is what operations return and what the
//! "last error" slot holds. Flags in `StepperFault::CRITICAL_MASK` latch the
//! fatal state: no further motion until `resurrect`.

use crate::types::SDist;
use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Stepper fault flags.
    ///
    /// CRITICAL flags (→ motion blocked): RANGE_LIMIT, REFERENCE_HIT,
    /// REFERENCE_NOT_FOUND, QUEUE_CORRUPT, EMERGENCY_STOP.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StepperFault: u16 {
        /// Target outside the configured travel. **CRITICAL**.
        const RANGE_LIMIT         = 0x0001;
        /// Reference switch active outside a reference move. **CRITICAL**.
        const REFERENCE_HIT       = 0x0002;
        /// Switch not found within the maximum travel. **CRITICAL**.
        const REFERENCE_NOT_FOUND = 0x0004;
        /// Kinematic solve failed; target unreachable.
        const GEOMETRY            = 0x0008;
        /// Queue bookkeeping inconsistent. **CRITICAL**.
        const QUEUE_CORRUPT       = 0x0010;
        /// Emergency stop active. **CRITICAL**.
        const EMERGENCY_STOP      = 0x0020;
        /// Axis index out of range.
        const INVALID_AXIS        = 0x0040;
    }
}

impl StepperFault {
    /// Mask of all CRITICAL flags.
    pub const CRITICAL_MASK: Self = Self::from_bits_truncate(
        Self::RANGE_LIMIT.bits()
            | Self::REFERENCE_HIT.bits()
            | Self::REFERENCE_NOT_FOUND.bits()
            | Self::QUEUE_CORRUPT.bits()
            | Self::EMERGENCY_STOP.bits(),
    );

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }
}

impl Default for StepperFault {
    fn default() -> Self {
        Self::empty()
    }
}

/// Failure of a motion operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MotionError {
    #[error("Range limit: axis {axis} target {target} outside {min}..={max}")]
    RangeLimit {
        axis: usize,
        target: SDist,
        min: SDist,
        max: SDist,
    },

    #[error("IsAnyReference")]
    ReferenceHit,

    #[error("MoveReference failed: axis {axis}")]
    ReferenceNotFound { axis: usize },

    #[error("Geometry: target unreachable")]
    Unreachable,

    #[error("Invalid axis {0}")]
    InvalidAxis(usize),

    #[error("Step queue corrupt")]
    QueueCorrupt,

    #[error("Emergency stop")]
    EmergencyStop,

    #[error("Motion blocked by fatal error")]
    FatalLocked,

    /// Speed override is 0; queued motion is held.
    #[error("Halted by speed override")]
    Halted,
}

impl MotionError {
    /// Fault flag this error raises.
    pub const fn fault(&self) -> StepperFault {
        match self {
            Self::RangeLimit { .. } => StepperFault::RANGE_LIMIT,
            Self::ReferenceHit => StepperFault::REFERENCE_HIT,
            Self::ReferenceNotFound { .. } => StepperFault::REFERENCE_NOT_FOUND,
            Self::Unreachable => StepperFault::GEOMETRY,
            Self::InvalidAxis(_) => StepperFault::INVALID_AXIS,
            Self::QueueCorrupt => StepperFault::QUEUE_CORRUPT,
            Self::EmergencyStop | Self::FatalLocked => StepperFault::EMERGENCY_STOP,
            Self::Halted => StepperFault::empty(),
        }
    }

    /// True if this error latches the fatal state.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        self.fault().has_critical()
    }
}
