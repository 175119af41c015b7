//! Fixed-point and integer types shared by the motion core.
//!
//! | Alias | Unit | Meaning |
//! |-------|------|---------|
//! | `Timer` | timer ticks | Interval between two step ticks |
//! | `StepRate` | steps/s | Step frequency |
//! | `MDist` | steps | Unsigned distance of one movement |
//! | `SDist` | steps | Signed machine position |
//! | `UDist` | steps | Unsigned machine position or travel |
//! | `Mm1000` | mm / 1000 | Logical position |
//! | `FeedRate` | mm1000 / min | Requested tool speed |

use crate::consts::MAX_AXES;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub type Timer = u32;
pub type StepRate = u32;
pub type MDist = u32;
pub type SDist = i32;
pub type UDist = u32;
pub type Mm1000 = i32;
pub type FeedRate = i32;

/// One value per axis.
pub type AxisArray<T> = [T; MAX_AXES];

// ─── Axis ───────────────────────────────────────────────────────────

/// Logical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
    A = 3,
    B = 4,
    C = 5,
}

impl Axis {
    pub const ALL: [Axis; MAX_AXES] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < MAX_AXES {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    pub const fn name(self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
        }
    }
}

bitflags! {
    /// One bit per axis, bit 0 = X.
    ///
    /// Used for direction masks ("set bit = moving up") and for
    /// "which axes changed" reporting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AxisMask: u8 {
        const X = 0x01;
        const Y = 0x02;
        const Z = 0x04;
        const A = 0x08;
        const B = 0x10;
        const C = 0x20;
    }
}

impl AxisMask {
    /// Mask with only `axis` set.
    #[inline]
    pub const fn of(axis: usize) -> Self {
        Self::from_bits_truncate(1 << axis)
    }

    #[inline]
    pub const fn has_axis(&self, axis: usize) -> bool {
        self.contains(Self::of(axis))
    }

    #[inline]
    pub fn set_axis(&mut self, axis: usize, value: bool) {
        self.set(Self::of(axis), value);
    }
}
