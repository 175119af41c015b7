//! Sorted-table lookup with linear interpolation.
//!
//! Used for calibration curves (servo pulse over joint angle, sensor
//! characteristics). The table must be sorted by ascending input.
//! Inputs outside the table clamp to the first or last output.

/// Numeric value usable as lookup input or output.
pub trait LookupValue: Copy + PartialOrd {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_lookup_value {
    ($($t:ty),*) => {
        $(impl LookupValue for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
        })*
    };
}

impl_lookup_value!(i16, u16, i32, u32, i64, f32, f64);

/// Table of `(input, output)` points.
#[derive(Debug, Clone, Copy)]
pub struct LinearLookup<'a, I, O> {
    table: &'a [(I, O)],
}

impl<'a, I: LookupValue, O: LookupValue> LinearLookup<'a, I, O> {
    pub const fn new(table: &'a [(I, O)]) -> Self {
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Output for `input`. An empty table yields zero.
    pub fn lookup(&self, input: I) -> O {
        let Some(&(first_in, first_out)) = self.table.first() else {
            return O::from_f64(0.0);
        };
        if input <= first_in {
            return first_out;
        }

        // first index with table input > input; >= 1 here
        let upper = self.table.partition_point(|&(i, _)| i <= input);
        if upper == self.table.len() {
            return self.table[upper - 1].1;
        }

        let (i0, o0) = self.table[upper - 1];
        if i0 == input {
            return o0;
        }
        let (i1, o1) = self.table[upper];
        interpolate(input, i0, o0, i1, o1)
    }
}

#[inline]
fn interpolate<I: LookupValue, O: LookupValue>(input: I, i0: I, o0: O, i1: I, o1: O) -> O {
    let dist_input = input.to_f64() - i0.to_f64();
    let diff_input = i1.to_f64() - i0.to_f64();
    let diff_output = o1.to_f64() - o0.to_f64();
    // integer outputs truncate the delta before adding the base
    let delta = O::from_f64(dist_input * diff_output / diff_input);
    O::from_f64(o0.to_f64() + delta.to_f64())
}
