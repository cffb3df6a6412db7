//! Numeric conversion helpers centralizing the lossy casts used by the simulator.

use num_traits::cast::cast;

/// Floor a f64 into a `usize` index, saturating at the bounds and mapping NaN to 0.
#[must_use]
pub fn floor_f64_to_usize(value: f64) -> usize {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    cast::<f64, usize>(value.floor()).unwrap_or(usize::MAX)
}

/// Round a f64 to the nearest `u32`, saturating at the bounds and mapping NaN to 0.
#[must_use]
pub fn round_f64_to_u32(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    let max = f64::from(u32::MAX);
    cast::<f64, u32>(value.round().min(max)).unwrap_or(0)
}

/// Convert a length or index to f64 while allowing precision loss in one place.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Convert a signed integer argument to an index, rejecting negatives.
#[must_use]
pub fn i32_to_usize(value: i32) -> Option<usize> {
    cast::<i32, usize>(value)
}
