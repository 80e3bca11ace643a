use fixed::types::{I16F16, I32F32};

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Q16.16 fixed-point for compact storage (durability fractions, etc.).
pub type Fixed32 = I16F16;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display/FFI, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Convert an f64 to Fixed32. Use only for initialization.
#[inline]
pub fn f64_to_fixed32(v: f64) -> Fixed32 {
    Fixed32::from_num(v)
}

/// Convert Fixed32 to f64. Use only for display/FFI.
#[inline]
pub fn fixed32_to_f64(v: Fixed32) -> f64 {
    v.to_num::<f64>()
}

/// Fraction `numerator / denominator` as Fixed64, clamped to 0..=1.
/// A zero denominator counts as complete.
#[inline]
pub fn unit_fraction(numerator: Ticks, denominator: Ticks) -> Fixed64 {
    if denominator == 0 {
        return Fixed64::from_num(1);
    }
    let n = Fixed64::from_num(numerator.min(denominator));
    let d = Fixed64::from_num(denominator);
    n / d
}
