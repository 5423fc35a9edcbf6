//! Phase wrapping for the vocoder's phase recurrences.

use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

/// Wraps an angle into `(-pi, pi]`.
///
/// Uses a floored modulo with a negative divisor so the upper bound is
/// closed: `wrap_phase(PI) == PI` while `wrap_phase(-PI) == PI`. The
/// half-open interval matters when a propagated phase lands exactly on the
/// branch cut.
#[inline]
pub fn wrap_phase(phase: f32) -> f32 {
    let shifted = phase + PI;
    // remainder in (-2*pi, 0]
    let rem = shifted + TWO_PI * (shifted / -TWO_PI).floor();
    rem + PI
}
