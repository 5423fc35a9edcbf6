//! Analysis/synthesis window tables.

use std::f32::consts::PI;

/// Builds a periodic (DFT-even) Hann window of the given length.
///
/// The periodic variant keeps `w[0] == 0.0` and omits the closing endpoint,
/// which is what makes Hann-squared overlap-add sum to a constant at integer
/// overlap factors. Its squared sum is exactly `0.375 * size`.
pub fn hann_periodic(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}
