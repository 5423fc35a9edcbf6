//! Fractional-rate resampling with Catmull-Rom interpolation.
//!
//! Each vocoder lane resamples its input before the STFT so that the
//! time-scale stage can undo the rate change, leaving a pure pitch shift.
//! The interpolator keeps a five-sample history and a sub-sample phase so it
//! can be fed in arbitrary chunks.

/// Catmull-Rom resampler with persistent history.
///
/// `ratio` is expressed as input samples consumed per output sample, so a
/// ratio above 1.0 shortens the signal. The fractional read position is
/// carried across calls.
#[derive(Clone, Debug)]
pub struct CatmullRom {
    last_inputs: [f32; 5],
    sub_sample_pos: f64,
}

impl Default for CatmullRom {
    fn default() -> Self {
        Self::new()
    }
}

impl CatmullRom {
    pub fn new() -> Self {
        Self {
            last_inputs: [0.0; 5],
            sub_sample_pos: 1.0,
        }
    }

    /// Clears the history and rewinds the fractional position.
    pub fn reset(&mut self) {
        self.last_inputs = [0.0; 5];
        self.sub_sample_pos = 1.0;
    }

    /// Fills `output` completely, consuming as many input samples as needed.
    ///
    /// Returns the number of input samples consumed. The caller must ensure
    /// `input` holds enough samples for the requested ratio; with
    /// `output.len()` outputs at most `ceil(output.len() * ratio) + 1`
    /// inputs are read.
    pub fn process(&mut self, ratio: f64, input: &[f32], output: &mut [f32]) -> usize {
        let num_out = output.len();
        let mut pos = self.sub_sample_pos;

        if ratio == 1.0 && pos == 1.0 {
            output.copy_from_slice(&input[..num_out]);
            self.push_history_bulk(input, num_out);
            return num_out;
        }

        let mut num_used = 0;
        for out in output.iter_mut() {
            while pos >= 1.0 {
                self.push_history(input[num_used]);
                num_used += 1;
                pos -= 1.0;
            }
            *out = value_at_offset(&self.last_inputs, pos as f32);
            pos += ratio;
        }

        self.sub_sample_pos = pos;
        num_used
    }

    #[inline]
    fn push_history(&mut self, value: f32) {
        self.last_inputs[4] = self.last_inputs[3];
        self.last_inputs[3] = self.last_inputs[2];
        self.last_inputs[2] = self.last_inputs[1];
        self.last_inputs[1] = self.last_inputs[0];
        self.last_inputs[0] = value;
    }

    fn push_history_bulk(&mut self, input: &[f32], num_out: usize) {
        if num_out >= 5 {
            for i in 0..5 {
                self.last_inputs[i] = input[num_out - 1 - i];
            }
        } else {
            for &sample in &input[..num_out] {
                self.push_history(sample);
            }
        }
    }
}

/// Four-point Catmull-Rom kernel over the most recent history samples.
///
/// `offset` is the fractional position between `inputs[2]` and `inputs[1]`
/// (the history is ordered newest-first).
#[inline]
fn value_at_offset(inputs: &[f32; 5], offset: f32) -> f32 {
    let y0 = inputs[3];
    let y1 = inputs[2];
    let y2 = inputs[1];
    let y3 = inputs[0];
    let half_y0 = 0.5 * y0;
    let half_y3 = 0.5 * y3;

    y1 + offset
        * ((0.5 * y2 - half_y0)
            + (offset
                * (((y0 + 2.0 * y2) - (half_y3 + 2.5 * y1))
                    + (offset * ((half_y3 + 1.5 * y1) - (half_y0 + 1.5 * y2))))))
}
