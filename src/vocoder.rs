//! Sample-synchronous phase vocoder for one subdivision lane.
//!
//! Each lane resamples its input at a rational pitch ratio, accumulates one
//! analysis hop at a time into an STFT ring, and emits a windowed,
//! amplitude-compensated synthesis frame whenever a hop completes. The
//! time-scale of the vocoder already absorbs the resampler's rate change, so
//! the two stages together shorten a beat by the subdivision power while
//! shifting its pitch by the configured interval.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::dsp::{hann_periodic, wrap_phase};
use crate::error::GamelanizerError;
use crate::resample::CatmullRom;

/// Fixed capacity of the per-lane resampler input queue.
pub const RESAMPLER_QUEUE_LEN: usize = 8192;

const TWO_PI: f32 = 2.0 * PI;

/// One vocoder lane: resampler, STFT ring, and phase memories.
pub struct PhaseVocoder {
    window: Vec<f32>,
    window_size: usize,
    overlap: usize,
    pitch_num: u64,
    pitch_den: u64,
    synthesis_overlap: f64,
    analysis_hop: usize,
    synthesis_hop: f64,
    n_bins: usize,

    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,

    /// Time-domain frame, shared by analysis input and synthesis output.
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    fft_queue: Vec<f32>,
    fft_queue_index: usize,
    /// Set once a full window has passed through the STFT ring.
    queue_ready: bool,
    /// False until the first frame of the current beat has seeded the phase
    /// memories.
    ready: bool,
    phase_prev: Vec<f32>,
    phase_accum: Vec<f32>,

    interpolator: CatmullRom,
    resampler_queue: Vec<f32>,
    resampler_write: usize,
    hop_buffer: Vec<f32>,
    /// Queued samples needed to guarantee one full analysis hop of
    /// resampler output.
    max_need: usize,

    /// Synthesis-hop amplitude compensation, with the inverse transform's
    /// 1/N normalization folded in.
    output_scale: f32,
}

impl std::fmt::Debug for PhaseVocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseVocoder")
            .field("window_size", &self.window_size)
            .field("overlap", &self.overlap)
            .field("pitch_num", &self.pitch_num)
            .field("pitch_den", &self.pitch_den)
            .field("analysis_hop", &self.analysis_hop)
            .field("synthesis_hop", &self.synthesis_hop)
            .field("n_bins", &self.n_bins)
            .finish_non_exhaustive()
    }
}

impl PhaseVocoder {
    /// Builds a lane that compresses time by `time_compression` while
    /// shifting pitch by `pitch_ratio`.
    ///
    /// `pitch_ratio` is approximated by a rational with denominator at most
    /// 1000 for the resampler stage.
    pub fn new(
        pitch_ratio: f64,
        time_compression: f64,
        window_size: usize,
        overlap: usize,
    ) -> Result<Self, GamelanizerError> {
        let window = hann_periodic(window_size);
        let (pitch_num, pitch_den) = approximate_ratio(pitch_ratio, 1000);

        let time_scale = pitch_ratio / time_compression;
        let synthesis_overlap = overlap as f64 / time_scale;
        let analysis_hop = window_size / overlap;
        let synthesis_hop = analysis_hop as f64 * time_scale;
        let n_bins = window_size / 2 + 1;

        let max_need =
            (analysis_hop as f64 * pitch_num as f64 / pitch_den as f64).floor() as usize;
        if max_need + 1 > RESAMPLER_QUEUE_LEN {
            return Err(GamelanizerError::ResamplerQueueOverflow {
                needed: max_need + 1,
                capacity: RESAMPLER_QUEUE_LEN,
            });
        }

        let squared_window_sum = window_size as f64 * 0.375;
        let output_scale = (synthesis_hop / squared_window_sum / window_size as f64) as f32;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let ifft = planner.plan_fft_inverse(window_size);
        let fft_scratch = fft.make_scratch_vec();
        let ifft_scratch = ifft.make_scratch_vec();
        let spectrum = fft.make_output_vec();

        Ok(Self {
            window,
            window_size,
            overlap,
            pitch_num,
            pitch_den,
            synthesis_overlap,
            analysis_hop,
            synthesis_hop,
            n_bins,
            fft,
            ifft,
            fft_scratch,
            ifft_scratch,
            frame: vec![0.0; window_size],
            spectrum,
            fft_queue: vec![0.0; window_size],
            fft_queue_index: 0,
            queue_ready: false,
            ready: false,
            phase_prev: vec![0.0; n_bins],
            phase_accum: vec![0.0; n_bins],
            interpolator: CatmullRom::new(),
            resampler_queue: vec![0.0; RESAMPLER_QUEUE_LEN],
            resampler_write: 0,
            hop_buffer: vec![0.0; analysis_hop],
            max_need,
            output_scale,
        })
    }

    /// The synthesized, windowed frame produced by the last non-zero hop.
    #[inline]
    pub fn frame(&self) -> &[f32] {
        &self.frame
    }

    /// Integer synthesis hop emitted per completed analysis hop.
    #[inline]
    pub fn hop_size(&self) -> usize {
        self.synthesis_hop as usize
    }

    /// Rearms the lane at a beat boundary.
    ///
    /// The next frame's phases will be captured verbatim rather than
    /// propagated. Phase memories and the STFT ring are left dirty on
    /// purpose; incoming samples rewrite them in order.
    pub fn reset(&mut self) {
        self.ready = false;
        self.queue_ready = false;
        self.fft_queue_index = 0;
        self.interpolator.reset();
    }

    /// Accepts one input sample.
    ///
    /// Returns the integer synthesis-hop size when a frame was produced,
    /// otherwise zero. After a non-zero return, [`frame`](Self::frame) holds
    /// the new synthesis frame ready for overlap-add.
    pub fn push_sample(&mut self, sample: f32) -> usize {
        self.resampler_queue[self.resampler_write] = sample;
        self.resampler_write += 1;
        if self.resampler_write < self.max_need + 1 {
            return 0;
        }

        self.resample_hop();
        self.push_hop_onto_fft_queue();
        if !self.queue_ready {
            return 0;
        }

        self.transform_frame();
        self.synthesis_hop as usize
    }

    /// Pulls exactly one analysis hop out of the resampler and pops the
    /// consumed input with an in-place compact.
    fn resample_hop(&mut self) {
        let ratio = self.pitch_num as f64 / self.pitch_den as f64;
        let num_used = self
            .interpolator
            .process(ratio, &self.resampler_queue, &mut self.hop_buffer);
        debug_assert!(num_used <= self.resampler_write);
        self.resampler_queue
            .copy_within(num_used..self.resampler_write, 0);
        self.resampler_write -= num_used;
    }

    fn push_hop_onto_fft_queue(&mut self) {
        for i in 0..self.analysis_hop {
            self.fft_queue[self.fft_queue_index] = self.hop_buffer[i];
            self.fft_queue_index += 1;
            if self.fft_queue_index == self.window_size {
                self.queue_ready = true;
                self.fft_queue_index = 0;
            }
        }
    }

    /// Runs one analysis/synthesis pass over the current STFT ring contents.
    fn transform_frame(&mut self) {
        // unwrap the ring so index 0 is the oldest sample
        for i in 0..self.window_size {
            let wrapped = (self.fft_queue_index + i) % self.window_size;
            self.frame[i] = self.fft_queue[wrapped];
        }
        for (sample, &w) in self.frame.iter_mut().zip(&self.window) {
            *sample *= w;
        }

        if self
            .fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.fft_scratch)
            .is_err()
        {
            return;
        }

        if self.ready {
            self.propagate_phases();
        } else {
            self.capture_phases();
            self.ready = true;
        }

        // the complex-to-real transform requires purely real DC and Nyquist
        self.spectrum[0].im = 0.0;
        self.spectrum[self.n_bins - 1].im = 0.0;

        if self
            .ifft
            .process_with_scratch(&mut self.spectrum, &mut self.frame, &mut self.ifft_scratch)
            .is_err()
        {
            return;
        }

        for (sample, &w) in self.frame.iter_mut().zip(&self.window) {
            *sample *= w * self.output_scale;
        }
    }

    /// Seeds both phase memories from the first frame of a beat. The frame
    /// itself passes through untouched and becomes the anchor that later
    /// frames drift from.
    fn capture_phases(&mut self) {
        for k in 0..self.n_bins {
            let phase = self.spectrum[k].arg();
            self.phase_prev[k] = phase;
            self.phase_accum[k] = phase;
        }
    }

    /// Re-estimates each bin's instantaneous frequency from its phase
    /// increment and advances the synthesis phase by one synthesis hop at
    /// that frequency.
    fn propagate_phases(&mut self) {
        let window_size = self.window_size as f32;
        let analysis_hop = self.analysis_hop as f32;
        let overlap = self.overlap as f32;
        let synthesis_overlap = self.synthesis_overlap as f32;

        for k in 0..self.n_bins {
            let (magnitude, current) = self.spectrum[k].to_polar();
            let old = self.phase_prev[k];
            self.phase_prev[k] = current;

            let expected = TWO_PI * k as f32 / overlap;
            let deviation = wrap_phase(current - old - expected) / analysis_hop;
            let omega = TWO_PI * k as f32 / window_size;
            let true_bin = (omega + deviation) * window_size / TWO_PI;

            let scaled = wrap_phase(true_bin * (TWO_PI / synthesis_overlap) + self.phase_accum[k]);
            self.phase_accum[k] = scaled;
            self.spectrum[k] = Complex::from_polar(magnitude, scaled);
        }
    }
}

/// Best rational approximation of `value` with denominator at most
/// `max_denominator`, via continued-fraction convergents and the closing
/// semiconvergent.
fn approximate_ratio(value: f64, max_denominator: u64) -> (u64, u64) {
    const SCALE: u64 = 1 << 32;
    let mut n = (value * SCALE as f64).round() as u64;
    if n == 0 {
        n = 1;
    }
    let mut d = SCALE;
    let g = gcd(n, d);
    n /= g;
    d /= g;
    if d <= max_denominator {
        return (n, d);
    }

    let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
    let (mut rem_n, mut rem_d) = (n, d);
    loop {
        let a = rem_n / rem_d;
        let q2 = q0 + a * q1;
        if q2 > max_denominator {
            break;
        }
        let p2 = p0 + a * p1;
        (p0, q0, p1, q1) = (p1, q1, p2, q2);
        (rem_n, rem_d) = (rem_d, rem_n - a * rem_d);
    }

    let k = (max_denominator - q0) / q1;
    let semi = (p0 + k * p1, q0 + k * q1);
    let conv = (p1, q1);
    let err_semi = (semi.0 as f64 / semi.1 as f64 - value).abs();
    let err_conv = (conv.0 as f64 / conv.1 as f64 - value).abs();
    if err_conv <= err_semi {
        conv
    } else {
        semi
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approximate_ratio_exact_fractions() {
        assert_eq!(approximate_ratio(1.0, 1000), (1, 1));
        assert_eq!(approximate_ratio(1.5, 1000), (3, 2));
        assert_eq!(approximate_ratio(4.0 / 3.0, 1000), (4, 3));
        assert_eq!(approximate_ratio(16.0 / 9.0, 1000), (16, 9));
        assert_eq!(approximate_ratio(64.0 / 27.0, 1000), (64, 27));
        assert_eq!(approximate_ratio(0.75, 1000), (3, 4));
    }

    #[test]
    fn test_approximate_ratio_irrational() {
        // equal-tempered fifth
        let value = 2.0f64.powf(7.0 / 12.0);
        let (num, den) = approximate_ratio(value, 1000);
        assert!(den <= 1000);
        assert!(
            (num as f64 / den as f64 - value).abs() < 1e-5,
            "{num}/{den} too far from {value}"
        );
    }

    #[test]
    fn test_warm_up_sample_count() {
        // unity settings: analysis hop 256, one input consumed per output
        let mut pv = PhaseVocoder::new(1.0, 1.0, 1024, 4).unwrap();
        assert_eq!(pv.hop_size(), 256);

        let mut first_hop_at = None;
        for i in 1..=2048u32 {
            let hop = pv.push_sample(0.1);
            if hop > 0 {
                first_hop_at = Some((i, hop));
                break;
            }
        }
        // the queue triggers at 257 samples and the ring needs four hops:
        // 257 + 3 * 256 = 1025
        assert_eq!(first_hop_at, Some((1025, 256)));
    }

    #[test]
    fn test_warm_up_after_reset() {
        let mut pv = PhaseVocoder::new(1.0, 1.0, 1024, 4).unwrap();
        let mut pushes = 0u32;
        loop {
            pushes += 1;
            if pv.push_sample(0.1) > 0 {
                break;
            }
        }
        pv.reset();
        // one unconsumed sample stays queued, so re-warming takes exactly a
        // full window again
        let mut pushes_after_reset = 0u32;
        loop {
            pushes_after_reset += 1;
            if pv.push_sample(0.1) > 0 {
                break;
            }
            assert!(pushes_after_reset < 4096, "lane never re-warmed");
        }
        assert_eq!(pushes_after_reset, 1024);
        assert_eq!(pushes, 1025);
    }

    #[test]
    fn test_queue_capacity_enforced() {
        let err = PhaseVocoder::new(4.0 / 3.0, 2.0, 16384, 2).unwrap_err();
        assert!(matches!(
            err,
            GamelanizerError::ResamplerQueueOverflow { .. }
        ));
    }

    #[test]
    fn test_unity_settings_reconstruct_input() {
        // with unity pitch and no compression the lane is an identity
        // (up to windowing latency): overlap-added frames rebuild the input
        let window = 1024usize;
        let hop = 256usize;
        let mut pv = PhaseVocoder::new(1.0, 1.0, window, 4).unwrap();

        let total = 8192;
        let input: Vec<f32> = (0..total)
            .map(|i| (TWO_PI * 220.5 * i as f32 / 44100.0).sin() * 0.7)
            .collect();

        let mut acc = vec![0.0f32; total + window];
        let mut emitted = 0usize;
        for &x in &input {
            if pv.push_sample(x) > 0 {
                for (j, &s) in pv.frame().iter().enumerate() {
                    acc[emitted * hop + j] += s;
                }
                emitted += 1;
            }
        }
        assert!(emitted >= 20, "only {emitted} frames emitted");

        // skip the first window (partial overlap) and the unemitted tail
        let valid_end = (emitted - 4) * hop;
        for i in window..valid_end {
            assert!(
                (acc[i] - input[i]).abs() < 5e-3,
                "reconstruction off at {i}: {} vs {}",
                acc[i],
                input[i]
            );
        }
    }

    #[test]
    fn test_dc_survives_time_compression() {
        // one level at unity pitch: time halves, the level should still
        // reconstruct the input's DC value
        let window = 1024usize;
        let mut pv = PhaseVocoder::new(1.0, 2.0, window, 4).unwrap();
        let hop = pv.hop_size();
        assert_eq!(hop, 128);

        let total = 8192;
        let mut acc = vec![0.0f32; total];
        let mut emitted = 0usize;
        for _ in 0..total {
            if pv.push_sample(0.5) > 0 {
                for (j, &s) in pv.frame().iter().enumerate() {
                    acc[emitted * hop + j] += s;
                }
                emitted += 1;
            }
        }
        assert!(emitted >= 16);

        let valid_end = (emitted - 8) * hop;
        for i in window..valid_end {
            assert!(
                (acc[i] - 0.5).abs() < 0.005,
                "DC off at {i}: {}",
                acc[i]
            );
        }
    }
}
