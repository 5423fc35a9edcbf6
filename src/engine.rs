//! Beat-aligned scheduling of the subdivision lanes.
//!
//! The engine drives every lane sample by sample, splats each synthesized
//! frame into that lane's output ring at one write head per replica, and
//! rolls the beat state machine when the play position crosses a beat
//! boundary. The dry signal runs through a delay line sized so the first
//! subdivided copy of a beat lands together with the original two beats
//! later.

use crate::config::GamelanizerConfig;
use crate::dsp::ftz;
use crate::error::GamelanizerError;
use crate::vocoder::PhaseVocoder;

const DENORMAL_LIMIT: f32 = 1e-20;

/// One subdivision level and its output ring.
#[derive(Debug)]
struct Lane {
    vocoder: PhaseVocoder,
    /// Notes this level plays per pair of source beats: `2^(level+1)`.
    replicas: usize,
    /// Width of one scaled beat in output samples.
    width: i64,
    /// Unwrapped write cursor; reduced modulo the ring length on access.
    write_pos: i64,
    /// Synthesis samples credited to the current beat.
    accumulated: i64,
    ring: Vec<f32>,
}

impl Lane {
    /// Accumulates the vocoder's current frame at every replica head.
    ///
    /// Replica `i` sits `2 * i` scaled beats past the lead head, producing
    /// the alternating A,B,A,B pattern of the subdivided layer.
    fn splat(&mut self, beat_len: f64) {
        let ring_len = self.ring.len() as i64;
        let scaled = beat_len / self.replicas as f64;
        let step = 2.0 * scaled;
        let frame = self.vocoder.frame();
        for i in 0..self.replicas {
            let head = self.write_pos + (step * i as f64) as i64;
            for (j, &sample) in frame.iter().enumerate() {
                let idx = (head + j as i64).rem_euclid(ring_len) as usize;
                self.ring[idx] += sample;
            }
        }
    }
}

/// The beat-aligned scheduler.
///
/// Owns the lanes, their output rings, the dry delay line, and the beat
/// state machine. Everything is preallocated; the per-sample path performs
/// no allocation and no locking.
#[derive(Debug)]
pub struct Engine {
    sample_rate: f64,
    lanes: Vec<Lane>,
    out_len: usize,
    out_read_pos: usize,
    delay: Vec<f32>,
    dly_write: usize,
    dly_read: usize,

    samples_per_beat: f64,
    beat_number: u32,
    /// True while the current beat is the second of its pair.
    beat_b: bool,
    /// Current beat's [start, end) in absolute input samples.
    beat_start: u64,
    beat_end: u64,
    samples_into_beat: u64,
    is_playing: bool,
}

impl Engine {
    pub fn new(config: &GamelanizerConfig) -> Result<Self, GamelanizerError> {
        config.validate()?;

        let out_len = config.max_samples_per_beat * 4;
        let delay_len = config.max_samples_per_beat * 3;

        let mut lanes = Vec::with_capacity(config.levels);
        for level in 0..config.levels {
            let replicas = 1usize << (level + 1);
            let pitch = config.pitch_ratio.powi(level as i32 + 1);
            let vocoder =
                PhaseVocoder::new(pitch, replicas as f64, config.window_size, config.overlap)?;
            lanes.push(Lane {
                vocoder,
                replicas,
                width: 0,
                write_pos: 0,
                accumulated: 0,
                ring: vec![0.0; out_len],
            });
        }

        Ok(Self {
            sample_rate: config.sample_rate as f64,
            lanes,
            out_len,
            out_read_pos: 0,
            delay: vec![0.0; delay_len],
            dly_write: 0,
            dly_read: 0,
            samples_per_beat: 0.0,
            beat_number: 0,
            beat_b: false,
            beat_start: 0,
            beat_end: 0,
            samples_into_beat: 0,
            is_playing: false,
        })
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Completed beats since first play.
    #[inline]
    pub fn beats_completed(&self) -> u32 {
        self.beat_number
    }

    /// Adopts the session tempo and lays out the write cursors.
    ///
    /// Called once, on the first processed block. The lead write head of the
    /// innermost level starts two beats ahead of the read cursor; each
    /// coarser level starts one scaled beat further out, and the dry delay
    /// spans the sum of all of them.
    pub fn start(&mut self, bpm: f64) {
        let spb = self.sample_rate * 60.0 / bpm;
        debug_assert!(spb.ceil() as usize * 3 <= self.delay.len());

        self.samples_per_beat = spb;
        self.beat_number = 0;
        self.beat_b = false;
        self.samples_into_beat = 0;
        self.out_read_pos = 0;
        self.beat_start = 0;
        self.beat_end = spb.round() as u64;

        for (level, lane) in self.lanes.iter_mut().enumerate() {
            lane.width = (spb / (1u64 << (level + 1)) as f64).round() as i64;
            lane.accumulated = 0;
        }

        let innermost = self.lanes.len() - 1;
        self.lanes[innermost].write_pos = (2.0 * spb).round() as i64;
        for level in (0..innermost).rev() {
            self.lanes[level].write_pos =
                self.lanes[level + 1].write_pos + self.lanes[level + 1].width;
        }
        let width_sum: i64 = self.lanes.iter().map(|lane| lane.width).sum();
        let delay_time = (2.0 * spb + width_sum as f64).ceil() as i64;
        self.dly_read =
            (self.dly_write as i64 - delay_time).rem_euclid(self.delay.len() as i64) as usize;

        self.is_playing = true;
    }

    /// Processes one input sample and returns the wet mix for it.
    pub fn process_sample(&mut self, input: f32) -> f32 {
        self.delay[self.dly_write] = input;

        let mut output = self.delay[self.dly_read];
        let read = self.out_read_pos;
        for lane in &mut self.lanes {
            output += ftz(lane.ring[read], DENORMAL_LIMIT);
            lane.ring[read] = 0.0;
        }

        let beat_len = (self.beat_end - self.beat_start) as f64;
        for lane in &mut self.lanes {
            let hop = lane.vocoder.push_sample(input);
            if hop > 0 {
                lane.accumulated += hop as i64;
                lane.splat(beat_len);
                lane.write_pos += hop as i64;
            }
        }

        if self.samples_into_beat + self.beat_start >= self.beat_end {
            self.next_beat();
        } else {
            self.samples_into_beat += 1;
        }

        self.out_read_pos += 1;
        if self.out_read_pos == self.out_len {
            self.out_read_pos = 0;
        }
        self.dly_write += 1;
        if self.dly_write == self.delay.len() {
            self.dly_write = 0;
        }
        self.dly_read += 1;
        if self.dly_read == self.delay.len() {
            self.dly_read = 0;
        }

        output
    }

    /// Rolls the beat state machine at a beat boundary.
    fn next_beat(&mut self) {
        let beat_len = (self.beat_end - self.beat_start) as f64;

        // integer hops rarely sum to the exact level width; nudge each
        // cursor so consecutive beats land exactly one width apart
        for lane in &mut self.lanes {
            let missing = lane.width - lane.accumulated;
            lane.write_pos += missing;
            lane.accumulated = 0;
            lane.vocoder.reset();
        }

        if self.beat_b {
            // the lead head sits at the end of the pair's second note; skip
            // the replicas that the splat step already scheduled
            for lane in &mut self.lanes {
                let scaled = beat_len / lane.replicas as f64;
                let notes_to_jump = (2 * lane.replicas - 2) as f64;
                lane.write_pos += (scaled * notes_to_jump) as i64;
            }
        }

        self.samples_into_beat = 0;
        self.beat_number += 1;
        self.beat_start = self.beat_end;
        self.beat_end = (self.samples_per_beat * (self.beat_number as f64 + 1.0)).round() as u64;
        self.beat_b = !self.beat_b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GamelanizerConfig {
        GamelanizerConfig::default().with_max_samples_per_beat(30_000)
    }

    #[test]
    fn test_start_lays_out_cursors() {
        let mut engine = Engine::new(&test_config()).unwrap();
        engine.start(120.0);
        assert!(engine.is_playing());
        assert_eq!(engine.samples_per_beat, 22050.0);
        assert_eq!(engine.beat_end, 22050);
        assert_eq!(engine.lanes[0].width, 11025);
        assert_eq!(engine.lanes[1].width, 5513);
        assert_eq!(engine.lanes[1].write_pos, 44100);
        assert_eq!(engine.lanes[0].write_pos, 44100 + 5513);
        // dry delay spans two beats plus every level width
        let delay_time = 44100 + 11025 + 5513;
        let delay_len = engine.delay.len() as i64;
        assert_eq!(
            engine.dly_read as i64,
            (-(delay_time as i64)).rem_euclid(delay_len)
        );
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut engine = Engine::new(&test_config()).unwrap();
        engine.start(120.0);
        for n in 0..88_200 {
            let y = engine.process_sample(0.0);
            assert!(y == 0.0, "non-zero output {y} at sample {n}");
        }
        assert!(engine.beats_completed() >= 3);
    }

    #[test]
    fn test_impulse_dry_path_arrives_at_delay_time() {
        let mut engine = Engine::new(&test_config()).unwrap();
        engine.start(120.0);
        let delay_time = 44100 + 11025 + 5513;
        let earliest_wet = engine.lanes[1].write_pos as usize;

        let mut output = Vec::with_capacity(61_000);
        for n in 0..61_000 {
            let x = if n == 0 { 1.0 } else { 0.0 };
            output.push(engine.process_sample(x));
        }

        for (n, &y) in output.iter().enumerate().take(earliest_wet) {
            assert!(y == 0.0, "output {y} before any write head at sample {n}");
        }
        assert_eq!(output[delay_time], 1.0);
        assert!(output[delay_time - 1].abs() < 1e-12);
    }

    #[test]
    fn test_write_cursor_advances_one_width_per_beat() {
        let mut engine = Engine::new(&test_config()).unwrap();
        engine.start(120.0);
        let first: Vec<i64> = engine.lanes.iter().map(|l| l.write_pos).collect();

        // 22050 samples of beat A plus the rollover sample
        for _ in 0..22_051 {
            engine.process_sample(0.25);
        }
        assert_eq!(engine.beats_completed(), 1);
        for (lane, &start) in engine.lanes.iter().zip(&first) {
            assert_eq!(lane.write_pos, start + lane.width);
        }
    }

    #[test]
    fn test_write_heads_jump_after_beat_b() {
        let mut engine = Engine::new(&test_config()).unwrap();
        engine.start(120.0);

        // the rollover sample itself never counts into the beat, so beat k
        // completes at sample k * 22050 + (k - 1)
        for _ in 0..44_102 {
            engine.process_sample(0.25);
        }
        assert_eq!(engine.beats_completed(), 2);
        // two widths of normal advance plus the skip over the scheduled
        // replicas: floor(beat_len / replicas * (2 * replicas - 2))
        assert_eq!(engine.lanes[0].write_pos, 49613 + 2 * 11025 + 22050);
        assert_eq!(engine.lanes[1].write_pos, 44100 + 2 * 5513 + 33075);
    }

    #[test]
    fn test_deterministic_output() {
        let run = || {
            let mut engine = Engine::new(&test_config()).unwrap();
            engine.start(97.0);
            (0..44_100)
                .map(|i| {
                    let x = (i as f32 * 0.013).sin() * 0.5;
                    engine.process_sample(x)
                })
                .collect::<Vec<f32>>()
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        assert!(a.iter().all(|y| y.is_finite()));
    }
}
