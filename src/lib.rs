//! Gamelanizer: a beat-synchronous subdivision effect.
//!
//! Given a monophonic input annotated with a tempo, the effect layers
//! progressively faster, pitch-shifted echoes of each beat over a delayed
//! copy of the dry signal, in the manner of gamelan figuration: level `l`
//! plays `2^(l+1)` notes per pair of source beats, each time-compressed by
//! `2^l` and pitch-shifted by the configured interval to the power `l`.
//!
//! The host presents fixed-size mono blocks and receives the wet mix in
//! place. All state lives in the [`Gamelanizer`] instance; the audio path
//! allocates nothing and never locks.

#[cfg(feature = "native")]
pub mod audio;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod playhead;
pub mod resample;
#[cfg(feature = "native")]
pub mod telemetry;
pub mod vocoder;

#[cfg(feature = "native")]
use std::sync::Arc;
#[cfg(feature = "native")]
use std::sync::atomic::Ordering;

pub use config::{parse_pitch_ratio, GamelanizerConfig};
use engine::Engine;
pub use error::GamelanizerError;
use playhead::PlayHead;
pub use playhead::{PlayHeadPosition, TempoMarker};
#[cfg(feature = "native")]
pub use telemetry::EngineMetrics;

/// The host-facing effect: play head plus engine.
#[derive(Debug)]
pub struct Gamelanizer {
    config: GamelanizerConfig,
    play_head: PlayHead,
    engine: Engine,
    #[cfg(feature = "native")]
    pub metrics: Arc<EngineMetrics>,
}

impl Gamelanizer {
    /// Validates the configuration and tempo map and preallocates every
    /// buffer.
    ///
    /// The tempo map is immutable for the session; each marker's tempo must
    /// keep beats within `config.max_samples_per_beat`.
    pub fn new(
        config: GamelanizerConfig,
        tempo_markers: Vec<TempoMarker>,
    ) -> Result<Self, GamelanizerError> {
        config.validate()?;
        let play_head = PlayHead::new(tempo_markers)?;
        for marker in play_head.markers() {
            let samples_per_beat = config.sample_rate as f64 * 60.0 / marker.bpm;
            if samples_per_beat.ceil() as usize > config.max_samples_per_beat {
                return Err(GamelanizerError::BeatTooLong {
                    samples_per_beat,
                    max: config.max_samples_per_beat,
                });
            }
        }
        let engine = Engine::new(&config)?;
        Ok(Self {
            config,
            play_head,
            engine,
            #[cfg(feature = "native")]
            metrics: Arc::new(EngineMetrics::default()),
        })
    }

    pub fn config(&self) -> &GamelanizerConfig {
        &self.config
    }

    /// Current musical position of the play head.
    pub fn position(&self) -> PlayHeadPosition {
        self.play_head.position()
    }

    /// Processes one host block in place.
    ///
    /// `block` must hold exactly the configured block size of mono samples;
    /// `block_start_sample` is the absolute index of its first sample. The
    /// play head is consulted once per block, and the engine adopts the
    /// reported tempo on the first call.
    pub fn process_block(&mut self, block: &mut [f32], block_start_sample: u64) {
        debug_assert_eq!(block.len(), self.config.block_size);

        #[cfg(feature = "native")]
        let started_at = std::time::Instant::now();

        self.play_head
            .move_to_sample(block_start_sample, self.config.sample_rate);
        let position = self.play_head.position();
        if !self.engine.is_playing() {
            self.engine.start(position.bpm);
        }

        for sample in block.iter_mut() {
            *sample = self.engine.process_sample(*sample);
        }

        #[cfg(feature = "native")]
        {
            let elapsed_ns = started_at.elapsed().as_nanos() as u64;
            self.metrics.record_block(elapsed_ns);
            self.metrics
                .beats_completed
                .store(self.engine.beats_completed(), Ordering::Relaxed);
            self.metrics.blocks_processed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(bpm: f64) -> Vec<TempoMarker> {
        vec![TempoMarker::new(0.0, bpm, 4, 4)]
    }

    fn test_config(block_size: usize) -> GamelanizerConfig {
        GamelanizerConfig::default()
            .with_block_size(block_size)
            .with_max_samples_per_beat(30_000)
    }

    #[test]
    fn test_rejects_too_slow_tempo() {
        let err = Gamelanizer::new(test_config(1024), marker(20.0)).unwrap_err();
        assert!(matches!(err, GamelanizerError::BeatTooLong { .. }));
    }

    #[test]
    fn test_silence_blocks_stay_silent() {
        let mut fx = Gamelanizer::new(test_config(1024), marker(120.0)).unwrap();
        let mut block = vec![0.0f32; 1024];
        for i in 0..64u64 {
            fx.process_block(&mut block, i * 1024);
            assert!(block.iter().all(|y| *y == 0.0 && y.is_finite()));
        }
    }

    #[test]
    fn test_output_independent_of_block_size() {
        let input: Vec<f32> = (0..32_768)
            .map(|i| (i as f32 * 0.021).sin() * 0.4)
            .collect();

        let render = |block_size: usize| {
            let mut fx = Gamelanizer::new(test_config(block_size), marker(120.0)).unwrap();
            let mut output = input.clone();
            let mut start = 0u64;
            for block in output.chunks_mut(block_size) {
                fx.process_block(block, start);
                start += block_size as u64;
            }
            output
        };

        let coarse = render(1024);
        let fine = render(256);
        assert_eq!(coarse, fine);
    }

    #[test]
    fn test_position_reports_block_start() {
        let mut fx = Gamelanizer::new(test_config(1024), marker(120.0)).unwrap();
        let mut block = vec![0.0f32; 1024];
        fx.process_block(&mut block, 44_100);
        let pos = fx.position();
        assert_eq!(pos.time_samples, 44_100);
        assert!((pos.ppq - 2.0).abs() < 1e-9);
        assert_eq!(pos.bpm, 120.0);
    }
}
