//! Construction-time configuration for the effect.

use crate::error::GamelanizerError;

/// Default interval between subdivision levels: a perfect fourth.
pub const DEFAULT_PITCH_RATIO: f64 = 4.0 / 3.0;

/// Configuration for the gamelanizer effect.
///
/// All fields are fixed for the lifetime of the instance; the audio path
/// never revalidates them.
#[derive(Debug, Clone, PartialEq)]
pub struct GamelanizerConfig {
    /// Host block size in samples. Every `process_block` call must present
    /// exactly this many samples.
    pub block_size: usize,
    /// STFT analysis window size. Power of two.
    pub window_size: usize,
    /// Analysis overlap factor; the analysis hop is `window_size / overlap`.
    pub overlap: usize,
    /// Number of subdivision levels. Level `l` (1-based) plays `2^(l+1)`
    /// notes per pair of source beats.
    pub levels: usize,
    pub sample_rate: u32,
    /// Interval applied per level; level `l` is shifted by this ratio to the
    /// power `l`.
    pub pitch_ratio: f64,
    /// Upper bound on `sample_rate * 60 / bpm`, used to size every ring
    /// buffer at construction.
    pub max_samples_per_beat: usize,
}

impl Default for GamelanizerConfig {
    fn default() -> Self {
        Self {
            block_size: 1024,
            window_size: 1024,
            overlap: 4,
            levels: 2,
            sample_rate: 44100,
            pitch_ratio: DEFAULT_PITCH_RATIO,
            max_samples_per_beat: 400_000,
        }
    }
}

impl GamelanizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_pitch_ratio(mut self, pitch_ratio: f64) -> Self {
        self.pitch_ratio = pitch_ratio;
        self
    }

    pub fn with_max_samples_per_beat(mut self, max: usize) -> Self {
        self.max_samples_per_beat = max;
        self
    }

    /// Checks every construction-time constraint.
    pub fn validate(&self) -> Result<(), GamelanizerError> {
        if self.block_size == 0 {
            return Err(GamelanizerError::InvalidBlockSize(self.block_size));
        }
        if self.window_size < 2 || !self.window_size.is_power_of_two() {
            return Err(GamelanizerError::InvalidWindowSize(self.window_size));
        }
        if self.overlap < 2 || self.window_size % self.overlap != 0 {
            return Err(GamelanizerError::InvalidOverlap {
                window: self.window_size,
                overlap: self.overlap,
            });
        }
        if self.levels == 0 {
            return Err(GamelanizerError::InvalidLevels(self.levels));
        }
        if !(self.pitch_ratio > 0.0) || !self.pitch_ratio.is_finite() {
            return Err(GamelanizerError::InvalidPitchRatio(self.pitch_ratio));
        }
        Ok(())
    }
}

/// Parses a pitch ratio from CLI text, accepting `"4/3"` or `"1.5"` forms.
pub fn parse_pitch_ratio(text: &str) -> Result<f64, GamelanizerError> {
    let value = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num
                .trim()
                .parse()
                .map_err(|_| GamelanizerError::UnparsablePitchRatio(text.to_string()))?;
            let den: f64 = den
                .trim()
                .parse()
                .map_err(|_| GamelanizerError::UnparsablePitchRatio(text.to_string()))?;
            num / den
        }
        None => text
            .trim()
            .parse()
            .map_err(|_| GamelanizerError::UnparsablePitchRatio(text.to_string()))?,
    };
    if !(value > 0.0) || !value.is_finite() {
        return Err(GamelanizerError::InvalidPitchRatio(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(GamelanizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = GamelanizerConfig::new()
            .with_block_size(512)
            .with_window_size(2048)
            .with_overlap(8)
            .with_levels(3)
            .with_sample_rate(48000)
            .with_pitch_ratio(1.5)
            .with_max_samples_per_beat(100_000);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.window_size, 2048);
        assert_eq!(config.overlap, 8);
        assert_eq!(config.levels, 3);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.pitch_ratio, 1.5);
        assert_eq!(config.max_samples_per_beat, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let base = GamelanizerConfig::default();
        assert!(matches!(
            base.clone().with_window_size(1000).validate(),
            Err(GamelanizerError::InvalidWindowSize(1000))
        ));
        assert!(matches!(
            base.clone().with_overlap(1).validate(),
            Err(GamelanizerError::InvalidOverlap { .. })
        ));
        assert!(matches!(
            base.clone().with_levels(0).validate(),
            Err(GamelanizerError::InvalidLevels(0))
        ));
        assert!(matches!(
            base.clone().with_pitch_ratio(-1.0).validate(),
            Err(GamelanizerError::InvalidPitchRatio(_))
        ));
        assert!(matches!(
            base.with_block_size(0).validate(),
            Err(GamelanizerError::InvalidBlockSize(0))
        ));
    }

    #[test]
    fn test_parse_pitch_ratio() {
        assert!((parse_pitch_ratio("4/3").unwrap() - 4.0 / 3.0).abs() < 1e-12);
        assert!((parse_pitch_ratio("3 / 2").unwrap() - 1.5).abs() < 1e-12);
        assert!((parse_pitch_ratio("1.25").unwrap() - 1.25).abs() < 1e-12);
        assert!(parse_pitch_ratio("fourth").is_err());
        assert!(parse_pitch_ratio("-2/3").is_err());
        assert!(parse_pitch_ratio("1/0").is_err());
    }
}
