//! Error types for the gamelanizer engine.

use std::fmt;

/// Errors that can occur while constructing the effect.
///
/// The audio path itself is total: every buffer is preallocated and every
/// index is modular, so all validation happens up front and returns one of
/// these.
#[derive(Debug, Clone, PartialEq)]
pub enum GamelanizerError {
    /// The analysis window size is not a power of two (or is zero).
    InvalidWindowSize(usize),
    /// The analysis overlap factor is below 2 or does not divide the window.
    InvalidOverlap { window: usize, overlap: usize },
    /// The number of subdivision levels is zero.
    InvalidLevels(usize),
    /// The pitch shift ratio is not a positive finite number.
    InvalidPitchRatio(f64),
    /// A pitch ratio string could not be parsed.
    UnparsablePitchRatio(String),
    /// The host block size is zero.
    InvalidBlockSize(usize),
    /// A tempo marker carries a non-positive bpm.
    InvalidBpm(f64),
    /// The tempo marker table is empty.
    EmptyTempoMap,
    /// The first tempo marker does not sit at time zero.
    TempoMapNotAtZero(f64),
    /// Tempo markers are not sorted by time position.
    TempoMapOutOfOrder,
    /// A marker's tempo produces beats longer than the configured maximum.
    BeatTooLong { samples_per_beat: f64, max: usize },
    /// A lane would need more queued input than the resampler queue holds.
    ResamplerQueueOverflow { needed: usize, capacity: usize },
}

impl fmt::Display for GamelanizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GamelanizerError::InvalidWindowSize(size) => {
                write!(f, "analysis window size must be a power of two, got {size}")
            }
            GamelanizerError::InvalidOverlap { window, overlap } => {
                write!(
                    f,
                    "overlap factor {overlap} must be >= 2 and divide the window size {window}"
                )
            }
            GamelanizerError::InvalidLevels(levels) => {
                write!(f, "need at least one subdivision level, got {levels}")
            }
            GamelanizerError::InvalidPitchRatio(ratio) => {
                write!(f, "pitch shift ratio must be positive and finite, got {ratio}")
            }
            GamelanizerError::UnparsablePitchRatio(s) => {
                write!(f, "cannot parse pitch ratio: {s:?}")
            }
            GamelanizerError::InvalidBlockSize(size) => {
                write!(f, "block size must be non-zero, got {size}")
            }
            GamelanizerError::InvalidBpm(bpm) => {
                write!(f, "tempo must be positive, got {bpm} bpm")
            }
            GamelanizerError::EmptyTempoMap => {
                write!(f, "tempo marker table is empty")
            }
            GamelanizerError::TempoMapNotAtZero(t) => {
                write!(f, "first tempo marker must sit at 0.0 s, got {t} s")
            }
            GamelanizerError::TempoMapOutOfOrder => {
                write!(f, "tempo markers are not sorted by time position")
            }
            GamelanizerError::BeatTooLong { samples_per_beat, max } => {
                write!(
                    f,
                    "beat of {samples_per_beat} samples exceeds the configured maximum of {max}"
                )
            }
            GamelanizerError::ResamplerQueueOverflow { needed, capacity } => {
                write!(
                    f,
                    "lane needs {needed} queued samples but the resampler queue holds {capacity}"
                )
            }
        }
    }
}

impl std::error::Error for GamelanizerError {}
