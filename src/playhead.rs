//! Transport position reporting over a tempo-marker table.

use serde::{Deserialize, Serialize};

use crate::error::GamelanizerError;

/// One tempo region, anchored at an absolute time in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoMarker {
    /// Start of the region, in seconds from session start.
    pub time_position: f64,
    pub bpm: f64,
    pub time_sig_top: u16,
    pub time_sig_bottom: u16,
}

impl TempoMarker {
    pub fn new(time_position: f64, bpm: f64, time_sig_top: u16, time_sig_bottom: u16) -> Self {
        Self {
            time_position,
            bpm,
            time_sig_top,
            time_sig_bottom,
        }
    }
}

/// Position report for one host block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayHeadPosition {
    pub bpm: f64,
    /// Position in quarter notes, fractional.
    pub ppq: f64,
    pub time_samples: u64,
    pub time_seconds: f64,
}

/// Maps an absolute sample index to musical time.
///
/// The marker table is validated once at construction and immutable for the
/// session. Mutation happens only between blocks, via [`move_to_sample`].
///
/// [`move_to_sample`]: PlayHead::move_to_sample
#[derive(Clone, Debug)]
pub struct PlayHead {
    markers: Vec<TempoMarker>,
    time_seconds: f64,
    time_samples: u64,
}

impl PlayHead {
    /// Builds a play head over a sorted marker table.
    ///
    /// The table must be non-empty, start at 0.0 s, be sorted by time, and
    /// carry positive tempos throughout.
    pub fn new(markers: Vec<TempoMarker>) -> Result<Self, GamelanizerError> {
        let first = markers.first().ok_or(GamelanizerError::EmptyTempoMap)?;
        if first.time_position != 0.0 {
            return Err(GamelanizerError::TempoMapNotAtZero(first.time_position));
        }
        for pair in markers.windows(2) {
            if pair[1].time_position < pair[0].time_position {
                return Err(GamelanizerError::TempoMapOutOfOrder);
            }
        }
        for marker in &markers {
            if !(marker.bpm > 0.0) {
                return Err(GamelanizerError::InvalidBpm(marker.bpm));
            }
        }
        Ok(Self {
            markers,
            time_seconds: 0.0,
            time_samples: 0,
        })
    }

    pub fn markers(&self) -> &[TempoMarker] {
        &self.markers
    }

    /// Moves the play head to an absolute sample index.
    pub fn move_to_sample(&mut self, sample: u64, sample_rate: u32) {
        self.time_seconds = sample as f64 / sample_rate as f64;
        self.time_samples = sample;
    }

    /// Reports the current musical position.
    ///
    /// PPQ is accumulated over every completed marker span, then the partial
    /// span under the active marker is added at that marker's tempo.
    pub fn position(&self) -> PlayHeadPosition {
        let (active, mut ppq) = self.active_marker_and_prior_ppq();
        let marker = &self.markers[active];
        let partial_s = self.time_seconds - marker.time_position;
        ppq += marker.bpm / 60.0 * partial_s;

        PlayHeadPosition {
            bpm: marker.bpm,
            ppq,
            time_samples: self.time_samples,
            time_seconds: self.time_seconds,
        }
    }

    fn active_marker_and_prior_ppq(&self) -> (usize, f64) {
        let mut active = 0;
        let mut ppq = 0.0;
        for j in 1..self.markers.len() {
            if self.markers[j].time_position > self.time_seconds {
                break;
            }
            let prev = &self.markers[j - 1];
            let span_s = self.markers[j].time_position - prev.time_position;
            ppq += prev.bpm / 60.0 * span_s;
            active = j;
        }
        (active, ppq)
    }
}
