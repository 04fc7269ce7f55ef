use std::time::Duration;

use crate::{ChoreoError, Result};

/// Counts 1..=beats within the active move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatCounter {
    count: u32,
    beats_per_move: u32,
}

impl Default for BeatCounter {
    fn default() -> Self {
        Self {
            count: 1,
            beats_per_move: 8,
        }
    }
}

impl BeatCounter {
    pub fn new(beats_per_move: u32) -> Self {
        Self {
            count: 1,
            beats_per_move: beats_per_move.max(1),
        }
    }

    /// Restarts counting at 1 for a move lasting `beats_per_move` beats.
    pub fn reset(&mut self, beats_per_move: u32) {
        *self = Self::new(beats_per_move);
    }

    /// Moves to the next beat, wrapping back to 1 after the last one.
    pub fn advance(&mut self) -> u32 {
        self.count = self.count % self.beats_per_move + 1;
        self.count
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn beats_per_move(&self) -> u32 {
        self.beats_per_move
    }
}

/// Time between beats at `bpm` (`60000 / bpm` milliseconds).
pub fn beat_interval(bpm: f64) -> Result<Duration> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(ChoreoError::InvalidBpm(bpm));
    }
    Ok(Duration::from_secs_f64(60.0 / bpm))
}
