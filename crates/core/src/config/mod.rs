use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the synchronization core.
///
/// Every field falls back to its default, so a config file only needs to
/// mention the heuristics it wants to tune.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
    pub alignment: AlignmentConfig,
    pub structure: StructureConfig,
    pub routine: RoutineConfig,
}

impl AppConfig {
    /// Parses a (possibly partial) JSON document into a configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Configuration for the per-tick synchronizer and its timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Period of the progress-poll timer.
    pub poll_interval_ms: u64,
    /// A lyric gap longer than this (strictly) counts as instrumental.
    pub instrumental_gap_seconds: f64,
    /// Trailing share of the routine whose moves use the "finish" messages.
    pub finish_fraction: f64,
    /// Chance of an "encourage" message for a mid-routine move change.
    pub encourage_probability: f64,
    /// Tempo used when neither the song nor its routine carries one.
    pub default_bpm: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            instrumental_gap_seconds: 5.0,
            finish_fraction: 0.15,
            encourage_probability: 0.3,
            default_bpm: 120.0,
        }
    }
}

/// Configuration for matching authored lyric lines to transcript segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Lines whose best weighted score falls below this stay unmatched.
    /// `0.0` means every line matches something while candidates remain.
    pub min_similarity: f64,
    /// Maximum distance between a line's and a segment's relative position.
    /// `None` searches every remaining segment.
    pub search_window: Option<f64>,
    /// How strongly positional distance discounts the similarity score.
    pub position_weight: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.1,
            search_window: Some(0.3),
            position_weight: 0.5,
        }
    }
}

/// Heuristics used by the song structure segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub pre_chorus_max_lines: usize,
    /// Relative position in the lyric span after which unique verses become bridges.
    pub bridge_start_fraction: f64,
    /// A candidate bridge resembling another section above this is not unique.
    pub bridge_uniqueness_similarity: f64,
    /// The first lyric must start at least this late for an intro label.
    pub intro_lead_seconds: f64,
    pub intro_max_lines: usize,
    /// The track must run at least this long past the last lyric for an outro label.
    pub outro_tail_seconds: f64,
    pub outro_max_lines: usize,
    /// Normalized lines shorter than this never count as repeated.
    pub min_repeat_chars: usize,
    /// Split same-typed runs at lyric gaps longer than this.
    pub section_break_gap_seconds: Option<f64>,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            pre_chorus_max_lines: 3,
            bridge_start_fraction: 0.6,
            bridge_uniqueness_similarity: 0.5,
            intro_lead_seconds: 10.0,
            intro_max_lines: 4,
            outro_tail_seconds: 10.0,
            outro_max_lines: 4,
            min_repeat_chars: 0,
            section_break_gap_seconds: None,
        }
    }
}

/// Configuration for routine resolution and duration correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineConfig {
    pub fallback_move_id: String,
    /// Duration mismatches up to this many seconds are left alone.
    pub rescale_tolerance_seconds: f64,
    /// No rescaled move may start closer than this to the end of the media.
    pub end_guard_seconds: f64,
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            fallback_move_id: "step_touch".to_string(),
            rescale_tolerance_seconds: 30.0,
            end_guard_seconds: 10.0,
        }
    }
}
