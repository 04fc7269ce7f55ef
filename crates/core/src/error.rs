use crate::playback::PlaybackPhase;

/// Result alias that carries the custom [`ChoreoError`] type.
pub type Result<T> = std::result::Result<T, ChoreoError>;

/// Common error type for the core crate.
///
/// Out-of-range times, unknown moves and missing lyrics are expected inputs and
/// never end up here; they resolve to sentinel values instead.
#[derive(Debug, thiserror::Error)]
pub enum ChoreoError {
    /// Free-form error carrying a readable message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON input (song payloads, transcripts, config files).
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// An interval whose end does not lie after its start.
    #[error("interval {index} is empty or inverted ({start}s..{end}s)")]
    InvalidInterval { index: usize, start: f64, end: f64 },
    /// A sequence that must be sorted by start time is not.
    #[error("interval {index} starts before its predecessor")]
    Unsorted { index: usize },
    /// A playback action that the current phase does not allow.
    #[error("cannot {action} while {from:?}")]
    InvalidTransition {
        from: PlaybackPhase,
        action: &'static str,
    },
    #[error("bpm must be positive and finite, got {0}")]
    InvalidBpm(f64),
}

impl ChoreoError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for ChoreoError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ChoreoError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
