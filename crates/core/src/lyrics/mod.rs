//! Timed lyric segments and the text utilities shared by alignment and
//! structure detection.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{timeline::Lookup, ChoreoError, Result, TimeIndex};

/// Offset applied when pushing an overlapping segment past its predecessor.
const OVERLAP_NUDGE_SECONDS: f64 = 0.1;
/// Minimum length given to a segment whose nudge inverted it.
const REPAIRED_MIN_SECONDS: f64 = 2.0;

const NOISE_MARKERS: &[&str] = &[
    "music",
    "music playing",
    "[music]",
    "(music)",
    "instrumental",
    "[instrumental]",
    "♪",
    "♫",
    "...",
    "applause",
    "silence",
    "song lyrics",
    "lyrics",
    "singing",
    "[singing]",
    "(singing)",
];

/// One timed line of lyrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Index into the song's section list, filled in by segmentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<usize>,
}

impl LyricSegment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            section_index: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Ordered, non-overlapping lyric segments of one song with a lookup index.
#[derive(Debug, Clone)]
pub struct LyricTrack {
    segments: Vec<LyricSegment>,
    index: TimeIndex,
}

impl LyricTrack {
    /// Strict constructor: segments must already be sorted, non-empty and
    /// non-overlapping.
    pub fn new(segments: Vec<LyricSegment>) -> Result<Self> {
        let index = TimeIndex::closed(segments.iter().map(|seg| (seg.start, seg.end)))?;
        Ok(Self { segments, index })
    }

    /// Lenient constructor for externally supplied segments. Blank or
    /// degenerate segments are dropped, the rest sorted and overlaps pushed
    /// forward.
    pub fn repaired(segments: Vec<LyricSegment>) -> Result<Self> {
        let mut segments: Vec<LyricSegment> = segments
            .into_iter()
            .filter(|seg| {
                !seg.text.trim().is_empty()
                    && seg.start.is_finite()
                    && seg.end.is_finite()
                    && seg.end > seg.start
            })
            .collect();
        segments.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(Ordering::Equal));

        for i in 1..segments.len() {
            let previous_end = segments[i - 1].end;
            let seg = &mut segments[i];
            if seg.start < previous_end {
                seg.start = previous_end + OVERLAP_NUDGE_SECONDS;
                if seg.end <= seg.start {
                    seg.end = seg.start + REPAIRED_MIN_SECONDS;
                }
            }
        }

        Self::new(segments)
    }

    /// Moves every segment by `offset` seconds, clamping times at zero.
    /// Segments pushed entirely before the start of the media are dropped.
    pub fn shifted(&self, offset: f64) -> Result<Self> {
        if !offset.is_finite() {
            return Err(ChoreoError::msg(format!("lyric offset must be finite, got {offset}")));
        }

        let segments = self
            .segments
            .iter()
            .filter_map(|seg| {
                let start = (seg.start + offset).max(0.0);
                let end = (seg.end + offset).max(0.0);
                (end > start).then(|| LyricSegment {
                    start,
                    end,
                    ..seg.clone()
                })
            })
            .collect();

        Self::new(segments)
    }

    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            index: TimeIndex::empty(),
        }
    }

    pub fn segments(&self) -> &[LyricSegment] {
        &self.segments
    }

    pub fn get(&self, index: usize) -> Option<&LyricSegment> {
        self.segments.get(index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn lookup(&self, t: f64) -> Lookup {
        self.index.lookup(t)
    }

    pub fn first_start(&self) -> Option<f64> {
        self.segments.first().map(|seg| seg.start)
    }

    pub fn last_end(&self) -> Option<f64> {
        self.segments.last().map(|seg| seg.end)
    }

    /// Records each segment's section back-reference. Extra entries are ignored.
    pub fn assign_sections(&mut self, line_sections: &[usize]) {
        for (seg, section) in self.segments.iter_mut().zip(line_sections) {
            seg.section_index = Some(*section);
        }
    }

    pub fn into_segments(self) -> Vec<LyricSegment> {
        self.segments
    }
}

/// Lower-cases, strips punctuation and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Set of normalized words in `text`.
pub fn tokens(text: &str) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the word sets of two texts, in `[0, 1]`.
/// Either side being empty yields `0.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}

/// Whether a transcript line is a music/noise marker rather than lyrics.
pub fn is_noise(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    if text.chars().count() < 2 || NOISE_MARKERS.contains(&text.as_str()) {
        return true;
    }
    if text.replace("music", "").replace(|c: char| c == ' ' || c == ',', "").is_empty() {
        return true;
    }
    text.matches("music").count() > 1
}
