//! Timestamping of pasted lyric lines against a machine transcript.
//!
//! Each authored line is matched to the most similar transcript segment that
//! comes after the previous match, so the resulting timeline never jumps
//! backwards. Lines without an acceptable match keep no timing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::AlignmentConfig,
    lyrics::{self, LyricSegment},
    LyricTrack, Result,
};

/// One timed segment produced by the transcription backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// Body returned by the transcription backend: either a transcript or an
/// error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptResponse {
    Failed {
        error: String,
    },
    Transcript {
        segments: Vec<TranscriptSegment>,
        #[serde(default)]
        text: String,
    },
}

impl TranscriptResponse {
    /// Usable segments of the response. Failures yield an empty list, and
    /// music markers or degenerate timings are dropped.
    pub fn into_segments(self) -> Vec<TranscriptSegment> {
        match self {
            TranscriptResponse::Failed { error } => {
                debug!(%error, "transcription failed; aligning against an empty transcript");
                Vec::new()
            }
            TranscriptResponse::Transcript { segments, .. } => segments
                .into_iter()
                .filter(|seg| {
                    !lyrics::is_noise(&seg.text)
                        && seg.start.is_finite()
                        && seg.end.is_finite()
                        && seg.end > seg.start
                })
                .collect(),
        }
    }
}

/// Outcome for a single authored line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignedLine {
    pub text: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub matched_segment_index: Option<usize>,
    /// Raw word-set similarity with the matched segment.
    pub similarity_score: f64,
    /// Similarity after the positional discount, used for ranking.
    pub weighted_score: f64,
}

impl AlignedLine {
    fn unmatched(text: &str) -> Self {
        Self {
            text: text.to_string(),
            start: None,
            end: None,
            matched_segment_index: None,
            similarity_score: 0.0,
            weighted_score: 0.0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched_segment_index.is_some()
    }
}

/// Alignment of every authored line, in authored order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub lines: Vec<AlignedLine>,
}

impl Alignment {
    pub fn matched_count(&self) -> usize {
        self.lines.iter().filter(|line| line.is_matched()).count()
    }

    /// True when no line received a timestamp; callers show plain text then.
    pub fn is_untimed(&self) -> bool {
        self.matched_count() == 0
    }

    /// Renderable track made of the matched lines only.
    pub fn to_track(&self) -> Result<LyricTrack> {
        let segments = self
            .lines
            .iter()
            .filter_map(|line| match (line.start, line.end) {
                (Some(start), Some(end)) => Some(LyricSegment::new(line.text.clone(), start, end)),
                _ => None,
            })
            .collect();
        LyricTrack::repaired(segments)
    }
}

/// Matches authored lines to transcript segments by word overlap.
#[derive(Debug, Clone, Default)]
pub struct SimilarityAligner {
    config: AlignmentConfig,
}

impl SimilarityAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Splits pasted lyrics into trimmed, non-empty lines.
    pub fn split_lines(pasted: &str) -> Vec<String> {
        pasted
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Aligns `lines` against `transcript`.
    ///
    /// A line may only match a segment after the one matched by the previous
    /// line. Among candidates the highest weighted score wins and ties go to
    /// the earliest segment.
    pub fn align<S: AsRef<str>>(&self, lines: &[S], transcript: &[TranscriptSegment]) -> Alignment {
        let line_count = lines.len();
        let segment_count = transcript.len();
        let mut next_free = 0;
        let mut aligned = Vec::with_capacity(line_count);

        for (i, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            let expected = i as f64 / line_count as f64;
            let mut best: Option<(usize, f64, f64)> = None;

            for (j, segment) in transcript.iter().enumerate().skip(next_free) {
                let distance = (j as f64 / segment_count as f64 - expected).abs();
                if self.config.search_window.is_some_and(|window| distance > window) {
                    continue;
                }

                let similarity = lyrics::similarity(line, &segment.text);
                let weighted = similarity * (1.0 - self.config.position_weight * distance).max(0.0);
                if best.map_or(true, |(_, score, _)| weighted > score) {
                    best = Some((j, weighted, similarity));
                }
            }

            match best {
                Some((j, weighted, similarity)) if weighted >= self.config.min_similarity => {
                    let segment = &transcript[j];
                    debug!(line = i, segment = j, similarity, "matched lyric line");
                    aligned.push(AlignedLine {
                        text: line.to_string(),
                        start: Some(segment.start),
                        end: Some(segment.end),
                        matched_segment_index: Some(j),
                        similarity_score: similarity,
                        weighted_score: weighted,
                    });
                    next_free = j + 1;
                }
                _ => {
                    debug!(line = i, "no transcript match for lyric line");
                    aligned.push(AlignedLine::unmatched(line));
                }
            }
        }

        let alignment = Alignment { lines: aligned };
        info!(
            matched = alignment.matched_count(),
            lines = line_count,
            segments = segment_count,
            "aligned lyrics to transcript"
        );
        alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Vec<TranscriptSegment> {
        vec![
            TranscriptSegment::new("hello world there", 0.0, 2.0),
            TranscriptSegment::new("goodbye now friend", 5.0, 7.0),
        ]
    }

    #[test]
    fn matches_lines_in_order() {
        let aligner = SimilarityAligner::default();
        let alignment = aligner.align(&["hello world", "goodbye now"], &transcript());

        assert_eq!(alignment.lines[0].matched_segment_index, Some(0));
        assert_eq!(alignment.lines[1].matched_segment_index, Some(1));
        assert!(alignment.lines.iter().all(|line| line.similarity_score > 0.3));
        assert_eq!(alignment.lines[1].start, Some(5.0));
        assert_eq!(alignment.lines[1].end, Some(7.0));
    }

    #[test]
    fn reversed_transcript_cannot_pull_matches_backwards() {
        let mut reversed = transcript();
        reversed.reverse();

        for search_window in [Some(0.3), None] {
            let aligner = SimilarityAligner::new(AlignmentConfig {
                search_window,
                ..AlignmentConfig::default()
            });
            let alignment = aligner.align(&["hello world", "goodbye now"], &reversed);
            assert_ne!(alignment.lines[1].matched_segment_index, Some(0));
        }
    }

    #[test]
    fn unwindowed_search_consumes_segments_monotonically() {
        let aligner = SimilarityAligner::new(AlignmentConfig {
            search_window: None,
            ..AlignmentConfig::default()
        });
        let mut reversed = transcript();
        reversed.reverse();

        let alignment = aligner.align(&["hello world", "goodbye now"], &reversed);
        assert_eq!(alignment.lines[0].matched_segment_index, Some(1));
        assert!(!alignment.lines[1].is_matched());
        assert_eq!(alignment.lines[1].start, None);
    }

    #[test]
    fn empty_transcript_leaves_every_line_unmatched() {
        let aligner = SimilarityAligner::default();
        let alignment = aligner.align(&["one line", "another line"], &[]);

        assert_eq!(alignment.lines.len(), 2);
        assert!(alignment.is_untimed());
        assert!(alignment.to_track().unwrap().is_empty());
    }

    #[test]
    fn zero_floor_always_matches_a_remaining_segment() {
        let aligner = SimilarityAligner::new(AlignmentConfig {
            min_similarity: 0.0,
            search_window: None,
            ..AlignmentConfig::default()
        });
        let alignment = aligner.align(&["nothing in common"], &transcript());

        assert_eq!(alignment.lines[0].matched_segment_index, Some(0));
        assert_eq!(alignment.lines[0].similarity_score, 0.0);
    }

    #[test]
    fn track_keeps_only_matched_lines() {
        let aligner = SimilarityAligner::new(AlignmentConfig {
            search_window: None,
            ..AlignmentConfig::default()
        });
        let lines = ["hello world", "no such words", "goodbye now"];
        let alignment = aligner.align(&lines, &transcript());
        let track = alignment.to_track().unwrap();

        assert_eq!(alignment.matched_count(), 2);
        assert_eq!(track.len(), 2);
        assert_eq!(track.segments()[1].text, "goodbye now");
    }

    #[test]
    fn error_payload_decodes_to_empty_transcript() {
        let failed: TranscriptResponse =
            serde_json::from_str(r#"{"error": "whisper crashed"}"#).unwrap();
        assert!(failed.into_segments().is_empty());

        let ok: TranscriptResponse = serde_json::from_str(
            r#"{"segments": [{"text": "[Music]", "start": 0, "end": 4},
                             {"text": "real words", "start": 4, "end": 6}],
                "text": "real words"}"#,
        )
        .unwrap();
        let segments = ok.into_segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "real words");
    }

    #[test]
    fn splits_pasted_lyrics() {
        let lines = SimilarityAligner::split_lines("  first line \n\n second\n   \n");
        assert_eq!(lines, ["first line", "second"]);
    }
}
