//! Song payloads and the per-session bundle built from them.
//!
//! The live library response and the persistent cache entry carry the same
//! data under different shapes; both become a [`SongSnapshot`] and from there
//! a [`SongSession`], which playback treats as read-only.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::{AppConfig, RoutineConfig},
    lyrics::LyricSegment,
    routine::{MoveEntry, Routine, RoutineBuilder},
    structure::{Section, SectionTrack, Segmentation, StructureSegmenter},
    timeline::Lookup,
    LyricTrack, Result,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SongInfo {
    pub title: String,
    pub artist: String,
    /// Duration the routine was authored against, in seconds.
    pub duration: Option<f64>,
    pub bpm: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutineStructure {
    pub song_vibe: Option<String>,
    #[serde(rename = "estimatedBPM", alias = "estimatedBpm")]
    pub estimated_bpm: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutinePayload {
    pub moves: Vec<MoveEntry>,
    pub structure: Option<RoutineStructure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsPayload {
    pub segments: Vec<LyricSegment>,
    /// Kept loose; sections that fail to parse are dropped with a warning.
    pub structure: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SectionsPayload {
    sections: Vec<Section>,
}

/// Everything needed to play one song, as delivered by the song library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongSnapshot {
    pub song: SongInfo,
    pub routine: RoutinePayload,
    pub lyrics: Option<LyricsPayload>,
}

impl SongSnapshot {
    /// Parses either a live snapshot or a cache entry.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("choreography").is_some() {
            let entry: CacheEntry = serde_json::from_value(value)?;
            return Ok(entry.into());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Persisted form of a processed song.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheEntry {
    pub title: String,
    pub artist: String,
    pub duration: Option<f64>,
    pub bpm: Option<f64>,
    pub choreography: RoutinePayload,
    pub lyrics: Option<LyricsPayload>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<CacheEntry> for SongSnapshot {
    fn from(entry: CacheEntry) -> Self {
        Self {
            song: SongInfo {
                title: entry.title,
                artist: entry.artist,
                duration: entry.duration,
                bpm: entry.bpm,
            },
            routine: entry.choreography,
            lyrics: entry.lyrics,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Intro,
    Break,
    Outro,
}

/// Stretch of the song without singing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentalRegion {
    pub kind: RegionKind,
    pub start: f64,
    pub end: f64,
}

/// Read-only song data for one playback session.
#[derive(Debug, Clone)]
pub struct SongSession {
    title: String,
    artist: String,
    duration: Option<f64>,
    bpm: f64,
    routine: Routine,
    lyrics: LyricTrack,
    sections: Option<SectionTrack>,
}

impl SongSession {
    pub fn from_parts(
        title: impl Into<String>,
        artist: impl Into<String>,
        duration: Option<f64>,
        bpm: f64,
        routine: Routine,
        lyrics: LyricTrack,
        sections: Option<SectionTrack>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration,
            bpm,
            routine,
            lyrics,
            sections,
        }
    }

    /// Resolves moves through `builder`, repairs lyric timing and picks the
    /// tempo. Missing lyrics or sections are not errors.
    pub fn build(
        snapshot: SongSnapshot,
        builder: &RoutineBuilder,
        config: &AppConfig,
    ) -> Result<Self> {
        let SongSnapshot { song, routine, lyrics } = snapshot;

        let bpm = [
            song.bpm,
            routine.structure.as_ref().and_then(|s| s.estimated_bpm),
        ]
        .into_iter()
        .flatten()
        .find(|bpm| bpm.is_finite() && *bpm > 0.0)
        .unwrap_or(config.playback.default_bpm);

        let routine = builder.build(&routine.moves)?;

        let (lyrics, sections) = match lyrics {
            Some(payload) => {
                let sections = payload.structure.and_then(parse_sections);
                (LyricTrack::repaired(payload.segments)?, sections)
            }
            None => (LyricTrack::empty(), None),
        };

        info!(
            title = %song.title,
            moves = routine.len(),
            lines = lyrics.len(),
            sections = sections.as_ref().map_or(0, SectionTrack::len),
            bpm,
            "song session ready"
        );

        Ok(Self {
            title: song.title,
            artist: song.artist,
            duration: song.duration.filter(|d| d.is_finite() && *d > 0.0),
            bpm,
            routine,
            lyrics,
            sections,
        })
    }

    /// Fits the routine to the real media length once the player reports it.
    pub fn with_media_duration(mut self, actual_duration: f64, config: &RoutineConfig) -> Self {
        if !actual_duration.is_finite() || actual_duration <= 0.0 {
            return self;
        }
        if let Some(assumed) = self.duration {
            self.routine = self.routine.rescaled(actual_duration, assumed, config);
        }
        self.duration = Some(actual_duration);
        self
    }

    /// Moves the lyric timings by `offset` seconds, leaving the routine as
    /// it is. Lines shifted before the start of the media are dropped.
    pub fn with_lyric_offset(mut self, offset: f64) -> Result<Self> {
        if offset != 0.0 {
            self.lyrics = self.lyrics.shifted(offset)?;
            info!(offset, lines = self.lyrics.len(), "shifted lyric timings");
        }
        Ok(self)
    }

    /// Derives sections from the lyrics when the payload had none and tags
    /// every lyric line with its section. Returns the fresh segmentation.
    pub fn enrich_sections(&mut self, segmenter: &StructureSegmenter) -> Option<Segmentation> {
        if self.sections.is_some() || self.lyrics.is_empty() {
            return None;
        }

        let segmentation = segmenter.segment(self.lyrics.segments(), self.duration);
        match SectionTrack::new(segmentation.sections.clone()) {
            Ok(track) => {
                self.lyrics.assign_sections(&segmentation.line_sections());
                info!(sections = track.len(), "derived song structure from lyrics");
                self.sections = Some(track);
                Some(segmentation)
            }
            Err(err) => {
                warn!(%err, "derived sections are unusable");
                None
            }
        }
    }

    /// Intro, outro and break regions without singing, in time order.
    ///
    /// Without lyrics the whole known duration is one break.
    pub fn instrumental_regions(&self, config: &AppConfig) -> Vec<InstrumentalRegion> {
        let (Some(first_start), Some(last_end)) =
            (self.lyrics.first_start(), self.lyrics.last_end())
        else {
            return self
                .duration
                .map(|end| InstrumentalRegion {
                    kind: RegionKind::Break,
                    start: 0.0,
                    end,
                })
                .into_iter()
                .collect();
        };

        let mut regions = Vec::new();
        if first_start > config.structure.intro_lead_seconds {
            regions.push(InstrumentalRegion {
                kind: RegionKind::Intro,
                start: 0.0,
                end: first_start,
            });
        }

        for pair in self.lyrics.segments().windows(2) {
            let gap = pair[1].start - pair[0].end;
            if gap > config.playback.instrumental_gap_seconds {
                regions.push(InstrumentalRegion {
                    kind: RegionKind::Break,
                    start: pair[0].end,
                    end: pair[1].start,
                });
            }
        }

        if let Some(duration) = self.duration {
            if duration - last_end > config.structure.outro_tail_seconds {
                regions.push(InstrumentalRegion {
                    kind: RegionKind::Outro,
                    start: last_end,
                    end: duration,
                });
            }
        }
        regions
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    /// Media duration when known: the player's if reported, else the payload's.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn lyrics(&self) -> &LyricTrack {
        &self.lyrics
    }

    pub fn sections(&self) -> Option<&SectionTrack> {
        self.sections.as_ref()
    }

    /// Section containing `t`, if any.
    pub fn section_at(&self, t: f64) -> Option<&Section> {
        let track = self.sections.as_ref()?;
        match track.lookup(t) {
            Lookup::Active(index) => track.get(index),
            _ => None,
        }
    }
}

fn parse_sections(structure: serde_json::Value) -> Option<SectionTrack> {
    let parsed = serde_json::from_value::<SectionsPayload>(structure)
        .map_err(crate::ChoreoError::from)
        .and_then(|payload| SectionTrack::new(payload.sections));
    match parsed {
        Ok(track) if !track.is_empty() => Some(track),
        Ok(_) => None,
        Err(err) => {
            warn!(%err, "ignoring malformed section list");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{structure::SectionType, MoveCatalog};

    const LIVE: &str = r#"{
        "song": {"title": "Glow", "artist": "Nova", "duration": 180, "bpm": null},
        "routine": {
            "moves": [
                {"moveId": "clap", "startTime": 0, "beats": 4},
                {"moveId": "moonwalk", "startTime": 30},
                {"moveId": "turn", "startTime": 170}
            ],
            "structure": {"songVibe": "upbeat", "estimatedBPM": 96}
        },
        "lyrics": {
            "segments": [
                {"text": "hello there", "start": 12, "end": 15},
                {"text": "over and over", "start": 16, "end": 19}
            ],
            "structure": {"sections": [
                {"type": "verse", "label": "VERSE 1", "start": 12, "end": 19}
            ]}
        }
    }"#;

    const CACHED: &str = r#"{
        "title": "Glow",
        "artist": "Nova",
        "duration": 180,
        "choreography": {
            "moves": [
                {"moveId": "clap", "timestamp": 0, "beats": 4},
                {"moveId": "moonwalk", "timestamp": 30},
                {"moveId": "turn", "timestamp": 170}
            ],
            "structure": {"songVibe": "upbeat", "estimatedBPM": 96}
        },
        "lyrics": {
            "segments": [
                {"text": "hello there", "start": 12, "end": 15},
                {"text": "over and over", "start": 16, "end": 19}
            ],
            "structure": {"sections": [
                {"type": "verse", "label": "VERSE 1", "start": 12, "end": 19}
            ]}
        },
        "createdAt": "2024-05-01T10:00:00Z"
    }"#;

    fn builder() -> RoutineBuilder {
        RoutineBuilder::new(MoveCatalog::builtin(), &AppConfig::default().routine).unwrap()
    }

    fn session(json: &str) -> SongSession {
        let snapshot = SongSnapshot::from_json(json).unwrap();
        SongSession::build(snapshot, &builder(), &AppConfig::default()).unwrap()
    }

    #[test]
    fn live_and_cached_payloads_are_interchangeable() {
        let live = session(LIVE);
        let cached = session(CACHED);

        assert_eq!(live.routine().moves(), cached.routine().moves());
        assert_eq!(live.lyrics().segments(), cached.lyrics().segments());
        assert_eq!(live.bpm(), 96.0);
        assert_eq!(cached.bpm(), 96.0);
        assert_eq!(live.routine().moves()[1].move_id, "step_touch");
        assert_eq!(cached.section_at(13.0).map(|s| s.kind), Some(SectionType::Verse));
    }

    #[test]
    fn missing_lyrics_leave_an_empty_track() {
        let snapshot = SongSnapshot::from_json(
            r#"{"song": {"title": "Beat"}, "routine": {"moves": [{"moveId": "jump", "startTime": 0}]}}"#,
        )
        .unwrap();
        let session = SongSession::build(snapshot, &builder(), &AppConfig::default()).unwrap();

        assert!(session.lyrics().is_empty());
        assert!(session.sections().is_none());
        assert_eq!(session.bpm(), 120.0);
        assert!(session.instrumental_regions(&AppConfig::default()).is_empty());
    }

    #[test]
    fn malformed_sections_are_dropped() {
        let json = LIVE.replace(r#""start": 12, "end": 19}"#, r#""start": 12, "end": 10}"#);
        let session = session(&json);

        assert!(session.sections().is_none());
        assert_eq!(session.lyrics().len(), 2);
    }

    #[test]
    fn media_duration_rescales_the_routine() {
        let config = AppConfig::default();
        let session = session(LIVE).with_media_duration(120.0, &config.routine);

        assert_eq!(session.duration(), Some(120.0));
        let starts: Vec<_> = session.routine().moves().iter().map(|m| m.start_time).collect();
        assert_eq!(starts[0], 0.0);
        assert!((starts[1] - 20.0).abs() < 1e-9);
        assert_eq!(starts[2], 110.0);
    }

    #[test]
    fn lists_instrumental_regions() {
        let config = AppConfig::default();
        let routine = builder().build(&[MoveEntry::new("sway", 0.0)]).unwrap();
        let lyrics = LyricTrack::new(vec![
            LyricSegment::new("a", 15.0, 18.0),
            LyricSegment::new("b", 19.0, 22.0),
            LyricSegment::new("c", 40.0, 44.0),
        ])
        .unwrap();
        let session = SongSession::from_parts("T", "A", Some(90.0), 120.0, routine, lyrics, None);

        let kinds: Vec<_> = session
            .instrumental_regions(&config)
            .iter()
            .map(|r| (r.kind, r.start, r.end))
            .collect();
        assert_eq!(
            kinds,
            [
                (RegionKind::Intro, 0.0, 15.0),
                (RegionKind::Break, 22.0, 40.0),
                (RegionKind::Outro, 44.0, 90.0),
            ]
        );
    }

    #[test]
    fn derives_sections_when_the_payload_has_none() {
        let snapshot = SongSnapshot {
            lyrics: Some(LyricsPayload {
                segments: vec![
                    LyricSegment::new("we rise up tonight", 1.0, 3.0),
                    LyricSegment::new("a quiet street", 4.0, 6.0),
                    LyricSegment::new("we rise up tonight", 7.0, 9.0),
                ],
                structure: None,
            }),
            ..SongSnapshot::default()
        };
        let mut session = SongSession::build(snapshot, &builder(), &AppConfig::default()).unwrap();

        let segmentation = session
            .enrich_sections(&StructureSegmenter::default())
            .unwrap();
        assert!(!segmentation.sections.is_empty());
        assert!(session.sections().is_some());
        assert!(session.lyrics().segments().iter().all(|seg| seg.section_index.is_some()));
        assert!(session.enrich_sections(&StructureSegmenter::default()).is_none());
    }

    #[test]
    fn lyric_offset_moves_lines_but_not_moves() {
        let routine = builder()
            .build(&[MoveEntry::new("sway", 0.0), MoveEntry::new("clap", 8.0)])
            .unwrap();
        let lyrics = LyricTrack::new(vec![
            LyricSegment::new("early", 0.5, 1.5),
            LyricSegment::new("late", 4.0, 6.0),
        ])
        .unwrap();
        let session = SongSession::from_parts("T", "A", Some(30.0), 120.0, routine, lyrics, None)
            .with_lyric_offset(-2.0)
            .unwrap();

        let texts: Vec<_> = session.lyrics().segments().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["late"]);
        assert_eq!(session.lyrics().first_start(), Some(2.0));
        assert_eq!(session.routine().moves()[1].start_time, 8.0);
    }
}
