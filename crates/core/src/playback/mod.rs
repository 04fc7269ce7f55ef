//! Keeps the move, lyric, section and beat displays in step with the media
//! clock. The caller owns the poll and beat timers (or hands them to a
//! [`PlaybackDriver`]) and feeds sampled media times into a
//! [`PlaybackSynchronizer`], which rebuilds its [`PlaybackState`] from that
//! single sample and reports the differences as [`Transition`]s. Timer
//! callbacks outside the `Playing` phase change nothing.

mod beat;
mod driver;
mod message;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::PlaybackConfig,
    structure::SectionType,
    timeline::Lookup,
    ChoreoError, Result, SongSession,
};

pub use beat::{beat_interval, BeatCounter};
pub use driver::{IntervalTimer, PlaybackDriver};
pub use message::{categorize, MessageCategory, MessageSelector, RandomSelector};

/// Lifecycle of one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
}

/// Where the playhead sits relative to the lyrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LyricStatus {
    /// The song has no timed lyrics.
    NoLyrics,
    /// Before the first line; `lead_seconds` is the time from 0 to it.
    BeforeFirst { lead_seconds: f64 },
    Singing { index: usize },
    Gap {
        previous: usize,
        next: usize,
        gap_seconds: f64,
    },
    AfterLast { last: usize },
}

impl LyricStatus {
    fn from_lookup(lookup: Lookup) -> Self {
        match lookup {
            Lookup::Empty => LyricStatus::NoLyrics,
            Lookup::BeforeFirst { first_start } => LyricStatus::BeforeFirst {
                lead_seconds: first_start,
            },
            Lookup::Active(index) => LyricStatus::Singing { index },
            Lookup::Gap {
                previous,
                next,
                gap_seconds,
            } => LyricStatus::Gap {
                previous,
                next,
                gap_seconds,
            },
            Lookup::AfterLast { last, .. } => LyricStatus::AfterLast { last },
        }
    }

    pub fn active_index(&self) -> Option<usize> {
        match self {
            LyricStatus::Singing { index } => Some(*index),
            _ => None,
        }
    }

    /// Index of the line shown as "up next".
    pub fn next_index(&self) -> Option<usize> {
        match self {
            LyricStatus::BeforeFirst { .. } => Some(0),
            LyricStatus::Singing { index } => Some(index + 1),
            LyricStatus::Gap { next, .. } => Some(*next),
            LyricStatus::NoLyrics | LyricStatus::AfterLast { .. } => None,
        }
    }

    /// Gaps longer than `threshold` (strictly) are instrumental, as is
    /// everything after the last line and a song without lyrics.
    pub fn is_instrumental(&self, threshold: f64) -> bool {
        match self {
            LyricStatus::NoLyrics | LyricStatus::AfterLast { .. } => true,
            LyricStatus::BeforeFirst { lead_seconds } => *lead_seconds > threshold,
            LyricStatus::Gap { gap_seconds, .. } => *gap_seconds > threshold,
            LyricStatus::Singing { .. } => false,
        }
    }
}

/// Which section label is on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SectionStatus {
    Active {
        index: usize,
        #[serde(rename = "type")]
        kind: SectionType,
        label: String,
    },
    /// No section covers the playhead and nobody is singing.
    Instrumental,
    /// No section covers the playhead during a short pause, or the song has
    /// no section list and someone is singing.
    Unlabeled,
}

impl SectionStatus {
    pub fn index(&self) -> Option<usize> {
        match self {
            SectionStatus::Active { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SectionStatus::Active { label, .. } => label,
            SectionStatus::Instrumental => "INSTRUMENTAL",
            SectionStatus::Unlabeled => "",
        }
    }

    pub fn icon_key(&self) -> &'static str {
        match self {
            SectionStatus::Active { kind, .. } => kind.icon_key(),
            SectionStatus::Instrumental => "music",
            SectionStatus::Unlabeled => "none",
        }
    }
}

/// Snapshot of what is on screen at one media time. Rebuilt from scratch on
/// every tick and seek.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_time: f64,
    pub active_move_index: Option<usize>,
    pub lyric: LyricStatus,
    pub section: SectionStatus,
    pub is_instrumental: bool,
    pub current_beat: u32,
}

impl PlaybackState {
    pub fn active_lyric_index(&self) -> Option<usize> {
        self.lyric.active_index()
    }

    pub fn active_section_index(&self) -> Option<usize> {
        self.section.index()
    }
}

/// Change notifications consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Transition {
    #[serde(rename_all = "camelCase")]
    MoveChanged {
        index: usize,
        /// 1-based position shown to the dancer.
        position: usize,
        category: MessageCategory,
    },
    #[serde(rename_all = "camelCase")]
    LyricChanged {
        index: Option<usize>,
        status: LyricStatus,
        is_instrumental: bool,
        gap_seconds: Option<f64>,
        text: Option<String>,
        next_text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SectionChanged {
        index: Option<usize>,
        kind: Option<SectionType>,
        label: String,
        icon_key: &'static str,
    },
    BeatTick { count: u32 },
}

/// Per-session synchronizer from media time to on-screen state.
pub struct PlaybackSynchronizer {
    config: PlaybackConfig,
    phase: PlaybackPhase,
    session: Option<SongSession>,
    state: Option<PlaybackState>,
    beat: BeatCounter,
    selector: Box<dyn MessageSelector>,
}

impl PlaybackSynchronizer {
    /// Creates an idle synchronizer whose mid-routine messages come from an
    /// unseeded random selector.
    pub fn new(config: PlaybackConfig) -> Self {
        let selector = RandomSelector::from_entropy(config.encourage_probability);
        Self::with_selector(config, Box::new(selector))
    }

    pub fn with_selector(config: PlaybackConfig, selector: Box<dyn MessageSelector>) -> Self {
        Self {
            config,
            phase: PlaybackPhase::Idle,
            session: None,
            state: None,
            beat: BeatCounter::default(),
            selector,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&SongSession> {
        self.session.as_ref()
    }

    /// State derived by the latest tick, seek or play.
    pub fn state(&self) -> Option<&PlaybackState> {
        self.state.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    /// Beat period for the loaded song.
    pub fn beat_interval(&self) -> Result<Duration> {
        let bpm = self
            .session
            .as_ref()
            .map(SongSession::bpm)
            .unwrap_or(self.config.default_bpm);
        beat_interval(bpm)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(1))
    }

    /// Marks the start of an asynchronous song fetch.
    pub fn begin_loading(&mut self) -> Result<()> {
        self.require(&[PlaybackPhase::Idle], "begin loading")?;
        self.set_phase(PlaybackPhase::Loading);
        Ok(())
    }

    /// Installs the session's song data. A synchronizer loads exactly one song;
    /// changing songs means building a new synchronizer.
    pub fn load(&mut self, session: SongSession) -> Result<()> {
        self.require(&[PlaybackPhase::Idle, PlaybackPhase::Loading], "load a song")?;
        if self.phase == PlaybackPhase::Idle {
            self.set_phase(PlaybackPhase::Loading);
        }
        self.session = Some(session);
        self.state = None;
        self.set_phase(PlaybackPhase::Ready);
        Ok(())
    }

    /// Starts or resumes playback at `current_time`. From `Ended` this is a
    /// replay and everything is reported afresh.
    pub fn play(&mut self, current_time: f64) -> Result<Vec<Transition>> {
        self.require(
            &[PlaybackPhase::Ready, PlaybackPhase::Paused, PlaybackPhase::Ended],
            "play",
        )?;
        if self.phase == PlaybackPhase::Ended {
            self.state = None;
        }
        self.set_phase(PlaybackPhase::Playing);
        Ok(self.update(current_time))
    }

    pub fn pause(&mut self) -> Result<()> {
        self.require(&[PlaybackPhase::Playing], "pause")?;
        self.set_phase(PlaybackPhase::Paused);
        Ok(())
    }

    /// Media end signal.
    pub fn end(&mut self) -> Result<()> {
        self.require(&[PlaybackPhase::Playing, PlaybackPhase::Paused], "end")?;
        self.set_phase(PlaybackPhase::Ended);
        Ok(())
    }

    /// Jumps to `current_time` and reports what changed right away. After the
    /// end only a seek back to the start resumes playback; any other seek
    /// updates the display and stays ended.
    pub fn seek(&mut self, current_time: f64) -> Result<Vec<Transition>> {
        self.require(
            &[
                PlaybackPhase::Ready,
                PlaybackPhase::Playing,
                PlaybackPhase::Paused,
                PlaybackPhase::Ended,
            ],
            "seek",
        )?;
        if self.phase == PlaybackPhase::Ended && current_time <= 0.0 {
            self.set_phase(PlaybackPhase::Playing);
        }
        Ok(self.update(current_time))
    }

    /// Poll-timer callback. Returns nothing unless playing.
    pub fn tick(&mut self, current_time: f64) -> Vec<Transition> {
        if !self.is_playing() {
            return Vec::new();
        }
        self.update(current_time)
    }

    /// Beat-timer callback. Returns nothing unless playing.
    pub fn beat(&mut self) -> Option<Transition> {
        if !self.is_playing() {
            return None;
        }
        let count = self.beat.advance();
        if let Some(state) = self.state.as_mut() {
            state.current_beat = count;
        }
        Some(Transition::BeatTick { count })
    }

    fn update(&mut self, current_time: f64) -> Vec<Transition> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };

        let threshold = self.config.instrumental_gap_seconds;
        let active_move_index = session.routine().active(current_time);
        let lyric = LyricStatus::from_lookup(session.lyrics().lookup(current_time));
        let is_instrumental = lyric.is_instrumental(threshold);
        let section = match session.sections() {
            Some(track) => match track.lookup(current_time) {
                Lookup::Active(index) => match track.get(index) {
                    Some(section) => SectionStatus::Active {
                        index,
                        kind: section.kind,
                        label: section.label.clone(),
                    },
                    None => SectionStatus::Unlabeled,
                },
                _ if is_instrumental => SectionStatus::Instrumental,
                _ => SectionStatus::Unlabeled,
            },
            None if is_instrumental => SectionStatus::Instrumental,
            None => SectionStatus::Unlabeled,
        };

        let previous = self.state.take();
        let mut transitions = Vec::new();

        if previous.as_ref().map(|s| s.active_move_index) != Some(active_move_index) {
            if let Some(index) = active_move_index {
                let routine = session.routine();
                let beats = routine.get(index).map(|m| m.beats).unwrap_or(1);
                self.beat.reset(beats);
                let category = categorize(
                    index,
                    routine.len(),
                    self.config.finish_fraction,
                    self.selector.as_mut(),
                );
                transitions.push(Transition::MoveChanged {
                    index,
                    position: index + 1,
                    category,
                });
                transitions.push(Transition::BeatTick { count: 1 });
            }
        }

        if previous.as_ref().map(|s| &s.lyric) != Some(&lyric) {
            let lyrics = session.lyrics();
            let gap_seconds = match lyric {
                LyricStatus::BeforeFirst { lead_seconds } => Some(lead_seconds),
                LyricStatus::Gap { gap_seconds, .. } => Some(gap_seconds),
                LyricStatus::AfterLast { .. } => session
                    .duration()
                    .zip(lyrics.last_end())
                    .map(|(duration, last_end)| (duration - last_end).max(0.0)),
                LyricStatus::NoLyrics | LyricStatus::Singing { .. } => None,
            };
            transitions.push(Transition::LyricChanged {
                index: lyric.active_index(),
                status: lyric,
                is_instrumental,
                gap_seconds,
                text: lyric
                    .active_index()
                    .and_then(|i| lyrics.get(i))
                    .map(|seg| seg.text.clone()),
                next_text: lyric
                    .next_index()
                    .and_then(|i| lyrics.get(i))
                    .map(|seg| seg.text.clone()),
            });
        }

        if previous.as_ref().map(|s| &s.section) != Some(&section) {
            transitions.push(Transition::SectionChanged {
                index: section.index(),
                kind: match &section {
                    SectionStatus::Active { kind, .. } => Some(*kind),
                    _ => None,
                },
                label: section.label().to_string(),
                icon_key: section.icon_key(),
            });
        }

        self.state = Some(PlaybackState {
            current_time,
            active_move_index,
            lyric,
            section,
            is_instrumental,
            current_beat: self.beat.count(),
        });
        transitions
    }

    fn require(&self, allowed: &[PlaybackPhase], action: &'static str) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ChoreoError::InvalidTransition {
                from: self.phase,
                action,
            })
        }
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "playback phase changed");
            self.phase = phase;
        }
    }
}

impl fmt::Debug for PlaybackSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSynchronizer")
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("beat", &self.beat)
            .field("loaded", &self.session.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lyrics::LyricSegment,
        routine::{MoveEntry, RoutineBuilder},
        structure::Section,
        AppConfig, LyricTrack, MoveCatalog, SectionTrack,
    };

    fn session(with_sections: bool) -> SongSession {
        let config = AppConfig::default();
        let builder = RoutineBuilder::new(MoveCatalog::builtin(), &config.routine).unwrap();
        let routine = builder
            .build(&[
                MoveEntry::new("clap", 2.0).with_beats(4),
                MoveEntry::new("hip_sway", 6.0),
                MoveEntry::new("turn", 12.0),
                MoveEntry::new("jump", 20.0),
            ])
            .unwrap();
        let lyrics = LyricTrack::new(vec![
            LyricSegment::new("first line", 8.0, 10.0),
            LyricSegment::new("second line", 11.0, 13.0),
            LyricSegment::new("third line", 20.0, 22.0),
        ])
        .unwrap();
        let sections = with_sections.then(|| {
            SectionTrack::new(vec![Section {
                kind: SectionType::Verse,
                label: "VERSE 1".to_string(),
                start: 8.0,
                end: 13.0,
                occurrence_index: 0,
                repeat_of: None,
                line_count: 2,
            }])
            .unwrap()
        });
        SongSession::from_parts("Test", "Band", Some(30.0), 120.0, routine, lyrics, sections)
    }

    fn playing(with_sections: bool) -> PlaybackSynchronizer {
        let selector = || MessageCategory::Encourage;
        let mut sync =
            PlaybackSynchronizer::with_selector(PlaybackConfig::default(), Box::new(selector));
        sync.load(session(with_sections)).unwrap();
        sync
    }

    fn lyric_event(transitions: &[Transition]) -> Option<&Transition> {
        transitions
            .iter()
            .find(|t| matches!(t, Transition::LyricChanged { .. }))
    }

    #[test]
    fn play_reports_full_initial_state() {
        let mut sync = playing(true);
        let transitions = sync.play(0.0).unwrap();

        assert_eq!(
            transitions[0],
            Transition::MoveChanged {
                index: 0,
                position: 1,
                category: MessageCategory::Start,
            }
        );
        assert_eq!(transitions[1], Transition::BeatTick { count: 1 });
        match lyric_event(&transitions) {
            Some(Transition::LyricChanged {
                is_instrumental,
                gap_seconds,
                next_text,
                ..
            }) => {
                assert!(is_instrumental);
                assert_eq!(*gap_seconds, Some(8.0));
                assert_eq!(next_text.as_deref(), Some("first line"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            transitions.last(),
            Some(Transition::SectionChanged { index: None, .. })
        ));
    }

    #[test]
    fn ticks_only_report_changes() {
        let mut sync = playing(true);
        sync.play(0.0).unwrap();

        assert!(sync.tick(0.5).is_empty());
        let transitions = sync.tick(8.5);
        assert!(transitions.iter().any(|t| matches!(t, Transition::MoveChanged { index: 1, .. })));
        assert!(transitions.iter().any(|t| matches!(
            t,
            Transition::SectionChanged {
                index: Some(0),
                ..
            }
        )));
        match lyric_event(&transitions) {
            Some(Transition::LyricChanged {
                index, text, next_text, ..
            }) => {
                assert_eq!(*index, Some(0));
                assert_eq!(text.as_deref(), Some("first line"));
                assert_eq!(next_text.as_deref(), Some("second line"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(sync.tick(8.6).is_empty());
    }

    #[test]
    fn all_lookups_share_one_time_sample() {
        let mut sync = playing(true);
        sync.play(0.0).unwrap();
        sync.tick(12.5);

        let state = sync.state().unwrap();
        assert_eq!(state.current_time, 12.5);
        assert_eq!(state.active_move_index, Some(2));
        assert_eq!(state.active_lyric_index(), Some(1));
        assert_eq!(state.active_section_index(), Some(0));
    }

    #[test]
    fn short_and_long_gaps_are_classified() {
        let mut sync = playing(false);
        sync.play(10.5).unwrap();
        assert!(!sync.state().unwrap().is_instrumental);

        sync.tick(15.0);
        let state = sync.state().unwrap();
        assert!(state.is_instrumental);
        assert_eq!(state.section, SectionStatus::Instrumental);
        assert_eq!(
            state.lyric,
            LyricStatus::Gap {
                previous: 1,
                next: 2,
                gap_seconds: 7.0,
            }
        );

        let transitions = sync.tick(25.0);
        match lyric_event(&transitions) {
            Some(Transition::LyricChanged {
                status, gap_seconds, ..
            }) => {
                assert_eq!(*status, LyricStatus::AfterLast { last: 2 });
                assert_eq!(*gap_seconds, Some(8.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gap_equal_to_threshold_is_a_pause() {
        let status = LyricStatus::Gap {
            previous: 0,
            next: 1,
            gap_seconds: 5.0,
        };
        assert!(!status.is_instrumental(5.0));
        assert!(LyricStatus::Gap {
            previous: 0,
            next: 1,
            gap_seconds: 5.01,
        }
        .is_instrumental(5.0));
    }

    #[test]
    fn beat_counter_resets_when_the_move_changes() {
        let mut sync = playing(true);
        sync.play(2.0).unwrap();

        let counts: Vec<_> = (0..3)
            .filter_map(|_| match sync.beat() {
                Some(Transition::BeatTick { count }) => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, [2, 3, 4]);

        sync.tick(6.5);
        assert_eq!(sync.state().unwrap().current_beat, 1);
        assert_eq!(sync.beat(), Some(Transition::BeatTick { count: 2 }));
    }

    #[test]
    fn paused_sessions_ignore_timers() {
        let mut sync = playing(true);
        sync.play(0.0).unwrap();
        sync.pause().unwrap();

        assert!(sync.tick(9.0).is_empty());
        assert!(sync.beat().is_none());
        assert_eq!(sync.state().unwrap().current_time, 0.0);
    }

    #[test]
    fn seek_recomputes_immediately() {
        let mut sync = playing(true);
        sync.play(0.0).unwrap();
        sync.pause().unwrap();

        let transitions = sync.seek(21.0).unwrap();
        assert!(transitions.iter().any(|t| matches!(t, Transition::MoveChanged { index: 3, .. })));
        assert_eq!(sync.state().unwrap().active_lyric_index(), Some(2));
        assert_eq!(sync.phase(), PlaybackPhase::Paused);

        let transitions = sync.seek(3.0).unwrap();
        assert!(transitions.iter().any(|t| matches!(t, Transition::MoveChanged { index: 0, .. })));
    }

    #[test]
    fn ended_sessions_replay_from_the_start() {
        let mut sync = playing(true);
        sync.play(0.0).unwrap();
        sync.tick(25.0);
        sync.end().unwrap();
        assert!(sync.tick(26.0).is_empty());

        let transitions = sync.play(0.0).unwrap();
        assert_eq!(sync.phase(), PlaybackPhase::Playing);
        assert!(transitions.iter().any(|t| matches!(t, Transition::MoveChanged { index: 0, .. })));

        sync.end().unwrap();
        sync.seek(0.0).unwrap();
        assert_eq!(sync.phase(), PlaybackPhase::Playing);
    }

    #[test]
    fn seeking_past_the_start_after_the_end_stays_ended() {
        let mut sync = playing(true);
        sync.play(0.0).unwrap();
        sync.tick(25.0);
        sync.end().unwrap();

        let transitions = sync.seek(12.5).unwrap();
        assert_eq!(sync.phase(), PlaybackPhase::Ended);
        assert!(transitions
            .iter()
            .any(|t| matches!(t, Transition::MoveChanged { index: 2, .. })));
        assert_eq!(sync.state().unwrap().current_time, 12.5);
        assert!(sync.tick(13.0).is_empty());
        assert!(sync.beat().is_none());
    }

    #[test]
    fn rejects_illegal_phase_changes() {
        let mut sync = PlaybackSynchronizer::new(PlaybackConfig::default());
        assert!(matches!(
            sync.pause(),
            Err(ChoreoError::InvalidTransition {
                from: PlaybackPhase::Idle,
                ..
            })
        ));
        assert!(sync.play(0.0).is_err());
        assert!(sync.seek(1.0).is_err());

        sync.begin_loading().unwrap();
        assert_eq!(sync.phase(), PlaybackPhase::Loading);
        sync.load(session(false)).unwrap();
        assert!(sync.load(session(false)).is_err());
    }

    #[test]
    fn missing_lyrics_make_everything_instrumental() {
        let config = AppConfig::default();
        let builder = RoutineBuilder::new(MoveCatalog::builtin(), &config.routine).unwrap();
        let routine = builder.build(&[MoveEntry::new("sway", 0.0)]).unwrap();
        let session =
            SongSession::from_parts("T", "A", None, 60.0, routine, LyricTrack::empty(), None);

        let mut sync = PlaybackSynchronizer::new(config.playback);
        sync.load(session).unwrap();
        sync.play(42.0).unwrap();

        let state = sync.state().unwrap();
        assert_eq!(state.lyric, LyricStatus::NoLyrics);
        assert!(state.is_instrumental);
        assert_eq!(state.section, SectionStatus::Instrumental);
        assert_eq!(sync.beat_interval().unwrap(), Duration::from_secs(1));
    }
}
