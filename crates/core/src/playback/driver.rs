use std::time::Duration;

use crate::{timeline::MediaClock, Result};

use super::{PlaybackPhase, PlaybackSynchronizer, Transition};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Repeating timer advanced by explicit wall-clock deltas.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    elapsed: Duration,
    armed: bool,
}

impl IntervalTimer {
    /// Creates a stopped timer. Periods shorter than a millisecond are raised
    /// to one.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            elapsed: Duration::ZERO,
            armed: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Arms the timer with a full period before the first firing.
    pub fn restart(&mut self) {
        self.elapsed = Duration::ZERO;
        self.armed = true;
    }

    pub fn stop(&mut self) {
        self.elapsed = Duration::ZERO;
        self.armed = false;
    }

    /// Time until the next firing, `None` while stopped.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .then(|| self.period.saturating_sub(self.elapsed))
    }

    pub fn advance(&mut self, delta: Duration) {
        if self.armed {
            self.elapsed += delta;
        }
    }

    /// Consumes one due firing.
    pub fn take_due(&mut self) -> bool {
        if self.armed && self.elapsed >= self.period {
            self.elapsed -= self.period;
            true
        } else {
            false
        }
    }
}

/// Owns a [`PlaybackSynchronizer`] together with its poll and beat timers.
///
/// Both timers only run while the synchronizer is `Playing`; pausing or
/// ending stops them in the same call, and dropping the driver drops them.
#[derive(Debug)]
pub struct PlaybackDriver {
    sync: PlaybackSynchronizer,
    poll: IntervalTimer,
    beat: IntervalTimer,
}

impl PlaybackDriver {
    pub fn new(sync: PlaybackSynchronizer) -> Result<Self> {
        let poll = IntervalTimer::new(sync.poll_interval());
        let beat = IntervalTimer::new(sync.beat_interval()?);
        Ok(Self { sync, poll, beat })
    }

    pub fn synchronizer(&self) -> &PlaybackSynchronizer {
        &self.sync
    }

    pub fn into_synchronizer(self) -> PlaybackSynchronizer {
        self.sync
    }

    pub fn poll_timer(&self) -> &IntervalTimer {
        &self.poll
    }

    pub fn beat_timer(&self) -> &IntervalTimer {
        &self.beat
    }

    pub fn play(&mut self, clock: &impl MediaClock) -> Result<Vec<Transition>> {
        let transitions = self.sync.play(clock.current_time())?;
        self.poll.restart();
        self.beat.restart();
        Ok(transitions)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.sync.pause()?;
        self.stop_timers();
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        self.sync.end()?;
        self.stop_timers();
        Ok(())
    }

    /// Seeks the synchronizer and arms the timers when the seek resumed an
    /// ended session.
    pub fn seek(&mut self, current_time: f64) -> Result<Vec<Transition>> {
        let was_playing = self.sync.is_playing();
        let transitions = self.sync.seek(current_time)?;
        if self.sync.is_playing() {
            if !was_playing {
                self.poll.restart();
                self.beat.restart();
            } else if has_move_change(&transitions) {
                self.beat.restart();
            }
        }
        Ok(transitions)
    }

    /// Lets `wall` of real time pass, firing every timer that comes due in
    /// chronological order. A poll and a beat due at the same instant fire
    /// poll first, so a move change restarts the beat before it counts.
    pub fn advance(&mut self, wall: Duration, clock: &impl MediaClock) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let mut left = wall;

        loop {
            let next = match (self.poll.remaining(), self.beat.remaining()) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => break,
            };
            if next > left {
                self.poll.advance(left);
                self.beat.advance(left);
                break;
            }
            self.poll.advance(next);
            self.beat.advance(next);
            left -= next;

            if self.poll.take_due() {
                let changes = self.sync.tick(clock.current_time());
                if has_move_change(&changes) {
                    self.beat.restart();
                }
                transitions.extend(changes);
            }
            if self.beat.take_due() {
                transitions.extend(self.sync.beat());
            }
            if self.sync.phase() != PlaybackPhase::Playing {
                self.stop_timers();
                break;
            }
        }
        transitions
    }

    fn stop_timers(&mut self) {
        self.poll.stop();
        self.beat.stop();
    }
}

fn has_move_change(transitions: &[Transition]) -> bool {
    transitions
        .iter()
        .any(|t| matches!(t, Transition::MoveChanged { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, PlaybackConfig},
        playback::MessageCategory,
        routine::{MoveEntry, RoutineBuilder},
        timeline::ManualClock,
        LyricTrack, MoveCatalog, SongSession,
    };

    fn driver() -> PlaybackDriver {
        let config = AppConfig::default();
        let builder = RoutineBuilder::new(MoveCatalog::builtin(), &config.routine).unwrap();
        let routine = builder
            .build(&[
                MoveEntry::new("clap", 0.0).with_beats(4),
                MoveEntry::new("snap", 6.0).with_beats(4),
            ])
            .unwrap();
        let session =
            SongSession::from_parts("T", "A", None, 120.0, routine, LyricTrack::empty(), None);

        let selector = || MessageCategory::Encourage;
        let mut sync =
            PlaybackSynchronizer::with_selector(PlaybackConfig::default(), Box::new(selector));
        sync.load(session).unwrap();
        PlaybackDriver::new(sync).unwrap()
    }

    fn beats(transitions: &[Transition]) -> Vec<u32> {
        transitions
            .iter()
            .filter_map(|t| match t {
                Transition::BeatTick { count } => Some(*count),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn timer_fires_once_per_period() {
        let mut timer = IntervalTimer::new(Duration::from_millis(100));
        timer.advance(Duration::from_millis(250));
        assert!(!timer.take_due());

        timer.restart();
        timer.advance(Duration::from_millis(250));
        assert!(timer.take_due());
        assert!(timer.take_due());
        assert!(!timer.take_due());
        assert_eq!(timer.remaining(), Some(Duration::from_millis(50)));
        assert_eq!(IntervalTimer::new(Duration::ZERO).period(), Duration::from_millis(1));
    }

    #[test]
    fn beats_follow_the_tempo() {
        let mut driver = driver();
        let clock = ManualClock::new();
        driver.play(&clock).unwrap();

        let transitions = driver.advance(Duration::from_secs(1), &clock);
        assert_eq!(beats(&transitions), [2, 3]);
    }

    #[test]
    fn move_change_restarts_the_beat_timer() {
        let mut driver = driver();
        let mut clock = ManualClock::new();
        driver.play(&clock).unwrap();
        driver.advance(Duration::from_millis(400), &clock);

        clock.seek(6.5);
        let transitions = driver.advance(Duration::from_millis(100), &clock);
        assert!(has_move_change(&transitions));
        assert_eq!(beats(&transitions), [1]);

        assert!(beats(&driver.advance(Duration::from_millis(400), &clock)).is_empty());
        assert_eq!(beats(&driver.advance(Duration::from_millis(100), &clock)), [2]);
    }

    #[test]
    fn pause_cancels_both_timers() {
        let mut driver = driver();
        let clock = ManualClock::new();
        driver.play(&clock).unwrap();
        driver.pause().unwrap();

        assert!(!driver.poll_timer().is_armed());
        assert!(!driver.beat_timer().is_armed());
        assert!(driver.advance(Duration::from_secs(5), &clock).is_empty());
    }

    #[test]
    fn only_a_seek_to_the_start_resumes_timers_after_the_end() {
        let mut driver = driver();
        let clock = ManualClock::new();
        driver.play(&clock).unwrap();
        driver.end().unwrap();
        assert!(driver.advance(Duration::from_secs(1), &clock).is_empty());

        driver.seek(1.0).unwrap();
        assert!(!driver.poll_timer().is_armed());
        assert!(!driver.beat_timer().is_armed());
        assert!(driver.advance(Duration::from_secs(1), &clock).is_empty());

        driver.seek(0.0).unwrap();
        assert!(driver.poll_timer().is_armed());
        assert_eq!(beats(&driver.advance(Duration::from_millis(500), &clock)), [2]);
    }
}
