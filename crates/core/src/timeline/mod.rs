//! Sorted time lookups shared by moves, lyric segments and sections.
//!
//! A [`TimeIndex`] answers "which item is active at `t`" with a binary search
//! over start times. Moves are open-ended (each lasts until the next one
//! starts), lyric segments and sections are closed-open `[start, end)`
//! intervals. Out-of-range and in-between times are ordinary answers described
//! by [`Lookup`], never errors.

use serde::{Deserialize, Serialize};

use crate::{ChoreoError, Result};

/// Answer of a [`TimeIndex`] query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Lookup {
    /// The index holds no items at all.
    Empty,
    /// `t` precedes the first interval; `first_start` is also the lead-in length.
    BeforeFirst { first_start: f64 },
    /// The item at this index is active.
    Active(usize),
    /// `t` lies between two intervals.
    Gap {
        previous: usize,
        next: usize,
        gap_seconds: f64,
    },
    /// `t` is at or past the end of the last interval.
    AfterLast { last: usize, last_end: f64 },
}

impl Lookup {
    /// The active index, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Lookup::Active(index) => Some(*index),
            _ => None,
        }
    }

    /// Whether the lookup landed outside the covered range (intro or outro side).
    pub fn is_boundary(&self) -> bool {
        matches!(self, Lookup::BeforeFirst { .. } | Lookup::AfterLast { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extent {
    OpenEnded,
    Closed,
}

/// Binary-searchable index over sorted start times.
#[derive(Debug, Clone)]
pub struct TimeIndex {
    starts: Vec<f64>,
    ends: Vec<f64>,
    extent: Extent,
}

impl TimeIndex {
    /// Builds an index of open-ended items such as moves. Start times must be
    /// finite and non-decreasing.
    pub fn open_ended<I>(starts: I) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let starts: Vec<f64> = starts.into_iter().collect();
        for (index, start) in starts.iter().enumerate() {
            if !start.is_finite() {
                return Err(ChoreoError::InvalidInterval {
                    index,
                    start: *start,
                    end: *start,
                });
            }
            if index > 0 && *start < starts[index - 1] {
                return Err(ChoreoError::Unsorted { index });
            }
        }

        Ok(Self {
            starts,
            ends: Vec::new(),
            extent: Extent::OpenEnded,
        })
    }

    /// Builds an index of closed-open intervals such as lyric segments or
    /// sections. Intervals must be non-empty, sorted and non-overlapping;
    /// touching neighbours are allowed.
    pub fn closed<I>(intervals: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut starts = Vec::new();
        let mut ends: Vec<f64> = Vec::new();

        for (index, (start, end)) in intervals.into_iter().enumerate() {
            if !start.is_finite() || !end.is_finite() || end <= start {
                return Err(ChoreoError::InvalidInterval { index, start, end });
            }
            if let Some(previous_end) = ends.last() {
                if start < *previous_end {
                    return Err(ChoreoError::Unsorted { index });
                }
            }
            starts.push(start);
            ends.push(end);
        }

        Ok(Self {
            starts,
            ends,
            extent: Extent::Closed,
        })
    }

    /// A closed-interval index with nothing in it.
    pub fn empty() -> Self {
        Self {
            starts: Vec::new(),
            ends: Vec::new(),
            extent: Extent::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn start(&self, index: usize) -> Option<f64> {
        self.starts.get(index).copied()
    }

    /// End of the item at `index`. Open-ended items end where the next one
    /// starts; the last open-ended item has no end.
    pub fn end(&self, index: usize) -> Option<f64> {
        match self.extent {
            Extent::Closed => self.ends.get(index).copied(),
            Extent::OpenEnded => self.starts.get(index + 1).copied(),
        }
    }

    /// Resolves `t` to the active item or a gap/boundary description.
    ///
    /// Open-ended indexes report the first item for times before it, so a
    /// non-empty routine always has an active move.
    pub fn lookup(&self, t: f64) -> Lookup {
        if self.starts.is_empty() {
            return Lookup::Empty;
        }

        // NaN compares false and lands before the first item.
        let started = self.starts.partition_point(|start| *start <= t);

        match self.extent {
            Extent::OpenEnded => Lookup::Active(started.saturating_sub(1)),
            Extent::Closed => {
                if started == 0 {
                    return Lookup::BeforeFirst {
                        first_start: self.starts[0],
                    };
                }
                let index = started - 1;
                if t < self.ends[index] {
                    Lookup::Active(index)
                } else if index + 1 == self.starts.len() {
                    Lookup::AfterLast {
                        last: index,
                        last_end: self.ends[index],
                    }
                } else {
                    Lookup::Gap {
                        previous: index,
                        next: index + 1,
                        gap_seconds: self.starts[index + 1] - self.ends[index],
                    }
                }
            }
        }
    }

    /// Shorthand for `lookup(t).index()`.
    pub fn active(&self, t: f64) -> Option<usize> {
        self.lookup(t).index()
    }
}

/// Authoritative media time source sampled by the playback driver.
pub trait MediaClock {
    /// Current media position in seconds.
    fn current_time(&self) -> f64;
}

/// Media clock advanced by hand, used by simulations and tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    pub time_seconds: f64,
    pub rate: f64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            time_seconds: 0.0,
            rate: 1.0,
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(rate: f64) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    /// Advances media time by `wall_seconds` scaled by the playback rate.
    pub fn advance(&mut self, wall_seconds: f64) {
        self.time_seconds = (self.time_seconds + wall_seconds * self.rate).max(0.0);
    }

    pub fn seek(&mut self, time_seconds: f64) {
        self.time_seconds = time_seconds.max(0.0);
    }
}

impl MediaClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.time_seconds
    }
}
