//! Resolution of move-id sequences into renderable routines.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    catalog::{BodyPart, MoveCatalog, MoveDefinition},
    config::RoutineConfig,
    timeline::Lookup,
    ChoreoError, Result, TimeIndex,
};

/// Move entry as produced by the choreography generator or the cache.
///
/// Older payloads call the start time `timestamp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEntry {
    #[serde(default)]
    pub move_id: Option<String>,
    #[serde(default)]
    pub beats: Option<u32>,
    #[serde(default, alias = "timestamp")]
    pub start_time: f64,
}

impl MoveEntry {
    pub fn new(move_id: &str, start_time: f64) -> Self {
        Self {
            move_id: Some(move_id.to_string()),
            beats: None,
            start_time,
        }
    }

    pub fn with_beats(mut self, beats: u32) -> Self {
        self.beats = Some(beats);
        self
    }
}

/// A move placed in a routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub move_id: String,
    pub name: String,
    pub description: String,
    pub beats: u32,
    pub start_time: f64,
    pub difficulty: u8,
    pub body_part: BodyPart,
    /// 1-based place in the routine.
    pub position: usize,
    /// The id the entry asked for when the fallback move stands in for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substituted_for: Option<String>,
}

impl Move {
    /// Overlays a routine entry on its catalog definition.
    ///
    /// The entry contributes only `beats` (when present and non-zero) and
    /// `start_time`; every display field comes from the catalog.
    pub fn merge(definition: &MoveDefinition, entry: &MoveEntry, position: usize) -> Self {
        Self {
            move_id: definition.id.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            beats: entry
                .beats
                .filter(|beats| *beats > 0)
                .unwrap_or(definition.default_beats),
            start_time: entry.start_time.max(0.0),
            difficulty: definition.difficulty,
            body_part: definition.body_part,
            position,
            substituted_for: None,
        }
    }
}

/// Ordered moves of one song, immutable for a playback session.
#[derive(Debug, Clone)]
pub struct Routine {
    moves: Vec<Move>,
    index: TimeIndex,
}

impl Routine {
    /// Moves must be ordered by non-decreasing start time.
    pub fn new(moves: Vec<Move>) -> Result<Self> {
        let index = TimeIndex::open_ended(moves.iter().map(|m| m.start_time))?;
        Ok(Self { moves, index })
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn get(&self, index: usize) -> Option<&Move> {
        self.moves.get(index)
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn lookup(&self, t: f64) -> Lookup {
        self.index.lookup(t)
    }

    /// Index of the move on screen at `t`; the first move before it starts.
    pub fn active(&self, t: f64) -> Option<usize> {
        self.index.active(t)
    }

    /// Fits start times authored for `assumed_duration` to the real media
    /// length.
    ///
    /// Mismatches within the tolerance leave the routine untouched. Larger
    /// ones scale every start by `actual / assumed` and keep starts out of the
    /// final `end_guard_seconds` of the media.
    pub fn rescaled(
        &self,
        actual_duration: f64,
        assumed_duration: f64,
        config: &RoutineConfig,
    ) -> Self {
        let usable = actual_duration.is_finite()
            && assumed_duration.is_finite()
            && actual_duration > 0.0
            && assumed_duration > 0.0;
        if !usable
            || (actual_duration - assumed_duration).abs() <= config.rescale_tolerance_seconds
        {
            return self.clone();
        }

        let ratio = actual_duration / assumed_duration;
        let latest_start = (actual_duration - config.end_guard_seconds).max(0.0);
        let moves: Vec<Move> = self
            .moves
            .iter()
            .map(|m| Move {
                start_time: (m.start_time * ratio).min(latest_start).max(0.0),
                ..m.clone()
            })
            .collect();

        info!(
            actual_duration,
            assumed_duration,
            ratio,
            "rescaled routine to media duration"
        );

        // Scaling by a positive ratio and clamping keep starts non-decreasing.
        let index = match TimeIndex::open_ended(moves.iter().map(|m| m.start_time)) {
            Ok(index) => index,
            Err(_) => return self.clone(),
        };
        Self { moves, index }
    }
}

/// Turns move entries into a [`Routine`] using a catalog.
#[derive(Debug, Clone)]
pub struct RoutineBuilder {
    catalog: MoveCatalog,
    fallback: MoveDefinition,
}

impl RoutineBuilder {
    /// Fails when the configured fallback move is not in `catalog`.
    pub fn new(catalog: MoveCatalog, config: &RoutineConfig) -> Result<Self> {
        let fallback = catalog.require(&config.fallback_move_id)?.clone();
        Ok(Self { catalog, fallback })
    }

    pub fn catalog(&self) -> &MoveCatalog {
        &self.catalog
    }

    pub fn fallback(&self) -> &MoveDefinition {
        &self.fallback
    }

    /// Resolves a single entry. Unknown or missing ids resolve to the
    /// fallback move with the entry's beats and start time.
    pub fn resolve(&self, entry: &MoveEntry, position: usize) -> Move {
        let requested = entry.move_id.as_deref().unwrap_or_default();
        match self.catalog.get(requested) {
            Some(definition) => Move::merge(definition, entry, position),
            None => {
                warn!(
                    move_id = requested,
                    position,
                    fallback = %self.fallback.id,
                    "unknown move id, substituting fallback"
                );
                Move {
                    substituted_for: Some(requested.to_string()),
                    ..Move::merge(&self.fallback, entry, position)
                }
            }
        }
    }

    /// Builds a routine preserving entry order. Entries must already be
    /// ordered by start time.
    pub fn build(&self, entries: &[MoveEntry]) -> Result<Routine> {
        let moves = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| self.resolve(entry, i + 1))
            .collect();

        Routine::new(moves).map_err(|err| match err {
            ChoreoError::Unsorted { index } => ChoreoError::msg(format!(
                "routine move {} starts before the move preceding it",
                index + 1
            )),
            other => other,
        })
    }
}
