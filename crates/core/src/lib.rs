//! Core library for the choreography viewer.
//!
//! Keeps dance moves, lyric lines and song sections in step with a media
//! clock. Each module owns one subsystem (time lookups, lyric alignment,
//! structure segmentation, routine resolution, playback) and the `song`
//! module assembles them into a session the presentation layer can drive.

pub mod align;
pub mod catalog;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod playback;
pub mod routine;
pub mod song;
pub mod structure;
pub mod timeline;

pub use align::{AlignedLine, Alignment, SimilarityAligner, TranscriptResponse, TranscriptSegment};
pub use catalog::{BodyPart, MoveCatalog, MoveDefinition};
pub use config::{AlignmentConfig, AppConfig, PlaybackConfig, RoutineConfig, StructureConfig};
pub use error::{ChoreoError, Result};
pub use lyrics::{LyricSegment, LyricTrack};
pub use playback::{
    BeatCounter, MessageCategory, PlaybackDriver, PlaybackPhase, PlaybackState,
    PlaybackSynchronizer, RandomSelector, Transition,
};
pub use routine::{Move, MoveEntry, Routine, RoutineBuilder};
pub use song::{CacheEntry, InstrumentalRegion, SongSession, SongSnapshot};
pub use structure::{Section, SectionTrack, SectionType, Segmentation, StructureSegmenter};
pub use timeline::{Lookup, ManualClock, MediaClock, TimeIndex};
