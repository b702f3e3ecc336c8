//! stemdeck - A terminal practice console for multi-track ensemble stems.
//!
//! This library provides the playback engine, the song model and the
//! engine configuration used by the console.

pub mod audio;
pub mod config;
pub mod song;

// Re-export commonly used types
pub use audio::{EngineEvent, PlaybackEngine, PlaybackState, TrackState};
pub use config::EngineConfig;
pub use song::{Song, SongCatalog, SongId, TimeSignature, Track, TrackId};
