//! Playback core for synchronized multi-track practice.
//!
//! This module loads a song's stems, mixes them through per-track and
//! master gains, and keeps every stem phase-locked under a single
//! transport. It supports:
//! - Concurrent stem loading with per-track failure isolation
//! - Mute, solo and volume resolution on a persistent mixing bus
//! - Play, pause, stop, seek and live playback-rate changes
//! - A lookahead metronome routed through the master gain
//! - Output through rodio or an offline render graph

pub mod decode;
pub mod engine;
pub mod fetch;
pub mod graph;
pub mod loader;
pub mod metronome;
pub mod mixer;
pub mod output;
pub mod reporter;
pub mod transport;
pub mod voices;

pub use decode::{DecodeError, PcmBuffer, PcmDecoder, RodioDecoder};
pub use engine::{EngineEvent, PlaybackEngine};
pub use fetch::{DefaultFetcher, FetchError, FileFetcher, HttpFetcher, ResourceFetcher};
pub use graph::SharedGraph;
pub use loader::{LoadReport, TrackLoad, TrackLoadError, TrackLoader};
pub use mixer::TrackState;
pub use output::{AudioError, AudioOutput, DeviceOutput};
pub use transport::PlaybackState;
