//! Song descriptors for the practice console.
//!
//! A song is an ordered set of instrument stems plus the musical metadata
//! the metronome needs (tempo and time signature). Songs are immutable once
//! selected; choosing another song rebuilds every piece of engine state.

mod catalog;
mod track;

pub use catalog::{CatalogError, SongCatalog};
pub use track::{Track, TrackId};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a song within the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(u32);

impl SongId {
    /// Creates a song id from its catalog value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time signature, serialized as `[beatsPerBar, beatUnit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct TimeSignature {
    /// Beats per bar (numerator).
    pub beats_per_bar: u32,
    /// Note value of one beat (denominator).
    pub beat_unit: u32,
}

impl TimeSignature {
    /// Creates a time signature.
    pub const fn new(beats_per_bar: u32, beat_unit: u32) -> Self {
        Self {
            beats_per_bar,
            beat_unit,
        }
    }

    /// Common time.
    pub const fn four_four() -> Self {
        Self::new(4, 4)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl From<[u32; 2]> for TimeSignature {
    fn from([beats_per_bar, beat_unit]: [u32; 2]) -> Self {
        Self::new(beats_per_bar, beat_unit)
    }
}

impl From<TimeSignature> for [u32; 2] {
    fn from(sig: TimeSignature) -> Self {
        [sig.beats_per_bar, sig.beat_unit]
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.beats_per_bar, self.beat_unit)
    }
}

/// A song: metadata plus its ordered stems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Catalog identifier.
    pub id: SongId,

    /// Song title.
    pub name: String,

    /// Artist or ensemble.
    pub artist: String,

    /// Tempo in beats per minute. Always greater than zero for catalog songs.
    pub bpm: u32,

    /// Bar layout used by the metronome.
    #[serde(default)]
    pub time_signature: TimeSignature,

    /// Stems in mixer order.
    pub tracks: Vec<Track>,
}

impl Song {
    /// Creates a song with no tracks, in 4/4 at the given tempo.
    ///
    /// # Arguments
    ///
    /// * `id` - Catalog identifier
    /// * `name` - Song title
    /// * `bpm` - Tempo in beats per minute
    pub fn new(id: u32, name: impl Into<String>, bpm: u32) -> Self {
        Self {
            id: SongId::new(id),
            name: name.into(),
            artist: String::new(),
            bpm,
            time_signature: TimeSignature::default(),
            tracks: Vec::new(),
        }
    }

    /// Builder-style helper to set the artist.
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    /// Builder-style helper to set the time signature.
    pub fn with_time_signature(mut self, beats_per_bar: u32, beat_unit: u32) -> Self {
        self.time_signature = TimeSignature::new(beats_per_bar, beat_unit);
        self
    }

    /// Builder-style helper to append a track.
    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    /// Returns a track by its id.
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Returns the length of one beat in seconds at the song's written tempo.
    pub fn seconds_per_beat(&self) -> f64 {
        seconds_per_beat(self.bpm as f64)
    }
}

/// Converts a tempo to the length of one beat in seconds.
///
/// Returns 0 for non-positive tempos so callers never divide by zero.
///
/// # Examples
///
/// ```
/// use stemdeck::song::seconds_per_beat;
///
/// assert_eq!(seconds_per_beat(120.0), 0.5);
/// ```
pub fn seconds_per_beat(bpm: f64) -> f64 {
    if bpm > 0.0 {
        60.0 / bpm
    } else {
        0.0
    }
}

/// Formats a song position as `m:ss`.
///
/// # Examples
///
/// ```
/// use stemdeck::song::format_time;
///
/// assert_eq!(format_time(75.4), "1:15");
/// ```
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
