//! Recorded instrument stems.
//!
//! A track is one instrument's recording within a song. Tracks are
//! immutable descriptors: the mixer state that changes during practice
//! (volume, mute, solo) lives in the engine, not here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a track within its song.
///
/// Ids come from the song catalog and are only unique per song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    /// Creates a track id from its catalog value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One instrument stem of a song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Identifier, unique within the song.
    pub id: TrackId,

    /// Instrument label shown on the mixer strip.
    pub instrument: String,

    /// Location of the audio resource: a local path, a `file://` URI or
    /// an `http(s)://` URL. Empty means the track is intentionally silent.
    #[serde(rename = "path", default)]
    pub resource_uri: String,
}

impl Track {
    /// Creates a track descriptor.
    ///
    /// # Arguments
    ///
    /// * `id` - Catalog id of the track
    /// * `instrument` - Display label
    /// * `resource_uri` - Audio location, or an empty string for a silent track
    pub fn new(id: u32, instrument: impl Into<String>, resource_uri: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(id),
            instrument: instrument.into(),
            resource_uri: resource_uri.into(),
        }
    }

    /// Returns true if the track has no audio resource.
    ///
    /// Silent tracks are never fetched and never produce a load error.
    pub fn is_silent(&self) -> bool {
        self.resource_uri.trim().is_empty()
    }
}
