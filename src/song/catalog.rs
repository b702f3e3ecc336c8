//! Song catalog loading.
//!
//! The catalog is a JSON document listing the songs available for
//! practice. It is static data: nothing in the engine writes it back.

use super::{Song, SongId, Track};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    /// The catalog is not valid JSON for the expected shape.
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    /// The catalog parsed but describes an unusable song.
    #[error("invalid song {song}: {reason}")]
    Invalid {
        /// Offending song id.
        song: SongId,
        /// What is wrong with it.
        reason: String,
    },
}

/// The list of songs offered by the song selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongCatalog {
    /// Songs in display order.
    pub songs: Vec<Song>,
}

impl SongCatalog {
    /// Parses and validates a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns error if parsing fails or a song is invalid
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Loads a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or validated
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks the invariants the engine relies on.
    ///
    /// Every song needs a positive tempo, at least one beat per bar and
    /// track ids that are unique within the song.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for song in &self.songs {
            let invalid = |reason: &str| CatalogError::Invalid {
                song: song.id,
                reason: reason.to_string(),
            };
            if song.bpm == 0 {
                return Err(invalid("bpm must be greater than zero"));
            }
            if song.time_signature.beats_per_bar == 0 {
                return Err(invalid("time signature needs at least one beat per bar"));
            }
            let mut seen = HashSet::new();
            if !song.tracks.iter().all(|t| seen.insert(t.id)) {
                return Err(invalid("track ids must be unique"));
            }
        }
        Ok(())
    }

    /// Returns the number of songs.
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Returns true if the catalog has no songs.
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Returns a song by index.
    pub fn song_at(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    /// Built-in demo catalog.
    ///
    /// None of the demo stems has audio attached, so every track loads as
    /// silent; users point the console at their own catalog to hear anything.
    pub fn demo() -> Self {
        let stems = |labels: &[&str]| -> Vec<Track> {
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| Track::new(i as u32 + 1, *label, ""))
                .collect()
        };
        let demo_song = |id, name: &str, bpm, labels: &[&str]| {
            let mut song = Song::new(id, name, bpm).with_artist("Demo");
            song.tracks = stems(labels);
            song
        };

        Self {
            songs: vec![
                demo_song(1, "Baobá Ancestral", 120, &["Alfaia", "Caixa", "Gonguê", "Agbê"]),
                demo_song(
                    2,
                    "Batuque de Malungo",
                    135,
                    &["Alfaia", "Caixa", "Gonguê", "Agbê", "Timbau", "Voz"],
                ),
                demo_song(
                    3,
                    "Pé de Coco",
                    110,
                    &["Alfaia Marcante", "Alfaia Repique", "Caixa", "Gonguê"],
                ),
                demo_song(4, "Boia Fria", 95, &["Alfaia", "Caixa", "Gonguê", "Voz"]),
            ],
        }
    }
}
