//! Track loading: fetch and decode every stem of a song concurrently.
//!
//! Failures are isolated per track. A stem that cannot be fetched or
//! decoded is reported against its id and simply stays silent; the rest
//! of the song loads normally. Tracks without a resource are silent by
//! intent and never touch the fetcher.
//!
//! Loads run on the rayon pool. Each batch is tagged with the engine's
//! load generation so the engine can discard a report that arrives after
//! a newer song was selected.

use super::decode::{DecodeError, PcmBuffer, PcmDecoder};
use super::fetch::{FetchError, ResourceFetcher};
use crate::song::{Song, Track, TrackId};
use crossbeam_channel::Receiver;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a track with a resource ended up without audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackLoadError {
    /// The resource could not be retrieved.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The resource was retrieved but is not playable audio.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Outcome of loading one track.
#[derive(Debug, Clone)]
pub enum TrackLoad {
    /// The track has no resource. Not an error.
    Silent,
    /// Decoded audio.
    Loaded(Arc<PcmBuffer>),
    /// Fetching or decoding failed.
    Failed(TrackLoadError),
}

/// Fetches and decodes a single track.
pub fn load_track(track: &Track, fetcher: &dyn ResourceFetcher, decoder: &dyn PcmDecoder) -> TrackLoad {
    if track.is_silent() {
        return TrackLoad::Silent;
    }

    let result = fetcher
        .fetch(&track.resource_uri)
        .map_err(TrackLoadError::from)
        .and_then(|bytes| decoder.decode(bytes).map_err(TrackLoadError::from));

    match result {
        Ok(buffer) => TrackLoad::Loaded(Arc::new(buffer)),
        Err(e) => {
            warn!(track = %track.id, instrument = %track.instrument, error = %e,
                "Failed to load or decode audio");
            TrackLoad::Failed(e)
        }
    }
}

/// The settled result of one load batch.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Load generation the batch was started for.
    pub generation: u64,
    /// Decoded audio for every track that loaded.
    pub buffers: HashMap<TrackId, Arc<PcmBuffer>>,
    /// Error description for every track with a resource that failed.
    pub errors: BTreeMap<TrackId, String>,
    /// Longest decoded buffer, or 0 if nothing decoded.
    pub duration: f64,
}

/// Loads every track of `tracks` in parallel and waits for all of them.
pub fn load_tracks(
    tracks: &[Track],
    fetcher: &dyn ResourceFetcher,
    decoder: &dyn PcmDecoder,
) -> LoadReport {
    let outcomes: Vec<(TrackId, TrackLoad)> = tracks
        .par_iter()
        .map(|track| (track.id, load_track(track, fetcher, decoder)))
        .collect();

    let mut report = LoadReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            TrackLoad::Silent => {}
            TrackLoad::Loaded(buffer) => {
                report.duration = report.duration.max(buffer.duration());
                report.buffers.insert(id, buffer);
            }
            TrackLoad::Failed(e) => {
                report.errors.insert(id, e.to_string());
            }
        }
    }
    report
}

/// Runs load batches for the engine.
#[derive(Clone)]
pub struct TrackLoader {
    fetcher: Arc<dyn ResourceFetcher>,
    decoder: Arc<dyn PcmDecoder>,
}

impl TrackLoader {
    /// Creates a loader from a byte source and a decoder.
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, decoder: Arc<dyn PcmDecoder>) -> Self {
        Self { fetcher, decoder }
    }

    /// Loads a song on the calling thread.
    pub fn load_blocking(&self, song: &Song, generation: u64) -> LoadReport {
        let mut report = load_tracks(&song.tracks, &*self.fetcher, &*self.decoder);
        report.generation = generation;
        debug!(
            song = %song.id,
            generation,
            loaded = report.buffers.len(),
            failed = report.errors.len(),
            duration = report.duration,
            "Load batch settled"
        );
        report
    }

    /// Starts loading a song in the background.
    ///
    /// The returned receiver yields exactly one report once every track has
    /// settled. Dropping it abandons the result without cancelling the work.
    pub fn spawn(&self, song: &Song, generation: u64) -> Receiver<LoadReport> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let loader = self.clone();
        let song = song.clone();
        rayon::spawn(move || {
            let report = loader.load_blocking(&song, generation);
            // The engine may have moved on to another song.
            let _ = tx.send(report);
        });
        rx
    }
}

impl std::fmt::Debug for TrackLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackLoader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves canned results and records which URIs were requested.
    #[derive(Default)]
    struct CannedFetcher {
        requested: Mutex<Vec<String>>,
    }

    impl ResourceFetcher for CannedFetcher {
        fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
            self.requested.lock().unwrap().push(uri.to_string());
            match uri {
                "missing" => Err(FetchError::Status {
                    uri: uri.to_string(),
                    status: 404,
                }),
                "garbage" => Ok(b"garbage".to_vec()),
                // The URI encodes the number of mono frames at 10 Hz.
                frames => Ok(frames.as_bytes().to_vec()),
            }
        }
    }

    struct CountingDecoder;

    impl PcmDecoder for CountingDecoder {
        fn decode(&self, bytes: Vec<u8>) -> Result<PcmBuffer, DecodeError> {
            let text = String::from_utf8(bytes).map_err(|_| DecodeError::UnrecognizedFormat)?;
            let frames: usize = text.parse().map_err(|_| DecodeError::UnrecognizedFormat)?;
            PcmBuffer::new(1, 10, vec![0.0; frames])
        }
    }

    #[test]
    fn test_silent_tracks_are_not_fetched() {
        let fetcher = CannedFetcher::default();
        let tracks = vec![Track::new(1, "Alfaia", ""), Track::new(2, "Caixa", "")];

        let report = load_tracks(&tracks, &fetcher, &CountingDecoder);
        assert!(fetcher.requested.lock().unwrap().is_empty());
        assert!(report.errors.is_empty());
        assert!(report.buffers.is_empty());
        assert_eq!(report.duration, 0.0);
    }

    #[test]
    fn test_failure_is_isolated() {
        let fetcher = CannedFetcher::default();
        let tracks = vec![
            Track::new(1, "Alfaia", "30"),
            Track::new(2, "Caixa", "missing"),
            Track::new(3, "Gonguê", "50"),
            Track::new(4, "Agbê", "garbage"),
        ];

        let report = load_tracks(&tracks, &fetcher, &CountingDecoder);
        assert_eq!(report.buffers.len(), 2);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(
            report.errors[&TrackId::new(2)],
            "HTTP error! status: 404 for missing"
        );
        assert_eq!(report.errors[&TrackId::new(4)], "unrecognized audio format");
        assert!((report.duration - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_spawn_tags_generation() {
        let loader = TrackLoader::new(Arc::new(CannedFetcher::default()), Arc::new(CountingDecoder));
        let song = Song::new(9, "Test", 100).with_track(Track::new(1, "Alfaia", "20"));

        let report = loader.spawn(&song, 42).recv().unwrap();
        assert_eq!(report.generation, 42);
        assert!((report.duration - 2.0).abs() < 1e-12);
    }
}
