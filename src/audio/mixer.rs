//! The mixing bus: per-track gain controls, solo logic and the master gain.
//!
//! Each song gets one gain control per track, all feeding a master gain
//! that feeds the device. The controls are built once per song and only
//! their values change afterwards, so mixer moves are heard immediately on
//! the voices already playing.

use super::output::{AudioOutput, GainId, GainTarget};
use crate::song::{Track, TrackId};

/// Mixer settings for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    /// The track this strip controls.
    pub id: TrackId,
    /// Instrument label, copied from the track.
    pub instrument: String,
    /// Fader level. 1.0 is unity; values above boost.
    pub volume: f32,
    /// Whether the strip is muted.
    pub is_muted: bool,
    /// Whether the strip is soloed.
    pub is_soloed: bool,
}

impl TrackState {
    /// Creates a strip at unity, unmuted and unsoloed.
    pub fn new(track: &Track) -> Self {
        Self {
            id: track.id,
            instrument: track.instrument.clone(),
            volume: 1.0,
            is_muted: false,
            is_soloed: false,
        }
    }

    /// Returns the strip to unity, unmuted and unsoloed.
    pub fn reset(&mut self) {
        self.volume = 1.0;
        self.is_muted = false;
        self.is_soloed = false;
    }
}

/// Returns true if any strip is soloed.
pub fn has_solo(states: &[TrackState]) -> bool {
    states.iter().any(|t| t.is_soloed)
}

/// Resolves mute, solo and volume into the multiplier actually applied.
///
/// A muted strip is silent. While any strip is soloed, every strip that
/// is not soloed is silent as well.
#[inline]
pub fn effective_gain(state: &TrackState, any_solo: bool) -> f32 {
    if state.is_muted || (any_solo && !state.is_soloed) {
        0.0
    } else {
        state.volume
    }
}

/// The gain topology of the active song.
#[derive(Debug)]
pub struct MixingGraph {
    master: GainId,
    tracks: Vec<(TrackId, GainId)>,
}

impl MixingGraph {
    /// Creates the master gain and one gain per track.
    ///
    /// Every track gets a control, including silent and failed ones, so the
    /// topology always matches the song's track list.
    pub fn build(output: &mut dyn AudioOutput, tracks: &[Track]) -> Self {
        let master = output.create_gain(GainTarget::Destination);
        let tracks = tracks
            .iter()
            .map(|t| (t.id, output.create_gain(GainTarget::Gain(master))))
            .collect();
        Self { master, tracks }
    }

    /// Removes every control this graph created.
    pub fn teardown(&self, output: &mut dyn AudioOutput) {
        for (_, gain) in &self.tracks {
            output.remove_gain(*gain);
        }
        output.remove_gain(self.master);
    }

    /// The master gain, which the metronome also feeds.
    pub fn master(&self) -> GainId {
        self.master
    }

    /// The gain control for a track.
    pub fn track_gain(&self, id: TrackId) -> Option<GainId> {
        self.tracks.iter().find(|(t, _)| *t == id).map(|(_, g)| *g)
    }

    /// Number of track controls.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Pushes the current mixer settings into the output.
    pub fn apply(&self, output: &mut dyn AudioOutput, states: &[TrackState], master_volume: f32) {
        let any_solo = has_solo(states);
        for state in states {
            if let Some(gain) = self.track_gain(state.id) {
                output.set_gain(gain, effective_gain(state, any_solo));
            }
        }
        output.set_gain(self.master, master_volume);
    }
}
