//! Transport state machine: owns the song position and the playing voices.
//!
//! Song position ("virtual time") is kept as an accumulated value plus,
//! while playing, the output-clock instant accumulation restarted at:
//!
//! ```text
//! virtual = paused_time + (now - reference_time) * rate
//! ```
//!
//! Every transition that changes the rate or stops the clock first folds
//! the elapsed time into `paused_time`, so a new rate only ever applies to
//! time that passes after the change.

use super::output::AudioOutput;
use super::voices::{Stem, VoiceBatch};
use tracing::debug;

/// Represents the current playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Not playing, position reset to start.
    #[default]
    Stopped,
    /// Currently playing.
    Playing,
    /// Paused at current position.
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        };
        f.write_str(label)
    }
}

/// Play/pause/stop/seek/rate control over one song's voices.
#[derive(Debug)]
pub struct Transport {
    state: PlaybackState,
    /// Song seconds accumulated up to `reference_time`.
    paused_time: f64,
    /// Output-clock instant accumulation restarted at. Meaningful while playing.
    reference_time: f64,
    rate: f64,
    min_rate: f64,
    max_rate: f64,
    /// Last position handed to consumers.
    displayed_time: f64,
    duration: f64,
    voices: Option<VoiceBatch>,
    generation: u64,
}

impl Transport {
    /// Creates a stopped transport at rate 1.0.
    ///
    /// # Arguments
    ///
    /// * `min_rate` - Lowest accepted playback rate
    /// * `max_rate` - Highest accepted playback rate
    pub fn new(min_rate: f64, max_rate: f64) -> Self {
        Self {
            state: PlaybackState::Stopped,
            paused_time: 0.0,
            reference_time: 0.0,
            rate: 1.0,
            min_rate,
            max_rate,
            displayed_time: 0.0,
            duration: 0.0,
            voices: None,
            generation: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Current playback rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Song length the transport seeks and wraps within.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Sets the song length once loading has settled.
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
    }

    /// Accumulated song position, excluding time elapsed since the last
    /// reference instant.
    pub fn paused_time(&self) -> f64 {
        self.paused_time
    }

    /// The position most recently reported to consumers.
    pub fn displayed_time(&self) -> f64 {
        self.displayed_time
    }

    /// Records the position reported to consumers.
    pub fn set_displayed_time(&mut self, time: f64) {
        self.displayed_time = time;
    }

    /// Generation tag of the most recent voice batch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The voices of the playing generation, if any.
    pub fn voices(&self) -> Option<&VoiceBatch> {
        self.voices.as_ref()
    }

    /// Song position at output-clock time `now`.
    pub fn virtual_time(&self, now: f64) -> f64 {
        match self.state {
            PlaybackState::Playing => self.paused_time + (now - self.reference_time) * self.rate,
            _ => self.paused_time,
        }
    }

    /// Starts playback from the accumulated position.
    ///
    /// Does nothing when already playing or when nothing decoded
    /// (zero duration).
    ///
    /// # Returns
    ///
    /// True if the transport transitioned to playing.
    pub fn play(&mut self, output: &mut dyn AudioOutput, stems: &[Stem]) -> bool {
        if self.state == PlaybackState::Playing || self.duration <= 0.0 {
            return false;
        }

        output.resume();
        let offset = self.paused_time % self.duration;
        self.start_batch(output, stems, offset);
        self.state = PlaybackState::Playing;
        debug!(offset, rate = self.rate, generation = self.generation, "Transport playing");
        true
    }

    /// Freezes the position and silences the output.
    ///
    /// Voices are torn down; the next [`Transport::play`] builds a fresh
    /// batch at the frozen position.
    pub fn pause(&mut self, output: &mut dyn AudioOutput) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }

        self.fold_elapsed(output.current_time());
        self.paused_time = self.paused_time.min(self.duration);
        self.displayed_time = self.paused_time;
        self.release_voices(output);
        output.suspend();
        self.state = PlaybackState::Paused;
        debug!(position = self.paused_time, "Transport paused");
        true
    }

    /// Tears down the voices and returns to the start. Valid from any state.
    pub fn stop(&mut self, output: &mut dyn AudioOutput) {
        self.release_voices(output);
        output.suspend();
        self.paused_time = 0.0;
        self.displayed_time = 0.0;
        self.state = PlaybackState::Stopped;
        debug!("Transport stopped");
    }

    /// Moves the position, clamped into the song.
    ///
    /// While playing, the voice batch is rebuilt at the new position and
    /// playback continues from there.
    ///
    /// # Returns
    ///
    /// The clamped target, or `None` when nothing decoded.
    pub fn seek(&mut self, output: &mut dyn AudioOutput, stems: &[Stem], target: f64) -> Option<f64> {
        if self.duration <= 0.0 || target.is_nan() {
            return None;
        }

        let target = target.clamp(0.0, self.duration);
        self.paused_time = target;
        self.displayed_time = target;

        if self.state == PlaybackState::Playing {
            self.release_voices(output);
            self.start_batch(output, stems, target % self.duration);
        }
        debug!(target, "Transport seeked");
        Some(target)
    }

    /// Changes the playback rate, clamped into the accepted range.
    ///
    /// Running voices are re-rated in place. Position accumulated so far
    /// keeps the old rate.
    ///
    /// # Returns
    ///
    /// The rate actually applied.
    pub fn set_rate(&mut self, output: &mut dyn AudioOutput, rate: f64) -> f64 {
        if rate.is_nan() {
            return self.rate;
        }
        let rate = rate.clamp(self.min_rate, self.max_rate);

        if self.state == PlaybackState::Playing {
            let now = output.current_time();
            self.fold_elapsed(now);
            self.displayed_time = self.paused_time.min(self.duration);
            if let Some(voices) = &self.voices {
                voices.set_rate(output, rate);
            }
        }
        self.rate = rate;
        rate
    }

    /// Stops and forgets the current song: position 0, rate 1.0, no duration.
    pub fn reset(&mut self, output: &mut dyn AudioOutput) {
        self.stop(output);
        self.rate = 1.0;
        self.duration = 0.0;
    }

    fn fold_elapsed(&mut self, now: f64) {
        self.paused_time += (now - self.reference_time) * self.rate;
        self.reference_time = now;
    }

    fn start_batch(&mut self, output: &mut dyn AudioOutput, stems: &[Stem], offset: f64) {
        self.generation += 1;
        let batch = VoiceBatch::start(output, stems, offset, self.rate, self.generation);
        self.reference_time = batch.start_at();
        self.voices = Some(batch);
    }

    fn release_voices(&mut self, output: &mut dyn AudioOutput) {
        if let Some(mut voices) = self.voices.take() {
            voices.stop(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::PcmBuffer;
    use crate::audio::graph::SharedGraph;
    use crate::audio::output::GainTarget;
    use crate::song::TrackId;
    use std::sync::Arc;

    const RATE: u32 = 100;

    /// A 10 second graph with two stems.
    fn setup() -> (SharedGraph, Vec<Stem>, Transport) {
        let mut graph = SharedGraph::new(RATE);
        let master = graph.create_gain(GainTarget::Destination);
        let stems = (1..=2)
            .map(|id| Stem {
                track: TrackId::new(id),
                buffer: Arc::new(PcmBuffer::new(1, RATE, vec![0.25; 1000]).unwrap()),
                gain: graph.create_gain(GainTarget::Gain(master)),
            })
            .collect();
        let mut transport = Transport::new(0.5, 1.5);
        transport.set_duration(10.0);
        (graph, stems, transport)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_play_requires_duration() {
        let (mut graph, stems, mut transport) = setup();
        transport.set_duration(0.0);
        assert!(!transport.play(&mut graph, &stems));
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert!(!graph.is_running());
        assert_eq!(transport.seek(&mut graph, &stems, 3.0), None);
        assert_eq!(transport.displayed_time(), 0.0);
    }

    #[test]
    fn test_play_pause_resume_round_trip() {
        let (mut graph, stems, mut transport) = setup();
        assert!(transport.play(&mut graph, &stems));
        assert!(graph.is_running());
        assert_eq!(graph.voice_count(), 2);

        graph.render_seconds(2.5);
        assert!(transport.pause(&mut graph));
        assert!(close(transport.paused_time(), 2.5));
        assert_eq!(graph.voice_count(), 0);
        assert!(!graph.is_running());

        // Clock frozen while paused: position must not move.
        graph.render_seconds(1.0);
        assert!(close(transport.virtual_time(graph.current_time()), 2.5));

        assert!(transport.play(&mut graph, &stems));
        assert!(close(transport.voices().unwrap().offset(), 2.5));
        graph.render_seconds(1.0);
        assert!(close(transport.virtual_time(graph.current_time()), 3.5));
    }

    #[test]
    fn test_play_twice_is_noop() {
        let (mut graph, stems, mut transport) = setup();
        assert!(transport.play(&mut graph, &stems));
        let generation = transport.generation();
        assert!(!transport.play(&mut graph, &stems));
        assert_eq!(transport.generation(), generation);
        assert_eq!(graph.voice_count(), 2);
    }

    #[test]
    fn test_pause_when_not_playing_is_noop() {
        let (mut graph, _, mut transport) = setup();
        assert!(!transport.pause(&mut graph));
        assert_eq!(transport.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_stop_then_play_starts_at_zero() {
        let (mut graph, stems, mut transport) = setup();
        transport.play(&mut graph, &stems);
        graph.render_seconds(4.0);
        transport.stop(&mut graph);
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(graph.voice_count(), 0);
        assert_eq!(transport.displayed_time(), 0.0);

        transport.play(&mut graph, &stems);
        assert_eq!(transport.voices().unwrap().offset(), 0.0);
        assert_eq!(transport.virtual_time(graph.current_time()), 0.0);
    }

    #[test]
    fn test_seek_clamps() {
        let (mut graph, stems, mut transport) = setup();
        assert_eq!(transport.seek(&mut graph, &stems, -5.0), Some(0.0));
        assert_eq!(transport.seek(&mut graph, &stems, 110.0), Some(10.0));
        assert_eq!(transport.displayed_time(), 10.0);
        assert_eq!(transport.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_seek_while_playing_rebuilds_batch() {
        let (mut graph, stems, mut transport) = setup();
        transport.play(&mut graph, &stems);
        graph.render_seconds(1.0);
        let first = transport.generation();

        transport.seek(&mut graph, &stems, 6.0);
        assert_eq!(transport.state(), PlaybackState::Playing);
        assert!(transport.generation() > first);
        assert_eq!(graph.voice_count(), 2);
        let voices = transport.voices().unwrap();
        assert_eq!(voices.offset(), 6.0);
        assert!(close(voices.start_at(), 1.0));

        graph.render_seconds(0.5);
        assert!(close(transport.virtual_time(graph.current_time()), 6.5));
    }

    #[test]
    fn test_rate_change_is_not_retroactive() {
        let (mut graph, stems, mut transport) = setup();
        transport.play(&mut graph, &stems);
        graph.render_seconds(2.0);

        let before = transport.virtual_time(graph.current_time());
        assert_eq!(transport.set_rate(&mut graph, 1.5), 1.5);
        let after = transport.virtual_time(graph.current_time());
        assert!(close(before, after));
        assert!(close(transport.displayed_time(), 2.0));

        // Voices were re-rated, not rebuilt.
        assert_eq!(transport.voices().unwrap().generation(), transport.generation());
        assert_eq!(graph.voice_count(), 2);

        graph.render_seconds(2.0);
        assert!(close(transport.virtual_time(graph.current_time()), 5.0));
    }

    #[test]
    fn test_rate_is_clamped() {
        let (mut graph, _, mut transport) = setup();
        assert_eq!(transport.set_rate(&mut graph, 0.1), 0.5);
        assert_eq!(transport.set_rate(&mut graph, 4.0), 1.5);
        assert_eq!(transport.set_rate(&mut graph, f64::NAN), 1.5);
    }

    #[test]
    fn test_reset_restores_rate() {
        let (mut graph, stems, mut transport) = setup();
        transport.set_rate(&mut graph, 0.75);
        transport.play(&mut graph, &stems);
        transport.reset(&mut graph);
        assert_eq!(transport.rate(), 1.0);
        assert_eq!(transport.duration(), 0.0);
        assert_eq!(graph.voice_count(), 0);
    }
}
