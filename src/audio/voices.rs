//! Playback voices: one-shot, looping bindings of decoded stems into the mix.
//!
//! Voices are never reused. Every start, resume or seek builds a fresh
//! [`VoiceBatch`] in a single scheduling call, so all stems share the same
//! start instant and buffer offset and stay phase-locked.

use super::decode::PcmBuffer;
use super::output::{AudioOutput, GainId, VoiceId, VoiceParams};
use crate::song::TrackId;
use std::sync::Arc;

/// A decoded track ready to be voiced: its audio and the gain it feeds.
#[derive(Debug, Clone)]
pub struct Stem {
    /// The track the audio belongs to.
    pub track: TrackId,
    /// Decoded audio.
    pub buffer: Arc<PcmBuffer>,
    /// The track's gain control.
    pub gain: GainId,
}

/// The voices of one playing generation.
#[derive(Debug)]
pub struct VoiceBatch {
    generation: u64,
    start_at: f64,
    offset: f64,
    voices: Vec<(TrackId, VoiceId)>,
}

impl VoiceBatch {
    /// Starts one looping voice per stem at the current output instant.
    ///
    /// # Arguments
    ///
    /// * `output` - Output to schedule on
    /// * `stems` - Decoded tracks to voice
    /// * `offset` - Buffer position, in seconds, every voice starts from
    /// * `rate` - Playback rate for every voice
    /// * `generation` - Tag identifying this batch
    pub fn start(
        output: &mut dyn AudioOutput,
        stems: &[Stem],
        offset: f64,
        rate: f64,
        generation: u64,
    ) -> Self {
        // The output stamps the start instant while it holds the batch.
        let params = stems
            .iter()
            .map(|stem| VoiceParams {
                buffer: Arc::clone(&stem.buffer),
                gain: stem.gain,
                start_at: 0.0,
                offset,
                rate,
                looping: true,
            })
            .collect();
        let (start_at, ids) = output.start_voices(params);
        let voices = stems.iter().map(|s| s.track).zip(ids).collect();

        Self {
            generation,
            start_at,
            offset,
            voices,
        }
    }

    /// Updates the rate of every voice in place; playback phase is kept.
    pub fn set_rate(&self, output: &mut dyn AudioOutput, rate: f64) {
        for (_, voice) in &self.voices {
            output.set_voice_rate(*voice, rate);
        }
    }

    /// Stops and detaches every voice. Calling it again does nothing.
    pub fn stop(&mut self, output: &mut dyn AudioOutput) {
        for (_, voice) in self.voices.drain(..) {
            output.stop_voice(voice);
        }
    }

    /// The batch's generation tag.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Output-clock time the batch started at.
    pub fn start_at(&self) -> f64 {
        self.start_at
    }

    /// Buffer offset the batch started from.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Number of voices still attached.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Returns true if no voice is attached.
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::SharedGraph;
    use crate::audio::output::GainTarget;

    fn stems(graph: &mut SharedGraph, count: u32) -> Vec<Stem> {
        let master = graph.create_gain(GainTarget::Destination);
        (1..=count)
            .map(|id| Stem {
                track: TrackId::new(id),
                buffer: Arc::new(PcmBuffer::new(1, 10, (0..40).map(|i| i as f32).collect()).unwrap()),
                gain: graph.create_gain(GainTarget::Gain(master)),
            })
            .collect()
    }

    #[test]
    fn test_batch_starts_all_stems_together() {
        let mut graph = SharedGraph::new(10);
        graph.resume();
        graph.render_seconds(0.7);
        let stems = stems(&mut graph, 3);

        let batch = VoiceBatch::start(&mut graph, &stems, 1.5, 1.0, 7);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.generation(), 7);
        assert!((batch.start_at() - 0.7).abs() < 1e-12);
        assert_eq!(batch.offset(), 1.5);
        assert_eq!(graph.voice_count(), 3);

        // Three identical ramps starting at frame 15 sum to 45.
        let out = graph.render_seconds(0.1);
        assert_eq!(out[0], 45.0);
    }

    #[test]
    fn test_stop_detaches_and_is_idempotent() {
        let mut graph = SharedGraph::new(10);
        let stems = stems(&mut graph, 2);
        let mut batch = VoiceBatch::start(&mut graph, &stems, 0.0, 1.0, 1);

        batch.stop(&mut graph);
        assert!(batch.is_empty());
        assert_eq!(graph.voice_count(), 0);

        batch.stop(&mut graph);
        assert_eq!(graph.voice_count(), 0);
    }

    #[test]
    fn test_rate_change_keeps_phase() {
        let mut graph = SharedGraph::new(10);
        graph.resume();
        let stems = stems(&mut graph, 1);
        let batch = VoiceBatch::start(&mut graph, &stems, 0.0, 1.0, 1);

        let out = graph.render_seconds(0.3);
        assert_eq!(out[4], 2.0);

        batch.set_rate(&mut graph, 0.5);
        let out = graph.render_seconds(0.2);
        assert_eq!(out[0], 3.0);
        assert_eq!(out[2], 3.0);
    }
}
