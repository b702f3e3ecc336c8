//! Audio rendering services.
//!
//! The engine never talks to a sound card directly. It drives an
//! [`AudioOutput`]: gain controls wired into a tree that ends at the device,
//! buffer-backed voices and short tones feeding those gains, and an output
//! clock that only advances while the output is running.
//!
//! [`DeviceOutput`] streams a [`SharedGraph`] to the default device through
//! rodio. The shared graph on its own is the offline output used headless
//! and in tests, where the clock advances only as frames are rendered.

use super::decode::PcmBuffer;
use super::graph::{GraphSource, SharedGraph};
use rodio::{OutputStream, OutputStreamHandle};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Handle to a gain control in the output graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GainId(pub(crate) u64);

/// Handle to a buffer-backed voice in the output graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub(crate) u64);

/// Where a gain control sends its signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainTarget {
    /// Straight to the device.
    Destination,
    /// Into another gain control.
    Gain(GainId),
}

/// Parameters for starting one buffer-backed voice.
#[derive(Debug, Clone)]
pub struct VoiceParams {
    /// Decoded audio to play.
    pub buffer: Arc<PcmBuffer>,
    /// Gain control the voice feeds.
    pub gain: GainId,
    /// Output-clock time at which the voice becomes audible.
    pub start_at: f64,
    /// Position inside the buffer, in seconds, heard at `start_at`.
    pub offset: f64,
    /// Playback rate (1.0 = recorded speed).
    pub rate: f64,
    /// Whether the voice wraps around at the end of the buffer.
    pub looping: bool,
}

/// Parameters for a short percussive sine tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    /// Pitch in hertz.
    pub frequency: f32,
    /// Output-clock time of the attack.
    pub start_at: f64,
    /// Length of the exponential decay.
    pub duration: f64,
    /// Peak amplitude.
    pub level: f32,
    /// Gain control the tone feeds.
    pub gain: GainId,
}

/// Errors that can occur while opening the audio device.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No usable output device.
    #[error("failed to open audio output: {0}")]
    DeviceInit(String),
    /// The device refused the stream.
    #[error("failed to start audio playback: {0}")]
    Playback(String),
}

/// The rendering services the playback engine depends on.
pub trait AudioOutput {
    /// Current output-clock time in seconds.
    fn current_time(&self) -> f64;

    /// Returns true while the output clock is advancing.
    fn is_running(&self) -> bool;

    /// Starts (or restarts) the output clock.
    fn resume(&mut self);

    /// Freezes the output clock and silences the device.
    fn suspend(&mut self);

    /// Creates a gain control at unity.
    fn create_gain(&mut self, target: GainTarget) -> GainId;

    /// Sets a gain control's multiplier, effective at the current clock instant.
    fn set_gain(&mut self, id: GainId, value: f32);

    /// Detaches a gain control. Signals routed through it fall silent.
    fn remove_gain(&mut self, id: GainId);

    /// Starts one voice.
    fn start_voice(&mut self, params: VoiceParams) -> VoiceId;

    /// Starts several voices in one scheduling call, so none of them can be
    /// rendered before the others exist.
    ///
    /// Every voice starts at the clock instant read inside that call; the
    /// `start_at` of each entry in `batch` is overwritten. Returns that
    /// instant with the new ids.
    fn start_voices(&mut self, batch: Vec<VoiceParams>) -> (f64, Vec<VoiceId>) {
        let at = self.current_time();
        let ids = batch
            .into_iter()
            .map(|p| self.start_voice(VoiceParams { start_at: at, ..p }))
            .collect();
        (at, ids)
    }

    /// Changes a running voice's rate without restarting it.
    fn set_voice_rate(&mut self, id: VoiceId, rate: f64);

    /// Stops and detaches a voice. Unknown or already stopped voices are ignored.
    fn stop_voice(&mut self, id: VoiceId);

    /// Schedules a one-shot tone.
    fn schedule_tone(&mut self, params: ToneParams);

    /// Drops every tone that has not finished yet.
    fn cancel_tones(&mut self);

    /// Number of voices currently attached.
    fn voice_count(&self) -> usize;
}

/// Sample rate requested from the device when none is configured.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// The default sound card, fed by a render graph.
pub struct DeviceOutput {
    graph: SharedGraph,
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    /// Audio output handle for playback.
    _stream_handle: OutputStreamHandle,
}

impl DeviceOutput {
    /// Opens the default output device.
    ///
    /// The graph starts suspended, like a freshly created browser audio
    /// context: nothing is heard and the clock stays at zero until
    /// [`AudioOutput::resume`] is called.
    ///
    /// # Errors
    ///
    /// Returns error if no device is available or the stream cannot start
    pub fn open(sample_rate: u32) -> Result<Self, AudioError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let graph = SharedGraph::new(sample_rate);
        stream_handle
            .play_raw(GraphSource::new(graph.clone()))
            .map_err(|e| AudioError::Playback(e.to_string()))?;

        info!(sample_rate, "Opened audio output");
        Ok(Self {
            graph,
            _stream: stream,
            _stream_handle: stream_handle,
        })
    }

}

impl AudioOutput for DeviceOutput {
    fn current_time(&self) -> f64 {
        self.graph.current_time()
    }

    fn is_running(&self) -> bool {
        self.graph.is_running()
    }

    fn resume(&mut self) {
        self.graph.resume();
    }

    fn suspend(&mut self) {
        self.graph.suspend();
    }

    fn create_gain(&mut self, target: GainTarget) -> GainId {
        self.graph.create_gain(target)
    }

    fn set_gain(&mut self, id: GainId, value: f32) {
        self.graph.set_gain(id, value);
    }

    fn remove_gain(&mut self, id: GainId) {
        self.graph.remove_gain(id);
    }

    fn start_voice(&mut self, params: VoiceParams) -> VoiceId {
        self.graph.start_voice(params)
    }

    fn start_voices(&mut self, batch: Vec<VoiceParams>) -> (f64, Vec<VoiceId>) {
        self.graph.start_voices(batch)
    }

    fn set_voice_rate(&mut self, id: VoiceId, rate: f64) {
        self.graph.set_voice_rate(id, rate);
    }

    fn stop_voice(&mut self, id: VoiceId) {
        self.graph.stop_voice(id);
    }

    fn schedule_tone(&mut self, params: ToneParams) {
        self.graph.schedule_tone(params);
    }

    fn cancel_tones(&mut self) {
        self.graph.cancel_tones();
    }

    fn voice_count(&self) -> usize {
        self.graph.voice_count()
    }
}
