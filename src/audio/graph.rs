//! The render graph behind every audio output.
//!
//! Gains form a tree rooted at the device. Voices and tones feed gains.
//! Rendering walks every source once per block and accumulates into an
//! interleaved stereo buffer. The output clock is the count of frames
//! rendered while running, so it is sample-accurate and frozen while
//! suspended.

use super::output::{AudioOutput, GainId, GainTarget, ToneParams, VoiceId, VoiceParams};
use super::decode::PcmBuffer;
use rodio::Source;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Frames rendered per lock of the graph in the device callback.
const BLOCK_FRAMES: usize = 256;

/// Longest gain chain followed before a route is treated as broken.
const MAX_GAIN_DEPTH: usize = 8;

/// Level a tone decays to by the end of its duration.
const TONE_FLOOR: f64 = 0.001;

#[derive(Debug, Clone, Copy)]
struct GainNode {
    value: f32,
    target: GainTarget,
}

#[derive(Debug)]
struct Voice {
    buffer: Arc<PcmBuffer>,
    gain: GainId,
    start_at: f64,
    /// Read position in buffer frames.
    position: f64,
    rate: f64,
    looping: bool,
    finished: bool,
}

impl Voice {
    fn new(params: VoiceParams) -> Self {
        let frames = params.buffer.frames() as f64;
        let mut position = params.offset.max(0.0) * params.buffer.sample_rate() as f64;
        if params.looping {
            position %= frames;
        }
        Self {
            finished: !params.looping && position >= frames,
            buffer: params.buffer,
            gain: params.gain,
            start_at: params.start_at,
            position,
            rate: params.rate,
            looping: params.looping,
        }
    }

    fn mix_into(&mut self, out: &mut [f32], first_frame: u64, output_rate: f64, gain: f32) {
        let frames = self.buffer.frames();
        let step_scale = self.buffer.sample_rate() as f64 / output_rate;

        for (i, slot) in out.chunks_exact_mut(2).enumerate() {
            if self.finished {
                return;
            }
            let t = (first_frame + i as u64) as f64 / output_rate;
            if t < self.start_at {
                continue;
            }

            let (left, right) = self.buffer.stereo_frame(self.position as usize);
            slot[0] += left * gain;
            slot[1] += right * gain;

            self.position += self.rate * step_scale;
            if self.position >= frames as f64 {
                if self.looping {
                    self.position %= frames as f64;
                } else {
                    self.finished = true;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tone {
    params: ToneParams,
}

impl Tone {
    fn end(&self) -> f64 {
        self.params.start_at + self.params.duration
    }

    #[inline]
    fn sample_at(&self, t: f64) -> f32 {
        let elapsed = t - self.params.start_at;
        if elapsed < 0.0 || elapsed >= self.params.duration {
            return 0.0;
        }
        let envelope = TONE_FLOOR.powf(elapsed / self.params.duration);
        let phase = TAU * self.params.frequency as f64 * elapsed;
        (phase.sin() * envelope) as f32 * self.params.level
    }
}

/// Multiplies the gains along a route down to the device.
///
/// A route through a removed gain, or one that never reaches the device,
/// is silent.
fn resolve_gain(gains: &HashMap<GainId, GainNode>, id: GainId) -> f32 {
    let mut total = 1.0;
    let mut current = id;
    for _ in 0..MAX_GAIN_DEPTH {
        let Some(node) = gains.get(&current) else {
            return 0.0;
        };
        total *= node.value;
        match node.target {
            GainTarget::Destination => return total,
            GainTarget::Gain(next) => current = next,
        }
    }
    0.0
}

/// The mutable state of an output: topology, sources and clock.
#[derive(Debug)]
pub struct Graph {
    sample_rate: u32,
    frames_rendered: u64,
    running: bool,
    next_id: u64,
    gains: HashMap<GainId, GainNode>,
    voices: HashMap<VoiceId, Voice>,
    tones: Vec<Tone>,
}

impl Graph {
    /// Creates a suspended, empty graph.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            running: false,
            next_id: 1,
            gains: HashMap::new(),
            voices: HashMap::new(),
            tones: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clock time in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Renders interleaved stereo frames into `out`, advancing the clock.
    ///
    /// While suspended the buffer is silent and the clock does not move.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if !self.running {
            return;
        }

        let frames = out.len() / 2;
        let first_frame = self.frames_rendered;
        let output_rate = self.sample_rate as f64;

        for voice in self.voices.values_mut() {
            let gain = resolve_gain(&self.gains, voice.gain);
            voice.mix_into(out, first_frame, output_rate, gain);
        }

        for tone in &self.tones {
            let gain = resolve_gain(&self.gains, tone.params.gain);
            if gain == 0.0 {
                continue;
            }
            for (i, slot) in out.chunks_exact_mut(2).enumerate() {
                let sample = tone.sample_at((first_frame + i as u64) as f64 / output_rate) * gain;
                slot[0] += sample;
                slot[1] += sample;
            }
        }

        self.frames_rendered += frames as u64;
        let now = self.current_time();
        self.tones.retain(|t| t.end() > now);
        self.voices.retain(|_, v| !v.finished);
    }

    fn resume(&mut self) {
        self.running = true;
    }

    fn suspend(&mut self) {
        self.running = false;
    }

    fn create_gain(&mut self, target: GainTarget) -> GainId {
        let id = GainId(self.next_id());
        self.gains.insert(id, GainNode { value: 1.0, target });
        id
    }

    fn set_gain(&mut self, id: GainId, value: f32) {
        if let Some(node) = self.gains.get_mut(&id) {
            node.value = value.max(0.0);
        }
    }

    fn start_voice(&mut self, params: VoiceParams) -> VoiceId {
        let id = VoiceId(self.next_id());
        self.voices.insert(id, Voice::new(params));
        id
    }

    fn set_voice_rate(&mut self, id: VoiceId, rate: f64) {
        if let Some(voice) = self.voices.get_mut(&id) {
            voice.rate = rate;
        }
    }
}

/// A graph shared between the control side and the audio callback.
#[derive(Debug, Clone)]
pub struct SharedGraph {
    inner: Arc<Mutex<Graph>>,
}

impl SharedGraph {
    /// Creates a suspended, empty graph.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Graph::new(sample_rate))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Graph> {
        // A panic mid-render leaves the graph structurally intact.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate()
    }

    /// Renders interleaved stereo frames, advancing the clock.
    pub fn render(&self, out: &mut [f32]) {
        self.lock().render(out);
    }

    /// Renders `seconds` of output offline and returns the interleaved frames.
    ///
    /// This is how a headless session (or a test) moves the clock forward.
    pub fn render_seconds(&self, seconds: f64) -> Vec<f32> {
        let mut graph = self.lock();
        let frames = (seconds.max(0.0) * graph.sample_rate() as f64).round() as usize;
        let mut out = vec![0.0; frames * 2];
        for block in out.chunks_mut(BLOCK_FRAMES * 2) {
            graph.render(block);
        }
        out
    }

    /// Number of tones waiting to sound or still decaying.
    pub fn pending_tones(&self) -> usize {
        self.lock().tones.len()
    }
}

impl AudioOutput for SharedGraph {
    fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }

    fn resume(&mut self) {
        self.lock().resume();
    }

    fn suspend(&mut self) {
        self.lock().suspend();
    }

    fn create_gain(&mut self, target: GainTarget) -> GainId {
        self.lock().create_gain(target)
    }

    fn set_gain(&mut self, id: GainId, value: f32) {
        self.lock().set_gain(id, value);
    }

    fn remove_gain(&mut self, id: GainId) {
        self.lock().gains.remove(&id);
    }

    fn start_voice(&mut self, params: VoiceParams) -> VoiceId {
        self.lock().start_voice(params)
    }

    fn start_voices(&mut self, batch: Vec<VoiceParams>) -> (f64, Vec<VoiceId>) {
        let mut graph = self.lock();
        let at = graph.current_time();
        let ids = batch
            .into_iter()
            .map(|p| graph.start_voice(VoiceParams { start_at: at, ..p }))
            .collect();
        (at, ids)
    }

    fn set_voice_rate(&mut self, id: VoiceId, rate: f64) {
        self.lock().set_voice_rate(id, rate);
    }

    fn stop_voice(&mut self, id: VoiceId) {
        self.lock().voices.remove(&id);
    }

    fn schedule_tone(&mut self, params: ToneParams) {
        self.lock().tones.push(Tone { params });
    }

    fn cancel_tones(&mut self) {
        self.lock().tones.clear();
    }

    fn voice_count(&self) -> usize {
        self.lock().voices.len()
    }
}

/// Streams a shared graph to rodio, one block per lock.
pub(crate) struct GraphSource {
    graph: SharedGraph,
    sample_rate: u32,
    buf: Vec<f32>,
    pos: usize,
}

impl GraphSource {
    pub(crate) fn new(graph: SharedGraph) -> Self {
        Self {
            sample_rate: graph.sample_rate(),
            graph,
            buf: vec![0.0; BLOCK_FRAMES * 2],
            pos: BLOCK_FRAMES * 2, // Start at end to trigger first render
        }
    }
}

impl Iterator for GraphSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.buf.len() {
            self.graph.render(&mut self.buf);
            self.pos = 0;
        }
        let sample = self.buf[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for GraphSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
