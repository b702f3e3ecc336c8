//! The playback engine: single owner of all mutable playback state.
//!
//! Ties the loader, mixing bus, transport, metronome and time reporter
//! together behind one `&mut self` API. Every mutator applies its graph and
//! voice changes before returning. Consumers poll the snapshot accessors or
//! subscribe to [`EngineEvent`]s, and call [`PlaybackEngine::update`] from
//! their refresh loop.

use super::decode::PcmBuffer;
use super::loader::{LoadReport, TrackLoader};
use super::metronome::MetronomeScheduler;
use super::mixer::{MixingGraph, TrackState};
use super::output::{AudioOutput, ToneParams};
use super::reporter::{self, TimeSample};
use super::transport::{PlaybackState, Transport};
use super::voices::Stem;
use crate::config::EngineConfig;
use crate::song::{Song, SongId, TrackId};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Change notifications published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A song was selected and its stems started loading.
    LoadStarted { song: SongId, generation: u64 },
    /// Every stem of the song settled.
    LoadFinished {
        song: SongId,
        failed: usize,
        duration: f64,
    },
    /// The transport changed state.
    TransportChanged(PlaybackState),
    /// A metronome click was heard.
    Beat(u32),
    /// A track strip or the master volume changed.
    MixerChanged,
    /// The playback rate changed.
    PlaybackRateChanged(f64),
    /// The metronome was switched on or off.
    MetronomeToggled(bool),
    /// Playback ran past the end of the song and stopped.
    SongEnded,
}

/// Multi-track playback engine.
pub struct PlaybackEngine {
    output: Box<dyn AudioOutput>,
    loader: TrackLoader,
    config: EngineConfig,
    song: Song,

    /// Generation of the most recent load batch.
    load_generation: u64,
    /// Receiver for the outstanding load batch.
    pending: Option<Receiver<LoadReport>>,
    buffers: HashMap<TrackId, Arc<PcmBuffer>>,
    load_errors: BTreeMap<TrackId, String>,

    mixer: MixingGraph,
    track_states: Vec<TrackState>,
    master_volume: f32,

    transport: Transport,
    metronome: MetronomeScheduler,
    metronome_on: bool,

    subscribers: Vec<Sender<EngineEvent>>,
}

impl PlaybackEngine {
    /// Creates an engine and starts loading `song`.
    ///
    /// # Arguments
    ///
    /// * `output` - Rendering services the engine drives (owned from here on)
    /// * `loader` - Fetches and decodes stems
    /// * `config` - Timing and mixing tunables; an invalid config is
    ///   replaced by the defaults
    /// * `song` - The song to load first
    pub fn new(
        mut output: Box<dyn AudioOutput>,
        loader: TrackLoader,
        mut config: EngineConfig,
        song: Song,
    ) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Invalid engine config, using defaults");
            config = EngineConfig::default();
        }
        let mixer = MixingGraph::build(output.as_mut(), &song.tracks);
        let transport = Transport::new(config.min_playback_rate, config.max_playback_rate);
        let metronome = MetronomeScheduler::new(config.scheduler_interval(), config.lookahead_secs);

        let mut engine = Self {
            output,
            loader,
            config,
            song: song.clone(),
            load_generation: 0,
            pending: None,
            buffers: HashMap::new(),
            load_errors: BTreeMap::new(),
            mixer,
            track_states: Vec::new(),
            master_volume: 1.0,
            transport,
            metronome,
            metronome_on: false,
            subscribers: Vec::new(),
        };
        engine.load_song(song);
        engine
    }

    /// Switches to another song.
    ///
    /// Everything belonging to the previous song is torn down before this
    /// returns: voices, clicks, gain controls, track strips, load errors
    /// and position. The playback rate returns to 1.0. Loading continues in
    /// the background and is picked up by [`update`](Self::update).
    pub fn load_song(&mut self, song: Song) {
        let was_stopped = self.transport.state() == PlaybackState::Stopped;
        self.stop_metronome();
        self.transport.reset(self.output.as_mut());

        self.mixer.teardown(self.output.as_mut());
        self.mixer = MixingGraph::build(self.output.as_mut(), &song.tracks);
        self.track_states = song.tracks.iter().map(TrackState::new).collect();
        self.apply_mixer();

        self.buffers.clear();
        self.load_errors.clear();
        self.load_generation += 1;
        self.pending = Some(self.loader.spawn(&song, self.load_generation));
        self.song = song;

        info!(song = %self.song.id, name = %self.song.name, tracks = self.song.tracks.len(),
            generation = self.load_generation, "Loading song");
        if !was_stopped {
            self.emit(EngineEvent::TransportChanged(PlaybackState::Stopped));
        }
        self.emit(EngineEvent::PlaybackRateChanged(self.transport.rate()));
        self.emit(EngineEvent::LoadStarted {
            song: self.song.id,
            generation: self.load_generation,
        });
    }

    /// Applies a settled load batch.
    ///
    /// Reports from a superseded generation are dropped.
    ///
    /// # Returns
    ///
    /// True if the report was applied.
    pub fn apply_load_report(&mut self, report: LoadReport) -> bool {
        if report.generation != self.load_generation {
            debug!(
                stale = report.generation,
                current = self.load_generation,
                "Discarding stale load result"
            );
            return false;
        }

        self.pending = None;
        self.buffers = report.buffers;
        self.load_errors = report.errors;
        self.transport.set_duration(report.duration);

        info!(song = %self.song.id, loaded = self.buffers.len(), failed = self.load_errors.len(),
            duration = report.duration, "Song loaded");
        self.emit(EngineEvent::LoadFinished {
            song: self.song.id,
            failed: self.load_errors.len(),
            duration: report.duration,
        });
        true
    }

    /// Blocks until the outstanding load batch has been applied.
    pub fn wait_for_load(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending.recv() {
            Ok(report) => {
                self.apply_load_report(report);
            }
            Err(_) => self.abandon_load(),
        }
    }

    /// Cooperative refresh: picks up finished loads, samples the song
    /// position and runs the metronome. Never blocks.
    pub fn update(&mut self) {
        self.poll_load();

        if self.transport.state() == PlaybackState::Playing {
            let now = self.output.current_time();
            match reporter::sample(&self.transport, now) {
                TimeSample::Position(time) => self.transport.set_displayed_time(time),
                TimeSample::EndOfSong => {
                    self.end_of_song();
                    return;
                }
            }
        }

        if self.metronome.is_running() {
            if self.metronome.tick_due() {
                self.tick_metronome();
            }
            if let Some(beat) = self.metronome.advance(self.output.current_time()) {
                self.emit(EngineEvent::Beat(beat));
            }
        }
    }

    /// Runs one metronome scheduling pass, booking every click inside the
    /// lookahead window. Does nothing unless the metronome is running.
    pub fn tick_metronome(&mut self) {
        if !self.metronome.is_running() {
            return;
        }
        let now = self.output.current_time();
        let clicks = self.metronome.schedule_ahead(
            now,
            self.song.bpm as f64,
            self.song.time_signature.beats_per_bar,
        );
        for click in clicks {
            let frequency = if click.is_downbeat {
                self.config.downbeat_hz
            } else {
                self.config.beat_hz
            };
            self.output.schedule_tone(ToneParams {
                frequency,
                start_at: click.at,
                duration: self.config.click_duration_secs,
                level: 1.0,
                gain: self.mixer.master(),
            });
        }
    }

    /// Starts playback from the current position.
    ///
    /// Refused while loading, while already playing, or when no track
    /// decoded.
    pub fn play(&mut self) -> bool {
        if self.is_loading() {
            debug!("Play ignored while loading");
            return false;
        }
        let stems = self.stems();
        if !self.transport.play(self.output.as_mut(), &stems) {
            return false;
        }
        if self.metronome_on {
            self.start_metronome();
        }
        self.emit(EngineEvent::TransportChanged(PlaybackState::Playing));
        true
    }

    /// Pauses at the current position.
    pub fn pause(&mut self) -> bool {
        if !self.transport.pause(self.output.as_mut()) {
            return false;
        }
        self.stop_metronome();
        self.emit(EngineEvent::TransportChanged(PlaybackState::Paused));
        true
    }

    /// Stops and returns to the start.
    pub fn stop(&mut self) {
        self.stop_metronome();
        self.transport.stop(self.output.as_mut());
        self.emit(EngineEvent::TransportChanged(PlaybackState::Stopped));
    }

    /// Same as [`stop`](Self::stop).
    pub fn return_to_zero(&mut self) {
        self.stop();
    }

    /// Moves to `time` seconds, clamped into the song.
    ///
    /// # Returns
    ///
    /// The position applied, or `None` if nothing decoded.
    pub fn seek(&mut self, time: f64) -> Option<f64> {
        let stems = self.stems();
        self.transport.seek(self.output.as_mut(), &stems, time)
    }

    /// Sets a track's volume, clamped to `[0, max_track_volume]`.
    pub fn set_volume(&mut self, id: TrackId, volume: f32) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, self.config.max_track_volume);
        self.update_track(id, |state| state.volume = volume);
    }

    /// Flips a track's mute.
    pub fn toggle_mute(&mut self, id: TrackId) {
        self.update_track(id, |state| state.is_muted = !state.is_muted);
    }

    /// Flips a track's solo.
    pub fn toggle_solo(&mut self, id: TrackId) {
        self.update_track(id, |state| state.is_soloed = !state.is_soloed);
    }

    /// Returns every strip to unity, unmuted and unsoloed.
    pub fn reset_mixer(&mut self) {
        for state in &mut self.track_states {
            state.reset();
        }
        self.apply_mixer();
        self.emit(EngineEvent::MixerChanged);
    }

    /// Sets the master volume, clamped to `[0, 1]`.
    pub fn set_master_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        self.master_volume = volume.clamp(0.0, 1.0);
        self.apply_mixer();
        self.emit(EngineEvent::MixerChanged);
    }

    /// Changes the playback rate without restarting the voices.
    ///
    /// # Returns
    ///
    /// The clamped rate actually applied.
    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        let applied = self.transport.set_rate(self.output.as_mut(), rate);
        self.emit(EngineEvent::PlaybackRateChanged(applied));
        applied
    }

    /// Switches the metronome on or off. Clicks only sound while playing.
    pub fn toggle_metronome(&mut self) -> bool {
        self.metronome_on = !self.metronome_on;
        if self.metronome_on {
            if self.transport.state() == PlaybackState::Playing {
                self.start_metronome();
            }
        } else {
            self.stop_metronome();
        }
        self.emit(EngineEvent::MetronomeToggled(self.metronome_on));
        self.metronome_on
    }

    /// Registers a change-notification subscriber.
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// True while a load batch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// True while playing.
    pub fn is_playing(&self) -> bool {
        self.transport.state() == PlaybackState::Playing
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.transport.state()
    }

    /// Track strips in song order.
    pub fn track_states(&self) -> &[TrackState] {
        &self.track_states
    }

    pub fn track_state(&self, id: TrackId) -> Option<&TrackState> {
        self.track_states.iter().find(|s| s.id == id)
    }

    /// Error description per track that failed to load.
    pub fn track_load_errors(&self) -> &BTreeMap<TrackId, String> {
        &self.load_errors
    }

    /// True if the track failed to load and its controls should be inert.
    pub fn is_track_disabled(&self, id: TrackId) -> bool {
        self.load_errors.contains_key(&id)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Song position as of the last [`update`](Self::update) or transport
    /// change.
    pub fn current_time(&self) -> f64 {
        self.transport.displayed_time()
    }

    /// Longest decoded stem, 0 until loaded or if nothing decoded.
    pub fn song_duration(&self) -> f64 {
        self.transport.duration()
    }

    pub fn playback_rate(&self) -> f64 {
        self.transport.rate()
    }

    /// Beat of the most recent click heard, 0 when the metronome is idle.
    pub fn current_beat(&self) -> u32 {
        self.metronome.current_beat()
    }

    /// Song tempo scaled by the playback rate, for display. Metronome
    /// clicks stay on the song tempo.
    pub fn effective_bpm(&self) -> f64 {
        self.song.bpm as f64 * self.transport.rate()
    }

    pub fn is_metronome_on(&self) -> bool {
        self.metronome_on
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn poll_load(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        match pending.try_recv() {
            Ok(report) => {
                self.apply_load_report(report);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.abandon_load(),
        }
    }

    /// The loader went away without reporting. Settle with nothing decoded.
    fn abandon_load(&mut self) {
        warn!(song = %self.song.id, "Load batch ended without a result");
        let report = LoadReport {
            generation: self.load_generation,
            ..LoadReport::default()
        };
        self.apply_load_report(report);
    }

    fn stems(&self) -> Vec<Stem> {
        self.song
            .tracks
            .iter()
            .filter_map(|track| {
                let buffer = self.buffers.get(&track.id)?;
                let gain = self.mixer.track_gain(track.id)?;
                Some(Stem {
                    track: track.id,
                    buffer: Arc::clone(buffer),
                    gain,
                })
            })
            .collect()
    }

    fn update_track(&mut self, id: TrackId, change: impl FnOnce(&mut TrackState)) {
        let Some(state) = self.track_states.iter_mut().find(|s| s.id == id) else {
            return;
        };
        change(state);
        self.apply_mixer();
        self.emit(EngineEvent::MixerChanged);
    }

    fn apply_mixer(&mut self) {
        self.mixer
            .apply(self.output.as_mut(), &self.track_states, self.master_volume);
    }

    fn start_metronome(&mut self) {
        if self.metronome.start(self.output.current_time()) {
            self.tick_metronome();
        }
    }

    fn stop_metronome(&mut self) {
        if self.metronome.stop() {
            self.output.cancel_tones();
        }
    }

    fn end_of_song(&mut self) {
        info!(song = %self.song.id, "Reached end of song");
        self.stop();
        self.emit(EngineEvent::SongEnded);
    }

    fn emit(&mut self, event: EngineEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
