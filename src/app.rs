//! Application state and logic.
//!
//! Wraps the playback engine with the console's selection, status line
//! and song switching. Key handling in `main.rs` calls into this.

use stemdeck::audio::{EngineEvent, PlaybackEngine, PlaybackState};
use stemdeck::song::{Song, SongCatalog, TrackId};
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// Seconds moved by one seek key press.
pub const SEEK_STEP: f64 = 5.0;

/// Track volume change per key press.
pub const VOLUME_STEP: f32 = 0.1;

/// Master volume change per key press.
pub const MASTER_STEP: f32 = 0.05;

/// Playback rate change per key press.
pub const RATE_STEP: f64 = 0.05;

/// How long a status message stays visible.
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// Main application state.
pub struct App {
    /// The playback engine.
    pub engine: PlaybackEngine,
    /// Songs available for selection.
    pub catalog: SongCatalog,
    /// Index of the active song in the catalog.
    pub song_index: usize,
    /// Index of the selected mixer strip.
    pub selected_track_index: usize,
    /// Status message to display.
    pub status_message: Option<(String, Instant)>,
    events: Receiver<EngineEvent>,
}

impl App {
    /// Creates the application around an engine already loading the
    /// catalog's first song.
    pub fn new(mut engine: PlaybackEngine, catalog: SongCatalog) -> Self {
        let events = engine.subscribe();
        let song_index = catalog
            .songs
            .iter()
            .position(|s| s.id == engine.song().id)
            .unwrap_or(0);

        Self {
            engine,
            catalog,
            song_index,
            selected_track_index: 0,
            status_message: None,
            events,
        }
    }

    /// Per-frame refresh: advances the engine and reacts to its events.
    pub fn update(&mut self) {
        self.engine.update();

        let events: Vec<EngineEvent> = self.events.try_iter().collect();
        for event in events {
            match event {
                EngineEvent::LoadFinished { failed, .. } if failed > 0 => {
                    self.set_status(format!("{} track(s) failed to load", failed));
                }
                EngineEvent::LoadFinished { .. } => self.set_status("Ready"),
                EngineEvent::SongEnded => self.set_status("End of song"),
                _ => {}
            }
        }
        self.clear_expired_status();
    }

    /// Sets a status message to display temporarily.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Clears expired status messages.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    /// The active song.
    pub fn song(&self) -> &Song {
        self.engine.song()
    }

    /// Id of the selected mixer strip.
    pub fn selected_track(&self) -> Option<TrackId> {
        self.engine
            .track_states()
            .get(self.selected_track_index)
            .map(|s| s.id)
    }

    /// Toggles play/pause state.
    pub fn toggle_playback(&mut self) {
        match self.engine.playback_state() {
            PlaybackState::Playing => {
                self.engine.pause();
                self.set_status("Paused");
            }
            PlaybackState::Paused | PlaybackState::Stopped => {
                if self.engine.is_loading() {
                    self.set_status("Still loading");
                } else if self.engine.song_duration() <= 0.0 {
                    self.set_status("Nothing to play");
                } else if self.engine.play() {
                    self.set_status("Playing");
                }
            }
        }
    }

    /// Stops playback and resets to the beginning.
    pub fn stop_playback(&mut self) {
        self.engine.stop();
        self.set_status("Stopped");
    }

    /// Returns to the start of the song.
    pub fn return_to_zero(&mut self) {
        self.engine.return_to_zero();
        self.set_status("Back to start");
    }

    /// Seeks relative to the current position.
    pub fn seek_by(&mut self, delta: f64) {
        let target = self.engine.current_time() + delta;
        if self.engine.seek(target).is_none() {
            self.set_status("Nothing to seek");
        }
    }

    /// Moves the strip selection up.
    pub fn select_previous_track(&mut self) {
        self.selected_track_index = self.selected_track_index.saturating_sub(1);
    }

    /// Moves the strip selection down.
    pub fn select_next_track(&mut self) {
        let count = self.engine.track_states().len();
        if self.selected_track_index + 1 < count {
            self.selected_track_index += 1;
        }
    }

    /// Returns the selected strip if its controls are live.
    fn enabled_selection(&mut self) -> Option<TrackId> {
        let id = self.selected_track()?;
        if self.engine.is_track_disabled(id) {
            self.set_status("Track unavailable");
            return None;
        }
        Some(id)
    }

    pub fn toggle_mute_selected(&mut self) {
        if let Some(id) = self.enabled_selection() {
            self.engine.toggle_mute(id);
        }
    }

    pub fn toggle_solo_selected(&mut self) {
        if let Some(id) = self.enabled_selection() {
            self.engine.toggle_solo(id);
        }
    }

    /// Nudges the selected strip's volume.
    pub fn adjust_selected_volume(&mut self, delta: f32) {
        if let Some(id) = self.enabled_selection() {
            let volume = self.engine.track_state(id).map(|s| s.volume).unwrap_or(1.0);
            self.engine.set_volume(id, volume + delta);
        }
    }

    /// Nudges the master volume.
    pub fn adjust_master_volume(&mut self, delta: f32) {
        let volume = self.engine.master_volume() + delta;
        self.engine.set_master_volume(volume);
    }

    /// Nudges the playback rate.
    pub fn adjust_playback_rate(&mut self, delta: f64) {
        let rate = self.engine.playback_rate() + delta;
        let applied = self.engine.set_playback_rate(rate);
        self.set_status(format!("Speed {:.0}%", applied * 100.0));
    }

    pub fn reset_mixer(&mut self) {
        self.engine.reset_mixer();
        self.set_status("Mixer reset");
    }

    pub fn toggle_metronome(&mut self) {
        let on = self.engine.toggle_metronome();
        self.set_status(if on { "Metronome on" } else { "Metronome off" });
    }

    /// Switches to the next song, wrapping around.
    pub fn next_song(&mut self) {
        let count = self.catalog.len();
        if count > 0 {
            self.select_song((self.song_index + 1) % count);
        }
    }

    /// Switches to the previous song, wrapping around.
    pub fn previous_song(&mut self) {
        let count = self.catalog.len();
        if count > 0 {
            self.select_song((self.song_index + count - 1) % count);
        }
    }

    fn select_song(&mut self, index: usize) {
        let Some(song) = self.catalog.song_at(index).cloned() else {
            return;
        };
        self.song_index = index;
        self.selected_track_index = 0;
        self.set_status(format!("Loading {}", song.name));
        self.engine.load_song(song);
    }
}
