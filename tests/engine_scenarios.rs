//! End-to-end playback scenarios against the offline render graph.
//!
//! Stems are real WAV files held in memory; the output clock only moves
//! when the test renders frames.

use stemdeck::audio::{
    AudioOutput, EngineEvent, FetchError, PlaybackEngine, PlaybackState, ResourceFetcher,
    RodioDecoder, SharedGraph, TrackLoader,
};
use stemdeck::config::EngineConfig;
use stemdeck::song::{Song, Track, TrackId};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SAMPLE_RATE: u32 = 1000;

/// Serves WAV bytes by URI; anything else is a 404.
#[derive(Default)]
struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    fn with_file(mut self, uri: &str, level: i16, seconds: usize) -> Self {
        self.files.insert(uri.to_string(), wav(level, seconds));
        self
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.files.get(uri).cloned().ok_or_else(|| FetchError::Status {
            uri: uri.to_string(),
            status: 404,
        })
    }
}

/// A mono 16-bit WAV holding a constant sample value.
fn wav(level: i16, seconds: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..seconds * SAMPLE_RATE as usize {
            writer.write_sample(level).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Quarter scale and half scale, as 16-bit samples.
const QUARTER: i16 = 8192;
const HALF: i16 = 16384;

fn config() -> EngineConfig {
    EngineConfig {
        sample_rate: SAMPLE_RATE,
        ..EngineConfig::default()
    }
}

fn engine(song: Song, fetcher: Arc<MemoryFetcher>) -> (SharedGraph, PlaybackEngine) {
    let graph = SharedGraph::new(SAMPLE_RATE);
    let loader = TrackLoader::new(fetcher, Arc::new(RodioDecoder));
    let engine = PlaybackEngine::new(Box::new(graph.clone()), loader, config(), song);
    (graph, engine)
}

/// Two 10 second stems at quarter and half scale.
fn duo() -> (SharedGraph, PlaybackEngine) {
    let fetcher = MemoryFetcher::default()
        .with_file("alfaia.wav", QUARTER, 10)
        .with_file("caixa.wav", HALF, 10);
    let song = Song::new(1, "Duo", 120)
        .with_track(Track::new(1, "Alfaia", "alfaia.wav"))
        .with_track(Track::new(2, "Caixa", "caixa.wav"));
    let (graph, mut engine) = engine(song, Arc::new(fetcher));
    engine.wait_for_load();
    (graph, engine)
}

/// Left-channel level of the next few milliseconds of output.
fn level(graph: &SharedGraph) -> f32 {
    graph.render_seconds(0.005)[0]
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_empty_resources_are_silent_not_errors() {
    let fetcher = Arc::new(MemoryFetcher::default());
    let song = Song::new(1, "Demo", 120)
        .with_track(Track::new(1, "Alfaia", ""))
        .with_track(Track::new(2, "Caixa", ""))
        .with_track(Track::new(3, "Gonguê", ""));
    let (graph, mut engine) = engine(song, fetcher.clone());
    let events = engine.subscribe();

    assert!(engine.is_loading());
    engine.wait_for_load();
    assert!(!engine.is_loading());

    assert_eq!(fetcher.requests(), 0);
    assert!(engine.track_load_errors().is_empty());
    assert_eq!(engine.song_duration(), 0.0);
    assert_eq!(engine.track_states().len(), 3);

    assert!(!engine.play());
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert!(!graph.is_running());
    assert_eq!(engine.seek(4.0), None);
    assert_eq!(engine.current_time(), 0.0);

    let finished = events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::LoadFinished { failed: 0, .. }));
    assert!(finished);
}

#[test]
fn test_failed_track_is_isolated() {
    let fetcher = MemoryFetcher::default()
        .with_file("one.wav", QUARTER, 3)
        .with_file("three.wav", HALF, 5);
    let song = Song::new(1, "Trio", 120)
        .with_track(Track::new(1, "Alfaia", "one.wav"))
        .with_track(Track::new(2, "Caixa", "two.wav"))
        .with_track(Track::new(3, "Gonguê", "three.wav"));
    let (graph, mut engine) = engine(song, Arc::new(fetcher));
    engine.wait_for_load();

    let errors = engine.track_load_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[&TrackId::new(2)], "HTTP error! status: 404 for two.wav");
    assert!(engine.is_track_disabled(TrackId::new(2)));
    assert_close(engine.song_duration(), 5.0);
    assert_eq!(engine.track_states().len(), 3);

    assert!(engine.play());
    assert_eq!(graph.voice_count(), 2);
    assert!((level(&graph) - 0.75).abs() < 1e-3);
}

#[test]
fn test_solo_silences_every_other_track() {
    let (graph, mut engine) = duo();
    engine.play();
    assert!((level(&graph) - 0.75).abs() < 1e-3);

    engine.toggle_solo(TrackId::new(2));
    assert!((level(&graph) - 0.5).abs() < 1e-3);

    // Nothing done to the non-soloed track brings it back.
    engine.set_volume(TrackId::new(1), 1.5);
    assert!((level(&graph) - 0.5).abs() < 1e-3);
    engine.toggle_mute(TrackId::new(1));
    assert!((level(&graph) - 0.5).abs() < 1e-3);

    // Solo both: the unmuted one plays, the muted one stays silent.
    engine.toggle_solo(TrackId::new(1));
    assert!((level(&graph) - 0.5).abs() < 1e-3);
    engine.toggle_mute(TrackId::new(1));
    assert!((level(&graph) - (0.375 + 0.5)).abs() < 1e-3);
}

#[test]
fn test_master_volume_scales_mix() {
    let (graph, mut engine) = duo();
    engine.play();
    engine.set_master_volume(0.5);
    assert!((level(&graph) - 0.375).abs() < 1e-3);
    engine.set_master_volume(-2.0);
    assert_eq!(engine.master_volume(), 0.0);
    assert!(level(&graph).abs() < 1e-6);
}

#[test]
fn test_reset_mixer_restores_defaults() {
    let (_graph, mut engine) = duo();
    engine.set_volume(TrackId::new(1), 0.3);
    engine.toggle_mute(TrackId::new(1));
    engine.toggle_solo(TrackId::new(2));
    engine.set_volume(TrackId::new(2), 1.4);

    engine.reset_mixer();
    for state in engine.track_states() {
        assert_eq!(state.volume, 1.0);
        assert!(!state.is_muted);
        assert!(!state.is_soloed);
    }
}

#[test]
fn test_seek_clamps_to_song() {
    let (_graph, mut engine) = duo();
    assert_eq!(engine.seek(-5.0), Some(0.0));
    assert_eq!(engine.current_time(), 0.0);
    assert_eq!(engine.seek(engine.song_duration() + 100.0), Some(10.0));
    assert_close(engine.current_time(), 10.0);
}

#[test]
fn test_seek_while_playing_keeps_playing() {
    let (graph, mut engine) = duo();
    engine.play();
    graph.render_seconds(1.0);
    engine.seek(7.0);
    assert!(engine.is_playing());
    assert_eq!(graph.voice_count(), 2);

    graph.render_seconds(0.5);
    engine.update();
    assert_close(engine.current_time(), 7.5);
}

#[test]
fn test_play_after_stop_starts_at_zero() {
    let (graph, mut engine) = duo();
    engine.play();
    graph.render_seconds(3.0);
    engine.update();
    assert_close(engine.current_time(), 3.0);

    engine.stop();
    assert_eq!(graph.voice_count(), 0);
    assert!(!graph.is_running());
    assert_eq!(engine.current_time(), 0.0);

    engine.play();
    engine.update();
    assert_eq!(engine.current_time(), 0.0);
    graph.render_seconds(0.25);
    engine.update();
    assert_close(engine.current_time(), 0.25);
}

#[test]
fn test_return_to_zero_from_pause() {
    let (graph, mut engine) = duo();
    engine.play();
    graph.render_seconds(2.0);
    engine.pause();
    engine.return_to_zero();
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert_eq!(engine.current_time(), 0.0);
    assert_eq!(graph.voice_count(), 0);
}

#[test]
fn test_rate_change_does_not_jump_position() {
    let (graph, mut engine) = duo();
    engine.play();
    graph.render_seconds(2.0);
    engine.update();
    assert_close(engine.current_time(), 2.0);

    assert_eq!(engine.set_playback_rate(1.5), 1.5);
    assert_close(engine.current_time(), 2.0);
    engine.update();
    assert_close(engine.current_time(), 2.0);
    assert_eq!(graph.voice_count(), 2);

    graph.render_seconds(1.0);
    engine.update();
    assert_close(engine.current_time(), 3.5);

    assert_eq!(engine.set_playback_rate(0.1), 0.5);
    graph.render_seconds(1.0);
    engine.update();
    assert_close(engine.current_time(), 4.0);
}

#[test]
fn test_pause_then_play_resumes_where_paused() {
    let (graph, mut engine) = duo();
    engine.play();
    graph.render_seconds(1.3);
    assert!(engine.pause());
    assert_close(engine.current_time(), 1.3);
    assert_eq!(graph.voice_count(), 0);

    // Time passes while paused without moving the song.
    graph.render_seconds(2.0);
    engine.update();
    assert_close(engine.current_time(), 1.3);

    assert!(engine.play());
    engine.update();
    assert_close(engine.current_time(), 1.3);
    graph.render_seconds(0.2);
    engine.update();
    assert_close(engine.current_time(), 1.5);
}

/// Runs the console loop for `seconds`, returning (clock time, beat) for
/// every beat reported.
fn run_metronome(graph: &SharedGraph, engine: &mut PlaybackEngine, seconds: f64) -> Vec<(f64, u32)> {
    let events = engine.subscribe();
    let mut beats = Vec::new();
    let steps = (seconds / 0.025).round() as usize;
    for _ in 0..steps {
        graph.render_seconds(0.025);
        engine.tick_metronome();
        engine.update();
        for event in events.try_iter() {
            if let EngineEvent::Beat(beat) = event {
                beats.push((graph.current_time(), beat));
            }
        }
    }
    beats
}

#[test]
fn test_metronome_spacing_at_120_bpm() {
    let (graph, mut engine) = duo();
    engine.toggle_metronome();
    engine.play();

    let beats = run_metronome(&graph, &mut engine, 4.0);
    assert!(beats.len() >= 7);
    for pair in beats.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!((gap - 0.5).abs() <= 0.025 + 1e-9, "gap {gap}");
    }
}

#[test]
fn test_metronome_keeps_song_tempo_when_sped_up() {
    let (graph, mut engine) = duo();
    assert_eq!(engine.set_playback_rate(1.5), 1.5);
    assert_eq!(engine.effective_bpm(), 180.0);
    engine.toggle_metronome();
    engine.play();

    let beats = run_metronome(&graph, &mut engine, 3.0);
    assert!(beats.len() >= 5);
    for pair in beats.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!((gap - 0.5).abs() <= 0.025 + 1e-9, "gap {gap}");
    }
}

#[test]
fn test_metronome_beats_cycle_over_bar() {
    let fetcher = MemoryFetcher::default().with_file("a.wav", QUARTER, 10);
    let song = Song::new(1, "Waltz", 180)
        .with_time_signature(3, 4)
        .with_track(Track::new(1, "Alfaia", "a.wav"));
    let (graph, mut engine) = engine(song, Arc::new(fetcher));
    engine.wait_for_load();
    engine.toggle_metronome();
    engine.play();

    let beats: Vec<u32> = run_metronome(&graph, &mut engine, 3.0)
        .into_iter()
        .map(|(_, b)| b)
        .collect();
    assert!(beats.len() >= 7);
    for (i, beat) in beats.iter().enumerate() {
        assert_eq!(*beat, (i % 3) as u32 + 1);
    }
}

#[test]
fn test_metronome_restarts_on_beat_one() {
    let (graph, mut engine) = duo();
    engine.toggle_metronome();
    engine.play();
    run_metronome(&graph, &mut engine, 1.2);
    assert!(engine.current_beat() > 1);

    engine.pause();
    assert_eq!(engine.current_beat(), 0);

    engine.play();
    let beats = run_metronome(&graph, &mut engine, 0.1);
    assert_eq!(beats.first().map(|(_, b)| *b), Some(1));
}

#[test]
fn test_song_switch_tears_down_previous_song() {
    let fetcher = MemoryFetcher::default()
        .with_file("a.wav", QUARTER, 10)
        .with_file("b.wav", HALF, 4);
    let song_a = Song::new(1, "A", 120)
        .with_track(Track::new(1, "Alfaia", "a.wav"))
        .with_track(Track::new(2, "Caixa", "a.wav"));
    let song_b = Song::new(2, "B", 90)
        .with_track(Track::new(1, "Agbê", "b.wav"))
        .with_track(Track::new(2, "Gonguê", ""))
        .with_track(Track::new(3, "Mineiro", "b.wav"));
    let (graph, mut engine) = engine(song_a, Arc::new(fetcher));
    engine.wait_for_load();
    engine.play();
    engine.set_playback_rate(1.2);
    graph.render_seconds(2.0);
    engine.update();

    engine.load_song(song_b);
    assert_eq!(graph.voice_count(), 0);
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert_eq!(engine.current_time(), 0.0);
    assert_eq!(engine.playback_rate(), 1.0);
    assert!(engine.is_loading());
    assert_eq!(engine.track_states().len(), 3);
    assert_eq!(engine.track_states()[0].instrument, "Agbê");
    assert_eq!(engine.song_duration(), 0.0);

    engine.wait_for_load();
    assert_close(engine.song_duration(), 4.0);
    assert!(engine.play());
    assert_eq!(graph.voice_count(), 2);
}
