//! stemdeck - A terminal practice console for multi-track ensemble stems.
//!
//! Plays every stem of a song phase-locked, with per-track mute, solo and
//! volume, a master fader, variable speed and a metronome overlay.
//!
//! # Usage
//!
//! ```bash
//! cargo run                           # Built-in demo catalog
//! cargo run -- songs.json             # Songs from a catalog file
//! cargo run -- --config engine.json songs.json
//! ```
//!
//! Stem paths in a catalog resolve relative to the catalog's folder;
//! `http://` and `https://` paths are downloaded.

mod app;
mod ui;

use app::{App, MASTER_STEP, RATE_STEP, SEEK_STEP, VOLUME_STEP};
use stemdeck::audio::{DefaultFetcher, DeviceOutput, FileFetcher, PlaybackEngine, RodioDecoder, TrackLoader};
use stemdeck::config::EngineConfig;
use stemdeck::song::SongCatalog;

use anyhow::{bail, Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command-line options for the application.
struct CliOptions {
    /// Song catalog to load instead of the demo songs.
    catalog: Option<PathBuf>,
    /// Engine configuration file.
    config: Option<PathBuf>,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--config <path>` or `-c <path>`: Load engine settings from JSON
    /// - `--help` or `-h`: Print help and exit
    /// - A positional path: the song catalog
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut catalog: Option<PathBuf> = None;
        let mut config: Option<PathBuf> = None;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    if i >= args.len() {
                        eprintln!("Error: --config requires a path argument");
                        std::process::exit(1);
                    }
                    config = Some(PathBuf::from(&args[i]));
                }
                "--help" | "-h" => {
                    eprintln!("stemdeck - Multi-track practice console");
                    eprintln!();
                    eprintln!(
                        "Usage: {} [OPTIONS] [CATALOG.json]",
                        args.first().map(String::as_str).unwrap_or("stemdeck")
                    );
                    eprintln!();
                    eprintln!("Options:");
                    eprintln!("  -c, --config PATH  Load engine settings from a JSON file");
                    eprintln!("  -h, --help         Print this help message");
                    eprintln!();
                    eprintln!("Without a catalog the built-in demo songs are used.");
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => {
                    if catalog.is_some() {
                        bail!("Only one catalog path may be given");
                    }
                    catalog = Some(PathBuf::from(other));
                }
            }
            i += 1;
        }

        Ok(Self { catalog, config })
    }
}

/// Main entry point.
fn main() -> Result<()> {
    // Parse CLI options first (before any terminal setup)
    let cli = CliOptions::parse()?;

    // Initialize logging (optional, for debugging)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let (catalog, base_dir) = match &cli.catalog {
        Some(path) => {
            let catalog = SongCatalog::load_from_file(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            let base_dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (catalog, base_dir)
        }
        None => (SongCatalog::demo(), PathBuf::from(".")),
    };
    let Some(first_song) = catalog.song_at(0).cloned() else {
        bail!("The catalog has no songs");
    };

    let fetcher = DefaultFetcher::new(FileFetcher::with_base_dir(base_dir))
        .context("Failed to initialize HTTP client")?;
    let loader = TrackLoader::new(Arc::new(fetcher), Arc::new(RodioDecoder));
    let output = DeviceOutput::open(config.sample_rate).context("Failed to open audio output")?;
    let engine = PlaybackEngine::new(Box::new(output), loader, config, first_song);
    let mut app = App::new(engine, catalog);

    let mut terminal = setup_terminal().context("Failed to setup terminal")?;
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;

    if let Err(e) = result {
        tracing::error!("Application error: {:?}", e);
        return Err(e);
    }
    Ok(())
}

/// Sets up the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("Failed to create terminal")?;
    Ok(terminal)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Main application loop.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    loop {
        // Pick up loads, advance the position display and the metronome
        app.update();

        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events with a short timeout to keep the display moving
        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                // Only handle key press events (not release)
                if key.kind == KeyEventKind::Press && handle_key(app, key.code) {
                    app.engine.stop();
                    return Ok(());
                }
            }
        }
    }
}

/// Handles a key press. Returns true if the application should quit.
fn handle_key(app: &mut App, code: KeyCode) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char(' ') => app.toggle_playback(),
        KeyCode::Char('s') => app.stop_playback(),
        KeyCode::Char('0') | KeyCode::Home => app.return_to_zero(),
        KeyCode::Left => app.seek_by(-SEEK_STEP),
        KeyCode::Right => app.seek_by(SEEK_STEP),
        KeyCode::Up => app.select_previous_track(),
        KeyCode::Down => app.select_next_track(),
        KeyCode::Char('m') => app.toggle_mute_selected(),
        KeyCode::Char('o') => app.toggle_solo_selected(),
        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_selected_volume(VOLUME_STEP),
        KeyCode::Char('-') => app.adjust_selected_volume(-VOLUME_STEP),
        KeyCode::Char(']') => app.adjust_master_volume(MASTER_STEP),
        KeyCode::Char('[') => app.adjust_master_volume(-MASTER_STEP),
        KeyCode::Char('>') | KeyCode::Char('.') => app.adjust_playback_rate(RATE_STEP),
        KeyCode::Char('<') | KeyCode::Char(',') => app.adjust_playback_rate(-RATE_STEP),
        KeyCode::Char('r') => app.reset_mixer(),
        KeyCode::Char('k') => app.toggle_metronome(),
        KeyCode::Char('n') => app.next_song(),
        KeyCode::Char('p') => app.previous_song(),
        _ => {}
    }
    false
}
