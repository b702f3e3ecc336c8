//! Terminal user interface components.
//!
//! This module provides the visual components for the practice console,
//! including the transport bar, the mixer strips and the song selector.

mod mixer;
mod songs;
mod transport;

use crate::app::App;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

pub use mixer::render_mixer;
pub use songs::render_song_list;
pub use transport::render_transport;

/// Key hints shown on the bottom line.
const KEY_HINTS: &[(&str, &str)] = &[
    ("Space", "play/pause"),
    ("s", "stop"),
    ("0", "start"),
    ("←/→", "seek"),
    ("m/o", "mute/solo"),
    ("+/-", "volume"),
    ("[/]", "master"),
    ("</>", "speed"),
    ("r", "reset"),
    ("k", "metronome"),
    ("n/p", "song"),
    ("q", "quit"),
];

/// Renders the whole console.
pub fn render(frame: &mut Frame, app: &App) {
    let has_errors = !app.engine.track_load_errors().is_empty();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),                                  // Transport
            Constraint::Length(if has_errors { 3 } else { 0 }),     // Warning banner
            Constraint::Min(6),                                     // Content area
            Constraint::Length(1),                                  // Key hints
        ])
        .split(frame.area());

    render_transport(frame, main_chunks[0], app);
    if has_errors {
        render_load_warning(frame, main_chunks[1], app);
    }

    // Content area: songs on the left, mixer on the right
    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(40)])
        .split(main_chunks[2]);

    render_song_list(frame, content_chunks[0], app);
    render_mixer(frame, content_chunks[1], app);
    render_key_hints(frame, main_chunks[3]);
}

/// Warns that some stems are missing from the mix.
fn render_load_warning(frame: &mut Frame, area: Rect, app: &App) {
    let failed: Vec<String> = app
        .engine
        .track_load_errors()
        .keys()
        .filter_map(|id| app.song().track(*id).map(|t| t.instrument.clone()))
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let text = Line::from(vec![
        Span::styled(
            " ! ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("Some stems could not be loaded: {}", failed.join(", ")),
            Style::default().fg(Color::Yellow),
        ),
    ]);
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_key_hints(frame: &mut Frame, area: Rect) {
    let mut spans = Vec::with_capacity(KEY_HINTS.len() * 2);
    for (key, action) in KEY_HINTS {
        spans.push(Span::styled(
            format!(" {} ", key),
            Style::default().fg(Color::Black).bg(Color::Gray),
        ));
        spans.push(Span::styled(
            format!(" {} ", action),
            Style::default().fg(Color::DarkGray),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
