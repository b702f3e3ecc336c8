//! Transport bar rendering.
//!
//! Displays playback status, position, tempo, speed, master volume and the
//! metronome beat lights.

use crate::app::App;
use stemdeck::audio::PlaybackState;
use stemdeck::song::format_time;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

/// Renders the transport bar at the top of the screen.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `area` - The area to render in
/// * `app` - Application state
pub fn render_transport(frame: &mut Frame, area: Rect, app: &App) {
    let engine = &app.engine;
    let song = app.song();

    let title = if song.artist.is_empty() {
        format!(" {} ", song.name)
    } else {
        format!(" {} - {} ", song.name, song.artist)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(14), // Playback status
            Constraint::Length(16), // Position
            Constraint::Length(18), // Tempo
            Constraint::Length(14), // Speed
            Constraint::Length(14), // Master
            Constraint::Min(12),    // Metronome / status
        ])
        .split(rows[0]);

    let play_status = if engine.is_loading() {
        Span::styled(" LOADING ", Style::default().fg(Color::Magenta))
    } else {
        match engine.playback_state() {
            PlaybackState::Playing => Span::styled(
                " [>] PLAY ",
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
            PlaybackState::Paused => Span::styled(
                " [||] PAUSE ",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            PlaybackState::Stopped => Span::styled(
                " [.] STOP ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
        }
    };
    frame.render_widget(Paragraph::new(Line::from(play_status)), chunks[0]);

    let position = format!(
        "{} / {}",
        format_time(engine.current_time()),
        format_time(engine.song_duration())
    );
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            position,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ))),
        chunks[1],
    );

    let tempo = Paragraph::new(Line::from(vec![
        Span::styled("BPM: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.0}", engine.effective_bpm()),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!(" {}", song.time_signature),
            Style::default().fg(Color::DarkGray),
        ),
    ]));
    frame.render_widget(tempo, chunks[2]);

    let speed = Paragraph::new(Line::from(vec![
        Span::styled("Speed: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.0}%", engine.playback_rate() * 100.0),
            Style::default().fg(Color::White),
        ),
    ]));
    frame.render_widget(speed, chunks[3]);

    let master = Paragraph::new(Line::from(vec![
        Span::styled("Master: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.0}%", engine.master_volume() * 100.0),
            Style::default().fg(Color::White),
        ),
    ]));
    frame.render_widget(master, chunks[4]);

    let right = if let Some((msg, _)) = &app.status_message {
        Line::from(Span::styled(
            msg.as_str(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::ITALIC),
        ))
    } else {
        beat_lights(engine.is_metronome_on(), engine.current_beat(), song.time_signature.beats_per_bar)
    };
    frame.render_widget(Paragraph::new(right), chunks[5]);

    let ratio = if engine.song_duration() > 0.0 {
        (engine.current_time() / engine.song_duration()).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let progress = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
        .ratio(ratio)
        .label("");
    frame.render_widget(progress, rows[1]);
}

/// One light per beat in the bar; the downbeat lights red, others green.
fn beat_lights(enabled: bool, current: u32, beats_per_bar: u32) -> Line<'static> {
    if !enabled {
        return Line::from(Span::styled("Click: off", Style::default().fg(Color::DarkGray)));
    }

    let mut spans = vec![Span::styled("Click: ", Style::default().fg(Color::DarkGray))];
    for beat in 1..=beats_per_bar.max(1) {
        let style = if beat == current {
            let color = if beat == 1 { Color::Red } else { Color::Green };
            Style::default().fg(color).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(if beat == current { "●" } else { "○" }, style));
    }
    Line::from(spans)
}
