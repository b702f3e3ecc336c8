//! Mixer strip rendering.
//!
//! One line per track: mute/solo indicators, instrument, a volume bar and
//! the value. Tracks that failed to load are drawn disabled.

use crate::app::App;
use stemdeck::audio::mixer::{effective_gain, has_solo};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use ratatui::Frame;

/// Width of the volume bar in cells.
const BAR_WIDTH: usize = 15;

/// Returns the display color for a volume value.
///
/// Red for boost above unity, yellow near unity, green otherwise.
#[inline]
fn volume_color(volume: f32) -> Color {
    if volume > 1.0 {
        Color::Red
    } else if volume > 0.8 {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// Draws a volume bar scaled to `max`.
fn volume_bar(volume: f32, max: f32) -> String {
    let filled = if max > 0.0 {
        ((volume / max) * BAR_WIDTH as f32).round() as usize
    } else {
        0
    };
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

/// Renders the mixer panel.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `area` - The area to render in
/// * `app` - Application state
pub fn render_mixer(frame: &mut Frame, area: Rect, app: &App) {
    let engine = &app.engine;
    let block = Block::default()
        .title(" Mixer ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let states = engine.track_states();
    let any_solo = has_solo(states);
    let max_volume = engine.config().max_track_volume;

    let items: Vec<ListItem> = states
        .iter()
        .enumerate()
        .map(|(i, state)| {
            let selected = i == app.selected_track_index;

            if engine.is_track_disabled(state.id) {
                return ListItem::new(Line::from(vec![
                    Span::styled(" x ", Style::default().fg(Color::Red)),
                    Span::styled(
                        format!("{:<14}", state.instrument),
                        Style::default()
                            .fg(Color::DarkGray)
                            .add_modifier(Modifier::CROSSED_OUT),
                    ),
                    Span::styled(" unavailable", Style::default().fg(Color::Red)),
                ]));
            }

            let mute_indicator = if state.is_muted {
                Span::styled(
                    "M",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )
            } else {
                Span::styled(".", Style::default().fg(Color::DarkGray))
            };

            let solo_indicator = if state.is_soloed {
                Span::styled(
                    "S",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                Span::styled(".", Style::default().fg(Color::DarkGray))
            };

            // Dim strips the solo bus or mute silences.
            let audible = effective_gain(state, any_solo) > 0.0;
            let name_style = match (selected, audible) {
                (true, _) => Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
                (false, true) => Style::default().fg(Color::Gray),
                (false, false) => Style::default().fg(Color::DarkGray),
            };

            ListItem::new(Line::from(vec![
                Span::raw(" "),
                mute_indicator,
                solo_indicator,
                Span::raw(" "),
                Span::styled(format!("{:<14}", state.instrument), name_style),
                Span::styled(
                    volume_bar(state.volume, max_volume),
                    Style::default().fg(volume_color(state.volume)),
                ),
                Span::styled(
                    format!(" {:>3.0}%", state.volume * 100.0),
                    Style::default().fg(Color::Gray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));
    let mut state = ListState::default().with_selected(Some(app.selected_track_index));
    frame.render_stateful_widget(list, area, &mut state);
}
