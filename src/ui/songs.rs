//! Song selector rendering.

use crate::app::App;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use ratatui::Frame;

/// Renders the catalog with the active song highlighted.
pub fn render_song_list(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(" Songs ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let items: Vec<ListItem> = app
        .catalog
        .songs
        .iter()
        .enumerate()
        .map(|(i, song)| {
            let active = i == app.song_index;
            let name_style = if active {
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            ListItem::new(vec![
                Line::from(Span::styled(song.name.clone(), name_style)),
                Line::from(Span::styled(
                    format!("  {} bpm  {}", song.bpm, song.time_signature),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));
    let mut state = ListState::default().with_selected(Some(app.song_index));
    frame.render_stateful_widget(list, area, &mut state);
}
