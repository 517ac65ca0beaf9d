//! Search bar and library sidebar

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, ListItem, Padding, Paragraph},
    Frame,
};

use crate::model::{ActiveSection, LibraryItem, UiState};
use super::utils::{border_style, render_scrollable_list, row_style};

pub fn render_top_bar(frame: &mut Frame, area: Rect, ui_state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(0),     // Search input
            Constraint::Length(16), // Help hint
        ])
        .split(area);

    let focused = ui_state.active_section == ActiveSection::Search;
    let (text, style) = if ui_state.search_query.is_empty() && !focused {
        ("Press / to search...".to_string(), Style::default().fg(Color::DarkGray))
    } else if focused {
        (format!("{}▏", ui_state.search_query), Style::default().fg(Color::Green))
    } else {
        (ui_state.search_query.clone(), Style::default().fg(Color::White))
    };

    let search = Paragraph::new(text).style(style).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Search ")
            .padding(Padding::horizontal(1))
            .border_style(border_style(focused)),
    );
    frame.render_widget(search, chunks[0]);

    let hint = Paragraph::new("H for help")
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).padding(Padding::horizontal(1)));
    frame.render_widget(hint, chunks[1]);
}

fn library_label(item: &LibraryItem) -> String {
    match item {
        LibraryItem::LikedSongs => format!("💚 {}", item.title()),
        LibraryItem::Playlist { .. } => format!("♫ {}", item.title()),
        LibraryItem::Artist { .. } | LibraryItem::Track(_) => item.title(),
    }
}

pub fn render_sidebar(frame: &mut Frame, area: Rect, ui_state: &UiState) {
    let focused = ui_state.active_section == ActiveSection::Library;

    let items: Vec<ListItem> = if ui_state.library.is_empty() {
        vec![ListItem::new("Loading library...").style(Style::default().fg(Color::DarkGray))]
    } else {
        ui_state
            .library
            .iter()
            .enumerate()
            .map(|(i, item)| {
                ListItem::new(library_label(item))
                    .style(row_style(i == ui_state.library_selected, focused, false))
            })
            .collect()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Library ")
        .padding(Padding::horizontal(1))
        .border_style(border_style(focused));

    render_scrollable_list(frame, area, items, ui_state.library_selected, block);
}
