//! Track listing and queue panes

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, ListItem, Padding, Paragraph},
    Frame,
};

use crate::model::{ActiveSection, LibraryItem, PlaybackView, QueueEntry, UiState};
use super::utils::{
    border_style, calculate_num_width, format_duration, render_scrollable_list, row_style,
    truncate_string,
};

/// Column widths for track rows: (num, title, artist)
fn track_columns(content_width: usize, item_count: usize) -> (usize, usize, usize) {
    // " {num}   {title}   {artist}   {duration}"
    let num_width = calculate_num_width(item_count);
    let duration_width = 7;
    let fixed_width = 1 + num_width + 3 + 3 + 3 + duration_width;
    let remaining = content_width.saturating_sub(fixed_width);
    let title_width = (remaining * 55) / 100;
    (num_width, title_width, remaining.saturating_sub(title_width))
}

fn header_row(num_width: usize, title_width: usize, artist_width: usize) -> ListItem<'static> {
    ListItem::new(format!(
        " {:<num_width$}   {:<title_width$}   {:<artist_width$}   {}",
        "#",
        "Title",
        "Artist",
        "Time",
        num_width = num_width,
        title_width = title_width,
        artist_width = artist_width
    ))
    .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
}

fn track_row(
    entry: &QueueEntry,
    marker: &str,
    index: usize,
    (num_width, title_width, artist_width): (usize, usize, usize),
) -> String {
    format!(
        "{}{:<num_width$}   {}   {}   {}",
        marker,
        index + 1,
        truncate_string(&entry.track.name, title_width),
        truncate_string(&entry.track.artist_line(), artist_width),
        format_duration(entry.track.duration_secs() as f64),
        num_width = num_width
    )
}

pub fn render_listing(frame: &mut Frame, area: Rect, ui_state: &UiState, playing_id: Option<&str>) {
    let focused = ui_state.active_section == ActiveSection::Tracks;
    let listing = &ui_state.listing;
    let title = if listing.title.is_empty() {
        " Tracks ".to_string()
    } else {
        format!(" {} ", listing.title)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .padding(Padding::horizontal(1))
        .border_style(border_style(focused));

    if listing.items.is_empty() {
        let empty = Paragraph::new(
            "Pick something from the library or press / to search\n\nEnter plays, A adds to the queue",
        )
        .style(Style::default().fg(Color::DarkGray))
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let columns = track_columns(area.width.saturating_sub(4) as usize, listing.items.len());
    let mut items = vec![header_row(columns.0, columns.1, columns.2)];
    items.extend(listing.items.iter().enumerate().map(|(i, item)| {
        let selected = i == ui_state.listing_selected;
        match item {
            LibraryItem::Track(entry) => {
                let playing = playing_id == Some(entry.track.id.as_str());
                let marker = if playing { "▶" } else { " " };
                ListItem::new(track_row(entry, marker, i, columns))
                    .style(row_style(selected, focused, playing))
            }
            other => ListItem::new(format!(" {}", other.title()))
                .style(row_style(selected, focused, false)),
        }
    }));
    if listing.cursor.is_some() {
        items.push(ListItem::new("   … more tracks load as you scroll").style(Style::default().fg(Color::DarkGray)));
    }

    // Header row shifts the selection by one
    render_scrollable_list(frame, area, items, ui_state.listing_selected + 1, block);
}

pub fn render_queue(frame: &mut Frame, area: Rect, ui_state: &UiState, playback: &PlaybackView) {
    let focused = ui_state.active_section == ActiveSection::Queue;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Now playing
            Constraint::Min(0),    // Queue
        ])
        .split(area);

    let now_playing = match &playback.selected {
        Some(selected) => {
            let liked = if selected.liked { "💚 " } else { "" };
            format!("{}{} - {}", liked, selected.entry.track.name, selected.entry.track.artist_line())
        }
        None => "Nothing playing".to_string(),
    };
    let now_playing = Paragraph::new(now_playing)
        .style(Style::default().fg(Color::Cyan))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Now Playing ")
                .padding(Padding::horizontal(1))
                .border_style(border_style(focused)),
        );
    frame.render_widget(now_playing, chunks[0]);

    let queue = &playback.queue;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Queue ({}) ", queue.entries.len()))
        .padding(Padding::horizontal(1))
        .border_style(border_style(focused));

    if queue.entries.is_empty() {
        let empty = Paragraph::new("Queue is empty")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, chunks[1]);
        return;
    }

    let num_width = calculate_num_width(queue.entries.len());
    let name_width = (chunks[1].width.saturating_sub(4) as usize).saturating_sub(num_width + 5);
    let items: Vec<ListItem> = queue
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let current = queue.current_index == Some(i);
            let marker = if current {
                "▶"
            } else if entry.from_queue {
                "+"
            } else {
                " "
            };
            let label = format!("{} - {}", entry.track.name, entry.track.artist_line());
            ListItem::new(format!(
                "{}{:<num_width$} {}",
                marker,
                i + 1,
                truncate_string(&label, name_width),
                num_width = num_width
            ))
            .style(row_style(i == ui_state.queue_selected, focused, current))
        })
        .collect();

    render_scrollable_list(frame, chunks[1], items, ui_state.queue_selected, block);
}
