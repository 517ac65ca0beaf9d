//! UI rendering
//!
//! - `utils`: formatting and scrollable lists
//! - `layout`: search bar and library sidebar
//! - `content`: track listing and queue panes
//! - `progress`: now-playing bar
//! - `overlays`: alert and help popup

mod content;
mod layout;
mod overlays;
mod progress;
mod utils;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

use crate::model::{PlaybackView, UiState};

pub struct AppView;

impl AppView {
    pub fn render(frame: &mut Frame, ui_state: &UiState, playback: &PlaybackView) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Search bar
                Constraint::Min(0),    // Library | Tracks | Queue
                Constraint::Length(3), // Progress bar
            ])
            .split(frame.area());

        layout::render_top_bar(frame, chunks[0], ui_state);

        let main_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(22),
                Constraint::Percentage(48),
                Constraint::Percentage(30),
            ])
            .split(chunks[1]);

        layout::render_sidebar(frame, main_chunks[0], ui_state);

        let playing_id = playback.selected.as_ref().map(|s| s.entry.track.id.as_str());
        content::render_listing(frame, main_chunks[1], ui_state, playing_id);
        content::render_queue(frame, main_chunks[2], ui_state, playback);

        progress::render_progress_bar(frame, chunks[2], playback);

        if ui_state.alert.is_some() {
            overlays::render_alert(frame, ui_state);
        }
        if ui_state.show_help_popup {
            overlays::render_help_popup(frame);
        }
    }
}
