//! Shared application state for the TUI

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::model::queue::PAGINATION_LOOKAHEAD;
use crate::player::{PlaybackStatus, PlayerEvent, QueueSnapshot, SelectedTrack, ToolLogKind, ToolLogLine};

use super::track::{LibraryItem, PaginationCursor, TrackPage};
use super::types::{ActiveSection, Alert, AlertLevel, TrackListing, UiState};

const ALERT_TTL: Duration = Duration::from_secs(5);

/// What the progress bar and queue pane show
#[derive(Clone, Debug, Default)]
pub struct PlaybackView {
    pub status: PlaybackStatus,
    pub selected: Option<SelectedTrack>,
    pub elapsed_secs: f64,
    pub duration_secs: f64,
    pub queue: QueueSnapshot,
    /// Latest progress line from the fetch tool
    pub tool_line: Option<ToolLogLine>,
}

pub struct AppModel {
    pub ui_state: Arc<Mutex<UiState>>,
    playback: Arc<Mutex<PlaybackView>>,
    should_quit: Arc<Mutex<bool>>,
}

impl Default for AppModel {
    fn default() -> Self {
        Self::new()
    }
}

impl AppModel {
    pub fn new() -> Self {
        Self {
            ui_state: Arc::new(Mutex::new(UiState::default())),
            playback: Arc::new(Mutex::new(PlaybackView::default())),
            should_quit: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn should_quit(&self) -> bool {
        *self.should_quit.lock().await
    }

    pub async fn set_should_quit(&self, quit: bool) {
        *self.should_quit.lock().await = quit;
    }

    pub async fn get_ui_state(&self) -> UiState {
        self.ui_state.lock().await.clone()
    }

    pub async fn get_playback(&self) -> PlaybackView {
        self.playback.lock().await.clone()
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub async fn cycle_section_forward(&self) {
        let mut state = self.ui_state.lock().await;
        state.active_section = state.active_section.next();
    }

    pub async fn cycle_section_backward(&self) {
        let mut state = self.ui_state.lock().await;
        state.active_section = state.active_section.prev();
    }

    pub async fn set_active_section(&self, section: ActiveSection) {
        self.ui_state.lock().await.active_section = section;
    }

    pub async fn move_selection_up(&self) {
        let mut guard = self.ui_state.lock().await;
        let state = &mut *guard;
        let selected = match state.active_section {
            ActiveSection::Library => &mut state.library_selected,
            ActiveSection::Tracks => &mut state.listing_selected,
            ActiveSection::Queue => &mut state.queue_selected,
            ActiveSection::Search => return,
        };
        *selected = selected.saturating_sub(1);
    }

    pub async fn move_selection_down(&self) {
        let queue_len = self.playback.lock().await.queue.entries.len();
        let mut guard = self.ui_state.lock().await;
        let state = &mut *guard;
        let (selected, len) = match state.active_section {
            ActiveSection::Library => (&mut state.library_selected, state.library.len()),
            ActiveSection::Tracks => (&mut state.listing_selected, state.listing.items.len()),
            ActiveSection::Queue => (&mut state.queue_selected, queue_len),
            ActiveSection::Search => return,
        };
        if *selected + 1 < len {
            *selected += 1;
        }
    }

    pub async fn append_to_search(&self, c: char) {
        self.ui_state.lock().await.search_query.push(c);
    }

    pub async fn backspace_search(&self) {
        self.ui_state.lock().await.search_query.pop();
    }

    pub async fn update_search_query(&self, query: String) {
        self.ui_state.lock().await.search_query = query;
    }

    pub async fn set_library(&self, items: Vec<LibraryItem>) {
        let mut state = self.ui_state.lock().await;
        state.library = items;
        state.library_selected = 0;
    }

    /// Show `listing` in the track pane and focus it
    pub async fn set_listing(&self, listing: TrackListing) {
        let mut state = self.ui_state.lock().await;
        state.listing = listing;
        state.listing_selected = 0;
        state.listing_fetching = false;
        state.active_section = ActiveSection::Tracks;
    }

    /// Claim the next page of the track pane once the selection is within
    /// the lookahead window of its end
    pub async fn begin_listing_fetch(&self) -> Option<PaginationCursor> {
        let mut state = self.ui_state.lock().await;
        if state.listing_fetching
            || state.listing_selected + PAGINATION_LOOKAHEAD < state.listing.items.len()
        {
            return None;
        }
        let cursor = state.listing.cursor.clone()?;
        state.listing_fetching = true;
        Some(cursor)
    }

    /// Append a page fetched with `cursor`. Dropped if the pane moved on.
    pub async fn complete_listing_fetch(&self, cursor: &PaginationCursor, page: TrackPage) -> bool {
        let mut state = self.ui_state.lock().await;
        if state.listing.cursor.as_ref() != Some(cursor) {
            return false;
        }
        state
            .listing
            .items
            .extend(page.entries.into_iter().map(LibraryItem::Track));
        state.listing.cursor = page.next;
        state.listing_fetching = false;
        true
    }

    pub async fn fail_listing_fetch(&self, cursor: &PaginationCursor) {
        let mut state = self.ui_state.lock().await;
        if state.listing.cursor.as_ref() == Some(cursor) {
            state.listing_fetching = false;
        }
    }

    pub async fn toggle_help_popup(&self) {
        let mut state = self.ui_state.lock().await;
        state.show_help_popup = !state.show_help_popup;
    }

    pub async fn is_help_popup_open(&self) -> bool {
        self.ui_state.lock().await.show_help_popup
    }

    // ========================================================================
    // Alerts
    // ========================================================================

    pub async fn set_error(&self, message: String) {
        self.set_alert(message, AlertLevel::Error).await;
    }

    pub async fn set_info(&self, message: String) {
        self.set_alert(message, AlertLevel::Info).await;
    }

    async fn set_alert(&self, message: String, level: AlertLevel) {
        self.ui_state.lock().await.alert = Some(Alert {
            message,
            level,
            at: Instant::now(),
        });
    }

    pub async fn clear_error(&self) {
        self.ui_state.lock().await.alert = None;
    }

    pub async fn auto_clear_old_errors(&self) {
        let mut state = self.ui_state.lock().await;
        if state.alert.as_ref().is_some_and(|a| a.at.elapsed() > ALERT_TTL) {
            state.alert = None;
        }
    }

    // ========================================================================
    // Player
    // ========================================================================

    pub async fn set_queue(&self, queue: QueueSnapshot) {
        let len = queue.entries.len();
        self.playback.lock().await.queue = queue;
        let mut state = self.ui_state.lock().await;
        if state.queue_selected >= len {
            state.queue_selected = len.saturating_sub(1);
        }
    }

    /// Fold a player event into the view. Queue changes are applied by the
    /// caller, which has to fetch the new queue.
    pub async fn apply_player_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::TrackStarted { entry, .. } => {
                let mut playback = self.playback.lock().await;
                playback.duration_secs = entry.track.duration_ms as f64 / 1000.0;
                playback.elapsed_secs = 0.0;
                playback.tool_line = None;
                playback.selected = Some(SelectedTrack { entry, liked: false });
            }
            PlayerEvent::Position {
                elapsed_secs,
                duration_secs,
            } => {
                let mut playback = self.playback.lock().await;
                playback.elapsed_secs = elapsed_secs;
                playback.duration_secs = duration_secs;
            }
            PlayerEvent::StatusChanged(status) => {
                let mut playback = self.playback.lock().await;
                playback.status = status;
                if status == PlaybackStatus::Idle {
                    playback.selected = None;
                    playback.elapsed_secs = 0.0;
                }
            }
            PlayerEvent::LikedChanged { track_id, liked } => {
                let mut playback = self.playback.lock().await;
                if let Some(selected) = playback.selected.as_mut() {
                    if selected.entry.track.id == track_id {
                        selected.liked = liked;
                    }
                }
            }
            PlayerEvent::Error(message) => self.set_error(message).await,
            PlayerEvent::ToolLog(line) => {
                if line.kind == ToolLogKind::Error {
                    self.set_error(format!("{}: {}", line.tool, line.text)).await;
                }
                if line.kind == ToolLogKind::Download {
                    self.playback.lock().await.tool_line = Some(line);
                }
            }
            PlayerEvent::QueueChanged => {}
        }
    }
}
