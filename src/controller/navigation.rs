//! Navigation-related controller methods (library, listings, search)

use tokio::task::JoinHandle;

use crate::model::catalog::describe_error;
use crate::model::{LibraryItem, ListingKind, TrackListing};
use crate::player::PlayerCommand;

use super::AppController;

pub const SEARCH_LIMIT: u32 = 20;

impl AppController {
    pub async fn load_library(&self) {
        let Some(spotify) = &self.spotify else {
            return;
        };
        match spotify.library().await {
            Ok(items) => {
                tracing::info!(count = items.len(), "Library loaded");
                self.model.set_library(items).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not load library");
                self.model.set_error(describe_error(&e)).await;
            }
        }
    }

    pub async fn perform_search(&self, query: &str) {
        let Some(spotify) = &self.spotify else {
            return;
        };
        tracing::debug!(query, "Performing search");
        match spotify.search(query, SEARCH_LIMIT).await {
            Ok(items) => self.model.set_listing(TrackListing::search(query, items)).await,
            Err(e) => {
                tracing::error!(query, error = %e, "Search failed");
                self.model.set_error(describe_error(&e)).await;
            }
        }
    }

    /// Show the tracks behind a library or search row
    pub async fn open_item(&self, item: &LibraryItem) {
        let Some(spotify) = &self.spotify else {
            return;
        };
        self.model.set_info(format!("Loading {}", item.title())).await;
        match spotify.open(item).await {
            Ok(page) => {
                self.model.clear_error().await;
                self.model.set_listing(TrackListing::browse(item.title(), page)).await;
            }
            Err(e) => {
                tracing::error!(item = %item.title(), error = %e, "Could not open item");
                self.model.set_error(describe_error(&e)).await;
            }
        }
    }

    /// Load the next page of the track pane in the background when the
    /// selection is close to its end
    pub async fn extend_listing_if_needed(&self) -> Option<JoinHandle<()>> {
        let catalog = self.catalog.clone()?;
        let cursor = self.model.begin_listing_fetch().await?;
        tracing::debug!(token = %cursor.next_token, "Loading more listing rows");
        let model = self.model.clone();
        Some(tokio::spawn(async move {
            match catalog.fetch_page(&cursor).await {
                Ok(page) => {
                    let count = page.entries.len();
                    if model.complete_listing_fetch(&cursor, page).await {
                        tracing::info!(count, "Appended page to listing");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Listing page fetch failed");
                    model.fail_listing_fetch(&cursor).await;
                    model.set_error(describe_error(&e)).await;
                }
            }
        }))
    }

    /// Enter on a row of the track pane
    pub async fn activate_listing_row(&self) {
        let ui_state = self.model.get_ui_state().await;
        let row = ui_state.listing_selected;
        let Some(item) = ui_state.selected_listing_item() else {
            return;
        };
        let Some(entry) = item.as_entry() else {
            self.open_item(item).await;
            return;
        };

        match ui_state.listing.kind {
            ListingKind::Search => {
                self.send(PlayerCommand::PlaySelected {
                    entry: entry.clone(),
                    is_skip: true,
                })
                .await
            }
            ListingKind::Browse => {
                let (entries, index) = ui_state.listing.tracks_from(row);
                self.send(PlayerCommand::PlayFrom {
                    entries,
                    index: index.unwrap_or(0),
                    cursor: ui_state.listing.cursor.clone(),
                })
                .await
            }
        }
    }

    /// Enter on a queue row
    pub async fn activate_queue_row(&self) {
        let index = self.model.get_ui_state().await.queue_selected;
        let queue_len = self.model.get_playback().await.queue.entries.len();
        if index < queue_len {
            self.send(PlayerCommand::PlayQueueIndex(index)).await;
        }
    }

    pub async fn queue_selected_track(&self) {
        let ui_state = self.model.get_ui_state().await;
        if let Some(entry) = ui_state.selected_listing_item().and_then(LibraryItem::as_entry) {
            tracing::debug!(track_id = %entry.track.id, "Adding to queue");
            self.send(PlayerCommand::AddToQueue(entry.clone())).await;
            self.model.set_info(format!("Queued {}", entry.track.name)).await;
        }
    }

    pub async fn remove_selected_queue_entry(&self) {
        let index = self.model.get_ui_state().await.queue_selected;
        self.send(PlayerCommand::RemoveFromQueue(index)).await;
    }
}
