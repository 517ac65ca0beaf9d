//! Model module - catalog data, the play queue and UI state
//!
//! - `track`: tracks, queue entries and browse rows
//! - `queue`: the play queue with lazy pagination
//! - `catalog`: what the player needs from the music catalog
//! - `spotify_client`: the rspotify-backed catalog and browse calls
//! - `types`: UI state
//! - `app_model`: shared application state

pub mod app_model;
pub mod catalog;
pub mod queue;
pub mod spotify_client;
pub mod track;
pub mod types;

pub use app_model::{AppModel, PlaybackView};
pub use catalog::Catalog;
pub use queue::Queue;
pub use spotify_client::SpotifyClient;
pub use track::{LibraryItem, PageSource, PaginationCursor, QueueEntry, Track, TrackPage};
pub use types::{ActiveSection, Alert, AlertLevel, ListingKind, TrackListing, UiState};
