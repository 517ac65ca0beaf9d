//! Spotify Web API client: browse calls for the UI and the `Catalog` the
//! player paginates and likes through

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use rspotify::{
    model::{ArtistId, FullTrack, Market, PlayableItem, PlaylistId, SearchResult, SearchType, TrackId},
    prelude::*,
    AuthCodeSpotify, Token,
};
use tokio::sync::RwLock;

use super::catalog::Catalog;
use super::track::{LibraryItem, PageSource, PaginationCursor, QueueEntry, Track, TrackPage};
use crate::log_api_result;

pub const PAGE_SIZE: u32 = 50;
/// Refresh once less than this many seconds of validity remain
const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Clone)]
pub struct SpotifyClient {
    client: Arc<AuthCodeSpotify>,
    refresh_token: Arc<RwLock<String>>,
    token_expires_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl SpotifyClient {
    pub fn new(
        client: AuthCodeSpotify,
        refresh_token: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            refresh_token: Arc::new(RwLock::new(refresh_token)),
            token_expires_at: Arc::new(RwLock::new(expires_at)),
        }
    }

    // ========================================================================
    // Token
    // ========================================================================

    pub async fn token_needs_refresh(&self) -> bool {
        match *self.token_expires_at.read().await {
            Some(exp) => (exp - Utc::now()).num_seconds() < REFRESH_MARGIN_SECS,
            None => false,
        }
    }

    pub async fn refresh_token_if_needed(&self) -> Result<bool> {
        if !self.token_needs_refresh().await {
            return Ok(false);
        }
        tracing::info!("Token expiring soon, refreshing");

        let refresh_token = self.refresh_token.read().await.clone();
        let (access_token, new_refresh_token, expires_at) =
            crate::auth::refresh_access_token(&refresh_token).await?;

        let token = crate::auth::build_token(access_token, expires_at);
        match self.client.token.lock().await {
            Ok(mut guard) => *guard = Some(token),
            Err(_) => anyhow::bail!("token store is poisoned"),
        }
        *self.refresh_token.write().await = new_refresh_token;
        *self.token_expires_at.write().await = Some(expires_at);

        tracing::info!(%expires_at, "Token refreshed");
        Ok(true)
    }

    // ========================================================================
    // Library
    // ========================================================================

    /// Sidebar contents: liked songs first, then playlists, then artists
    pub async fn library(&self) -> Result<Vec<LibraryItem>> {
        let (playlists, artists) = futures::join!(self.user_playlists(), self.followed_artists());
        let mut items = vec![LibraryItem::LikedSongs];
        items.extend(playlists?);
        match artists {
            Ok(artists) => items.extend(artists),
            // following is optional, keep the playlists
            Err(e) => tracing::warn!(error = %e, "Could not load followed artists"),
        }
        Ok(items)
    }

    pub async fn user_playlists(&self) -> Result<Vec<LibraryItem>> {
        let result: Result<Vec<_>, _> = self.client.current_user_playlists().try_collect().await;
        log_api_result!("current_user_playlists", result);
        Ok(result?
            .into_iter()
            .map(|playlist| LibraryItem::Playlist {
                id: playlist.id.id().to_string(),
                name: playlist.name,
            })
            .collect())
    }

    pub async fn followed_artists(&self) -> Result<Vec<LibraryItem>> {
        let result = self
            .client
            .current_user_followed_artists(None, Some(PAGE_SIZE))
            .await;
        log_api_result!("current_user_followed_artists", result);
        Ok(result?
            .items
            .into_iter()
            .map(|artist| LibraryItem::Artist {
                id: artist.id.id().to_string(),
                name: artist.name,
            })
            .collect())
    }

    /// First page of tracks behind a sidebar or search row
    pub async fn open(&self, item: &LibraryItem) -> Result<TrackPage> {
        match item {
            LibraryItem::LikedSongs => self.saved_tracks_page(0).await,
            LibraryItem::Playlist { id, .. } => self.playlist_page(id, 0).await,
            LibraryItem::Artist { id, .. } => Ok(TrackPage {
                entries: self.artist_top_tracks(id).await?,
                next: None,
            }),
            LibraryItem::Track(entry) => Ok(TrackPage {
                entries: vec![entry.clone()],
                next: None,
            }),
        }
    }

    pub async fn playlist_page(&self, playlist_id: &str, offset: u32) -> Result<TrackPage> {
        tracing::debug!(playlist_id, offset, "API: playlist_items");
        let id = PlaylistId::from_id(playlist_id)?;
        let page = self
            .client
            .playlist_items_manual(id, None, None, Some(PAGE_SIZE), Some(offset))
            .await?;

        let fetched = page.items.len();
        let entries = page
            .items
            .into_iter()
            .filter_map(|item| match item.track {
                Some(PlayableItem::Track(track)) => track_from_full(&track),
                _ => None,
            })
            .map(QueueEntry::new)
            .collect();
        Ok(TrackPage {
            entries,
            next: next_cursor(
                offset,
                fetched,
                page.next.is_some(),
                PageSource::PlaylistTracks {
                    playlist_id: playlist_id.to_string(),
                },
            ),
        })
    }

    pub async fn saved_tracks_page(&self, offset: u32) -> Result<TrackPage> {
        tracing::debug!(offset, "API: current_user_saved_tracks");
        let page = self
            .client
            .current_user_saved_tracks_manual(None, Some(PAGE_SIZE), Some(offset))
            .await?;

        let fetched = page.items.len();
        let entries = page
            .items
            .into_iter()
            .filter_map(|saved| track_from_full(&saved.track))
            .map(QueueEntry::new)
            .collect();
        Ok(TrackPage {
            entries,
            next: next_cursor(offset, fetched, page.next.is_some(), PageSource::SavedTracks),
        })
    }

    pub async fn artist_top_tracks(&self, artist_id: &str) -> Result<Vec<QueueEntry>> {
        let id = ArtistId::from_id(artist_id)?;
        // FromToken uses the account's country
        let tracks = self
            .client
            .artist_top_tracks(id, Some(Market::FromToken))
            .await?;
        Ok(tracks
            .iter()
            .filter_map(track_from_full)
            .map(QueueEntry::new)
            .collect())
    }

    /// Tracks first, then artists and playlists
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<LibraryItem>> {
        let (tracks, artists, playlists) = futures::join!(
            self.client.search(query, SearchType::Track, None, None, Some(limit), None),
            self.client.search(query, SearchType::Artist, None, None, Some(limit), None),
            self.client.search(query, SearchType::Playlist, None, None, Some(limit), None)
        );

        let mut items = Vec::new();
        if let SearchResult::Tracks(page) = tracks.context("track search failed")? {
            items.extend(
                page.items
                    .iter()
                    .filter_map(track_from_full)
                    .map(|t| LibraryItem::Track(QueueEntry::from_search(t))),
            );
        }
        if let Ok(SearchResult::Artists(page)) = artists {
            items.extend(page.items.into_iter().map(|artist| LibraryItem::Artist {
                id: artist.id.id().to_string(),
                name: artist.name,
            }));
        }
        if let Ok(SearchResult::Playlists(page)) = playlists {
            items.extend(page.items.into_iter().map(|playlist| LibraryItem::Playlist {
                id: playlist.id.id().to_string(),
                name: playlist.name,
            }));
        }
        tracing::debug!(query, count = items.len(), "Search finished");
        Ok(items)
    }
}

#[async_trait]
impl Catalog for SpotifyClient {
    async fn fetch_page(&self, cursor: &PaginationCursor) -> Result<TrackPage> {
        let offset: u32 = cursor
            .next_token
            .parse()
            .with_context(|| format!("bad page token {:?}", cursor.next_token))?;
        match &cursor.source {
            PageSource::PlaylistTracks { playlist_id } => self.playlist_page(playlist_id, offset).await,
            PageSource::SavedTracks => self.saved_tracks_page(offset).await,
        }
    }

    async fn is_track_saved(&self, track_id: &str) -> Result<bool> {
        let id = TrackId::from_id(track_id)?;
        let saved = self.client.current_user_saved_tracks_contains([id]).await?;
        Ok(saved.first().copied().unwrap_or(false))
    }

    async fn set_track_saved(&self, track_id: &str, saved: bool) -> Result<()> {
        if track_id.is_empty() {
            anyhow::bail!("Track ID is empty");
        }
        let id = TrackId::from_id(track_id)?;
        let result = if saved {
            self.client.current_user_saved_tracks_add([id]).await
        } else {
            self.client.current_user_saved_tracks_delete([id]).await
        };
        log_api_result!("set_track_saved", result);
        result?;
        tracing::info!(track_id, saved, "Updated liked songs");
        Ok(())
    }
}

/// Local files and unavailable tracks have no id and are skipped
fn track_from_full(track: &FullTrack) -> Option<Track> {
    let id = track.id.as_ref()?.id().to_string();
    Some(Track {
        id,
        name: track.name.clone(),
        duration_ms: track.duration.num_milliseconds().max(0) as u32,
        artists: track.artists.iter().map(|a| a.name.clone()).collect(),
        album: track.album.name.clone(),
    })
}

/// Page tokens are the offset of the next page
fn next_cursor(offset: u32, fetched: usize, has_next: bool, source: PageSource) -> Option<PaginationCursor> {
    if !has_next || fetched == 0 {
        return None;
    }
    Some(PaginationCursor {
        next_token: (offset + fetched as u32).to_string(),
        source,
    })
}

/// Scopes granted to the token, as rspotify expects them
pub(crate) fn scope_set(scopes: &str) -> HashSet<String> {
    scopes.split_whitespace().map(str::to_string).collect()
}

/// Client with `token` installed and rspotify's own refreshing turned off
pub async fn build_rspotify(token: Token) -> Result<AuthCodeSpotify> {
    let spotify = AuthCodeSpotify::with_config(
        Default::default(),
        Default::default(),
        rspotify::Config {
            token_cached: false,
            token_refreshing: false,
            ..Default::default()
        },
    );
    match spotify.token.lock().await {
        Ok(mut guard) => *guard = Some(token),
        Err(_) => anyhow::bail!("token store is poisoned"),
    }
    tracing::debug!("rspotify client initialized");
    Ok(spotify)
}
