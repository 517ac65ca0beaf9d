//! Catalog values consumed by the player: tracks, queue entries and list items

/// A playable unit of music metadata, as supplied by the catalog
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub duration_ms: u32,
    pub artists: Vec<String>,
    pub album: String,
}

impl Track {
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_ms / 1000
    }

    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// A track plus where it came from. The flags only matter to the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    pub track: Track,
    pub from_queue: bool,
    pub from_search: bool,
}

impl QueueEntry {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            from_queue: false,
            from_search: false,
        }
    }

    pub fn from_search(track: Track) -> Self {
        Self {
            track,
            from_queue: false,
            from_search: true,
        }
    }

    pub fn queued(mut self) -> Self {
        self.from_queue = true;
        self
    }
}

/// Which catalog listing a pagination cursor continues
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageSource {
    PlaylistTracks { playlist_id: String },
    SavedTracks,
}

/// Opaque continuation token for the next page of a listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationCursor {
    pub next_token: String,
    pub source: PageSource,
}

/// One page of tracks and the cursor for the page after it, if any
#[derive(Clone, Debug, Default)]
pub struct TrackPage {
    pub entries: Vec<QueueEntry>,
    pub next: Option<PaginationCursor>,
}

/// A row in a browse list. Library sidebar and search results mix these.
#[derive(Clone, Debug)]
pub enum LibraryItem {
    Track(QueueEntry),
    Artist { id: String, name: String },
    Playlist { id: String, name: String },
    LikedSongs,
}

impl LibraryItem {
    pub fn title(&self) -> String {
        match self {
            LibraryItem::Track(entry) => {
                format!("{} - {}", entry.track.name, entry.track.artist_line())
            }
            LibraryItem::Artist { name, .. } => format!("[artist] {}", name),
            LibraryItem::Playlist { name, .. } => name.clone(),
            LibraryItem::LikedSongs => "Liked songs".to_string(),
        }
    }

    pub fn as_entry(&self) -> Option<&QueueEntry> {
        match self {
            LibraryItem::Track(entry) => Some(entry),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn track(id: &str, secs: u32) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Song {}", id),
        duration_ms: secs * 1000,
        artists: vec![format!("Artist {}", id)],
        album: "Album".to_string(),
    }
}
