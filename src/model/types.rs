//! UI state types

use std::time::Instant;

use super::track::{LibraryItem, PaginationCursor, QueueEntry, TrackPage};

/// Which pane has focus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ActiveSection {
    Search,
    #[default]
    Library,
    Tracks,
    Queue,
}

impl ActiveSection {
    pub fn next(self) -> Self {
        match self {
            ActiveSection::Search => ActiveSection::Library,
            ActiveSection::Library => ActiveSection::Tracks,
            ActiveSection::Tracks => ActiveSection::Queue,
            ActiveSection::Queue => ActiveSection::Search,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            ActiveSection::Search => ActiveSection::Queue,
            ActiveSection::Library => ActiveSection::Search,
            ActiveSection::Tracks => ActiveSection::Library,
            ActiveSection::Queue => ActiveSection::Tracks,
        }
    }
}

/// Where the rows of the track pane came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ListingKind {
    /// A playlist, liked songs or an artist. Playing a row replaces the queue.
    #[default]
    Browse,
    /// Search results. Playing a row leaves the queue alone.
    Search,
}

/// Contents of the track pane
#[derive(Clone, Debug, Default)]
pub struct TrackListing {
    pub title: String,
    pub kind: ListingKind,
    pub items: Vec<LibraryItem>,
    pub cursor: Option<PaginationCursor>,
}

impl TrackListing {
    pub fn browse(title: impl Into<String>, page: TrackPage) -> Self {
        Self {
            title: title.into(),
            kind: ListingKind::Browse,
            items: page.entries.into_iter().map(LibraryItem::Track).collect(),
            cursor: page.next,
        }
    }

    pub fn search(query: &str, items: Vec<LibraryItem>) -> Self {
        Self {
            title: format!("Search: {}", query),
            kind: ListingKind::Search,
            items,
            cursor: None,
        }
    }

    /// Track rows only, with the position of row `row` among them
    pub fn tracks_from(&self, row: usize) -> (Vec<QueueEntry>, Option<usize>) {
        let mut index = None;
        let mut entries = Vec::new();
        for (i, item) in self.items.iter().enumerate() {
            if let Some(entry) = item.as_entry() {
                if i == row {
                    index = Some(entries.len());
                }
                entries.push(entry.clone());
            }
        }
        (entries, index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Error,
}

#[derive(Clone, Debug)]
pub struct Alert {
    pub message: String,
    pub level: AlertLevel,
    pub at: Instant,
}

#[derive(Clone, Debug, Default)]
pub struct UiState {
    pub active_section: ActiveSection,
    pub search_query: String,
    pub library: Vec<LibraryItem>,
    pub library_selected: usize,
    pub listing: TrackListing,
    pub listing_selected: usize,
    /// A next page of the listing is being loaded
    pub listing_fetching: bool,
    pub queue_selected: usize,
    pub alert: Option<Alert>,
    pub show_help_popup: bool,
}

impl UiState {
    pub fn selected_library_item(&self) -> Option<&LibraryItem> {
        self.library.get(self.library_selected)
    }

    pub fn selected_listing_item(&self) -> Option<&LibraryItem> {
        self.listing.items.get(self.listing_selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::track::track;

    #[test]
    fn sections_cycle_both_ways() {
        let mut section = ActiveSection::Search;
        for _ in 0..4 {
            section = section.next();
        }
        assert_eq!(section, ActiveSection::Search);
        assert_eq!(ActiveSection::Library.prev(), ActiveSection::Search);
    }

    #[test]
    fn track_index_skips_non_track_rows() {
        let listing = TrackListing::search(
            "numb",
            vec![
                LibraryItem::Artist { id: "ar".into(), name: "Linkin Park".into() },
                LibraryItem::Track(QueueEntry::from_search(track("a", 100))),
                LibraryItem::Track(QueueEntry::from_search(track("b", 100))),
            ],
        );
        let (entries, index) = listing.tracks_from(2);
        assert_eq!(entries.len(), 2);
        assert_eq!(index, Some(1));
        assert_eq!(listing.tracks_from(0).1, None);
    }
}
