//! Play queue with a cursor and lazy pagination

use super::track::{PaginationCursor, QueueEntry, TrackPage};

/// How close to the end of the queue the cursor has to be before the next
/// page is requested
pub const PAGINATION_LOOKAHEAD: usize = 5;

/// Permission to fetch one page for a specific queue generation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageTicket {
    generation: u64,
    pub cursor: PaginationCursor,
}

/// Ordered play queue.
///
/// `current_index` is only meaningful while the queue is non-empty. When the
/// playing entry is removed the queue is `detached`: `current_index` is then
/// the slot it left, which may equal `len`, and the next `next()` lands on
/// whatever now fills that slot. The pagination cursor survives appends and is dropped on every wholesale
/// replace; `generation` changes on replace so pages requested for an older
/// queue are thrown away when they arrive.
#[derive(Debug, Default)]
pub struct Queue {
    entries: Vec<QueueEntry>,
    current_index: usize,
    cursor: Option<PaginationCursor>,
    fetch_in_flight: bool,
    generation: u64,
    detached: bool,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.current_index)
        }
    }

    /// Index of the entry that is playing, `None` once it was removed
    pub fn playing_index(&self) -> Option<usize> {
        if self.detached {
            None
        } else {
            self.current_index()
        }
    }

    /// Whether going back has nowhere to go
    pub fn at_start(&self) -> bool {
        self.current_index == 0
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        if self.detached {
            return None;
        }
        self.entries.get(self.current_index)
    }

    pub fn position_of(&self, track_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.track.id == track_id)
    }

    /// Replace the whole queue, e.g. when a new playlist is opened
    pub fn replace(
        &mut self,
        entries: Vec<QueueEntry>,
        index: usize,
        cursor: Option<PaginationCursor>,
    ) {
        self.current_index = index.min(entries.len().saturating_sub(1));
        self.entries = entries;
        self.cursor = cursor;
        self.fetch_in_flight = false;
        self.generation += 1;
        self.detached = false;
    }

    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.current_index = index;
            self.detached = false;
            true
        } else {
            false
        }
    }

    /// Insert `entry` at `index` (clamped, `None` appends). Returns where it
    /// landed. The cursor keeps pointing at the same entry.
    pub fn add(&mut self, entry: QueueEntry, index: Option<usize>) -> usize {
        let was_empty = self.entries.is_empty();
        let index = index.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries.insert(index, entry);
        let shifts = index < self.current_index || (index == self.current_index && !self.detached);
        if !was_empty && shifts {
            self.current_index += 1;
        }
        index
    }

    /// Insert right after the current entry so it plays next
    pub fn insert_after_current(&mut self, entry: QueueEntry) -> usize {
        let index = if self.entries.is_empty() {
            0
        } else if self.detached {
            self.current_index
        } else {
            self.current_index + 1
        };
        self.add(entry, Some(index))
    }

    pub fn remove(&mut self, index: usize) -> Option<QueueEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        if self.entries.is_empty() {
            self.current_index = 0;
            self.detached = false;
        } else if index < self.current_index {
            self.current_index -= 1;
        } else if index == self.current_index {
            self.detached = true;
        }
        Some(removed)
    }

    /// Move the cursor forward, wrapping from the last entry to the first
    pub fn next(&mut self) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let step = if self.detached { 0 } else { 1 };
        self.detached = false;
        self.current_index = (self.current_index + step) % self.entries.len();
        Some(self.current_index)
    }

    /// Move the cursor back, wrapping from the first entry to the last.
    /// A queue of one entry stays where it is.
    pub fn previous(&mut self) -> Option<usize> {
        if self.detached && !self.entries.is_empty() {
            self.detached = false;
            self.current_index = self.current_index.checked_sub(1).unwrap_or(self.entries.len() - 1);
            return Some(self.current_index);
        }
        match self.entries.len() {
            0 => None,
            1 => Some(self.current_index),
            len => {
                self.current_index = if self.current_index == 0 {
                    len - 1
                } else {
                    self.current_index - 1
                };
                Some(self.current_index)
            }
        }
    }

    pub fn pagination_cursor(&self) -> Option<&PaginationCursor> {
        self.cursor.as_ref()
    }

    pub fn set_pagination_cursor(&mut self, cursor: Option<PaginationCursor>) {
        self.cursor = cursor;
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_in_flight
    }

    /// Claim the single in-flight page fetch if `position` is within the
    /// lookahead window of the end and there is a page left to load
    pub fn begin_page_fetch(&mut self, position: usize) -> Option<PageTicket> {
        if self.fetch_in_flight || position + PAGINATION_LOOKAHEAD < self.entries.len() {
            return None;
        }
        let cursor = self.cursor.clone()?;
        self.fetch_in_flight = true;
        Some(PageTicket {
            generation: self.generation,
            cursor,
        })
    }

    /// Append a fetched page. Returns false if the queue was replaced since
    /// the ticket was issued, in which case the page is dropped.
    pub fn complete_page_fetch(&mut self, ticket: &PageTicket, page: TrackPage) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.entries.extend(page.entries);
        self.cursor = page.next;
        self.fetch_in_flight = false;
        true
    }

    pub fn fail_page_fetch(&mut self, ticket: &PageTicket) {
        if ticket.generation == self.generation {
            self.fetch_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::track::{track, PageSource};

    fn queue_of(n: usize) -> Queue {
        let mut queue = Queue::new();
        let entries = (0..n)
            .map(|i| QueueEntry::new(track(&format!("t{}", i), 100)))
            .collect();
        queue.replace(entries, 0, None);
        queue
    }

    fn cursor() -> PaginationCursor {
        PaginationCursor {
            next_token: "50".to_string(),
            source: PageSource::PlaylistTracks {
                playlist_id: "p1".to_string(),
            },
        }
    }

    #[test]
    fn next_is_cyclic() {
        for n in 1..=7 {
            for start in 0..n {
                let mut queue = queue_of(n);
                queue.set_current(start);
                for _ in 0..n {
                    queue.next();
                }
                assert_eq!(queue.current_index(), Some(start), "len {} start {}", n, start);
            }
        }
    }

    #[test]
    fn next_wraps_from_last_to_first() {
        let mut queue = queue_of(3);
        queue.set_current(2);
        assert_eq!(queue.next(), Some(0));
    }

    #[test]
    fn previous_wraps_only_with_two_or_more() {
        let mut queue = queue_of(4);
        assert_eq!(queue.previous(), Some(3));

        let mut single = queue_of(1);
        assert_eq!(single.previous(), Some(0));

        let mut empty = Queue::new();
        assert_eq!(empty.previous(), None);
        assert_eq!(empty.next(), None);
        assert_eq!(empty.current_index(), None);
    }

    #[test]
    fn add_clamps_and_keeps_cursor_on_same_entry() {
        let mut queue = queue_of(3);
        queue.set_current(1);
        assert_eq!(queue.add(QueueEntry::new(track("x", 1)), Some(99)), 3);
        assert_eq!(queue.current().map(|e| e.track.id.as_str()), Some("t1"));

        queue.add(QueueEntry::new(track("y", 1)), Some(0));
        assert_eq!(queue.current_index(), Some(2));
        assert_eq!(queue.current().map(|e| e.track.id.as_str()), Some("t1"));

        let appended = queue.add(QueueEntry::new(track("z", 1)), None);
        assert_eq!(appended, queue.len() - 1);
    }

    #[test]
    fn insert_after_current_plays_next() {
        let mut queue = queue_of(4);
        queue.set_current(1);
        let at = queue.insert_after_current(QueueEntry::new(track("q", 1)).queued());
        assert_eq!(at, 2);
        assert_eq!(queue.next().and_then(|i| queue.get(i)).map(|e| e.track.id.clone()), Some("q".to_string()));

        let mut empty = Queue::new();
        assert_eq!(empty.insert_after_current(QueueEntry::new(track("only", 1))), 0);
        assert_eq!(empty.current_index(), Some(0));
    }

    #[test]
    fn remove_out_of_range_is_noop() {
        let mut queue = queue_of(2);
        assert!(queue.remove(5).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn remove_keeps_cursor_valid() {
        let mut queue = queue_of(4);
        queue.set_current(2);
        queue.remove(0);
        assert_eq!(queue.current().map(|e| e.track.id.as_str()), Some("t2"));

        while !queue.is_empty() {
            queue.remove(0);
        }
        assert_eq!(queue.current_index(), None);
    }

    #[test]
    fn removing_the_playing_entry_keeps_its_successor_next() {
        let mut queue = queue_of(3);
        queue.remove(0);
        assert_eq!(queue.playing_index(), None);
        assert!(queue.current().is_none());
        assert_eq!(queue.next().and_then(|i| queue.get(i)).map(|e| e.track.id.as_str()), Some("t1"));
        assert_eq!(queue.playing_index(), Some(0));

        let mut queue = queue_of(4);
        queue.set_current(2);
        queue.remove(2);
        assert_eq!(queue.previous().and_then(|i| queue.get(i)).map(|e| e.track.id.as_str()), Some("t1"));
    }

    #[test]
    fn removing_the_playing_last_entry_wraps_to_the_first() {
        let mut queue = queue_of(3);
        queue.set_current(2);
        queue.remove(2);
        assert_eq!(queue.next(), Some(0));
    }

    #[test]
    fn queueing_after_a_removed_entry_plays_next() {
        let mut queue = queue_of(3);
        queue.set_current(1);
        queue.remove(1);
        assert_eq!(queue.insert_after_current(QueueEntry::new(track("q", 1)).queued()), 1);
        assert_eq!(queue.next().and_then(|i| queue.get(i)).map(|e| e.track.id.as_str()), Some("q"));
        assert_eq!(queue.next().and_then(|i| queue.get(i)).map(|e| e.track.id.as_str()), Some("t2"));
    }

    #[test]
    fn pagination_fetch_is_issued_once() {
        let mut queue = queue_of(10);
        queue.set_pagination_cursor(Some(cursor()));

        let ticket = queue.begin_page_fetch(6);
        assert!(ticket.is_some());
        assert!(queue.is_fetching());
        assert!(queue.begin_page_fetch(7).is_none());
    }

    #[test]
    fn pagination_waits_for_lookahead_window() {
        let mut queue = queue_of(10);
        queue.set_pagination_cursor(Some(cursor()));
        assert!(queue.begin_page_fetch(4).is_none());
        assert!(queue.begin_page_fetch(5).is_some());
    }

    #[test]
    fn pagination_needs_a_cursor() {
        let mut queue = queue_of(3);
        assert!(queue.begin_page_fetch(2).is_none());
        assert!(!queue.is_fetching());
    }

    #[test]
    fn completed_page_appends_and_moves_cursor() {
        let mut queue = queue_of(10);
        queue.set_pagination_cursor(Some(cursor()));
        let ticket = queue.begin_page_fetch(8).expect("ticket");

        let next = PaginationCursor {
            next_token: "100".to_string(),
            ..cursor()
        };
        let page = TrackPage {
            entries: vec![QueueEntry::new(track("n1", 1)), QueueEntry::new(track("n2", 1))],
            next: Some(next.clone()),
        };
        assert!(queue.complete_page_fetch(&ticket, page));
        assert_eq!(queue.len(), 12);
        assert_eq!(queue.pagination_cursor(), Some(&next));
        assert!(!queue.is_fetching());

        let ticket = queue.begin_page_fetch(11).expect("second ticket");
        assert!(queue.complete_page_fetch(&ticket, TrackPage::default()));
        assert!(queue.pagination_cursor().is_none());
    }

    #[test]
    fn replace_clears_cursor_and_drops_stale_pages() {
        let mut queue = queue_of(10);
        queue.set_pagination_cursor(Some(cursor()));
        let ticket = queue.begin_page_fetch(9).expect("ticket");

        queue.replace(vec![QueueEntry::new(track("fresh", 1))], 0, None);
        assert!(queue.pagination_cursor().is_none());
        assert!(!queue.is_fetching());

        let page = TrackPage {
            entries: vec![QueueEntry::new(track("old", 1))],
            next: None,
        };
        assert!(!queue.complete_page_fetch(&ticket, page));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn failed_fetch_releases_the_guard() {
        let mut queue = queue_of(3);
        queue.set_pagination_cursor(Some(cursor()));
        let ticket = queue.begin_page_fetch(2).expect("ticket");
        queue.fail_page_fetch(&ticket);
        assert!(!queue.is_fetching());
        assert!(queue.pagination_cursor().is_some());
    }
}
