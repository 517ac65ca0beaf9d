//! Playback controller
//!
//! Owns the queue and the single active session behind one `RwLock`. Every
//! operation that touches the session takes the write guard for its whole
//! duration, so the old session is always closed before the next one is
//! started. Blocking process work runs on the blocking pool while the guard
//! is held.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};

use crate::model::catalog::{describe_error, Catalog};
use crate::model::{PaginationCursor, QueueEntry, Queue};

use super::error::PlaybackError;
use super::process::ToolLogLine;
use super::session::{Session, SessionFactory};

pub const TICK_INTERVAL: Duration = Duration::from_millis(500);
/// Remaining time at which the next track is started
pub const AUTO_ADVANCE_MARGIN_SECS: f64 = 4.0;
const EVENT_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    Transitioning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedTrack {
    pub entry: QueueEntry,
    pub liked: bool,
}

#[derive(Clone, Debug)]
pub enum PlayerEvent {
    TrackStarted { entry: QueueEntry, session_id: u64 },
    Position { elapsed_secs: f64, duration_secs: f64 },
    StatusChanged(PlaybackStatus),
    LikedChanged { track_id: String, liked: bool },
    QueueChanged,
    Error(String),
    ToolLog(ToolLogLine),
}

#[derive(Clone, Debug, Default)]
pub struct PlayerSnapshot {
    pub status: PlaybackStatus,
    pub selected: Option<SelectedTrack>,
    pub elapsed_secs: f64,
    pub session_id: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
    pub current_index: Option<usize>,
}

/// What the periodic tick wants done with the active session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickAction {
    Advance { session_id: u64 },
    /// Stream ended without producing any audio
    StreamFailed { session_id: u64 },
}

#[derive(Default)]
struct PlayerState {
    status: PlaybackStatus,
    queue: Queue,
    session: Option<Box<dyn Session>>,
    /// Id of `session`, meaningless while it is `None`
    session_id: u64,
    sessions_started: u64,
    selected: Option<SelectedTrack>,
}

impl PlayerState {
    fn active_id(&self) -> Option<u64> {
        self.session.as_ref().map(|_| self.session_id)
    }
}

#[derive(Clone)]
pub struct PlaybackController {
    state: Arc<RwLock<PlayerState>>,
    factory: Arc<dyn SessionFactory>,
    catalog: Option<Arc<dyn Catalog>>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlaybackController {
    pub fn new(factory: Arc<dyn SessionFactory>, catalog: Option<Arc<dyn Catalog>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(PlayerState::default())),
            factory,
            catalog,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&self, state: &mut PlayerState, status: PlaybackStatus) {
        if state.status != status {
            state.status = status;
            self.emit(PlayerEvent::StatusChanged(status));
        }
    }

    // ========================================================================
    // Track changes
    // ========================================================================

    /// Play `entry`, moving the queue cursor to it if it is queued
    pub async fn play_selected(&self, entry: QueueEntry, is_skip: bool) {
        let mut state = self.state.write().await;
        if let Some(index) = state.queue.position_of(&entry.track.id) {
            state.queue.set_current(index);
        }
        self.start_entry(&mut state, entry, is_skip).await;
    }

    /// Play the queue row at `index`. Duplicated tracks stay apart because the
    /// cursor goes to the row, not the first entry with that id.
    pub async fn play_queue_index(&self, index: usize) {
        let mut state = self.state.write().await;
        if !state.queue.set_current(index) {
            tracing::debug!(index, "Queue row out of range");
            return;
        }
        let Some(entry) = state.queue.current().cloned() else {
            return;
        };
        self.emit(PlayerEvent::QueueChanged);
        self.start_entry(&mut state, entry, true).await;
    }

    /// Replace the queue with a listing and play `index` of it
    pub async fn play_from(
        &self,
        entries: Vec<QueueEntry>,
        index: usize,
        cursor: Option<PaginationCursor>,
    ) {
        let mut state = self.state.write().await;
        state.queue.replace(entries, index, cursor);
        self.emit(PlayerEvent::QueueChanged);
        let Some(entry) = state.queue.current().cloned() else {
            return;
        };
        self.start_entry(&mut state, entry, true).await;
    }

    /// Move through the queue. Going back from the first entry does nothing.
    pub async fn advance(&self, forward: bool, is_skip: bool) {
        self.advance_inner(forward, is_skip, None).await;
    }

    /// Advance issued by the tick. Ignored unless `session_id` is still the
    /// active session.
    pub async fn auto_advance(&self, session_id: u64) {
        self.advance_inner(true, false, Some(session_id)).await;
    }

    async fn advance_inner(&self, forward: bool, is_skip: bool, expected: Option<u64>) {
        let mut state = self.state.write().await;
        if let Some(expected) = expected {
            if state.active_id() != Some(expected) {
                tracing::debug!(session_id = expected, "Ignoring stale advance");
                return;
            }
        }
        if state.queue.is_empty() || (!forward && state.queue.at_start()) {
            return;
        }

        let index = if forward {
            state.queue.next()
        } else {
            state.queue.previous()
        };
        let Some(entry) = index.and_then(|i| state.queue.get(i)).cloned() else {
            return;
        };
        if self.start_entry(&mut state, entry, is_skip).await && forward {
            if let Some(index) = index {
                self.maybe_paginate(&mut state, index);
            }
        }
    }

    /// Close whatever is playing, then start `entry`. Returns whether the new
    /// session is live.
    async fn start_entry(&self, state: &mut PlayerState, entry: QueueEntry, is_skip: bool) -> bool {
        self.set_status(state, PlaybackStatus::Transitioning);

        if let Some(old) = state.session.take() {
            if let Err(e) = close_session(old, is_skip).await {
                tracing::warn!(error = %e, "Closing previous session failed");
                self.emit(PlayerEvent::Error(e.to_string()));
            }
        }
        state.selected = None;

        let factory = self.factory.clone();
        let track = entry.track.clone();
        let started = match tokio::task::spawn_blocking(move || factory.start(&track)).await {
            Ok(result) => result,
            Err(e) => Err(PlaybackError::Io(io::Error::other(e))),
        };

        match started {
            Ok(session) => {
                state.sessions_started += 1;
                let session_id = state.sessions_started;
                state.session_id = session_id;
                state.session = Some(session);
                state.selected = Some(SelectedTrack {
                    entry: entry.clone(),
                    liked: false,
                });
                tracing::info!(track_id = %entry.track.id, session_id, is_skip, "Track started");
                self.set_status(state, PlaybackStatus::Playing);
                self.refresh_liked(session_id, entry.track.id.clone());
                self.emit(PlayerEvent::TrackStarted { entry, session_id });
                true
            }
            Err(e) => {
                tracing::error!(track_id = %entry.track.id, error = %e, "Could not start track");
                self.set_status(state, PlaybackStatus::Idle);
                self.emit(PlayerEvent::Error(e.to_string()));
                false
            }
        }
    }

    /// Claim a page fetch if the cursor is close to the end of the queue and
    /// load it in the background
    fn maybe_paginate(&self, state: &mut PlayerState, position: usize) {
        let Some(catalog) = self.catalog.clone() else {
            return;
        };
        let Some(ticket) = state.queue.begin_page_fetch(position) else {
            return;
        };
        tracing::debug!(position, "Fetching next page of tracks");
        let controller = self.clone();
        tokio::spawn(async move {
            let result = catalog.fetch_page(&ticket.cursor).await;
            let mut state = controller.state.write().await;
            match result {
                Ok(page) => {
                    let count = page.entries.len();
                    if state.queue.complete_page_fetch(&ticket, page) {
                        tracing::info!(count, "Appended page to queue");
                        controller.emit(PlayerEvent::QueueChanged);
                    } else {
                        tracing::debug!("Dropped page for a replaced queue");
                    }
                }
                Err(e) => {
                    state.queue.fail_page_fetch(&ticket);
                    tracing::warn!(error = %e, "Page fetch failed");
                    controller.emit(PlayerEvent::Error(describe_error(&e)));
                }
            }
        });
    }

    fn refresh_liked(&self, session_id: u64, track_id: String) {
        let Some(catalog) = self.catalog.clone() else {
            return;
        };
        let controller = self.clone();
        tokio::spawn(async move {
            let liked = match catalog.is_track_saved(&track_id).await {
                Ok(liked) => liked,
                Err(e) => {
                    tracing::warn!(track_id = %track_id, error = %e, "Liked status lookup failed");
                    return;
                }
            };
            let mut state = controller.state.write().await;
            if state.active_id() != Some(session_id) {
                return;
            }
            if let Some(selected) = state.selected.as_mut() {
                selected.liked = liked;
            }
            controller.emit(PlayerEvent::LikedChanged { track_id, liked });
        });
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Sample the active session without waiting for the lock. Emits a
    /// position event and reports whether the track is over.
    pub fn tick(&self) -> Option<TickAction> {
        let state = self.state.try_read().ok()?;
        if state.status != PlaybackStatus::Playing {
            return None;
        }
        let session = state.session.as_ref()?;
        let selected = state.selected.as_ref()?;
        let session_id = state.session_id;

        let position = session.position();
        let elapsed_secs = position.current_seconds();
        let duration_secs = selected.entry.track.duration_ms as f64 / 1000.0;
        self.emit(PlayerEvent::Position {
            elapsed_secs,
            duration_secs,
        });

        if position.is_finished() {
            return if position.total_bytes() == 0 {
                Some(TickAction::StreamFailed { session_id })
            } else {
                Some(TickAction::Advance { session_id })
            };
        }
        if duration_secs > AUTO_ADVANCE_MARGIN_SECS
            && duration_secs - elapsed_secs < AUTO_ADVANCE_MARGIN_SECS
        {
            return Some(TickAction::Advance { session_id });
        }
        None
    }

    /// Tear down a session whose stream produced nothing
    pub async fn stream_failed(&self, session_id: u64) {
        let mut state = self.state.write().await;
        if state.active_id() != Some(session_id) {
            return;
        }
        let track = state
            .selected
            .take()
            .map(|s| s.entry.track.name)
            .unwrap_or_default();
        if let Some(session) = state.session.take() {
            if let Err(e) = close_session(session, true).await {
                tracing::warn!(error = %e, "Closing failed session");
            }
        }
        let error = PlaybackError::Resolution { track };
        tracing::error!(session_id, error = %error, "Stream ended without audio");
        self.set_status(&mut state, PlaybackStatus::Idle);
        self.emit(PlayerEvent::Error(error.to_string()));
    }

    // ========================================================================
    // Playback state
    // ========================================================================

    pub async fn toggle_pause(&self) {
        let mut state = self.state.write().await;
        let next = match state.status {
            PlaybackStatus::Playing => PlaybackStatus::Paused,
            PlaybackStatus::Paused => PlaybackStatus::Playing,
            _ => return,
        };
        if let Some(session) = state.session.as_ref() {
            if next == PlaybackStatus::Paused {
                session.pause();
            } else {
                session.play();
            }
        }
        self.set_status(&mut state, next);
    }

    /// Save or unsave the selected track
    pub async fn toggle_liked(&self) {
        let Some(catalog) = self.catalog.clone() else {
            return;
        };
        let (session_id, track_id, liked) = {
            let state = self.state.read().await;
            let Some(selected) = state.selected.as_ref() else {
                return;
            };
            (state.session_id, selected.entry.track.id.clone(), !selected.liked)
        };

        if let Err(e) = catalog.set_track_saved(&track_id, liked).await {
            tracing::warn!(track_id = %track_id, error = %e, "Could not update liked songs");
            self.emit(PlayerEvent::Error(describe_error(&e)));
            return;
        }

        let mut state = self.state.write().await;
        if state.active_id() == Some(session_id) {
            if let Some(selected) = state.selected.as_mut() {
                selected.liked = liked;
            }
        }
        self.emit(PlayerEvent::LikedChanged { track_id, liked });
    }

    /// Stop playback for good. The partial download is discarded.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if let Some(session) = state.session.take() {
            if let Err(e) = close_session(session, true).await {
                tracing::warn!(error = %e, "Closing session on shutdown");
            }
        }
        state.selected = None;
        self.set_status(&mut state, PlaybackStatus::Idle);
        tracing::info!("Playback shut down");
    }

    // ========================================================================
    // Queue
    // ========================================================================

    pub async fn add_to_queue(&self, entry: QueueEntry) {
        let mut state = self.state.write().await;
        let index = state.queue.insert_after_current(entry.queued());
        tracing::debug!(index, "Queued track");
        self.emit(PlayerEvent::QueueChanged);
    }

    pub async fn remove_from_queue(&self, index: usize) -> Option<QueueEntry> {
        let mut state = self.state.write().await;
        let removed = state.queue.remove(index);
        if removed.is_some() {
            self.emit(PlayerEvent::QueueChanged);
        }
        removed
    }

    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        let state = self.state.read().await;
        QueueSnapshot {
            entries: state.queue.entries().to_vec(),
            current_index: state.queue.playing_index(),
        }
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.read().await;
        snapshot_of(&state)
    }

    /// Like `snapshot` but gives up while a command holds the lock
    pub fn try_snapshot(&self) -> Option<PlayerSnapshot> {
        self.state.try_read().ok().map(|state| snapshot_of(&state))
    }
}

fn snapshot_of(state: &PlayerState) -> PlayerSnapshot {
    PlayerSnapshot {
        status: state.status,
        selected: state.selected.clone(),
        elapsed_secs: state
            .session
            .as_ref()
            .map(|s| s.position().current_seconds())
            .unwrap_or_default(),
        session_id: state.active_id(),
    }
}

async fn close_session(mut session: Box<dyn Session>, is_skip: bool) -> Result<(), PlaybackError> {
    match tokio::task::spawn_blocking(move || session.close(is_skip)).await {
        Ok(result) => result,
        Err(e) => Err(PlaybackError::Teardown(e.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::model::{Track, TrackPage};
    use crate::player::byte_counter::PositionHandle;

    /// Shared record of what the fake sessions went through
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub log: Mutex<Vec<String>>,
        pub live: AtomicUsize,
        pub max_live: AtomicUsize,
        pub positions: Mutex<HashMap<String, PositionHandle>>,
    }

    impl Recorder {
        pub fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn position(&self, track_id: &str) -> PositionHandle {
            self.positions.lock().unwrap()[track_id].clone()
        }
    }

    pub(crate) struct FakeFactory {
        pub rec: Arc<Recorder>,
        pub failing: HashSet<String>,
        /// How long start and close block, like real process spawn and reap
        pub delay: Duration,
    }

    struct FakeSession {
        id: String,
        rec: Arc<Recorder>,
        delay: Duration,
        position: PositionHandle,
        playing: AtomicBool,
        closed: bool,
    }

    impl Session for FakeSession {
        fn play(&self) {
            self.playing.store(true, Ordering::SeqCst);
        }

        fn pause(&self) {
            self.playing.store(false, Ordering::SeqCst);
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }

        fn position(&self) -> PositionHandle {
            self.position.clone()
        }

        fn close(&mut self, is_skip: bool) -> Result<(), PlaybackError> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            std::thread::sleep(self.delay);
            self.rec.live.fetch_sub(1, Ordering::SeqCst);
            self.rec
                .log
                .lock()
                .unwrap()
                .push(format!("close {} skip={}", self.id, is_skip));
            Ok(())
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            let _ = self.close(true);
        }
    }

    impl SessionFactory for FakeFactory {
        fn start(&self, track: &Track) -> Result<Box<dyn Session>, PlaybackError> {
            if self.failing.contains(&track.id) {
                self.rec.log.lock().unwrap().push(format!("fail {}", track.id));
                return Err(PlaybackError::process_start(
                    "yt-dlp",
                    io::Error::new(io::ErrorKind::NotFound, "not found"),
                ));
            }
            std::thread::sleep(self.delay);
            let live = self.rec.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.rec.max_live.fetch_max(live, Ordering::SeqCst);
            self.rec.log.lock().unwrap().push(format!("start {}", track.id));

            let position = PositionHandle::default();
            self.rec
                .positions
                .lock()
                .unwrap()
                .insert(track.id.clone(), position.clone());
            Ok(Box::new(FakeSession {
                id: track.id.clone(),
                rec: self.rec.clone(),
                delay: self.delay,
                position,
                playing: AtomicBool::new(true),
                closed: false,
            }))
        }
    }

    /// Catalog whose page fetches block until the test releases them
    pub(crate) struct FakeCatalog {
        pub fetches: AtomicUsize,
        pub gate: Semaphore,
        pub page: Mutex<TrackPage>,
        pub saved: Mutex<HashSet<String>>,
    }

    impl FakeCatalog {
        pub fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                page: Mutex::new(TrackPage::default()),
                saved: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn fetch_page(&self, _cursor: &PaginationCursor) -> Result<TrackPage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await?;
            Ok(self.page.lock().unwrap().clone())
        }

        async fn is_track_saved(&self, track_id: &str) -> Result<bool> {
            Ok(self.saved.lock().unwrap().contains(track_id))
        }

        async fn set_track_saved(&self, track_id: &str, saved: bool) -> Result<()> {
            let mut set = self.saved.lock().unwrap();
            if saved {
                set.insert(track_id.to_string());
            } else {
                set.remove(track_id);
            }
            Ok(())
        }
    }

    pub(crate) fn setup(failing: &[&str]) -> (PlaybackController, Arc<Recorder>, Arc<FakeCatalog>) {
        setup_with_delay(failing, Duration::ZERO)
    }

    pub(crate) fn setup_with_delay(
        failing: &[&str],
        delay: Duration,
    ) -> (PlaybackController, Arc<Recorder>, Arc<FakeCatalog>) {
        let rec = Arc::new(Recorder::default());
        let factory = FakeFactory {
            rec: rec.clone(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
            delay,
        };
        let catalog = Arc::new(FakeCatalog::new());
        let controller = PlaybackController::new(Arc::new(factory), Some(catalog.clone()));
        (controller, rec, catalog)
    }
}
