//! Key event handling

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::model::ActiveSection;
use crate::player::PlayerCommand;

use super::AppController;

impl AppController {
    pub async fn handle_key_event(&self, key: KeyEvent) -> Result<()> {
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        let model = &self.model;

        if model.is_help_popup_open().await {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('?')) {
                model.toggle_help_popup().await;
            }
            return Ok(());
        }

        let ui_state = model.get_ui_state().await;

        if ui_state.active_section == ActiveSection::Search {
            match key.code {
                KeyCode::Tab => {
                    model.cycle_section_forward().await;
                    return Ok(());
                }
                KeyCode::BackTab => {
                    model.cycle_section_backward().await;
                    return Ok(());
                }
                KeyCode::Enter => {
                    let query = ui_state.search_query.trim().to_string();
                    if !query.is_empty() {
                        self.perform_search(&query).await;
                    }
                    return Ok(());
                }
                KeyCode::Esc => {
                    model.update_search_query(String::new()).await;
                    return Ok(());
                }
                KeyCode::Backspace => {
                    model.backspace_search().await;
                    return Ok(());
                }
                KeyCode::Char(c) => {
                    if (c == 'q' || c == 'c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                        model.set_should_quit(true).await;
                    } else {
                        model.append_to_search(c).await;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        // Esc dismisses the alert
        if ui_state.alert.is_some() && key.code == KeyCode::Esc {
            model.clear_error().await;
            return Ok(());
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                model.set_should_quit(true).await;
            }
            KeyCode::Tab => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    model.cycle_section_backward().await;
                } else {
                    model.cycle_section_forward().await;
                }
            }
            KeyCode::BackTab => {
                model.cycle_section_backward().await;
            }
            KeyCode::Up | KeyCode::Down => {
                if key.code == KeyCode::Up {
                    model.move_selection_up().await;
                } else {
                    model.move_selection_down().await;
                }
                if ui_state.active_section == ActiveSection::Tracks {
                    self.extend_listing_if_needed().await;
                }
            }
            KeyCode::Enter => match ui_state.active_section {
                ActiveSection::Library => {
                    if let Some(item) = ui_state.selected_library_item() {
                        self.open_item(item).await;
                    }
                }
                ActiveSection::Tracks => self.activate_listing_row().await,
                ActiveSection::Queue => self.activate_queue_row().await,
                ActiveSection::Search => {}
            },
            // Focus search
            KeyCode::Char('/') => {
                model.set_active_section(ActiveSection::Search).await;
            }
            KeyCode::Char(' ') => {
                self.send(PlayerCommand::TogglePause).await;
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                self.send(PlayerCommand::Advance {
                    forward: true,
                    is_skip: true,
                })
                .await;
            }
            KeyCode::Char('b') | KeyCode::Char('B') => {
                self.send(PlayerCommand::Advance {
                    forward: false,
                    is_skip: true,
                })
                .await;
            }
            KeyCode::Char('l') | KeyCode::Char('L') => {
                self.send(PlayerCommand::ToggleLiked).await;
            }
            KeyCode::Char('a') | KeyCode::Char('A') => {
                if ui_state.active_section == ActiveSection::Tracks {
                    self.queue_selected_track().await;
                }
            }
            KeyCode::Char('r') | KeyCode::Char('R') | KeyCode::Delete => {
                if ui_state.active_section == ActiveSection::Queue {
                    self.remove_selected_queue_entry().await;
                }
            }
            KeyCode::Char('h') | KeyCode::Char('?') => {
                model.toggle_help_popup().await;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::model::track::track;
    use crate::model::{
        AppModel, Catalog, LibraryItem, PageSource, PaginationCursor, QueueEntry, TrackListing,
        TrackPage,
    };
    use crate::player::command_channel;
    use crate::player::controller::fakes::{setup, FakeCatalog};
    use crate::player::CommandReceiver;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> (AppController, CommandReceiver) {
        let (app, rx, _) = app_with_catalog();
        (app, rx)
    }

    fn app_with_catalog() -> (AppController, CommandReceiver, Arc<FakeCatalog>) {
        let (player, _, catalog) = setup(&[]);
        let (tx, rx) = command_channel();
        let shared: Arc<dyn Catalog> = catalog.clone();
        let app = AppController::new(Arc::new(AppModel::new()), None, Some(shared), player, tx);
        (app, rx, catalog)
    }

    fn tracks(range: std::ops::Range<usize>) -> Vec<QueueEntry> {
        range.map(|i| QueueEntry::new(track(&format!("t{}", i), 100))).collect()
    }

    #[tokio::test]
    async fn playback_keys_become_commands() {
        let (app, mut rx) = app();
        app.handle_key_event(key(KeyCode::Char(' '))).await.unwrap();
        app.handle_key_event(key(KeyCode::Char('n'))).await.unwrap();
        app.handle_key_event(key(KeyCode::Char('b'))).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), PlayerCommand::TogglePause));
        assert!(matches!(
            rx.try_recv().unwrap(),
            PlayerCommand::Advance { forward: true, is_skip: true }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            PlayerCommand::Advance { forward: false, is_skip: true }
        ));
    }

    #[tokio::test]
    async fn search_box_captures_letters() {
        let (app, mut rx) = app();
        app.handle_key_event(key(KeyCode::Char('/'))).await.unwrap();
        for c in "nq".chars() {
            app.handle_key_event(key(KeyCode::Char(c))).await.unwrap();
        }
        let ui_state = app.model.get_ui_state().await;
        assert_eq!(ui_state.search_query, "nq");
        assert!(!app.model.should_quit().await);
        assert!(rx.try_recv().is_err());

        app.handle_key_event(key(KeyCode::Tab)).await.unwrap();
        app.handle_key_event(key(KeyCode::Char('q'))).await.unwrap();
        assert!(app.model.should_quit().await);
    }

    #[tokio::test]
    async fn enter_on_a_browse_row_plays_the_listing() {
        let (app, mut rx) = app();
        let page = TrackPage {
            entries: vec![QueueEntry::new(track("a", 100)), QueueEntry::new(track("b", 100))],
            next: None,
        };
        app.model.set_listing(TrackListing::browse("Mix", page)).await;
        app.handle_key_event(key(KeyCode::Down)).await.unwrap();
        app.handle_key_event(key(KeyCode::Enter)).await.unwrap();

        match rx.try_recv().unwrap() {
            PlayerCommand::PlayFrom { entries, index, cursor } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(index, 1);
                assert!(cursor.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn scrolling_near_the_end_loads_the_next_page() {
        let (app, _rx, catalog) = app_with_catalog();
        *catalog.page.lock().unwrap() = TrackPage {
            entries: tracks(8..11),
            next: None,
        };
        let cursor = PaginationCursor {
            next_token: "8".into(),
            source: PageSource::SavedTracks,
        };
        let page = TrackPage {
            entries: tracks(0..8),
            next: Some(cursor),
        };
        app.model.set_listing(TrackListing::browse("Liked songs", page)).await;

        for _ in 0..2 {
            app.handle_key_event(key(KeyCode::Down)).await.unwrap();
        }
        tokio::task::yield_now().await;
        assert_eq!(catalog.fetches.load(Ordering::SeqCst), 0);

        for _ in 0..3 {
            app.handle_key_event(key(KeyCode::Down)).await.unwrap();
        }
        for _ in 0..100 {
            if catalog.fetches.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);

        catalog.gate.add_permits(1);
        for _ in 0..100 {
            if app.model.get_ui_state().await.listing.items.len() == 11 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let state = app.model.get_ui_state().await;
        assert_eq!(state.listing.items.len(), 11);
        assert!(state.listing.cursor.is_none());
        assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enter_on_a_queue_row_plays_that_row() {
        let (app, mut rx) = app();
        app.model.set_active_section(ActiveSection::Queue).await;
        app.handle_key_event(key(KeyCode::Enter)).await.unwrap();
        assert!(rx.try_recv().is_err());

        app.model
            .set_queue(crate::player::QueueSnapshot {
                entries: tracks(0..3),
                current_index: Some(0),
            })
            .await;
        app.handle_key_event(key(KeyCode::Down)).await.unwrap();
        app.handle_key_event(key(KeyCode::Down)).await.unwrap();
        app.handle_key_event(key(KeyCode::Enter)).await.unwrap();
        assert!(matches!(rx.try_recv().unwrap(), PlayerCommand::PlayQueueIndex(2)));
    }

    #[tokio::test]
    async fn enter_on_a_search_track_keeps_the_queue() {
        let (app, mut rx) = app();
        let items = vec![LibraryItem::Track(QueueEntry::from_search(track("a", 100)))];
        app.model.set_listing(TrackListing::search("a", items)).await;
        app.handle_key_event(key(KeyCode::Enter)).await.unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            PlayerCommand::PlaySelected { is_skip: true, .. }
        ));
    }
}
