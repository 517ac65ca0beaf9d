//! Player event listener

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::player::PlayerEvent;

use super::AppController;

impl AppController {
    pub fn start_player_event_listener(&self) -> JoinHandle<()> {
        let mut events = self.player.subscribe();
        let controller = self.clone();
        tracing::info!("Starting player event listener");

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        // positions are resent every tick, the queue is refetched
                        tracing::debug!(skipped, "Player event listener lagged");
                        controller.refresh_queue().await;
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if controller.model.should_quit().await {
                    tracing::debug!("Player event listener shutting down");
                    break;
                }

                match &event {
                    PlayerEvent::TrackStarted { entry, session_id } => {
                        tracing::info!(
                            track = %entry.track.name,
                            artist = %entry.track.artist_line(),
                            session_id,
                            "Now playing"
                        );
                        controller.refresh_queue().await;
                    }
                    PlayerEvent::QueueChanged => {
                        controller.refresh_queue().await;
                        continue;
                    }
                    _ => {}
                }
                controller.model.apply_player_event(event).await;
            }
        })
    }

    async fn refresh_queue(&self) {
        let queue = self.player.queue_snapshot().await;
        self.model.set_queue(queue).await;
    }
}
