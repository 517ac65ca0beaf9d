//! Command channel into the controller
//!
//! UI keys, media keys and the tick task all produce `PlayerCommand`s. A
//! single consumer applies them in arrival order.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::model::{PaginationCursor, QueueEntry};

use super::controller::{PlaybackController, PlaybackStatus, TickAction, PlayerEvent, TICK_INTERVAL};
use super::process::ToolLogLine;

#[derive(Debug)]
pub enum PlayerCommand {
    PlaySelected { entry: QueueEntry, is_skip: bool },
    PlayFrom {
        entries: Vec<QueueEntry>,
        index: usize,
        cursor: Option<PaginationCursor>,
    },
    /// Play a row of the current queue by position
    PlayQueueIndex(usize),
    TogglePause,
    Play,
    Pause,
    Advance { forward: bool, is_skip: bool },
    AutoAdvance { session_id: u64 },
    StreamFailed { session_id: u64 },
    AddToQueue(QueueEntry),
    RemoveFromQueue(usize),
    ToggleLiked,
    /// Close the active session and stop the loop. Acked once done.
    Shutdown(oneshot::Sender<()>),
}

impl From<TickAction> for PlayerCommand {
    fn from(action: TickAction) -> Self {
        match action {
            TickAction::Advance { session_id } => PlayerCommand::AutoAdvance { session_id },
            TickAction::StreamFailed { session_id } => PlayerCommand::StreamFailed { session_id },
        }
    }
}

pub type CommandSender = mpsc::UnboundedSender<PlayerCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<PlayerCommand>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

/// Apply commands until `Shutdown` arrives or every sender is gone
pub async fn run_commands(controller: PlaybackController, mut rx: CommandReceiver) {
    while let Some(command) = rx.recv().await {
        if !dispatch(&controller, command).await {
            return;
        }
    }
    tracing::debug!("Command channel closed");
    controller.shutdown().await;
}

/// Returns false once the loop should stop
async fn dispatch(controller: &PlaybackController, command: PlayerCommand) -> bool {
    match command {
        PlayerCommand::PlaySelected { entry, is_skip } => controller.play_selected(entry, is_skip).await,
        PlayerCommand::PlayFrom {
            entries,
            index,
            cursor,
        } => controller.play_from(entries, index, cursor).await,
        PlayerCommand::PlayQueueIndex(index) => controller.play_queue_index(index).await,
        PlayerCommand::TogglePause => controller.toggle_pause().await,
        PlayerCommand::Play => {
            if controller.snapshot().await.status == PlaybackStatus::Paused {
                controller.toggle_pause().await;
            }
        }
        PlayerCommand::Pause => {
            if controller.snapshot().await.status == PlaybackStatus::Playing {
                controller.toggle_pause().await;
            }
        }
        PlayerCommand::Advance { forward, is_skip } => controller.advance(forward, is_skip).await,
        PlayerCommand::AutoAdvance { session_id } => controller.auto_advance(session_id).await,
        PlayerCommand::StreamFailed { session_id } => controller.stream_failed(session_id).await,
        PlayerCommand::AddToQueue(entry) => controller.add_to_queue(entry).await,
        PlayerCommand::RemoveFromQueue(index) => {
            controller.remove_from_queue(index).await;
        }
        PlayerCommand::ToggleLiked => controller.toggle_liked().await,
        PlayerCommand::Shutdown(done) => {
            controller.shutdown().await;
            let _ = done.send(());
            return false;
        }
    }
    true
}

/// Sample playback every `TICK_INTERVAL` and submit end-of-track commands
pub fn spawn_tick(controller: PlaybackController, commands: CommandSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if commands.is_closed() {
                break;
            }
            if let Some(action) = controller.tick() {
                if commands.send(action.into()).is_err() {
                    break;
                }
            }
        }
    })
}

/// Republish tool stderr lines as player events
pub fn spawn_tool_log_forwarder(
    controller: PlaybackController,
    mut lines: mpsc::UnboundedReceiver<ToolLogLine>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            controller.emit(PlayerEvent::ToolLog(line));
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::track::track;
    use crate::player::byte_counter::BYTES_PER_SECOND;
    use crate::player::controller::fakes::setup;
    use crate::player::process::ToolLogKind;

    #[tokio::test]
    async fn commands_apply_in_order_and_shutdown_is_acked() {
        let (controller, rec, _) = setup(&[]);
        let (tx, rx) = command_channel();
        let loop_handle = tokio::spawn(run_commands(controller.clone(), rx));

        tx.send(PlayerCommand::PlayFrom {
            entries: vec![QueueEntry::new(track("a", 180)), QueueEntry::new(track("b", 180))],
            index: 0,
            cursor: None,
        })
        .unwrap();
        tx.send(PlayerCommand::Advance {
            forward: true,
            is_skip: true,
        })
        .unwrap();
        tx.send(PlayerCommand::Pause).unwrap();
        tx.send(PlayerCommand::Pause).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(PlayerCommand::Shutdown(done_tx)).unwrap();

        done_rx.await.unwrap();
        loop_handle.await.unwrap();
        assert_eq!(
            rec.log(),
            vec!["start a", "close a skip=true", "start b", "close b skip=true"]
        );
        assert_eq!(controller.snapshot().await.status, PlaybackStatus::Idle);
    }

    #[tokio::test]
    async fn tick_task_submits_auto_advance_near_the_end() {
        let (controller, rec, _) = setup(&[]);
        controller
            .play_selected(QueueEntry::new(track("a", 180)), false)
            .await;
        rec.position("a").add_bytes(178 * BYTES_PER_SECOND);
        let session_id = controller.snapshot().await.session_id.unwrap();

        let (tx, mut rx) = command_channel();
        let tick = spawn_tick(controller.clone(), tx);
        let command = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(command, PlayerCommand::AutoAdvance { session_id: id } if id == session_id));
        tick.abort();
    }

    #[tokio::test]
    async fn tool_lines_become_events() {
        let (controller, _, _) = setup(&[]);
        let mut events = controller.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = spawn_tool_log_forwarder(controller, rx);

        tx.send(ToolLogLine::classify("yt-dlp", "ERROR: Video unavailable")).unwrap();
        drop(tx);
        forwarder.await.unwrap();

        match events.recv().await.unwrap() {
            PlayerEvent::ToolLog(line) => assert_eq!(line.kind, ToolLogKind::Error),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
