//! Desktop media keys and now-playing info (MPRIS on Linux)
//!
//! `MediaControls` is not `Send` on every platform, so it lives on its own
//! thread. Player events are forwarded to it over a channel and key presses
//! come back as player commands.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use souvlaki::{MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, PlatformConfig};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::config::APP_NAME;
use crate::model::Track;
use crate::player::{CommandSender, PlaybackStatus, PlayerCommand, PlayerEvent, PlaybackController};

enum Update {
    Metadata(Track),
    Playback(MediaPlayback),
}

/// Map a key press to what the player should do
fn command_for(event: &MediaControlEvent) -> Option<PlayerCommand> {
    match event {
        MediaControlEvent::Next => Some(PlayerCommand::Advance {
            forward: true,
            is_skip: true,
        }),
        MediaControlEvent::Previous => Some(PlayerCommand::Advance {
            forward: false,
            is_skip: true,
        }),
        MediaControlEvent::Toggle => Some(PlayerCommand::TogglePause),
        MediaControlEvent::Play => Some(PlayerCommand::Play),
        MediaControlEvent::Pause | MediaControlEvent::Stop => Some(PlayerCommand::Pause),
        _ => None,
    }
}

fn playback_for(status: PlaybackStatus) -> Option<MediaPlayback> {
    match status {
        PlaybackStatus::Playing => Some(MediaPlayback::Playing { progress: None }),
        PlaybackStatus::Paused => Some(MediaPlayback::Paused { progress: None }),
        PlaybackStatus::Idle => Some(MediaPlayback::Stopped),
        PlaybackStatus::Transitioning => None,
    }
}

/// Start the media-controls thread and the task feeding it. Failing to
/// register with the desktop is not fatal; the caller just logs it.
pub fn spawn_media_controls(
    controller: &PlaybackController,
    commands: CommandSender,
) -> Result<JoinHandle<()>> {
    let (tx, rx) = mpsc::channel::<Update>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

    thread::Builder::new()
        .name("media-controls".to_string())
        .spawn(move || run_controls(rx, commands, ready_tx))?;
    ready_rx
        .recv()
        .map_err(|_| anyhow!("media controls thread exited"))??;

    let mut events = controller.subscribe();
    Ok(tokio::spawn(async move {
        loop {
            let update = match events.recv().await {
                Ok(PlayerEvent::TrackStarted { entry, .. }) => Update::Metadata(entry.track),
                Ok(PlayerEvent::StatusChanged(status)) => match playback_for(status) {
                    Some(playback) => Update::Playback(playback),
                    None => continue,
                },
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Media controls lagged behind player events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if tx.send(update).is_err() {
                break;
            }
        }
    }))
}

fn run_controls(rx: mpsc::Receiver<Update>, commands: CommandSender, ready: mpsc::Sender<Result<()>>) {
    let config = PlatformConfig {
        dbus_name: APP_NAME,
        display_name: APP_NAME,
        hwnd: None,
    };
    let mut controls = match MediaControls::new(config) {
        Ok(controls) => controls,
        Err(e) => {
            let _ = ready.send(Err(anyhow!("media controls unavailable: {:?}", e)));
            return;
        }
    };
    let attached = controls.attach(move |event: MediaControlEvent| {
        tracing::debug!(?event, "Media key");
        if let Some(command) = command_for(&event) {
            let _ = commands.send(command);
        }
    });
    if let Err(e) = attached {
        let _ = ready.send(Err(anyhow!("media controls attach failed: {:?}", e)));
        return;
    }
    let _ = ready.send(Ok(()));
    tracing::info!("Media controls attached");

    while let Ok(update) = rx.recv() {
        let result = match update {
            Update::Metadata(track) => {
                let artists = track.artist_line();
                controls.set_metadata(MediaMetadata {
                    title: Some(&track.name),
                    artist: Some(&artists),
                    album: Some(&track.album),
                    duration: Some(Duration::from_millis(track.duration_ms as u64)),
                    cover_url: None,
                })
            }
            Update::Playback(playback) => controls.set_playback(playback),
        };
        if let Err(e) = result {
            tracing::warn!(error = ?e, "Media controls update failed");
        }
    }
    tracing::debug!("Media controls stopped");
}
