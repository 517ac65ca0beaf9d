//! Controller module - input handling and coordination
//!
//! Turns key presses into browse calls and player commands, and keeps the
//! model in step with player events.
//!
//! - `input`: Key event handling
//! - `navigation`: Library, listing and search navigation
//! - `player_events`: Player event listener

mod input;
mod navigation;
mod player_events;

use std::sync::Arc;

use crate::model::{AppModel, Catalog, SpotifyClient};
use crate::player::{CommandSender, PlaybackController, PlayerCommand};

#[derive(Clone)]
pub struct AppController {
    pub(crate) model: Arc<AppModel>,
    pub(crate) spotify: Option<SpotifyClient>,
    /// Pages of long listings
    pub(crate) catalog: Option<Arc<dyn Catalog>>,
    pub(crate) player: PlaybackController,
    commands: CommandSender,
}

impl AppController {
    pub fn new(
        model: Arc<AppModel>,
        spotify: Option<SpotifyClient>,
        catalog: Option<Arc<dyn Catalog>>,
        player: PlaybackController,
        commands: CommandSender,
    ) -> Self {
        Self {
            model,
            spotify,
            catalog,
            player,
            commands,
        }
    }

    /// Queue a command for the player. Only fails once the player loop is gone.
    pub(crate) async fn send(&self, command: PlayerCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Player command loop is not running");
            self.model.set_error("Player stopped".to_string()).await;
        }
    }
}
