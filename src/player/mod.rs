//! Playback engine
//!
//! - `resolve`: search arguments for the fetch tool
//! - `process`: child process groups, teardown, stderr classification
//! - `pipeline`: fetch -> (cache tee) -> transcode process chain
//! - `byte_counter`: PCM byte count as the playback clock
//! - `sink`: rodio output and the PCM pump
//! - `session`: one pipeline plus one sink
//! - `controller`: queue, active session and player events
//! - `commands`: the command channel, tick task and log forwarding

pub mod byte_counter;
pub mod commands;
pub mod controller;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod resolve;
pub mod session;
pub mod sink;

pub use commands::{
    command_channel, run_commands, spawn_tick, spawn_tool_log_forwarder, CommandReceiver, CommandSender,
    PlayerCommand,
};
pub use controller::{
    PlaybackController, PlaybackStatus, PlayerEvent, PlayerSnapshot, QueueSnapshot, SelectedTrack,
};
pub use error::PlaybackError;
pub use pipeline::PipelineConfig;
pub use process::{ToolLogKind, ToolLogLine};
pub use session::{Session, SessionFactory, YtSessionFactory};
