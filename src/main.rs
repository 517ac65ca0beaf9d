mod auth;
mod config;
mod controller;
mod logging;
mod media_controls;
mod model;
mod player;
mod view;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use rspotify::clients::OAuthClient;
use tokio::sync::{mpsc, oneshot};

use config::{AppConfig, Cli};
use controller::AppController;
use model::{AppModel, Catalog, SpotifyClient};
use player::{
    command_channel, run_commands, spawn_tick, spawn_tool_log_forwarder, CommandSender,
    PipelineConfig, PlaybackController, PlayerCommand, ToolLogLine, YtSessionFactory,
};
use view::AppView;

const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, config_error) = AppConfig::load(cli.config.as_deref());
    config.apply_cli(&cli);

    let _log_guard = match logging::init_logging(&config.debug_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("=== ytspot starting ===");
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Using default configuration");
    }
    tracing::debug!(?config, "Configuration loaded");

    let auth_result = auth::perform_oauth_flow().await?;
    let expires_at = auth_result.token.expires_at;
    let rspotify_client = model::spotify_client::build_rspotify(auth_result.token).await?;

    match rspotify_client.me().await {
        Ok(user) => tracing::info!(user_id = %user.id, "rspotify authorized successfully"),
        Err(e) => {
            tracing::error!(error = %e, "rspotify authentication failed");
            return Err(anyhow::anyhow!("Spotify authorization failed: {}", e));
        }
    }
    let spotify = SpotifyClient::new(rspotify_client, auth_result.refresh_token, expires_at);

    // Player: sessions, command loop, tick and tool logs
    let (log_tx, log_rx) = mpsc::unbounded_channel::<ToolLogLine>();
    let factory = YtSessionFactory::new(PipelineConfig::from(&config), Some(log_tx));
    let catalog: Arc<dyn Catalog> = Arc::new(spotify.clone());
    let player = PlaybackController::new(Arc::new(factory), Some(catalog.clone()));

    let (commands, command_rx) = command_channel();
    tokio::spawn(run_commands(player.clone(), command_rx));
    spawn_tick(player.clone(), commands.clone());
    spawn_tool_log_forwarder(player.clone(), log_rx);

    if let Err(e) = media_controls::spawn_media_controls(&player, commands.clone()) {
        tracing::warn!(error = %e, "Media controls disabled");
    }

    let model = Arc::new(AppModel::new());
    let controller = AppController::new(
        model.clone(),
        Some(spotify.clone()),
        Some(catalog),
        player,
        commands.clone(),
    );
    controller.start_player_event_listener();

    let controller_for_library = controller.clone();
    tokio::spawn(async move {
        controller_for_library.load_library().await;
    });

    tracing::info!("Starting TUI...");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, model, controller, spotify).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    shutdown_player(&commands).await;

    tracing::info!("ytspot shutting down");
    Ok(())
}

/// Ask the player to tear down its session and wait for it
async fn shutdown_player(commands: &CommandSender) {
    let (done_tx, done_rx) = oneshot::channel();
    if commands.send(PlayerCommand::Shutdown(done_tx)).is_err() {
        return;
    }
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, done_rx).await.is_err() {
        tracing::warn!("Player did not shut down in time");
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    model: Arc<AppModel>,
    controller: AppController,
    spotify: SpotifyClient,
) -> io::Result<()> {
    let mut last_token_check = Instant::now();

    loop {
        if last_token_check.elapsed() >= TOKEN_CHECK_INTERVAL {
            last_token_check = Instant::now();
            let spotify = spotify.clone();
            tokio::spawn(async move {
                if let Err(e) = spotify.refresh_token_if_needed().await {
                    tracing::warn!("Token refresh check failed: {}", e);
                }
            });
        }

        model.auto_clear_old_errors().await;
        let ui_state = model.get_ui_state().await;
        let playback = model.get_playback().await;

        terminal.draw(|f| {
            AppView::render(f, &ui_state, &playback);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if let Err(e) = controller.handle_key_event(key).await {
                    tracing::warn!(error = %e, "Key handling failed");
                }
            }
        }

        if model.should_quit().await {
            break;
        }
    }

    Ok(())
}
