//! Entry point for the `parlor` terminal chat client.

use anyhow::Context;
use clap::Parser;
use log::{debug, info, warn};
use parlor_config::{ENV_API_URL, LayeredConfigOptions, ParlorConfig, default_config_dir};
use parlor_core::{
    AudioCaptureController, CaptureConstraints, ChatApi, ClientContext, CommandCaptureBackend,
    ConnectivityMonitor, Conversation, ConversationTimings, EventSink, HttpChatApi,
    SessionIdentity, SharedMessageStore, StatusCell,
};
use parlor_tui::{ChatClient, EventBus, Player, TuiConfig};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_LOG_FILE: &str = "parlor.log";

/// Command-line options for the chat client.
#[derive(Parser)]
#[command(name = "parlor", version)]
struct Cli {
    /// Optional path to a parlor.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend base URL (overrides config and PARLOR_API_URL)
    #[arg(long)]
    api_url: Option<String>,
    /// Forget the stored session id and start a new conversation
    #[arg(long)]
    new_session: bool,
    /// Log file path (defaults to ~/.parlor/parlor.log)
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Disable voice recording
    #[arg(long)]
    no_audio: bool,
}

/// Entry point for the Parlor TUI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.clone())?;
    info!(
        "starting parlor (config_set={}, api_url_set={}, new_session={}, no_audio={})",
        cli.config.is_some(),
        cli.api_url.is_some(),
        cli.new_session,
        cli.no_audio
    );

    let cwd = std::env::current_dir().context("cwd")?;
    let mut options = LayeredConfigOptions::new(&cwd).with_process_env();
    if let Some(path) = cli.config.as_ref() {
        options = options.with_runtime_path(path);
    }
    if let Some(api_url) = cli.api_url.as_ref() {
        options = options.with_env(ENV_API_URL, api_url.clone());
    }
    let layered =
        ParlorConfig::load_layered_with_options(options).context("failed to load config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    let mut config = layered.config;
    if cli.no_audio {
        config.audio.enabled = false;
    }

    let identity = SessionIdentity::from_config(&config.session);
    if cli.new_session
        && let Err(err) = identity.forget()
    {
        warn!("failed to forget stored session (error={err})");
    }
    let session_id = identity.get_or_create_session_id();

    let events = EventBus::new(256);
    let sink: Arc<dyn EventSink> = Arc::new(events.clone());
    let api: Arc<dyn ChatApi> =
        Arc::new(HttpChatApi::from_config(&config.api).context("failed to build HTTP client")?);

    let recorder = AudioCaptureController::new(
        Arc::new(CommandCaptureBackend::from_config(&config.audio)),
        CaptureConstraints::from_config(&config.audio),
        sink.clone(),
    );
    let context = ClientContext::new(session_id, &config.api.base_url, recorder.is_supported());
    let monitor = ConnectivityMonitor::new(api.clone(), StatusCell::new(), sink.clone());
    let conversation = Conversation::new(
        api,
        SharedMessageStore::new(),
        monitor.clone(),
        sink,
        context,
        ConversationTimings::from_config(&config.api),
    );
    let client = ChatClient::new(
        conversation,
        monitor,
        recorder,
        Player::new(config.audio.player.clone()),
    );

    let tui_config = TuiConfig {
        persona: config.persona.clone(),
        ui: config.ui.clone(),
        health_interval: config.api.health_interval(),
    };
    parlor_tui::run(client, events, tui_config).await
}

/// Send logs to a file; the terminal belongs to the UI.
fn init_logging(path: Option<PathBuf>) -> anyhow::Result<()> {
    let Some(path) = path.or_else(|| default_config_dir().map(|dir| dir.join(DEFAULT_LOG_FILE)))
    else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init();
    Ok(())
}
