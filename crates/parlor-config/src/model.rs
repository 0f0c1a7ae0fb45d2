//! Configuration schema for Parlor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root config for the Parlor client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParlorConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl ParlorConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ParlorConfigBuilder {
        ParlorConfigBuilder::new()
    }
}

/// Builder for assembling a `ParlorConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ParlorConfigBuilder {
    config: ParlorConfig,
}

impl ParlorConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ParlorConfig::default(),
        }
    }

    /// Replace the backend API configuration.
    pub fn api(mut self, api: ApiConfig) -> Self {
        self.config.api = api;
        self
    }

    /// Override only the backend base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.api.base_url = base_url.into();
        self
    }

    /// Replace the session storage configuration.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    /// Replace the audio capture configuration.
    pub fn audio(mut self, audio: AudioConfig) -> Self {
        self.config.audio = audio;
        self
    }

    /// Replace the persona texts.
    pub fn persona(mut self, persona: PersonaConfig) -> Self {
        self.config.persona = persona;
        self
    }

    /// Replace the UI tuning.
    pub fn ui(mut self, ui: UiConfig) -> Self {
        self.config.ui = ui;
        self
    }

    /// Finalize and return the built `ParlorConfig`.
    pub fn build(self) -> ParlorConfig {
        self.config
    }
}

/// Backend endpoint and request bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_chat_timeout_ms")]
    pub chat_timeout_ms: u64,
    #[serde(default = "default_audio_timeout_ms")]
    pub audio_timeout_ms: u64,
    #[serde(default = "default_history_timeout_ms")]
    pub history_timeout_ms: u64,
    /// Client-side guard that force-resolves a pending text send.
    #[serde(default = "default_send_guard_ms")]
    pub send_guard_ms: u64,
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
    /// Delay before re-probing after a send received no response.
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            health_timeout_ms: default_health_timeout_ms(),
            chat_timeout_ms: default_chat_timeout_ms(),
            audio_timeout_ms: default_audio_timeout_ms(),
            history_timeout_ms: default_history_timeout_ms(),
            send_guard_ms: default_send_guard_ms(),
            health_interval_ms: default_health_interval_ms(),
            recheck_delay_ms: default_recheck_delay_ms(),
        }
    }
}

impl ApiConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_timeout_ms)
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_timeout_ms)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_millis(self.history_timeout_ms)
    }

    pub fn send_guard(&self) -> Duration {
        Duration::from_millis(self.send_guard_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_chat_timeout_ms() -> u64 {
    30_000
}

fn default_audio_timeout_ms() -> u64 {
    60_000
}

fn default_history_timeout_ms() -> u64 {
    30_000
}

fn default_send_guard_ms() -> u64 {
    45_000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_recheck_delay_ms() -> u64 {
    5_000
}

/// Where the session identifier is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Storage file; defaults to `session.json` in the config dir.
    #[serde(default)]
    pub path: Option<String>,
    /// Key under which the identifier is stored.
    #[serde(default = "default_session_key")]
    pub key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: None,
            key: default_session_key(),
        }
    }
}

fn default_session_key() -> String {
    "chat_session_id".to_string()
}

/// Microphone capture and reply playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Recorder argv; must write the encoded stream to stdout.
    #[serde(default = "default_capture_command")]
    pub command: Vec<String>,
    /// MIME type of the recorder output.
    #[serde(default = "default_capture_mime")]
    pub mime: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_true")]
    pub echo_cancellation: bool,
    #[serde(default = "default_true")]
    pub noise_suppression: bool,
    /// Player argv; `{url}` is replaced with the reply URL.
    #[serde(default = "default_player_command")]
    pub player: Vec<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_capture_command(),
            mime: default_capture_mime(),
            sample_rate: default_sample_rate(),
            echo_cancellation: true,
            noise_suppression: true,
            player: default_player_command(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_capture_command() -> Vec<String> {
    [
        "arecord",
        "-q",
        "-f",
        "S16_LE",
        "-r",
        "{sample_rate}",
        "-c",
        "1",
        "-t",
        "wav",
        "-",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_capture_mime() -> String {
    "audio/wav".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_player_command() -> Vec<String> {
    [
        "ffplay",
        "-nodisp",
        "-autoexit",
        "-loglevel",
        "quiet",
        "{url}",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Texts describing the scripted persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_persona_tagline")]
    pub tagline: String,
    #[serde(default = "default_user_label")]
    pub user_label: String,
    #[serde(default = "default_welcome_title")]
    pub welcome_title: String,
    #[serde(default = "default_welcome_body")]
    pub welcome_body: String,
    #[serde(default = "default_welcome_hint")]
    pub welcome_hint: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            tagline: default_persona_tagline(),
            user_label: default_user_label(),
            welcome_title: default_welcome_title(),
            welcome_body: default_welcome_body(),
            welcome_hint: default_welcome_hint(),
        }
    }
}

fn default_persona_name() -> String {
    "Persona".to_string()
}

fn default_persona_tagline() -> String {
    "Scripted conversation partner".to_string()
}

fn default_user_label() -> String {
    "You".to_string()
}

fn default_welcome_title() -> String {
    "Welcome".to_string()
}

fn default_welcome_body() -> String {
    "Type a message or record your voice to start the conversation.".to_string()
}

fn default_welcome_hint() -> String {
    "How can I help you today?".to_string()
}

/// Terminal UI tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Rows from the bottom still considered "near bottom".
    #[serde(default = "default_near_bottom_rows")]
    pub near_bottom_rows: u16,
    /// Delay before auto-scrolling after the transcript changes.
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            near_bottom_rows: default_near_bottom_rows(),
            scroll_settle_ms: default_scroll_settle_ms(),
        }
    }
}

impl UiConfig {
    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}

fn default_near_bottom_rows() -> u16 {
    3
}

fn default_scroll_settle_ms() -> u64 {
    100
}
