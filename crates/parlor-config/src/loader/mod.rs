//! Layered configuration loader.
//!
//! Discovers configuration layers (user, cwd, runtime), validates schema,
//! merges them in precedence order, applies environment overrides, and
//! produces a final `ParlorConfig`.

mod layer_io;
mod merge;
mod schema;


use crate::{ConfigError, ParlorConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "parlor.json5";
/// Default config directory under the home directory.
const DEFAULT_CONFIG_DIR: &str = ".parlor";
/// Environment variable overriding `api.base_url`.
pub const ENV_API_URL: &str = "PARLOR_API_URL";

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: ParlorConfig,
    /// Metadata for each layer considered during load.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// User-specific configuration.
    User,
    /// Current working directory configuration.
    Cwd,
    /// Explicit runtime config paths.
    Runtime,
    /// Environment variable overrides (highest precedence).
    Env,
}

/// Metadata about a config layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    /// Layer origin.
    pub source: ConfigLayerSource,
    /// Location on disk if present.
    pub path: Option<PathBuf>,
}

/// Schema validation mode for layered configs.
#[derive(Debug, Clone, Copy)]
enum SchemaMode {
    /// Partial validation for non-final layers.
    Partial,
    /// Full validation for the effective config.
    Full,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to resolve the cwd layer.
    pub cwd: PathBuf,
    /// Optional user config path (defaults to `~/.parlor/parlor.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Runtime override config paths applied after file layers.
    pub runtime_paths: Vec<PathBuf>,
    /// Environment overrides as (variable, value) pairs.
    pub env: Vec<(String, String)>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Add a runtime override config path.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Capture the recognized variables from the process environment.
    pub fn with_process_env(mut self) -> Self {
        if let Ok(value) = std::env::var(ENV_API_URL) {
            self.env.push((ENV_API_URL.to_string(), value));
        }
        self
    }

    /// Add a single environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Directory holding the user config, session file and logs.
pub fn default_config_dir() -> Option<PathBuf> {
    layer_io::default_config_dir()
}

impl ParlorConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        let value: Value = json5::from_str(&contents)?;
        config_from_value(value, "config")
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        info!(
            "loading layered config with defaults (cwd={})",
            cwd.as_ref().display()
        );
        let options = LayeredConfigOptions::new(cwd).with_process_env();
        Self::load_layered_with_options(options)
    }

    /// Load a layered config stack using explicit layer locations and overrides.
    ///
    /// Layer precedence (low -> high): user, cwd, runtime paths, environment.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut layers = Vec::new();
        let mut merged = Value::Object(serde_json::Map::new());
        let mut seen_paths = HashSet::new();

        let mut candidates = Vec::new();
        if let Some(path) = options.user_config_path.as_deref() {
            candidates.push((ConfigLayerSource::User, path.to_path_buf(), false));
        }
        candidates.push((
            ConfigLayerSource::Cwd,
            options.cwd.join(DEFAULT_CONFIG_FILE),
            false,
        ));
        for path in &options.runtime_paths {
            candidates.push((ConfigLayerSource::Runtime, path.clone(), true));
        }

        for (source, path, required) in candidates {
            let loaded = if required {
                Some(layer_io::load_required_layer(source, &path)?)
            } else {
                layer_io::load_optional_layer(source, Some(&path))?
            };
            let Some(loaded) = loaded else {
                continue;
            };
            if !seen_paths.insert(layer_io::unique_path(&path)) {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            debug!("loaded {:?} layer", source);
            merge::merge_json_values(&mut merged, &loaded.value);
            layers.push(loaded.meta);
        }

        if let Some(overlay) = env_overlay(&options.env) {
            debug!("applying environment overrides");
            merge::merge_json_values(&mut merged, &overlay);
            layers.push(ConfigLayer {
                source: ConfigLayerSource::Env,
                path: None,
            });
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api.base_url.trim();
        if !base_url.is_empty()
            && !base_url.starts_with("http://")
            && !base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidField {
                path: "api.base_url".to_string(),
                message: "must start with http:// or https://".to_string(),
            });
        }
        for (name, value) in [
            ("api.health_timeout_ms", self.api.health_timeout_ms),
            ("api.chat_timeout_ms", self.api.chat_timeout_ms),
            ("api.audio_timeout_ms", self.api.audio_timeout_ms),
            ("api.history_timeout_ms", self.api.history_timeout_ms),
            ("api.send_guard_ms", self.api.send_guard_ms),
            ("api.health_interval_ms", self.api.health_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidField {
                    path: name.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.session.key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.key cannot be empty".to_string(),
            ));
        }
        if self.audio.enabled && self.audio.command.is_empty() {
            return Err(ConfigError::Invalid(
                "audio.command requires at least the recorder program".to_string(),
            ));
        }
        Ok(())
    }
}

/// Internal representation of a loaded config layer.
#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

/// Translate recognized environment variables into a config overlay.
fn env_overlay(env: &[(String, String)]) -> Option<Value> {
    let mut overlay = None;
    for (key, value) in env {
        if key == ENV_API_URL && !value.trim().is_empty() {
            overlay = Some(serde_json::json!({ "api": { "base_url": value.trim() } }));
        }
    }
    overlay
}

fn config_from_value(value: Value, label: &str) -> Result<ParlorConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    let mut config: ParlorConfig = serde_json::from_value(value)?;
    config.api.base_url = config.api.base_url.trim().trim_end_matches('/').to_string();
    config.validate()?;
    Ok(config)
}
