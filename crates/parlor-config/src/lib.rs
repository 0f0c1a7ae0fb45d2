//! Configuration models and layered config loading.
//!
//! This crate owns the Parlor config schema, validation, and layer-merging
//! logic used by the terminal client.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Layered config types and loader options.
pub use loader::{
    ConfigLayer, ConfigLayerSource, ENV_API_URL, LayeredConfig, LayeredConfigOptions,
    default_config_dir,
};
/// Configuration schema models.
pub use model::*;
