//! Configuration loading and env substitution.
//!
//! Config files: `hal.toml`, `hal.yaml`, `hal.yml` or `hal.json`
//! Searched in `./` then `~/.config/hal/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, data_dir, discover_and_load, load_config},
    schema::{BotConfig, HalConfig, PluginsConfig, RbacConfig},
};
