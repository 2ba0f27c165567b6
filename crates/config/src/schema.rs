//! Config schema types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub bot: BotConfig,
    pub rbac: RbacConfig,
    pub plugins: PluginsConfig,
}

/// Routing and delivery behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Character(s) marking a command, as in `!echo`.
    pub command_prefix: String,
    /// TTL applied to tracked messages when the response does not set one.
    pub default_ttl_minutes: u32,
    /// How often the tracker reaper sweeps expired entries.
    pub reaper_interval_secs: u64,
    /// Capacity of the outbound response queue.
    pub outbound_queue_size: usize,
    /// Replies used when the bot is addressed but nothing handled the message.
    pub fallback_replies: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".into(),
            default_ttl_minutes: 300,
            reaper_interval_secs: 60,
            outbound_queue_size: 256,
            fallback_replies: default_fallback_replies(),
        }
    }
}

fn default_fallback_replies() -> Vec<String> {
    [
        "I'm afraid I don't understand.",
        "I am putting myself to the fullest possible use, but that is beyond me.",
        "This conversation can serve no purpose anymore.",
        "I'm sorry, could you rephrase that? Try `help`.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Role-based access control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// When false, every command is allowed and no database is opened.
    pub enabled: bool,
    /// SQLite database path. Defaults to `<data_dir>/rbac.db`.
    pub database: Option<PathBuf>,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
        }
    }
}

/// Plugin loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugin names registered but disabled at startup.
    pub disabled: Vec<String>,
}
