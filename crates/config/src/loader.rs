use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result, env_subst::substitute_env, schema::HalConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["hal.toml", "hal.yaml", "hal.yml", "hal.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<HalConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./hal.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/hal/hal.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HalConfig::default()` if no config file is found or the file
/// fails to parse.
pub fn discover_and_load() -> HalConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    HalConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/hal/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hal").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory, falling back to `./.hal`.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "hal")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".hal"))
}

fn parse_config(raw: &str, path: &Path) -> Result<HalConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::unsupported_format(other)),
    }
}
