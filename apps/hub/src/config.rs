use std::{env, fs, path};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    ReadFailed(std::io::Error),
    #[error("failed to write config file: {0}")]
    WriteFailed(std::io::Error),
    #[error("failed to parse config file: {0}")]
    ParseFailed(toml::de::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen: Listen,
    pub database: DatabaseConfig,
    pub dispatch: Dispatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listen {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    /// Seconds between scheduler passes
    pub interval_seconds: u64,
    /// Payout units credited per verified reply
    pub payout_per_check: i64,
    /// Seconds before an unresolved callback entry is reclaimed
    pub callback_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: Listen { bind: "0.0.0.0".into(), port: 8081 },
            database: DatabaseConfig { path: "watchpost-hub.db".into() },
            dispatch: Dispatch {
                interval_seconds: 60,
                payout_per_check: watchpost::DEFAULT_PAYOUT_PER_CHECK,
                callback_ttl_seconds: 120,
            },
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/watchpost/hub.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("watchpost/hub.toml"))
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config at the default path or the specified path
    /// if one does not exist yet.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            toml::from_str(raw_string.as_str()).map_err(Error::ParseFailed)
        } else {
            let config = Self::default();
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
            }
            let serialized =
                toml::to_string_pretty(&config).expect("default config serializes");
            fs::write(&config_path, serialized).map_err(Error::WriteFailed)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            Ok(config)
        }
    }
}
