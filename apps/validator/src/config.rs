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
    pub hub: Hub,
    pub identity: Identity,
    pub probe: Probe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hub {
    /// WebSocket URL of the hub, e.g. ws://localhost:8081
    pub url: String,
    /// Seconds to wait before reconnecting after a drop
    pub reconnect_backoff_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Path to the 32-byte Ed25519 secret key file; generated on first run
    pub key_path: String,
    /// Address reported to the hub at signup
    pub network_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    /// HTTP client timeout for outbound probes
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub: Hub { url: "ws://localhost:8081".into(), reconnect_backoff_seconds: 5 },
            identity: Identity {
                key_path: "validator.key".into(),
                network_address: "127.0.0.1".into(),
            },
            probe: Probe { timeout_seconds: 10 },
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

/// Get default config path ($XDG_CONFIG_HOME/watchpost/validator.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("watchpost/validator.toml"))
}

impl Config {
    /// Generate Config structure from file, writing defaults on first run.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validator.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.hub.reconnect_backoff_seconds, 5);
        assert!(path.exists());
    }

    #[test]
    fn test_parse_error_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validator.toml");
        fs::write(&path, "not = [valid").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));
    }
}
