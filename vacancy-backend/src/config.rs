/// Configuration for the vacancy backend.
/// Reads config.json from ~/.config/vacancy/config.json (or platform equivalent).
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use vacancy_core::action::DEFAULT_WINDOW_SECS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacancyConfig {
    /// Remote replica endpoint: `GET ?state=1` to fetch, `POST` to push.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Item feed document (`jobListings` + `sections`).
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    /// Legacy state-only snapshot, read when the endpoint fetch fails.
    #[serde(default)]
    pub snapshot_url: Option<String>,
    /// Where the durable local replica and logs live.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_undo_window_secs")]
    pub undo_window_secs: u32,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_feed_url() -> String {
    "http://127.0.0.1:8000/data.json".to_string()
}

fn default_port() -> u16 {
    8095
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_undo_window_secs() -> u32 {
    DEFAULT_WINDOW_SECS
}

impl Default for VacancyConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            feed_url: default_feed_url(),
            snapshot_url: None,
            data_dir: None,
            port: default_port(),
            bind_address: default_bind_address(),
            undo_window_secs: default_undo_window_secs(),
        }
    }
}

impl VacancyConfig {
    /// Configured data dir, else the platform data dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vacancy"),
        }
    }
}

/// Default config path: ~/.config/vacancy/config.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vacancy")
        .join("config.json")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config at {0}")]
    Missing(PathBuf),
    #[error("failed to read config {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Load config from path. Runs before the logger exists, so problems are returned
/// for the caller to report once logging is up.
pub fn load_config(path: &Path) -> Result<VacancyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::Missing(path.to_path_buf())
        } else {
            ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}
