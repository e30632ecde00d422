//! Server configuration.
//!
//! Everything is read from environment variables with sensible defaults,
//! so the runner needs no config file to start.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::log_book::GameConfig;

/// Seconds to wait for a single engine response.
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 3;

/// Directory scanned for an engine jar when no command is given.
pub const DEFAULT_ENGINE_SEARCH_DIR: &str = "../engine";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Rules engine process configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit command line (program followed by arguments).
    pub command: Option<Vec<String>>,
    /// Directory searched for a single `.jar` when `command` is unset.
    pub search_dir: PathBuf,
    /// Maximum wait for one response line.
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: None,
            search_dir: PathBuf::from(DEFAULT_ENGINE_SEARCH_DIR),
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            command: std::env::var("TANK_GAME_ENGINE_COMMAND")
                .ok()
                .map(|cmd| split_command(&cmd))
                .filter(|cmd| !cmd.is_empty()),
            search_dir: std::env::var("TANK_GAME_ENGINE_SEARCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.search_dir),
            timeout: std::env::var("TANK_GAME_ENGINE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Command used to launch the engine.
    ///
    /// Falls back to `java -jar <jar>` when the search directory holds
    /// exactly one jar. Returns `None` if neither is available.
    pub fn resolve_command(&self) -> Option<Vec<String>> {
        if let Some(command) = &self.command {
            return Some(command.clone());
        }

        let jars = find_jars(&self.search_dir);
        if jars.len() != 1 {
            warn!(
                search_dir = %self.search_dir.display(),
                found = ?jars,
                "Expected exactly 1 tank game jar"
            );
            return None;
        }

        let command = vec![
            "java".to_string(),
            "-jar".to_string(),
            jars[0].display().to_string(),
        ];
        info!("Tank game engine command: {}", command.join(" "));
        Some(command)
    }
}

/// Top-level runner configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Engine process settings.
    pub engine: EngineConfig,
    /// Optional JSON file with per-version settings (`GameConfig`).
    pub game_config_path: Option<PathBuf>,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            game_config_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            engine: EngineConfig::from_env(),
            game_config_path: std::env::var("TANK_GAME_CONFIG").ok().map(PathBuf::from),
            log_filter: std::env::var("TANK_GAME_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Load the game version config, if one is configured.
    pub async fn load_game_config(&self) -> Result<Option<GameConfig>, ConfigError> {
        let Some(path) = &self.game_config_path else {
            return Ok(None);
        };

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;

        let config = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;

        Ok(Some(config))
    }
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn find_jars(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut jars: Vec<PathBuf> = read_dir
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jar"))
        .collect();
    jars.sort();
    jars
}
