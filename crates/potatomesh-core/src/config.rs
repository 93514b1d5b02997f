use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::snapshot::SNAPSHOT_DEPTH;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for a PotatoMesh client
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MeshConfig {
    /// Where the PotatoMesh web API lives
    #[serde(default)]
    pub api: ApiConfig,

    /// `limit=` sent to each list endpoint
    #[serde(default)]
    pub limits: FeedLimits,

    /// Refresh cycle behaviour
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Instance base URL, with or without a trailing `/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedLimits {
    #[serde(default = "default_feed_limit")]
    pub nodes: usize,
    #[serde(default = "default_feed_limit")]
    pub telemetry: usize,
    #[serde(default = "default_feed_limit")]
    pub positions: usize,
    #[serde(default = "default_feed_limit")]
    pub neighbors: usize,
    #[serde(default = "default_feed_limit")]
    pub traces: usize,
    #[serde(default = "default_message_limit")]
    pub messages: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            nodes: default_feed_limit(),
            telemetry: default_feed_limit(),
            positions: default_feed_limit(),
            neighbors: default_feed_limit(),
            traces: default_feed_limit(),
            messages: default_message_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between refresh cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Snapshots retained per node for history charts
    #[serde(default = "default_snapshot_depth")]
    pub snapshot_depth: usize,

    /// Fetch the traceroute feed
    #[serde(default = "default_true")]
    pub include_traces: bool,

    /// Also fetch encrypted messages
    #[serde(default)]
    pub include_encrypted: bool,

    /// Ask the node feed for historical rows (`history=1`)
    #[serde(default)]
    pub node_history: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            snapshot_depth: default_snapshot_depth(),
            include_traces: true,
            include_encrypted: false,
            node_history: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:41447".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_feed_limit() -> usize {
    1000
}
fn default_message_limit() -> usize {
    200
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_snapshot_depth() -> usize {
    SNAPSHOT_DEPTH
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Loads configuration from `.env`, an optional TOML file and environment
/// variables, in increasing order of precedence.
pub struct ConfigManager {
    config: MeshConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading PotatoMesh configuration...");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!("API base URL: {}", config.api.base_url);
        info!("Poll interval: {}s", config.refresh.poll_interval_secs);

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit config file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".potatomesh.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .potatomesh.env: {}", e);
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.potatomesh.toml
    /// 2. ~/.potatomesh/config.toml
    /// 3. defaults
    fn load_config_file() -> Result<(MeshConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".potatomesh.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".potatomesh").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((MeshConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<MeshConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(config: MeshConfig) -> MeshConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Apply `POTATOMESH_*` overrides read through `lookup`. Unparsable
    /// numbers are ignored with a warning.
    fn apply_overrides<F>(mut config: MeshConfig, lookup: F) -> MeshConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: String) -> Option<T> {
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid {}: {:?}", key, raw);
                    None
                }
            }
        }

        if let Some(url) = lookup("POTATOMESH_BASE_URL") {
            config.api.base_url = url.trim().to_string();
        }
        if let Some(secs) = lookup("POTATOMESH_TIMEOUT_SECS")
            .and_then(|raw| parsed("POTATOMESH_TIMEOUT_SECS", raw))
        {
            config.api.timeout_secs = secs;
        }
        if let Some(secs) = lookup("POTATOMESH_POLL_INTERVAL_SECS")
            .and_then(|raw| parsed("POTATOMESH_POLL_INTERVAL_SECS", raw))
        {
            config.refresh.poll_interval_secs = secs;
        }
        if let Some(depth) = lookup("POTATOMESH_SNAPSHOT_DEPTH")
            .and_then(|raw| parsed("POTATOMESH_SNAPSHOT_DEPTH", raw))
        {
            config.refresh.snapshot_depth = depth;
        }
        if let Some(limit) = lookup("POTATOMESH_NODE_LIMIT")
            .and_then(|raw| parsed("POTATOMESH_NODE_LIMIT", raw))
        {
            config.limits.nodes = limit;
        }
        if let Some(level) = lookup("POTATOMESH_LOG_LEVEL") {
            config.logging.level = level.trim().to_lowercase();
        }

        config
    }

    fn validate_config(config: &MeshConfig) -> Result<(), ConfigError> {
        if config.api.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "api.base_url must not be empty".to_string(),
            ));
        }
        if config.refresh.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "refresh.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if config.refresh.snapshot_depth == 0 {
            return Err(ConfigError::ValidationError(
                "refresh.snapshot_depth must be greater than zero".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn into_config(self) -> MeshConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Write the defaults to `path`, creating parent directories.
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = MeshConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = MeshConfig::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:41447");
        assert_eq!(config.refresh.poll_interval_secs, 60);
        assert_eq!(config.refresh.snapshot_depth, 7);
        assert_eq!(config.limits.nodes, 1000);
        assert_eq!(config.limits.messages, 200);
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = MeshConfig::default();

        let mut bad = config.clone();
        bad.api.base_url = "  ".to_string();
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.refresh.poll_interval_secs = 0;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.refresh.snapshot_depth = 0;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config;
        bad.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&bad).is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://mesh.example/api\"\n\n[refresh]\ninclude_encrypted = true\n",
        )
        .unwrap();

        let config = ConfigManager::read_toml_file(&path).unwrap();
        assert_eq!(config.api.base_url, "https://mesh.example/api");
        assert_eq!(config.api.timeout_secs, 10);
        assert!(config.refresh.include_encrypted);
        assert!(config.refresh.include_traces);
        assert_eq!(config.limits.telemetry, 1000);
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("POTATOMESH_BASE_URL", " http://override:1 "),
            ("POTATOMESH_SNAPSHOT_DEPTH", "3"),
            ("POTATOMESH_POLL_INTERVAL_SECS", "soon"),
            ("POTATOMESH_LOG_LEVEL", "DEBUG"),
        ]);
        let config = ConfigManager::apply_overrides(MeshConfig::default(), |key| {
            env.get(key).map(|v| v.to_string())
        });
        assert_eq!(config.api.base_url, "http://override:1");
        assert_eq!(config.refresh.snapshot_depth, 3);
        assert_eq!(config.refresh.poll_interval_secs, 60);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_error_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[api\nbase_url = ").unwrap();
        assert!(matches!(
            ConfigManager::read_toml_file(&path),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            ConfigManager::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_default_config_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        ConfigManager::create_default_config(&path).unwrap();
        let config = ConfigManager::read_toml_file(&path).unwrap();
        assert_eq!(config.refresh.snapshot_depth, SNAPSHOT_DEPTH);
    }
}
