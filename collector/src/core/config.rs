use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BUFFER_REPLAY_DELAY_MS, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_REGISTER_INTERVAL_MS, DEFAULT_TOPIC_BUFFER_SIZE, DEFAULT_TOPIC_CHANNEL_CAPACITY,
};

// =============================================================================
// Log Format Enum
// =============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Pipeline (topic) configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PipelineFileConfig {
    pub buffer_size: Option<usize>,
    pub channel_capacity: Option<usize>,
}

/// Buffer replay configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BufferFileConfig {
    pub enabled: Option<bool>,
    pub replay_delay_ms: Option<u64>,
}

/// Register worker configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RegisterFileConfig {
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub pipeline: Option<PipelineFileConfig>,
    pub buffer: Option<BufferFileConfig>,
    pub register: Option<RegisterFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            if server.host.is_some() {
                current.host = server.host;
            }
            if server.port.is_some() {
                current.port = server.port;
            }
        }

        if let Some(pipeline) = other.pipeline {
            let current = self.pipeline.get_or_insert_with(PipelineFileConfig::default);
            if pipeline.buffer_size.is_some() {
                current.buffer_size = pipeline.buffer_size;
            }
            if pipeline.channel_capacity.is_some() {
                current.channel_capacity = pipeline.channel_capacity;
            }
        }

        if let Some(buffer) = other.buffer {
            let current = self.buffer.get_or_insert_with(BufferFileConfig::default);
            if buffer.enabled.is_some() {
                current.enabled = buffer.enabled;
            }
            if buffer.replay_delay_ms.is_some() {
                current.replay_delay_ms = buffer.replay_delay_ms;
            }
        }

        if let Some(register) = other.register {
            let current = self.register.get_or_insert_with(RegisterFileConfig::default);
            if register.interval_ms.is_some() {
                current.interval_ms = register.interval_ms;
            }
        }
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub buffer_size: usize,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub enabled: bool,
    pub replay_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct RegisterConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub buffer: BufferConfig,
    pub register: RegisterConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.segment-collector/segment-collector.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(cli, file_config);
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, file values and CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_pipeline = file_config.pipeline.unwrap_or_default();
        let file_buffer = file_config.buffer.unwrap_or_default();
        let file_register = file_config.register.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let pipeline = PipelineConfig {
            buffer_size: cli
                .topic_buffer_size
                .or(file_pipeline.buffer_size)
                .unwrap_or(DEFAULT_TOPIC_BUFFER_SIZE),
            channel_capacity: cli
                .topic_channel_capacity
                .or(file_pipeline.channel_capacity)
                .unwrap_or(DEFAULT_TOPIC_CHANNEL_CAPACITY),
        };

        let buffer = BufferConfig {
            enabled: cli
                .buffer_enabled
                .or(file_buffer.enabled)
                .unwrap_or(true),
            replay_delay: Duration::from_millis(
                cli.buffer_replay_delay_ms
                    .or(file_buffer.replay_delay_ms)
                    .unwrap_or(DEFAULT_BUFFER_REPLAY_DELAY_MS),
            ),
        };

        let register = RegisterConfig {
            interval: Duration::from_millis(
                cli.register_interval_ms
                    .or(file_register.interval_ms)
                    .unwrap_or(DEFAULT_REGISTER_INTERVAL_MS),
            ),
        };

        Self {
            server,
            pipeline,
            buffer,
            register,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }

        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }

        if self.pipeline.buffer_size == 0 {
            anyhow::bail!("Configuration error: pipeline.buffer_size must be greater than 0");
        }

        if self.pipeline.channel_capacity == 0 {
            anyhow::bail!("Configuration error: pipeline.channel_capacity must be greater than 0");
        }

        if self.register.interval.is_zero() {
            anyhow::bail!("Configuration error: register.interval_ms must be greater than 0");
        }

        Ok(())
    }
}

/// Get the profile config path (~/.segment-collector/segment-collector.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
