use clap::Parser;

use std::path::PathBuf;

use super::config::LogFormat;
use super::constants::{
    ENV_BUFFER_ENABLED, ENV_BUFFER_REPLAY_DELAY_MS, ENV_CONFIG, ENV_HOST, ENV_LOG_FORMAT, ENV_PORT,
    ENV_REGISTER_INTERVAL_MS, ENV_TOPIC_BUFFER_SIZE, ENV_TOPIC_CHANNEL_CAPACITY,
};

#[derive(Parser)]
#[command(name = "segment-collector")]
#[command(version, about = "Trace segment ingestion collector", long_about = None)]
pub struct Cli {
    /// Server host address
    #[arg(long, short = 'H', env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Log output format (compact or json)
    #[arg(long, env = ENV_LOG_FORMAT, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    // Pipeline options
    /// Topic buffer size in bytes
    #[arg(long, env = ENV_TOPIC_BUFFER_SIZE)]
    pub topic_buffer_size: Option<usize>,

    /// Topic channel capacity (messages)
    #[arg(long, env = ENV_TOPIC_CHANNEL_CAPACITY)]
    pub topic_channel_capacity: Option<usize>,

    /// Enable or disable replay of buffered segments
    #[arg(long, env = ENV_BUFFER_ENABLED)]
    pub buffer_enabled: Option<bool>,

    /// Delay before a buffered segment is replayed, in milliseconds
    #[arg(long, env = ENV_BUFFER_REPLAY_DELAY_MS)]
    pub buffer_replay_delay_ms: Option<u64>,

    /// Register worker tick, in milliseconds
    #[arg(long, env = ENV_REGISTER_INTERVAL_MS)]
    pub register_interval_ms: Option<u64>,
}

/// Parse log format from CLI/env string
fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_lowercase().as_str() {
        "compact" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        _ => Err(format!(
            "Invalid log format '{}'. Valid options: compact, json",
            s
        )),
    }
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
    pub topic_buffer_size: Option<usize>,
    pub topic_channel_capacity: Option<usize>,
    pub buffer_enabled: Option<bool>,
    pub buffer_replay_delay_ms: Option<u64>,
    pub register_interval_ms: Option<u64>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            config: cli.config,
            log_format: cli.log_format,
            topic_buffer_size: cli.topic_buffer_size,
            topic_channel_capacity: cli.topic_channel_capacity,
            buffer_enabled: cli.buffer_enabled,
            buffer_replay_delay_ms: cli.buffer_replay_delay_ms,
            register_interval_ms: cli.register_interval_ms,
        }
    }
}

/// Parse CLI arguments
pub fn parse() -> CliConfig {
    Cli::parse().into()
}
