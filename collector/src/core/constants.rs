// =============================================================================
// Application Identity
// =============================================================================

/// Application name (for display)
pub const APP_NAME: &str = "Segment Collector";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "segment_collector";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".segment-collector";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "segment-collector.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "SEGMENT_COLLECTOR_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "SEGMENT_COLLECTOR_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "SEGMENT_COLLECTOR_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "SEGMENT_COLLECTOR_LOG";

/// Environment variable for log output format (`compact` or `json`)
pub const ENV_LOG_FORMAT: &str = "SEGMENT_COLLECTOR_LOG_FORMAT";

// =============================================================================
// Environment Variables - Pipeline
// =============================================================================

/// Environment variable for topic buffer size in bytes
pub const ENV_TOPIC_BUFFER_SIZE: &str = "SEGMENT_COLLECTOR_TOPIC_BUFFER_SIZE";

/// Environment variable for topic channel capacity
pub const ENV_TOPIC_CHANNEL_CAPACITY: &str = "SEGMENT_COLLECTOR_TOPIC_CHANNEL_CAPACITY";

/// Environment variable to enable/disable buffer replay
pub const ENV_BUFFER_ENABLED: &str = "SEGMENT_COLLECTOR_BUFFER_ENABLED";

/// Environment variable for buffer replay delay in milliseconds
pub const ENV_BUFFER_REPLAY_DELAY_MS: &str = "SEGMENT_COLLECTOR_BUFFER_REPLAY_DELAY_MS";

/// Environment variable for register worker interval in milliseconds
pub const ENV_REGISTER_INTERVAL_MS: &str = "SEGMENT_COLLECTOR_REGISTER_INTERVAL_MS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 12800;

/// Maximum accepted request body (upstream segment) in bytes
pub const MAX_SEGMENT_BODY_BYTES: usize = 8 * 1024 * 1024;

// =============================================================================
// Pipeline Defaults
// =============================================================================

/// Topic name for the segment persistence pipeline
pub const TOPIC_SEGMENT_PERSISTENCE: &str = "segment.persistence";

/// Topic name for the segment buffer pipeline
pub const TOPIC_SEGMENT_BUFFER: &str = "segment.buffer";

/// Default topic buffer size in bytes (64 MiB)
pub const DEFAULT_TOPIC_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default topic channel capacity (messages)
pub const DEFAULT_TOPIC_CHANNEL_CAPACITY: usize = 10_000;

/// Default delay before a buffered segment is replayed
pub const DEFAULT_BUFFER_REPLAY_DELAY_MS: u64 = 1_000;

/// Default register worker tick
pub const DEFAULT_REGISTER_INTERVAL_MS: u64 = 200;

// =============================================================================
// Segment Parsing
// =============================================================================

/// Operation name used for spans that carry none
pub const DOMAIN_OPERATION_NAME: &str = "/";

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
