//! Configuration management for the radio call ingest pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// File storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ingest authentication and validation configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Work queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Transcription configuration
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of pooled connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Per-acquisition timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory uploaded payloads are materialized into
    #[serde(default = "default_incoming_dir")]
    pub incoming_dir: PathBuf,
}

/// Per-key descriptor for the enhanced API key scheme
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// The key value
    pub key: String,

    /// Operator description
    #[serde(default)]
    pub description: Option<String>,

    /// If set, only these IPs may use the key
    #[serde(default)]
    pub allowed_ips: Option<Vec<String>>,

    /// If set, only these system IDs may use the key
    #[serde(default)]
    pub allowed_systems: Option<Vec<String>>,
}

/// Ingest authentication, validation and rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Legacy single API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enhanced API key descriptors
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,

    /// Run payload validation on uploads
    #[serde(default = "default_enable_file_validation")]
    pub enable_file_validation: bool,

    /// Maximum payload size in MiB
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Minimum payload size in bytes
    #[serde(default = "default_min_file_size_bytes")]
    pub min_file_size_bytes: u64,

    /// Per-IP upload admissions per minute
    #[serde(default = "default_max_uploads_per_minute")]
    pub max_uploads_per_minute: u32,

    /// Per-IP upload admissions per hour
    #[serde(default = "default_max_uploads_per_hour")]
    pub max_uploads_per_hour: u32,

    /// Transcribe inline when the queue is saturated instead of failing
    #[serde(default = "default_inline_fallback")]
    pub inline_fallback: bool,
}

impl IngestConfig {
    /// Maximum payload size in bytes
    #[must_use]
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Whether any authentication material is configured
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some() || !self.api_keys.is_empty()
    }
}

/// Work queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Main queue capacity
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Number of transcription workers
    #[serde(default = "default_queue_workers")]
    pub workers: usize,

    /// Retries before a task fails permanently
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long finished task records are retained, hours
    #[serde(default = "default_task_retention_hours")]
    pub task_retention_hours: u64,

    /// Reaper interval, minutes
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

/// Transcription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Whether transcription is enabled
    #[serde(default = "default_transcription_enabled")]
    pub enabled: bool,

    /// Model identifier reported on transcriptions
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Language hint (None for auto-detect)
    #[serde(default)]
    pub language: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or text)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_database_url() -> String {
    std::env::var("RADIOCALL_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| "postgresql://localhost/radiocalls".to_string())
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_acquire_timeout() -> u64 {
    60
}

const fn default_idle_timeout() -> u64 {
    600
}

fn default_incoming_dir() -> PathBuf {
    PathBuf::from("./data/incoming")
}

const fn default_enable_file_validation() -> bool {
    true
}

const fn default_max_file_size_mb() -> u64 {
    100
}

const fn default_min_file_size_bytes() -> u64 {
    1024
}

const fn default_max_uploads_per_minute() -> u32 {
    10
}

const fn default_max_uploads_per_hour() -> u32 {
    100
}

const fn default_inline_fallback() -> bool {
    true
}

const fn default_queue_size() -> usize {
    10_000
}

const fn default_queue_workers() -> usize {
    4
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_task_retention_hours() -> u64 {
    24
}

const fn default_cleanup_interval_minutes() -> u64 {
    60
}

const fn default_transcription_enabled() -> bool {
    true
}

fn default_model_name() -> String {
    "large-v2".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            incoming_dir: default_incoming_dir(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_keys: Vec::new(),
            enable_file_validation: default_enable_file_validation(),
            max_file_size_mb: default_max_file_size_mb(),
            min_file_size_bytes: default_min_file_size_bytes(),
            max_uploads_per_minute: default_max_uploads_per_minute(),
            max_uploads_per_hour: default_max_uploads_per_hour(),
            inline_fallback: default_inline_fallback(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            workers: default_queue_workers(),
            max_retries: default_max_retries(),
            task_retention_hours: default_task_retention_hours(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: default_transcription_enabled(),
            model_name: default_model_name(),
            language: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            ingest: IngestConfig::default(),
            queue: QueueConfig::default(),
            transcription: TranscriptionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment and files
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or parsed.
    pub fn load() -> crate::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("RADIOCALL").separator("_"))
            .build()
            .map_err(|e| crate::Error::Configuration {
                message: e.to_string(),
            })?;

        config
            .try_deserialize()
            .map_err(|e| crate::Error::Configuration {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::field_reassign_with_default)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);

        assert!(config.database.url.contains("postgresql"));
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.min_connections, 5);
        assert_eq!(config.database.acquire_timeout, 60);

        assert!(config.ingest.api_key.is_none());
        assert!(config.ingest.api_keys.is_empty());
        assert!(config.ingest.enable_file_validation);
        assert_eq!(config.ingest.max_file_size_mb, 100);
        assert_eq!(config.ingest.min_file_size_bytes, 1024);
        assert_eq!(config.ingest.max_uploads_per_minute, 10);
        assert_eq!(config.ingest.max_uploads_per_hour, 100);
        assert!(config.ingest.inline_fallback);

        assert_eq!(config.queue.queue_size, 10_000);
        assert_eq!(config.queue.workers, 4);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.task_retention_hours, 24);

        assert!(config.transcription.enabled);
        assert_eq!(config.transcription.model_name, "large-v2");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_max_file_size_bytes() {
        let ingest = IngestConfig::default();
        assert_eq!(ingest.max_file_size_bytes(), 100 * 1024 * 1024);

        let ingest = IngestConfig {
            max_file_size_mb: 1,
            ..Default::default()
        };
        assert_eq!(ingest.max_file_size_bytes(), 1_048_576);
    }

    #[test]
    fn test_auth_enabled() {
        let mut ingest = IngestConfig::default();
        assert!(!ingest.auth_enabled());

        ingest.api_key = Some("legacy-key".to_string());
        assert!(ingest.auth_enabled());

        ingest.api_key = None;
        ingest.api_keys.push(ApiKeyConfig {
            key: "k".to_string(),
            description: None,
            allowed_ips: None,
            allowed_systems: None,
        });
        assert!(ingest.auth_enabled());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();

        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.server.port, config.server.port);
        assert_eq!(
            deserialized.database.max_connections,
            config.database.max_connections
        );
        assert_eq!(
            deserialized.ingest.max_file_size_mb,
            config.ingest.max_file_size_mb
        );
        assert_eq!(deserialized.queue.queue_size, config.queue.queue_size);
    }

    #[test]
    fn test_partial_config_deserialization() {
        let json_str = r#"{
            "server": {"host": "localhost"},
            "database": {"url": "postgresql://test"},
            "ingest": {"api_key": "secret"}
        }"#;

        let config: Config = serde_json::from_str(json_str).unwrap();

        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8000); // Uses default
        assert_eq!(config.database.url, "postgresql://test");
        assert_eq!(config.database.max_connections, 20); // Uses default
        assert_eq!(config.ingest.api_key.as_deref(), Some("secret"));
        assert!(config.ingest.enable_file_validation); // Uses default
    }

    #[test]
    fn test_api_key_config_deserialization() {
        let json_str = r#"{
            "key": "abcdef0123456789",
            "description": "north site recorder",
            "allowed_ips": ["10.0.0.2"],
            "allowed_systems": ["123"]
        }"#;

        let key: ApiKeyConfig = serde_json::from_str(json_str).unwrap();
        assert_eq!(key.key, "abcdef0123456789");
        assert_eq!(key.description.as_deref(), Some("north site recorder"));
        assert_eq!(key.allowed_ips, Some(vec!["10.0.0.2".to_string()]));
        assert_eq!(key.allowed_systems, Some(vec!["123".to_string()]));
    }

    #[test]
    fn test_api_key_config_minimal() {
        let key: ApiKeyConfig = serde_json::from_str(r#"{"key": "k"}"#).unwrap();
        assert_eq!(key.key, "k");
        assert!(key.description.is_none());
        assert!(key.allowed_ips.is_none());
        assert!(key.allowed_systems.is_none());
    }

    #[test]
    fn test_config_bounds() {
        let config = Config::default();

        assert!(config.server.port > 0);
        assert!(config.database.max_connections >= config.database.min_connections);
        assert!(config.database.acquire_timeout > 0);
        assert!(config.ingest.max_file_size_bytes() > config.ingest.min_file_size_bytes);
        assert!(config.queue.queue_size > 0);
        assert!(config.queue.workers > 0);
    }
}
