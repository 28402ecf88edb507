use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the Video Transcoding Service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub upload: UploadConfig,
    pub transcoding: TranscodingConfig,
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_seconds: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub min_free_bytes: u64,
    pub temp_ttl_seconds: u64,
    pub orphan_dir_ttl_seconds: u64,
    pub gc_interval_seconds: u64,
}

/// Redis broker configuration; no URL selects local mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub event_channel: String,
    pub queue_name: String,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub chunk_size_bytes: u64,
    pub max_chunk_bytes: u64,
    pub max_file_size_bytes: u64,
    pub session_expiry_hours: u64,
}

/// Transcoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodingConfig {
    pub max_concurrent_jobs: usize,
    pub max_starts_per_window: usize,
    pub start_window_seconds: u64,
    pub max_attempts: u32,
    pub initial_backoff_seconds: u64,
    pub hls_segment_seconds: u32,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub log_level: String,
    pub json_logs: bool,
}

impl Config {
    /// Load configuration from defaults, an optional config file, and
    /// environment variable overrides
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let mut config = Config::default();

        if let Ok(config_path) = std::env::var("CONFIG_FILE") {
            let builder = config::Config::builder()
                .add_source(config::File::with_name(&config_path).required(true));

            let file_config = builder
                .build()
                .context("Failed to build configuration from file")?;
            config = file_config
                .try_deserialize()
                .context("Failed to deserialize configuration from file")?;
        }

        // Short spellings used by deployments
        if let Ok(val) = std::env::var("STORAGE_DIR") {
            config.storage.root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("REDIS_URL") {
            if !val.is_empty() {
                config.redis.url = Some(val);
            }
        }
        if let Ok(val) = std::env::var("PORT") {
            config.server.port = val.parse().context("Invalid PORT")?;
        }

        // Section overrides
        if let Ok(val) = std::env::var("SERVER__HOST") {
            config.server.host = val;
        }
        if let Ok(val) = std::env::var("SERVER__PORT") {
            config.server.port = val.parse().context("Invalid SERVER__PORT")?;
        }
        if let Ok(val) = std::env::var("STORAGE__ROOT") {
            config.storage.root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("STORAGE__MIN_FREE_BYTES") {
            config.storage.min_free_bytes =
                val.parse().context("Invalid STORAGE__MIN_FREE_BYTES")?;
        }
        if let Ok(val) = std::env::var("REDIS__URL") {
            if !val.is_empty() {
                config.redis.url = Some(val);
            }
        }
        if let Ok(val) = std::env::var("REDIS__EVENT_CHANNEL") {
            config.redis.event_channel = val;
        }
        if let Ok(val) = std::env::var("OBSERVABILITY__LOG_LEVEL") {
            config.observability.log_level = val;
        }
        if let Ok(val) = std::env::var("OBSERVABILITY__JSON_LOGS") {
            config.observability.json_logs =
                val.parse().context("Invalid OBSERVABILITY__JSON_LOGS")?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }
        if self.storage.root.as_os_str().is_empty() {
            anyhow::bail!("Storage root is required");
        }
        if self.upload.chunk_size_bytes == 0 {
            anyhow::bail!("Upload chunk_size_bytes must be greater than 0");
        }
        if self.upload.max_chunk_bytes < self.upload.chunk_size_bytes {
            anyhow::bail!("Upload max_chunk_bytes cannot be below chunk_size_bytes");
        }
        if self.upload.max_file_size_bytes == 0 {
            anyhow::bail!("Upload max_file_size_bytes must be greater than 0");
        }
        if self.transcoding.max_concurrent_jobs == 0 {
            anyhow::bail!("Transcoding max_concurrent_jobs must be greater than 0");
        }
        if self.transcoding.max_attempts == 0 {
            anyhow::bail!("Transcoding max_attempts must be greater than 0");
        }
        if self.redis.event_channel.is_empty() {
            anyhow::bail!("Redis event_channel is required");
        }
        if self.redis.queue_name.is_empty() {
            anyhow::bail!("Redis queue_name is required");
        }
        Ok(())
    }

    /// Get server shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_seconds)
    }

    /// Get temp file TTL as Duration
    pub fn temp_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.temp_ttl_seconds)
    }

    /// Get orphan directory TTL as Duration
    pub fn orphan_dir_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.orphan_dir_ttl_seconds)
    }

    /// Get GC interval as Duration
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.storage.gc_interval_seconds)
    }

    /// Get worker start rate-limit window as Duration
    pub fn start_window(&self) -> Duration {
        Duration::from_secs(self.transcoding.start_window_seconds)
    }

    /// Get initial retry backoff as Duration
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.transcoding.initial_backoff_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8090,
                shutdown_timeout_seconds: 30,
            },
            storage: StorageConfig {
                root: PathBuf::from("./storage"),
                min_free_bytes: 100 * 1024 * 1024, // 100MB
                temp_ttl_seconds: 300,             // 5 minutes
                orphan_dir_ttl_seconds: 1800,      // 30 minutes
                gc_interval_seconds: 300,          // 5 minutes
            },
            redis: RedisConfig {
                url: None,
                event_channel: "video-events".to_string(),
                queue_name: "transcoding-jobs".to_string(),
            },
            upload: UploadConfig {
                chunk_size_bytes: 2 * 1024 * 1024,            // 2MiB
                max_chunk_bytes: 10 * 1024 * 1024,            // 10MiB wire headroom
                max_file_size_bytes: 10 * 1024 * 1024 * 1024, // 10GiB
                session_expiry_hours: 24,
            },
            transcoding: TranscodingConfig {
                max_concurrent_jobs: 2,
                max_starts_per_window: 3,
                start_window_seconds: 60,
                max_attempts: 3,
                initial_backoff_seconds: 1,
                hls_segment_seconds: 4,
            },
            observability: ObservabilityConfig {
                service_name: "video-transcoding-service".to_string(),
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}
