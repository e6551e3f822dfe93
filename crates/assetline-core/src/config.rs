//! Configuration module
//!
//! Process configuration is read once from the environment (after loading `.env`
//! through dotenvy) and passed explicitly into every component.

use std::env;
use std::str::FromStr;

use crate::storage_types::StorageBackend;

// Common constants
const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const UPLOAD_EVENT_QUEUE: &str = "upload-events";
const PROCESSING_TASK_QUEUE: &str = "processing-tasks";
const CONSUMER_MAX_WORKERS: usize = 4;
const CONSUMER_POLL_INTERVAL_MS: u64 = 1000;
const QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 900;
const QUEUE_MAX_DELIVERY_ATTEMPTS: i32 = 5;
const UPLOAD_EVENT_RETRY_DELAY_SECS: u64 = 30;
const TASK_RETRY_DELAY_SECS: u64 = 60;
const IMAGE_RESIZE_TIMEOUT_SECS: u64 = 60;
const DOCUMENT_TEXT_MAX_CHARS: usize = 20_000;
const VIDEO_PROVIDER_API_BASE: &str = "https://api.mux.com";
const VIDEO_PROVIDER_STREAM_BASE: &str = "https://stream.mux.com";
const VIDEO_PROVIDER_IMAGE_BASE: &str = "https://image.mux.com";
const VIDEO_PROVIDER_POLL_INTERVAL_MS: u64 = 2000;
const VIDEO_PROVIDER_TIMEOUT_SECS: u64 = 600;
const RECORD_STORE_TIMEOUT_SECS: u64 = 30;

/// Settings shared by every process role.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// `json` switches the log formatter to JSON lines.
    pub log_format: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, ...)
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// Bucket used when an upload event names none.
    pub default_bucket: Option<String>,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub upload_event_queue: String,
    pub processing_task_queue: String,
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout_secs: u64,
    /// Deliveries per message before it is dead-lettered.
    pub max_delivery_attempts: i32,
    pub upload_event_retry_delay_secs: u64,
    pub task_retry_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            upload_event_queue: UPLOAD_EVENT_QUEUE.to_string(),
            processing_task_queue: PROCESSING_TASK_QUEUE.to_string(),
            max_workers: CONSUMER_MAX_WORKERS,
            poll_interval_ms: CONSUMER_POLL_INTERVAL_MS,
            visibility_timeout_secs: QUEUE_VISIBILITY_TIMEOUT_SECS,
            max_delivery_attempts: QUEUE_MAX_DELIVERY_ATTEMPTS,
            upload_event_retry_delay_secs: UPLOAD_EVENT_RETRY_DELAY_SECS,
            task_retry_delay_secs: TASK_RETRY_DELAY_SECS,
        }
    }
}

/// Managed video-hosting credentials and polling bounds.
#[derive(Clone, Debug)]
pub struct VideoProviderConfig {
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub api_base: String,
    pub stream_base: String,
    pub image_base: String,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl VideoProviderConfig {
    /// Both halves of the access token are present.
    pub fn has_credentials(&self) -> bool {
        matches!(
            (self.token_id.as_deref(), self.token_secret.as_deref()),
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty()
        )
    }
}

impl Default for VideoProviderConfig {
    fn default() -> Self {
        Self {
            token_id: None,
            token_secret: None,
            api_base: VIDEO_PROVIDER_API_BASE.to_string(),
            stream_base: VIDEO_PROVIDER_STREAM_BASE.to_string(),
            image_base: VIDEO_PROVIDER_IMAGE_BASE.to_string(),
            poll_interval_ms: VIDEO_PROVIDER_POLL_INTERVAL_MS,
            timeout_secs: VIDEO_PROVIDER_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessingConfig {
    pub image_resize_base_url: Option<String>,
    pub image_resize_timeout_secs: u64,
    pub document_text_max_chars: usize,
    pub video: VideoProviderConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            image_resize_base_url: None,
            image_resize_timeout_secs: IMAGE_RESIZE_TIMEOUT_SECS,
            document_text_max_chars: DOCUMENT_TEXT_MAX_CHARS,
            video: VideoProviderConfig::default(),
        }
    }
}

/// External record store that receives completion notifications.
#[derive(Clone, Debug)]
pub struct NotifierConfig {
    pub record_store_base_url: Option<String>,
    pub record_store_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            record_store_base_url: None,
            record_store_token: None,
            timeout_secs: RECORD_STORE_TIMEOUT_SECS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub processing: ProcessingConfig,
    pub notifier: NotifierConfig,
}

fn var_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn var_parse<T: FromStr>(name: &str, default: T) -> Result<T, anyhow::Error> {
    match var_opt(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid value, got '{}'", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let base = BaseConfig {
            environment,
            server_port: var_parse("PORT", SERVER_PORT)?,
            database_url: var_opt("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: var_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS)?,
            db_timeout_seconds: var_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS)?,
            log_format: var_opt("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
        };

        let storage = StorageConfig {
            backend: var_opt("STORAGE_BACKEND")
                .map(|b| b.parse::<StorageBackend>())
                .transpose()?
                .unwrap_or(StorageBackend::S3),
            s3_region: var_opt("S3_REGION").or_else(|| var_opt("AWS_REGION")),
            s3_endpoint: var_opt("S3_ENDPOINT"),
            local_storage_path: var_opt("LOCAL_STORAGE_PATH"),
            local_storage_base_url: var_opt("LOCAL_STORAGE_BASE_URL"),
            default_bucket: var_opt("DEFAULT_BUCKET"),
        };

        let queue = QueueConfig {
            upload_event_queue: var_opt("UPLOAD_EVENT_QUEUE")
                .unwrap_or_else(|| UPLOAD_EVENT_QUEUE.to_string()),
            processing_task_queue: var_opt("PROCESSING_TASK_QUEUE")
                .unwrap_or_else(|| PROCESSING_TASK_QUEUE.to_string()),
            max_workers: var_parse("CONSUMER_MAX_WORKERS", CONSUMER_MAX_WORKERS)?,
            poll_interval_ms: var_parse("CONSUMER_POLL_INTERVAL_MS", CONSUMER_POLL_INTERVAL_MS)?,
            visibility_timeout_secs: var_parse(
                "QUEUE_VISIBILITY_TIMEOUT_SECS",
                QUEUE_VISIBILITY_TIMEOUT_SECS,
            )?,
            max_delivery_attempts: var_parse(
                "QUEUE_MAX_DELIVERY_ATTEMPTS",
                QUEUE_MAX_DELIVERY_ATTEMPTS,
            )?,
            upload_event_retry_delay_secs: var_parse(
                "UPLOAD_EVENT_RETRY_DELAY_SECS",
                UPLOAD_EVENT_RETRY_DELAY_SECS,
            )?,
            task_retry_delay_secs: var_parse("TASK_RETRY_DELAY_SECS", TASK_RETRY_DELAY_SECS)?,
        };

        let processing = ProcessingConfig {
            image_resize_base_url: var_opt("IMAGE_RESIZE_BASE_URL"),
            image_resize_timeout_secs: var_parse(
                "IMAGE_RESIZE_TIMEOUT_SECS",
                IMAGE_RESIZE_TIMEOUT_SECS,
            )?,
            document_text_max_chars: var_parse("DOCUMENT_TEXT_MAX_CHARS", DOCUMENT_TEXT_MAX_CHARS)?,
            video: VideoProviderConfig {
                token_id: var_opt("VIDEO_PROVIDER_TOKEN_ID"),
                token_secret: var_opt("VIDEO_PROVIDER_TOKEN_SECRET"),
                api_base: var_opt("VIDEO_PROVIDER_API_BASE")
                    .unwrap_or_else(|| VIDEO_PROVIDER_API_BASE.to_string()),
                stream_base: var_opt("VIDEO_PROVIDER_STREAM_BASE")
                    .unwrap_or_else(|| VIDEO_PROVIDER_STREAM_BASE.to_string()),
                image_base: var_opt("VIDEO_PROVIDER_IMAGE_BASE")
                    .unwrap_or_else(|| VIDEO_PROVIDER_IMAGE_BASE.to_string()),
                poll_interval_ms: var_parse(
                    "VIDEO_PROVIDER_POLL_INTERVAL_MS",
                    VIDEO_PROVIDER_POLL_INTERVAL_MS,
                )?,
                timeout_secs: var_parse("VIDEO_PROVIDER_TIMEOUT_SECS", VIDEO_PROVIDER_TIMEOUT_SECS)?,
            },
        };

        let notifier = NotifierConfig {
            record_store_base_url: var_opt("RECORD_STORE_BASE_URL"),
            record_store_token: var_opt("RECORD_STORE_TOKEN"),
            timeout_secs: var_parse("RECORD_STORE_TIMEOUT_SECS", RECORD_STORE_TIMEOUT_SECS)?,
        };

        Ok(Config {
            base,
            storage,
            queue,
            processing,
            notifier,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.base.database_url.starts_with("postgres://")
            && !self.base.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.queue.max_workers == 0 {
            return Err(anyhow::anyhow!("CONSUMER_MAX_WORKERS must be at least 1"));
        }

        if self.queue.max_delivery_attempts < 1 {
            return Err(anyhow::anyhow!(
                "QUEUE_MAX_DELIVERY_ATTEMPTS must be at least 1"
            ));
        }

        if self.queue.upload_event_queue == self.queue.processing_task_queue {
            return Err(anyhow::anyhow!(
                "UPLOAD_EVENT_QUEUE and PROCESSING_TASK_QUEUE must name different queues"
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 if self.storage.s3_region.is_none() => {
                return Err(anyhow::anyhow!(
                    "STORAGE_BACKEND=s3 requires S3_REGION or AWS_REGION to be set"
                ));
            }
            StorageBackend::Local
                if self.storage.local_storage_path.is_none()
                    || self.storage.local_storage_base_url.is_none() =>
            {
                return Err(anyhow::anyhow!(
                    "STORAGE_BACKEND=local requires LOCAL_STORAGE_PATH and LOCAL_STORAGE_BASE_URL"
                ));
            }
            _ => {}
        }

        let video = &self.processing.video;
        if video.token_id.is_some() != video.token_secret.is_some() {
            return Err(anyhow::anyhow!(
                "VIDEO_PROVIDER_TOKEN_ID and VIDEO_PROVIDER_TOKEN_SECRET must be set together"
            ));
        }

        if self.processing.document_text_max_chars == 0 {
            return Err(anyhow::anyhow!("DOCUMENT_TEXT_MAX_CHARS must be positive"));
        }

        Ok(())
    }
}
