//! Assetline Core Library
//!
//! Domain models, the task planner, the coordinator state machine, error types and
//! configuration shared by every assetline crate.

pub mod config;
pub mod error;
pub mod models;
pub mod planner;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    BaseConfig, Config, NotifierConfig, ProcessingConfig, QueueConfig, StorageConfig,
    VideoProviderConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use planner::build_tasks;
pub use storage_types::StorageBackend;
