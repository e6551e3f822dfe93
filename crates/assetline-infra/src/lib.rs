//! Assetline Infrastructure Library
//!
//! Shared infrastructure used by the worker and API binaries:
//! - Telemetry initialization (`tracing-subscriber`)
//! - HTTP error response body
//! - Completion notification to the external record store

pub mod error;
#[cfg(feature = "notifier")]
pub mod notifier;
pub mod telemetry;

// Re-export commonly used types
pub use error::ErrorResponse;
#[cfg(feature = "notifier")]
pub use notifier::{
    CompletionNotifier, NoopNotifier, NotifyOutcome, RecordStoreNotifier,
};
pub use telemetry::init_telemetry;
