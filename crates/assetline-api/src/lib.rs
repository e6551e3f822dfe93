//! Assetline API Library
//!
//! HTTP control surface for the coordinator, event ingestion and application setup.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;

pub use error::HttpAppError;
pub use state::AppState;
