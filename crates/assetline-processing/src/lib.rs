//! Assetline Processing Library
//!
//! One stateless processor per task kind. Each reads the source object, talks to at
//! most one external service, writes its output under a deterministic derived key and
//! returns a [`DerivedAssetRecord`](assetline_core::models::DerivedAssetRecord).
//!
//! Processors only swallow errors where a documented fallback exists: a failed managed
//! transcode degrades to a passthrough copy. Every other error reaches the task
//! consumer, which records it and relies on redelivery.

pub mod document;
pub mod error;
pub mod image;
pub mod registry;
pub mod safety;
pub mod video;

pub use document::DocumentProcessor;
pub use error::{ProcessingError, ProcessingResult};
pub use image::{ImageVariantProcessor, ResizeClient};
pub use registry::ProcessorRegistry;
pub use safety::SafetyScanProcessor;
pub use video::{VideoProcessor, VideoProviderClient};
