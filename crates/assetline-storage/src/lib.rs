//! Assetline Storage Library
//!
//! Object storage abstraction used by the task processors. It includes the `Storage`
//! trait and implementations for S3 (through `object_store`), the local filesystem,
//! and an in-process map used by tests and local runs.
//!
//! # Key format
//!
//! Objects are addressed by `(bucket, key)`. Derived assets live next to their source:
//! `stripExtension(sourceKey) + "__" + marker + "." + ext`, e.g. `u/1.jpg` produces
//! `u/1__thumbnail_512.webp`. Key derivation is centralized in the `keys` module.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use assetline_core::StorageBackend;
pub use factory::create_storage;
pub use keys::{derived_key, extension, strip_extension};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
