//! Assetline Worker
//!
//! Two queue consumers share one process: the upload-event consumer asks the
//! coordinator to plan (or resume) an upload and publishes its pending tasks; the task
//! consumer runs the matching processor and reports the outcome back.

pub mod consumer;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod handlers;

pub use consumer::{ConsumerConfig, QueueConsumer};
pub use context::QueueHandler;
pub use coordinator::CoordinatorService;
pub use dispatcher::{DispatchContext, Dispatcher};
pub use handlers::{ProcessingTaskHandler, UploadEventHandler};
