pub mod asset;
pub mod coordinator;
pub mod event;
pub mod message;
pub mod task;

pub use asset::DerivedAssetRecord;
pub use coordinator::{
    AggregateStatus, CoordinatorState, MarkOutcome, ProcessOutcome, TaskEntry, TaskStatus,
};
pub use event::{
    coordinator_identity, SessionRecord, UploadEvent, UploadEventMessage, UPLOAD_COMPLETED_EVENT,
};
pub use message::{ProcessingTaskMessage, TaskCompletion, PROCESSING_TASK_MESSAGE};
pub use task::{ProcessingTask, TaskKind};
