//! Batch orchestration: prompts × models fan-out under bounded concurrency,
//! with polling, cooperative cancellation, and per-task error reporting.

mod job;
mod limits;
mod orchestrator;
mod store;
mod task;

pub use job::{BatchJob, BatchState, BatchStatus, TaskSummary};
pub use limits::{ConcurrencyLimits, DispatchPermit};
pub use orchestrator::{BatchHandle, BatchOrchestrator};
pub use store::BatchStore;
pub use task::{
    expand_tasks, BatchId, BatchTask, TaskError, TaskErrorKind, TaskFailure, TaskOutcome,
    TaskResult, TaskState,
};
