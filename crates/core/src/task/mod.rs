//! Batch tasks: the per-submission record, its state machine, and the
//! registry that owns every live task.

mod registry;
mod types;

pub use registry::{SweepReport, TaskRegistry, TIMED_OUT_MESSAGE};
pub use types::{BatchRequest, BatchTask, FailedItem, TaskError, TaskStatus, ValidationError};
