//! Batch orchestrator.
//!
//! Turns a submitted [`BatchRequest`](crate::task::BatchRequest) into a task
//! record, fans the items out to [`ItemWorker`](crate::worker::ItemWorker)s
//! and folds their outcomes back into the record:
//! - **Lookups**: ungated, one tokio task per item
//! - **Download → upload**: bounded by the shared [`ConcurrencyGate`](crate::gate::ConcurrencyGate)
//! - **Reaper**: times out overdue batches and evicts records nobody polled

mod config;
mod runner;
mod types;

pub use config::BatchConfig;
pub use runner::BatchOrchestrator;
pub use types::{OrchestratorError, OrchestratorStatus};
