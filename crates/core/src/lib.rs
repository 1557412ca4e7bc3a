//! Core library for vidtune: batch orchestration of the
//! metadata → download → transcode → upload pipeline.

pub mod config;
pub mod converter;
pub mod fetcher;
pub mod gate;
pub mod metrics;
pub mod orchestrator;
pub mod source;
pub mod task;
pub mod testing;
pub mod uploader;
pub mod worker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    ServerConfig,
};
pub use gate::{ConcurrencyGate, GateError, GatePermit, GateStatus};
pub use orchestrator::{BatchConfig, BatchOrchestrator, OrchestratorError, OrchestratorStatus};
pub use task::{
    BatchRequest, BatchTask, FailedItem, TaskError, TaskRegistry, TaskStatus, ValidationError,
};
pub use worker::{Collaborators, ItemWorker, Stage, StageError, StageTimeouts};
