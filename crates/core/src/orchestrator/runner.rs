//! Batch orchestrator implementation.
//!
//! One run loop per batch:
//! - Prerequisite: the source session is checked once, before any item starts
//! - Items: one tokio task each, joined through a `JoinSet`
//! - Collector: the run loop itself drains the outcome channel, so a task
//!   record only ever has one writer for its outcome lists

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::gate::{ConcurrencyGate, GateStatus};
use crate::metrics;
use crate::source::{MediaSource, SourceError};
use crate::task::{
    BatchRequest, BatchTask, FailedItem, SweepReport, TaskError, TaskRegistry, TaskStatus,
};
use crate::uploader::UploadTarget;
use crate::worker::{Collaborators, ItemJob, ItemOutcome, ItemWorker, StageTimeouts};

use super::config::BatchConfig;
use super::types::{OrchestratorError, OrchestratorStatus};

/// Drives batch tasks from submission to a terminal state.
///
/// Cheap to clone; clones share the registry, the gate and the shutdown
/// signal.
#[derive(Clone)]
pub struct BatchOrchestrator {
    config: BatchConfig,
    registry: Arc<TaskRegistry>,
    source: Arc<dyn MediaSource>,
    worker: ItemWorker,
    prepare_timeout: Duration,

    // Runtime state
    cancels: Arc<RwLock<HashMap<String, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl BatchOrchestrator {
    /// Create a new orchestrator with its own registry and gate.
    pub fn new(config: BatchConfig, timeouts: StageTimeouts, collaborators: Collaborators) -> Self {
        let gate = ConcurrencyGate::new(config.max_concurrency);
        let source = Arc::clone(&collaborators.source);
        let worker = ItemWorker::new(collaborators, gate, config.scratch_dir.clone(), timeouts);

        Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            source,
            worker,
            prepare_timeout: timeouts.lookup,
            cancels: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create an orchestrator using the `[batch]` section and the
    /// collaborator timeouts of `config`.
    pub fn from_config(config: &Config, collaborators: Collaborators) -> Self {
        Self::new(
            config.batch.clone(),
            StageTimeouts::from_config(config),
            collaborators,
        )
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn gate_status(&self) -> GateStatus {
        self.worker.gate().status()
    }

    /// Validates and registers a batch, then starts it in the background.
    ///
    /// Returns the task id as soon as the Pending record exists. Invalid
    /// requests never create a record.
    pub async fn submit(&self, request: BatchRequest) -> Result<String, OrchestratorError> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }
        request.validate()?;

        let task = self.registry.create(request.clone()).await;
        let task_id = task.id().to_string();
        let cancel = self.shutdown.child_token();
        self.cancels
            .write()
            .await
            .insert(task_id.clone(), cancel.clone());
        metrics::BATCHES_SUBMITTED.inc();

        info!(
            task_id = %task_id,
            items = task.total(),
            save_to_collection = request.save_to_collection,
            "Batch submitted"
        );

        let this = self.clone();
        let run_id = task_id.clone();
        tokio::spawn(async move {
            this.run_batch(run_id, request, cancel).await;
        });

        Ok(task_id)
    }

    /// Snapshot of a task without consuming it.
    pub async fn status(&self, task_id: &str) -> Result<BatchTask, OrchestratorError> {
        self.registry
            .get(task_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(task_id.to_string()))
    }

    /// Snapshot of a task, discarding the record if it is terminal.
    ///
    /// A terminal snapshot is returned at most once; later polls get
    /// [`OrchestratorError::NotFound`].
    pub async fn poll(&self, task_id: &str) -> Result<BatchTask, OrchestratorError> {
        Ok(self.registry.take_if_terminal(task_id).await?)
    }

    pub async fn status_summary(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            shutting_down: self.shutdown.is_cancelled(),
            active_batches: self.cancels.read().await.len(),
            gate: self.gate_status(),
            tasks: self.registry.count_by_status().await,
        }
    }

    /// Spawn the reaper loop. It stops when [`shutdown`](Self::shutdown) is
    /// called.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let this = self.clone();
        let period = self.config.reaper_interval();

        tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Reaper started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => {
                        info!("Reaper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        this.reap_at(Utc::now()).await;
                    }
                }
            }
            info!("Reaper stopped");
        })
    }

    /// One reaper pass as of `now`.
    ///
    /// Overdue Running tasks become TimedOut and their in-flight items are
    /// cancelled. Terminal records older than the retention window go away.
    pub async fn reap_at(&self, now: DateTime<Utc>) -> SweepReport {
        let report = self
            .registry
            .sweep(now, self.config.batch_timeout(), self.config.retention())
            .await;

        if !report.timed_out.is_empty() {
            // The run loop still owns the token and drops it once the
            // cancelled items have reported.
            let cancels = self.cancels.read().await;
            for task_id in &report.timed_out {
                if let Some(token) = cancels.get(task_id) {
                    token.cancel();
                }
                metrics::BATCHES_FINISHED
                    .with_label_values(&[TaskStatus::TimedOut.as_str()])
                    .inc();
            }
        }

        if !report.is_empty() {
            info!(
                timed_out = report.timed_out.len(),
                evicted = report.evicted.len(),
                "Reaper pass"
            );
        }
        report
    }

    /// Stop accepting batches, cancel in-flight items and stop the reaper.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            warn!("Orchestrator already shutting down");
            return;
        }
        info!("Stopping batch orchestrator");
        self.shutdown.cancel();
        self.worker.gate().close();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    async fn run_batch(&self, task_id: String, request: BatchRequest, cancel: CancellationToken) {
        if let Err(e) = self
            .registry
            .update_status(&task_id, TaskStatus::Running, None)
            .await
        {
            error!(task_id = %task_id, error = %e, "Failed to start batch");
            self.cancels.write().await.remove(&task_id);
            return;
        }

        if let Err(e) = self.prepare().await {
            warn!(task_id = %task_id, error = %e, "Batch prerequisite failed");
            self.finish(&task_id, TaskStatus::Failed, Some(e.to_string()))
                .await;
            return;
        }

        let total = request.item_ids.len();
        let target = UploadTarget {
            save_to_collection: request.save_to_collection,
            collection_id: request.collection_id,
        };
        let (tx, mut rx) = mpsc::channel::<ItemOutcome>(total.max(1));
        let mut workers = JoinSet::new();

        for (index, item_id) in request.item_ids.iter().enumerate() {
            let job = ItemJob {
                index,
                item_id: item_id.clone(),
                name_override: request.name_override_for(item_id).map(str::to_string),
                target,
            };
            let worker = self.worker.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                let item_id = job.item_id.clone();
                let outcome = match AssertUnwindSafe(worker.run(job, &cancel))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => ItemOutcome::lost(
                        index,
                        item_id,
                        format!("worker panicked: {}", panic_message(panic.as_ref())),
                    ),
                };
                // Only fails if the collector is gone, which never happens
                // before every sender is dropped.
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);
        debug!(task_id = %task_id, workers = total, "Item workers launched");

        let mut reported = vec![false; total];
        while let Some(outcome) = rx.recv().await {
            match reported.get_mut(outcome.index) {
                Some(seen) if !*seen => *seen = true,
                _ => {
                    warn!(task_id = %task_id, index = outcome.index, "Ignoring duplicate outcome");
                    continue;
                }
            }
            self.record(&task_id, outcome).await;
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(task_id = %task_id, error = %e, "Item worker aborted");
            }
        }

        for (index, seen) in reported.iter().enumerate() {
            if !*seen {
                let item_id = request.item_ids[index].clone();
                self.record(
                    &task_id,
                    ItemOutcome::lost(index, item_id, "worker exited without reporting"),
                )
                .await;
            }
        }

        self.finish(&task_id, TaskStatus::Completed, None).await;
    }

    async fn prepare(&self) -> Result<(), SourceError> {
        match tokio::time::timeout(self.prepare_timeout, self.source.prepare()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Unavailable(format!(
                "session check timed out after {}s",
                self.prepare_timeout.as_secs()
            ))),
        }
    }

    /// Folds one outcome into the task record.
    async fn record(&self, task_id: &str, outcome: ItemOutcome) {
        let seconds = outcome.elapsed.as_secs_f64();
        let result = match outcome.result {
            Ok(()) => {
                metrics::ITEMS_TOTAL.with_label_values(&["success"]).inc();
                metrics::ITEM_DURATION
                    .with_label_values(&["success"])
                    .observe(seconds);
                self.registry.add_success(task_id, outcome.label).await
            }
            Err(err) => {
                metrics::ITEMS_TOTAL.with_label_values(&["failed"]).inc();
                metrics::ITEM_FAILURES
                    .with_label_values(&[err.stage.as_str()])
                    .inc();
                metrics::ITEM_DURATION
                    .with_label_values(&["failed"])
                    .observe(seconds);
                self.registry
                    .add_failed(
                        task_id,
                        FailedItem {
                            item_id: outcome.item_id,
                            title: outcome.label,
                            stage: err.stage,
                            error: err.message,
                        },
                    )
                    .await
            }
        };

        match result {
            Ok(snapshot) => debug!(
                task_id = %task_id,
                progress = snapshot.progress(),
                reported = snapshot.reported(),
                total = snapshot.total(),
                "Outcome recorded"
            ),
            Err(e) => debug!(task_id = %task_id, error = %e, "Outcome not recorded"),
        }
    }

    async fn finish(&self, task_id: &str, status: TaskStatus, message: Option<String>) {
        match self.registry.update_status(task_id, status, message).await {
            Ok(snapshot) => {
                metrics::BATCHES_FINISHED
                    .with_label_values(&[status.as_str()])
                    .inc();
                info!(
                    task_id = %task_id,
                    status = %status,
                    succeeded = snapshot.succeeded().len(),
                    failed = snapshot.failed().len(),
                    "Batch finished"
                );
            }
            Err(TaskError::InvalidTransition { from, .. }) => {
                debug!(task_id = %task_id, status = %from, "Batch already terminal");
            }
            Err(e) => warn!(task_id = %task_id, error = %e, "Failed to finalize batch"),
        }
        self.cancels.write().await.remove(task_id);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
