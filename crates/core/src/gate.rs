//! Process-wide admission control for the expensive pipeline stages.
//!
//! One gate is shared by every batch. A worker holds its [`GatePermit`] from
//! the start of the download until the upload finishes, so at most
//! `capacity` items are downloading, transcoding or uploading at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("cancelled while waiting for a processing slot")]
    Cancelled,

    #[error("concurrency gate is closed")]
    Closed,
}

#[derive(Debug, Default)]
struct GateStats {
    in_flight: AtomicU64,
    waiting: AtomicU64,
    total_admitted: AtomicU64,
}

/// Point-in-time view of gate occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStatus {
    pub capacity: usize,
    pub in_flight: usize,
    pub waiting: usize,
    pub total_admitted: u64,
}

/// Bounded admission shared across all batches.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<GateStats>,
}

impl ConcurrencyGate {
    /// Creates a gate with `capacity` slots. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats: Arc::new(GateStats::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for a free slot.
    ///
    /// Returns [`GateError::Cancelled`] if `cancel` fires first, in which case
    /// no slot is consumed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit, GateError> {
        if cancel.is_cancelled() {
            return Err(GateError::Cancelled);
        }

        let waiting = WaitingGuard::enter(&self.stats);
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GateError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| GateError::Closed)
            }
        };
        drop(waiting);

        let permit = acquired?;
        self.stats.in_flight.fetch_add(1, Ordering::Relaxed);
        self.stats.total_admitted.fetch_add(1, Ordering::Relaxed);

        Ok(GatePermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Rejects every pending and future acquisition.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn status(&self) -> GateStatus {
        GateStatus {
            capacity: self.capacity,
            in_flight: self.stats.in_flight.load(Ordering::Relaxed) as usize,
            waiting: self.stats.waiting.load(Ordering::Relaxed) as usize,
            total_admitted: self.stats.total_admitted.load(Ordering::Relaxed),
        }
    }
}

// Keeps `waiting` accurate when an acquire future is dropped mid-wait.
struct WaitingGuard<'a>(&'a GateStats);

impl<'a> WaitingGuard<'a> {
    fn enter(stats: &'a GateStats) -> Self {
        stats.waiting.fetch_add(1, Ordering::Relaxed);
        Self(stats)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.waiting.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An occupied gate slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<GateStats>,
}

impl GatePermit {
    /// Frees the slot now rather than at end of scope.
    pub fn release(self) {}
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
