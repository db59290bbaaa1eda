//! Background expiry sweeps.
//!
//! Each registry evicts lazily on access; the sweeper bounds memory for
//! entries nobody looks up again. A sweep that panics is logged and the
//! loop carries on with the next tick.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// A registry whose expired entries can be purged in bulk.
pub trait Sweep: Send + Sync + 'static {
    /// Label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Remove every expired entry, returning how many were dropped.
    fn sweep_expired(&self) -> usize;
}

/// Run one sweep, containing any panic.
pub fn run_sweep<S: Sweep + ?Sized>(target: &S) -> Option<usize> {
    match catch_unwind(AssertUnwindSafe(|| target.sweep_expired())) {
        Ok(removed) => {
            if removed > 0 {
                tracing::debug!(registry = target.name(), removed, "Swept expired entries");
            }
            metrics::record_sweep(target.name(), removed);
            Some(removed)
        }
        Err(_) => {
            tracing::error!(registry = target.name(), "Sweep panicked; retrying next interval");
            None
        }
    }
}

/// Spawn a task that sweeps `target` every `every` until shutdown.
pub fn spawn_sweeper<S: Sweep>(
    target: Arc<S>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(registry = target.name(), interval_secs = every.as_secs(), "Sweeper starting");

        let mut ticker = time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_sweep(target.as_ref());
                }
                _ = shutdown.recv() => {
                    tracing::info!(registry = target.name(), "Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}

/// Handles for a set of running sweepers, with their own stop signal.
pub struct Sweepers {
    shutdown: Shutdown,
    handles: Vec<JoinHandle<()>>,
}

impl Sweepers {
    pub fn new() -> Self {
        Self {
            shutdown: Shutdown::new(),
            handles: Vec::new(),
        }
    }

    pub fn spawn<S: Sweep>(&mut self, target: Arc<S>, every: Duration) {
        let handle = spawn_sweeper(target, every, self.shutdown.subscribe());
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every sweeper and wait for the tasks to finish.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sweeper task failed");
            }
        }
    }
}

impl Default for Sweepers {
    fn default() -> Self {
        Self::new()
    }
}
