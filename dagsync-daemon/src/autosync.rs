//! Background pull worker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use dagsync_core::{AutoSyncConfig, SyncResult};
use dagsync_engine::{CancellationToken, SyncCoordinator, SyncError};

use crate::error::DaemonError;

/// Periodic pulls against a shared coordinator.
///
/// Every pull goes through [`SyncCoordinator::pull`] and therefore takes the
/// same exclusive lock as interactive callers.
pub struct AutoSync {
    coordinator: Arc<SyncCoordinator>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AutoSync {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self {
            coordinator,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker on the current runtime using the auto-sync settings
    /// in effect right now.
    ///
    /// Returns `false` without spawning when git sync is disabled or a worker
    /// is already running.
    pub fn start(&self) -> bool {
        let mut worker = self.worker();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return false;
        }

        let settings = self.coordinator.config();
        if !settings.enabled {
            tracing::debug!("git sync is disabled; auto-sync not started");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_worker(
            self.coordinator.clone(),
            settings.auto_sync,
            cancel.clone(),
        ));
        *worker = Some(Worker { cancel, handle });
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Cancel the worker and wait for it to exit. A pull in flight stops at
    /// its next cancellation checkpoint.
    ///
    /// Returns `false` when there was nothing to stop.
    pub async fn stop(&self) -> bool {
        let Some(worker) = self.worker().take() else {
            return false;
        };
        worker.cancel.cancel();
        if let Err(err) = worker.handle.await {
            tracing::warn!(error = %err, "auto-sync worker join failure");
        }
        true
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run one pull on the blocking pool.
pub(crate) async fn pull_now(
    coordinator: Arc<SyncCoordinator>,
    cancel: CancellationToken,
) -> Result<SyncResult, DaemonError> {
    tokio::task::spawn_blocking(move || coordinator.pull(&cancel))
        .await
        .map_err(|err| DaemonError::Protocol(format!("pull task join error: {err}")))?
        .map_err(DaemonError::from)
}

async fn run_worker(
    coordinator: Arc<SyncCoordinator>,
    settings: AutoSyncConfig,
    cancel: CancellationToken,
) {
    if settings.on_startup {
        pull_logged(&coordinator, &cancel, "startup").await;
    }
    if cancel.is_cancelled() || !settings.enabled || settings.interval_seconds == 0 {
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(settings.interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // the first tick is immediate
    tracing::info!(interval_seconds = settings.interval_seconds, "auto-sync started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => pull_logged(&coordinator, &cancel, "interval").await,
        }
    }
    tracing::info!("auto-sync stopped");
}

async fn pull_logged(
    coordinator: &Arc<SyncCoordinator>,
    cancel: &CancellationToken,
    trigger: &'static str,
) {
    match pull_now(coordinator.clone(), cancel.clone()).await {
        Ok(result) => tracing::info!(
            trigger,
            synced = result.synced.len(),
            conflicts = result.conflicts.len(),
            errors = result.errors.len(),
            message = %result.message,
            "auto-sync pull finished",
        ),
        Err(DaemonError::Sync(SyncError::Cancelled)) => {
            tracing::debug!(trigger, "auto-sync pull cancelled");
        }
        // pull already recorded the failure in the ledger
        Err(err) => tracing::warn!(trigger, error = %err, "auto-sync pull failed"),
    }
}
