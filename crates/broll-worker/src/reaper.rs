//! Retention reaper.
//!
//! Periodically evicts terminal tasks older than the retention period
//! together with their artifacts, then sweeps artifacts that no record
//! references any more and half-copied publishes (left over from a crash or
//! restart).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use broll_queue::TaskStore;
use broll_storage::ArtifactStore;

use crate::error::WorkerResult;
use crate::metrics;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Task records evicted
    pub tasks_removed: usize,
    /// Artifacts of evicted tasks that were deleted
    pub artifacts_deleted: usize,
    /// Unreferenced artifacts that were deleted
    pub orphans_deleted: usize,
    /// Items skipped because of an error; retried on the next sweep
    pub errors: usize,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Retention reaper service.
pub struct Reaper {
    store: Arc<dyn TaskStore>,
    artifacts: ArtifactStore,
    retention: Duration,
    interval: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn TaskStore>, artifacts: ArtifactStore, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            artifacts,
            retention,
            interval,
        }
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting reaper (interval: {:?}, retention: {:?})",
            self.interval, self.retention
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if !report.is_empty() => info!(
                            tasks = report.tasks_removed,
                            artifacts = report.artifacts_deleted,
                            orphans = report.orphans_deleted,
                            errors = report.errors,
                            "Reaper sweep complete"
                        ),
                        Ok(_) => debug!("Reaper sweep found nothing to remove"),
                        Err(e) => error!("Reaper sweep error: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reaper stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Run one sweep against the current time.
    pub async fn sweep(&self) -> WorkerResult<ReapReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as if the current time were `now`.
    ///
    /// A task is expired once `now - completed_at >= retention`. Its
    /// artifact is deleted first; the record is only evicted if that
    /// succeeded, so an artifact never outlives its record.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> WorkerResult<ReapReport> {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut report = ReapReport::default();

        for task in self.store.expired(cutoff).await? {
            if let Some(output_ref) = task.output_ref.as_deref() {
                match self.artifacts.delete_artifact(output_ref).await {
                    Ok(true) => report.artifacts_deleted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(task_id = %task.id, artifact = %output_ref, "Failed to delete artifact: {}", e);
                        report.errors += 1;
                        continue;
                    }
                }
            }

            if self.store.remove(&task.id).await?.is_some() {
                debug!(task_id = %task.id, status = %task.status, "Evicted expired task");
                report.tasks_removed += 1;
            }
        }

        for entry in self.artifacts.list_artifacts().await? {
            if entry.modified > cutoff || self.store.references_output(&entry.name).await? {
                continue;
            }
            match self.artifacts.delete_artifact(&entry.name).await {
                Ok(true) => {
                    debug!(artifact = %entry.name, "Deleted orphaned artifact");
                    report.orphans_deleted += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(artifact = %entry.name, "Failed to delete orphaned artifact: {}", e);
                    report.errors += 1;
                }
            }
        }

        match self.artifacts.remove_stale_partials(cutoff).await {
            Ok(removed) => report.orphans_deleted += removed,
            Err(e) => {
                warn!("Failed to remove stale partial copies: {}", e);
                report.errors += 1;
            }
        }

        metrics::record_reaped(report.tasks_removed, report.artifacts_deleted + report.orphans_deleted);
        Ok(report)
    }
}
