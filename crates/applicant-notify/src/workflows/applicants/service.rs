use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::detector::{detect, index_by_posting};
use super::domain::{AggregateRecord, CompanyId, PostingId, SnapshotDraft};
use super::message::increment_notification;
use super::repository::{
    CompanySnapshotCount, NotificationSink, RunLease, SnapshotStore, StoreError, UpsertFailure,
};
use super::source::{AggregateSource, SourceError};
use crate::config::{ReconciliationConfig, SnapshotAdvancePolicy};

/// Lease name shared by reconciliation and snapshot pruning.
pub const RECONCILIATION_LEASE: &str = "reconciliation";

const TOP_COMPANY_LIMIT: u32 = 10;

/// Drives reconciliation runs and the snapshot maintenance operations.
pub struct ReconciliationService<A, S, N> {
    source: Arc<A>,
    snapshots: Arc<S>,
    sink: Arc<N>,
    config: ReconciliationConfig,
}

impl<A, S, N> ReconciliationService<A, S, N>
where
    A: AggregateSource + 'static,
    S: SnapshotStore + RunLease + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        source: Arc<A>,
        snapshots: Arc<S>,
        sink: Arc<N>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            source,
            snapshots,
            sink,
            config,
        }
    }

    /// Fetch live totals, notify on every positive delta and advance the baselines.
    pub async fn run_reconciliation(&self) -> Result<RunSummary, ReconcileError> {
        let lease = self.acquire_lease().await?;
        let outcome = self.reconcile().await;
        lease.release().await;

        match &outcome {
            Ok(summary) => info!(
                postings_processed = summary.postings_processed,
                notifications_created = summary.notifications_created,
                failed_notifications = summary.failed_notifications.len(),
                snapshot_write_failures = summary.snapshot_write_failures.len(),
                "reconciliation run finished"
            ),
            Err(err) => error!(error = %err, "reconciliation run failed"),
        }
        outcome
    }

    /// Describe the active postings and the stored baselines without writing anything.
    pub async fn summarize_active_state(&self) -> Result<ActiveStateSummary, ReconcileError> {
        let current = self
            .source
            .fetch_current_totals()
            .await
            .map_err(ReconcileError::SourceUnavailable)?;
        let stored_snapshots = self
            .snapshots
            .count()
            .await
            .map_err(ReconcileError::SnapshotReadFailure)?;

        let postings = current
            .into_iter()
            .map(|record| ActivePosting {
                posting_id: record.posting_id,
                title: record.title,
                total_applicants: record.total_applicants,
                company_id: record.company_id,
            })
            .collect::<Vec<_>>();

        Ok(ActiveStateSummary {
            active_postings: postings.len(),
            stored_snapshots,
            postings,
        })
    }

    /// Delete baselines for postings that are no longer active.
    pub async fn prune_inactive_snapshots(&self) -> Result<PruneSummary, ReconcileError> {
        let lease = self.acquire_lease().await?;
        let outcome = self.prune().await;
        lease.release().await;
        outcome
    }

    /// Stored baseline count plus the companies holding the most baselines.
    pub async fn snapshot_stats(&self) -> Result<SnapshotStats, ReconcileError> {
        let total_snapshots = self
            .snapshots
            .count()
            .await
            .map_err(ReconcileError::SnapshotReadFailure)?;
        let top_companies = self
            .snapshots
            .count_by_company(TOP_COMPANY_LIMIT)
            .await
            .map_err(ReconcileError::SnapshotReadFailure)?;

        Ok(SnapshotStats {
            total_snapshots,
            top_companies,
        })
    }

    async fn reconcile(&self) -> Result<RunSummary, ReconcileError> {
        let current = self
            .source
            .fetch_current_totals()
            .await
            .map_err(ReconcileError::SourceUnavailable)?;
        if current.is_empty() {
            info!("no active postings reported; skipping run");
            return Ok(RunSummary::empty());
        }

        let previous = index_by_posting(
            self.snapshots
                .get_all()
                .await
                .map_err(ReconcileError::SnapshotReadFailure)?,
        );
        let increments = detect(&current, &previous);

        let mut summary = RunSummary {
            message: String::new(),
            postings_processed: current.len(),
            notifications_created: 0,
            postings_with_increment: 0,
            details: Vec::new(),
            failed_notifications: Vec::new(),
            snapshot_write_failures: Vec::new(),
        };

        for increment in increments.iter().filter(|delta| delta.has_increment()) {
            summary.postings_with_increment += 1;

            let created = match increment_notification(increment) {
                Ok(draft) => self.sink.create_isolated(draft).await.map_err(|err| err.to_string()),
                Err(err) => Err(err.to_string()),
            };

            match created {
                Ok(notification) => {
                    debug!(
                        posting_id = increment.posting_id.0,
                        company_id = increment.company_id.0,
                        notification_id = %notification.id.0,
                        new_applicants = increment.new_applicants,
                        "notification created"
                    );
                    summary.notifications_created += 1;
                    summary.details.push(IncrementDetail {
                        posting_id: increment.posting_id,
                        title: increment.title.clone(),
                        new_applicants: increment.new_applicants,
                        total_after: increment.current_total,
                    });
                }
                Err(err) => {
                    warn!(
                        posting_id = increment.posting_id.0,
                        company_id = increment.company_id.0,
                        error = %err,
                        "notification write failed"
                    );
                    summary.failed_notifications.push(increment.posting_id);
                }
            }
        }

        let failures = self
            .advance_snapshots(&current, &summary.failed_notifications)
            .await;
        summary.snapshot_write_failures = failures
            .into_iter()
            .map(|failure| failure.posting_id)
            .collect();
        summary.message = format!(
            "Processed {} postings; created {} notifications",
            summary.postings_processed, summary.notifications_created
        );

        Ok(summary)
    }

    async fn advance_snapshots(
        &self,
        current: &[AggregateRecord],
        failed_notifications: &[PostingId],
    ) -> Vec<UpsertFailure> {
        let held_back: HashSet<PostingId> = match self.config.advance_policy {
            SnapshotAdvancePolicy::Always => HashSet::new(),
            SnapshotAdvancePolicy::DeliveredOnly => failed_notifications.iter().copied().collect(),
        };

        let mut failures = Vec::new();
        let mut drafts = Vec::with_capacity(current.len());
        for record in current {
            if held_back.contains(&record.posting_id) {
                debug!(
                    posting_id = record.posting_id.0,
                    "keeping previous snapshot after failed notification"
                );
                continue;
            }
            match SnapshotDraft::try_from(record) {
                Ok(draft) => drafts.push(draft),
                Err(err) => {
                    warn!(
                        posting_id = record.posting_id.0,
                        error = %err,
                        "snapshot draft rejected"
                    );
                    failures.push(UpsertFailure {
                        posting_id: record.posting_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        let report = self.snapshots.upsert_many(&drafts).await;
        failures.extend(report.failed);
        failures
    }

    async fn prune(&self) -> Result<PruneSummary, ReconcileError> {
        let active: HashSet<PostingId> = self
            .source
            .fetch_current_totals()
            .await
            .map_err(ReconcileError::SourceUnavailable)?
            .into_iter()
            .map(|record| record.posting_id)
            .collect();
        let stored = self
            .snapshots
            .get_all()
            .await
            .map_err(ReconcileError::SnapshotReadFailure)?;

        let mut removed = 0;
        for snapshot in stored.iter().filter(|s| !active.contains(&s.posting_id)) {
            if self
                .snapshots
                .delete(snapshot.posting_id)
                .await
                .map_err(ReconcileError::SnapshotWriteFailure)?
            {
                removed += 1;
            }
        }

        let remaining = self
            .snapshots
            .count()
            .await
            .map_err(ReconcileError::SnapshotReadFailure)?;
        info!(removed, remaining, "pruned inactive snapshots");

        Ok(PruneSummary {
            message: format!("Removed {removed} inactive snapshots"),
            removed,
            remaining,
        })
    }

    async fn acquire_lease(&self) -> Result<LeaseGuard<S>, ReconcileError> {
        let holder = uuid::Uuid::new_v4().to_string();
        let acquired = self
            .snapshots
            .try_acquire(RECONCILIATION_LEASE, &holder, self.config.lease_ttl)
            .await
            .map_err(ReconcileError::Lease)?;

        if acquired {
            Ok(LeaseGuard {
                lease: self.snapshots.clone(),
                holder: Some(holder),
            })
        } else {
            warn!(lease = RECONCILIATION_LEASE, "run lease held by another run");
            Err(ReconcileError::RunInProgress)
        }
    }
}

/// Held run lease. A guard dropped before `release` hands the release to the runtime.
struct LeaseGuard<S: RunLease + 'static> {
    lease: Arc<S>,
    holder: Option<String>,
}

impl<S: RunLease + 'static> LeaseGuard<S> {
    async fn release(mut self) {
        if let Some(holder) = self.holder.take() {
            release_lease(self.lease.as_ref(), &holder).await;
        }
    }
}

impl<S: RunLease + 'static> Drop for LeaseGuard<S> {
    fn drop(&mut self) {
        let Some(holder) = self.holder.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lease = self.lease.clone();
                debug!(lease = RECONCILIATION_LEASE, "run cancelled; releasing lease");
                handle.spawn(async move {
                    release_lease(lease.as_ref(), &holder).await;
                });
            }
            Err(_) => warn!(
                lease = RECONCILIATION_LEASE,
                "no runtime to release cancelled run lease; it will expire"
            ),
        }
    }
}

// A failed release only delays the next run until the lease expires.
async fn release_lease<S: RunLease + ?Sized>(lease: &S, holder: &str) {
    if let Err(err) = lease.release(RECONCILIATION_LEASE, holder).await {
        warn!(lease = RECONCILIATION_LEASE, error = %err, "failed to release run lease");
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub message: String,
    pub postings_processed: usize,
    pub notifications_created: usize,
    pub postings_with_increment: usize,
    pub details: Vec<IncrementDetail>,
    pub failed_notifications: Vec<PostingId>,
    pub snapshot_write_failures: Vec<PostingId>,
}

impl RunSummary {
    fn empty() -> Self {
        Self {
            message: "No active postings to process".to_string(),
            postings_processed: 0,
            notifications_created: 0,
            postings_with_increment: 0,
            details: Vec::new(),
            failed_notifications: Vec::new(),
            snapshot_write_failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncrementDetail {
    pub posting_id: PostingId,
    pub title: String,
    pub new_applicants: u32,
    pub total_after: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveStateSummary {
    pub active_postings: usize,
    pub stored_snapshots: u64,
    pub postings: Vec<ActivePosting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePosting {
    pub posting_id: PostingId,
    pub title: String,
    pub total_applicants: u32,
    pub company_id: CompanyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
    pub message: String,
    pub removed: usize,
    pub remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub top_companies: Vec<CompanySnapshotCount>,
}

/// Run-level failures. Per-posting failures are reported in [`RunSummary`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("aggregate source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
    #[error("failed to read snapshots: {0}")]
    SnapshotReadFailure(#[source] StoreError),
    #[error("failed to write snapshots: {0}")]
    SnapshotWriteFailure(#[source] StoreError),
    #[error("another reconciliation run is in progress")]
    RunInProgress,
    #[error("failed to acquire run lease: {0}")]
    Lease(#[source] StoreError),
}
