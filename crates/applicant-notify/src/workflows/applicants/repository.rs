use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::domain::{
    CompanyId, DraftError, Notification, NotificationDraft, NotificationId, PostingId, Snapshot,
    SnapshotDraft, UserId,
};

/// Persisted applicant-count baselines, one per posting.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_all(&self) -> Result<Vec<Snapshot>, StoreError>;

    async fn get_by_posting_id(&self, posting_id: PostingId)
        -> Result<Option<Snapshot>, StoreError>;

    /// Insert or overwrite the baseline for the draft's posting as one atomic write.
    async fn upsert(&self, draft: &SnapshotDraft) -> Result<Snapshot, StoreError>;

    /// Upsert every draft, continuing past individual failures.
    async fn upsert_many(&self, drafts: &[SnapshotDraft]) -> UpsertReport {
        let mut report = UpsertReport::default();
        for draft in drafts {
            match self.upsert(draft).await {
                Ok(snapshot) => report.written.push(snapshot),
                Err(err) => {
                    warn!(
                        posting_id = draft.posting_id().0,
                        error = %err,
                        "snapshot write failed"
                    );
                    report.failed.push(UpsertFailure {
                        posting_id: draft.posting_id(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Remove the baseline for a posting. Returns `true` when a row was deleted.
    async fn delete(&self, posting_id: PostingId) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Companies with the most stored baselines, largest first.
    async fn count_by_company(&self, limit: u32)
        -> Result<Vec<CompanySnapshotCount>, StoreError>;
}

/// Named, expiring lock used to keep reconciliation and pruning from overlapping.
#[async_trait]
pub trait RunLease: Send + Sync {
    /// Take the lease unless another holder owns an unexpired one.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    async fn release(&self, name: &str, holder: &str) -> Result<(), StoreError>;
}

/// Outgoing notification records written outside any caller transaction.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Persist one notification in its own transaction.
    ///
    /// Nothing the caller does afterwards can roll this write back, and a failure here is
    /// rolled back before the error is returned.
    async fn create_isolated(&self, draft: NotificationDraft) -> Result<Notification, StoreError>;
}

/// Read and read-state operations consumed by the notification HTTP surface.
#[async_trait]
pub trait NotificationInbox: Send + Sync {
    async fn get(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError>;

    /// Newest first.
    async fn list(&self, page: Page) -> Result<Vec<Notification>, StoreError>;

    async fn list_unread(&self) -> Result<Vec<Notification>, StoreError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError>;

    async fn list_for_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Flag a notification as read. Returns `None` when it does not exist.
    async fn mark_read(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError>;

    async fn mark_all_read_for_user(&self, user_id: UserId) -> Result<u64, StoreError>;

    async fn mark_all_read_for_company(&self, company_id: CompanyId) -> Result<u64, StoreError>;

    async fn delete(&self, id: &NotificationId) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default, Clone)]
pub struct UpsertReport {
    pub written: Vec<Snapshot>,
    pub failed: Vec<UpsertFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertFailure {
    pub posting_id: PostingId,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompanySnapshotCount {
    pub company_id: CompanyId,
    pub active_postings: u64,
}

/// Bounded slice of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: u32,
    offset: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(limit: u32, offset: u32) -> Result<Self, DraftError> {
        if limit == 0 || limit > Self::MAX_LIMIT {
            return Err(DraftError::OutOfRange {
                field: "limit",
                min: 1,
                max: i64::from(Self::MAX_LIMIT),
                found: i64::from(limit),
            });
        }
        Ok(Self { limit, offset })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::MAX_LIMIT,
            offset: 0,
        }
    }
}
