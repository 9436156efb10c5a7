//! Applicant increment detection, notification emission and the inbox surface.
//!
//! A reconciliation run reads live per-posting totals from an [`AggregateSource`],
//! compares them with the stored [`Snapshot`] baselines, writes one notification per
//! positive delta through a [`NotificationSink`] and then advances the baselines.

pub mod detector;
pub mod domain;
pub mod message;
pub mod repository;
pub mod router;
pub mod service;
pub mod source;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use detector::{detect, index_by_posting};
pub use domain::{
    AggregateRecord, CompanyId, DraftError, IncrementRecord, Notification, NotificationDraft,
    NotificationId, PostingId, Priority, Snapshot, SnapshotDraft, UserId,
    COMPANY_LEVEL_RECIPIENT, NEW_APPLICATION_KIND,
};
pub use repository::{
    CompanySnapshotCount, NotificationInbox, NotificationSink, Page, RunLease, SnapshotStore,
    StoreError, UpsertFailure, UpsertReport,
};
pub use router::{notification_router, processing_router, CreateNotificationRequest};
pub use service::{
    ActivePosting, ActiveStateSummary, IncrementDetail, PruneSummary, ReconcileError,
    ReconciliationService, RunSummary, SnapshotStats, RECONCILIATION_LEASE,
};
pub use source::{AggregateSource, CsvExportSource, SourceError, WarehouseSource};
pub use sqlite::{SqliteNotificationStore, SqliteSnapshotStore};
