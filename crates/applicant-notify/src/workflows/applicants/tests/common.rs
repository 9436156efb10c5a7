use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::config::{ReconciliationConfig, SnapshotAdvancePolicy};
use crate::workflows::applicants::domain::{
    AggregateRecord, CompanyId, Notification, NotificationDraft, NotificationId, PostingId,
    Snapshot, SnapshotDraft, UserId,
};
use crate::workflows::applicants::repository::{
    CompanySnapshotCount, NotificationInbox, NotificationSink, Page, RunLease, SnapshotStore,
    StoreError,
};
use crate::workflows::applicants::service::ReconciliationService;
use crate::workflows::applicants::source::{AggregateSource, SourceError};

pub(super) type MemoryService = ReconciliationService<MemorySource, MemorySnapshots, MemorySink>;

pub(super) fn record(company: i64, posting: i64, title: &str, total: u32) -> AggregateRecord {
    AggregateRecord {
        company_id: CompanyId(company),
        posting_id: PostingId(posting),
        title: title.to_string(),
        total_applicants: total,
    }
}

pub(super) fn snapshot(company: i64, posting: i64, title: &str, total: u32) -> Snapshot {
    Snapshot {
        id: posting,
        company_id: CompanyId(company),
        posting_id: PostingId(posting),
        title: title.to_string(),
        total_applicants: total,
        last_updated_at: Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp"),
    }
}

pub(super) fn config(policy: SnapshotAdvancePolicy) -> ReconciliationConfig {
    ReconciliationConfig {
        advance_policy: policy,
        lease_ttl: Duration::from_secs(60),
    }
}

pub(super) fn build_service(
    source: MemorySource,
    snapshots: MemorySnapshots,
    sink: MemorySink,
    policy: SnapshotAdvancePolicy,
) -> (
    MemoryService,
    Arc<MemorySource>,
    Arc<MemorySnapshots>,
    Arc<MemorySink>,
) {
    let source = Arc::new(source);
    let snapshots = Arc::new(snapshots);
    let sink = Arc::new(sink);
    let service = ReconciliationService::new(
        source.clone(),
        snapshots.clone(),
        sink.clone(),
        config(policy),
    );
    (service, source, snapshots, sink)
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

#[derive(Default)]
pub(super) struct MemorySource {
    records: Mutex<Vec<AggregateRecord>>,
    unavailable: bool,
    hanging: bool,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub(super) fn with_records(records: Vec<AggregateRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub(super) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub(super) fn hanging() -> Self {
        Self {
            hanging: true,
            ..Self::default()
        }
    }

    pub(super) fn replace(&self, records: Vec<AggregateRecord>) {
        *self.records.lock().expect("source mutex poisoned") = records;
    }

    pub(super) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AggregateSource for MemorySource {
    async fn fetch_current_totals(&self) -> Result<Vec<AggregateRecord>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hanging {
            std::future::pending::<()>().await;
        }
        if self.unavailable {
            return Err(SourceError::Unavailable("warehouse offline".to_string()));
        }
        Ok(self.records.lock().expect("source mutex poisoned").clone())
    }
}

#[derive(Default)]
pub(super) struct MemorySnapshots {
    rows: Mutex<BTreeMap<PostingId, Snapshot>>,
    lease: Mutex<Option<String>>,
    failing_upserts: HashSet<PostingId>,
    unreadable: bool,
    upserts: AtomicUsize,
}

impl MemorySnapshots {
    pub(super) fn with_rows(rows: Vec<Snapshot>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(|s| (s.posting_id, s)).collect()),
            ..Self::default()
        }
    }

    pub(super) fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::default()
        }
    }

    pub(super) fn failing_upserts_for(mut self, posting: i64) -> Self {
        self.failing_upserts.insert(PostingId(posting));
        self
    }

    pub(super) fn lease_held_by(self, holder: &str) -> Self {
        *self.lease.lock().expect("lease mutex poisoned") = Some(holder.to_string());
        self
    }

    pub(super) fn lease_holder(&self) -> Option<String> {
        self.lease.lock().expect("lease mutex poisoned").clone()
    }

    pub(super) fn total_for(&self, posting: i64) -> Option<u32> {
        self.rows
            .lock()
            .expect("snapshot mutex poisoned")
            .get(&PostingId(posting))
            .map(|s| s.total_applicants)
    }

    pub(super) fn posting_ids(&self) -> Vec<PostingId> {
        self.rows
            .lock()
            .expect("snapshot mutex poisoned")
            .keys()
            .copied()
            .collect()
    }

    pub(super) fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshots {
    async fn get_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        if self.unreadable {
            return Err(StoreError::Unavailable("snapshot table locked".to_string()));
        }
        Ok(self
            .rows
            .lock()
            .expect("snapshot mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn get_by_posting_id(
        &self,
        posting_id: PostingId,
    ) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .rows
            .lock()
            .expect("snapshot mutex poisoned")
            .get(&posting_id)
            .cloned())
    }

    async fn upsert(&self, draft: &SnapshotDraft) -> Result<Snapshot, StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.failing_upserts.contains(&draft.posting_id()) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }

        let mut rows = self.rows.lock().expect("snapshot mutex poisoned");
        let id = rows
            .get(&draft.posting_id())
            .map_or(draft.posting_id().0, |existing| existing.id);
        let stored = Snapshot {
            id,
            company_id: draft.company_id(),
            posting_id: draft.posting_id(),
            title: draft.title().to_string(),
            total_applicants: draft.total_applicants(),
            last_updated_at: Utc::now(),
        };
        rows.insert(draft.posting_id(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, posting_id: PostingId) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .lock()
            .expect("snapshot mutex poisoned")
            .remove(&posting_id)
            .is_some())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.rows.lock().expect("snapshot mutex poisoned").len() as u64)
    }

    async fn count_by_company(
        &self,
        limit: u32,
    ) -> Result<Vec<CompanySnapshotCount>, StoreError> {
        let rows = self.rows.lock().expect("snapshot mutex poisoned");
        let mut counts: BTreeMap<CompanyId, u64> = BTreeMap::new();
        for snapshot in rows.values() {
            *counts.entry(snapshot.company_id).or_default() += 1;
        }

        let mut ranked: Vec<CompanySnapshotCount> = counts
            .into_iter()
            .map(|(company_id, active_postings)| CompanySnapshotCount {
                company_id,
                active_postings,
            })
            .collect();
        ranked.sort_by(|a, b| b.active_postings.cmp(&a.active_postings));
        ranked.truncate(limit as usize);
        Ok(ranked)
    }
}

#[async_trait]
impl RunLease for MemorySnapshots {
    async fn try_acquire(
        &self,
        _name: &str,
        holder: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut lease = self.lease.lock().expect("lease mutex poisoned");
        if lease.is_some() {
            return Ok(false);
        }
        *lease = Some(holder.to_string());
        Ok(true)
    }

    async fn release(&self, _name: &str, holder: &str) -> Result<(), StoreError> {
        let mut lease = self.lease.lock().expect("lease mutex poisoned");
        if lease.as_deref() == Some(holder) {
            *lease = None;
        }
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemorySink {
    created: Mutex<Vec<Notification>>,
    failing_postings: HashSet<PostingId>,
    attempts: AtomicUsize,
    sequence: AtomicUsize,
}

impl MemorySink {
    pub(super) fn failing_for(posting: i64) -> Self {
        let mut sink = Self::default();
        sink.failing_postings.insert(PostingId(posting));
        sink
    }

    pub(super) fn created(&self) -> Vec<Notification> {
        self.created.lock().expect("sink mutex poisoned").clone()
    }

    pub(super) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn all(&self) -> Vec<Notification> {
        let mut notifications = self.created();
        notifications.reverse();
        notifications
    }

    fn update<F>(&self, mut apply: F) -> u64
    where
        F: FnMut(&mut Notification) -> bool,
    {
        let mut created = self.created.lock().expect("sink mutex poisoned");
        let mut changed = 0;
        for notification in created.iter_mut() {
            if apply(notification) {
                changed += 1;
            }
        }
        changed
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn create_isolated(&self, draft: NotificationDraft) -> Result<Notification, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_postings.contains(&draft.source_posting_id()) {
            return Err(StoreError::Unavailable("notification table locked".to_string()));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let notification = draft.into_notification(
            NotificationId(format!("n-{sequence:04}")),
            Utc::now(),
        );
        self.created
            .lock()
            .expect("sink mutex poisoned")
            .push(notification.clone());
        Ok(notification)
    }
}

#[async_trait]
impl NotificationInbox for MemorySink {
    async fn get(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError> {
        Ok(self.created().into_iter().find(|n| &n.id == id))
    }

    async fn list(&self, page: Page) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .all()
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn list_unread(&self) -> Result<Vec<Notification>, StoreError> {
        Ok(self.all().into_iter().filter(|n| !n.is_read).collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|n| n.recipient_user_id == user_id)
            .collect())
    }

    async fn list_for_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|n| n.recipient_company_id == company_id)
            .collect())
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError> {
        self.update(|n| {
            if &n.id == id && !n.is_read {
                n.is_read = true;
                n.read_at = Some(Utc::now());
            }
            false
        });
        self.get(id).await
    }

    async fn mark_all_read_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        Ok(self.update(|n| {
            if n.recipient_user_id == user_id && !n.is_read {
                n.is_read = true;
                n.read_at = Some(Utc::now());
                return true;
            }
            false
        }))
    }

    async fn mark_all_read_for_company(&self, company_id: CompanyId) -> Result<u64, StoreError> {
        Ok(self.update(|n| {
            if n.recipient_company_id == company_id && !n.is_read {
                n.is_read = true;
                n.read_at = Some(Utc::now());
                return true;
            }
            false
        }))
    }

    async fn delete(&self, id: &NotificationId) -> Result<bool, StoreError> {
        let mut created = self.created.lock().expect("sink mutex poisoned");
        let before = created.len();
        created.retain(|n| &n.id != id);
        Ok(created.len() != before)
    }
}
