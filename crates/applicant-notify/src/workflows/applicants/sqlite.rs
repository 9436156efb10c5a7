//! SQLite-backed stores for snapshots, run leases and notifications.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::domain::{
    CompanyId, Notification, NotificationDraft, NotificationId, PostingId, Priority, Snapshot,
    SnapshotDraft, UserId,
};
use super::repository::{
    CompanySnapshotCount, NotificationInbox, NotificationSink, Page, RunLease, SnapshotStore,
    StoreError,
};
use crate::db::{from_millis, now_millis};

const SNAPSHOT_COLUMNS: &str =
    "id, company_id, posting_id, title, total_applicants, last_updated_at";

const NOTIFICATION_COLUMNS: &str = "id, recipient_user_id, recipient_company_id, kind, subject, \
     body, source_posting_id, priority, extra_data, is_read, read_at, created_at";

/// Snapshot baselines and run leases stored in the notification database.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot, StoreError> {
    let posting_id: i64 = row.try_get("posting_id")?;
    let total: i64 = row.try_get("total_applicants")?;
    let updated: i64 = row.try_get("last_updated_at")?;

    let total_applicants = u32::try_from(total).map_err(|_| {
        StoreError::Corrupt(format!(
            "snapshot for posting {posting_id} has total {total}"
        ))
    })?;
    let last_updated_at = from_millis(updated).ok_or_else(|| {
        StoreError::Corrupt(format!(
            "snapshot for posting {posting_id} has timestamp {updated}"
        ))
    })?;

    Ok(Snapshot {
        id: row.try_get("id")?,
        company_id: CompanyId(row.try_get("company_id")?),
        posting_id: PostingId(posting_id),
        title: row.try_get("title")?,
        total_applicants,
        last_updated_at,
    })
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM posting_snapshots ORDER BY posting_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }

    async fn get_by_posting_id(
        &self,
        posting_id: PostingId,
    ) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM posting_snapshots WHERE posting_id = ?"
        ))
        .bind(posting_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn upsert(&self, draft: &SnapshotDraft) -> Result<Snapshot, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO posting_snapshots (company_id, posting_id, title, total_applicants, last_updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(posting_id) DO UPDATE SET
                company_id = excluded.company_id,
                title = excluded.title,
                total_applicants = excluded.total_applicants,
                last_updated_at = excluded.last_updated_at
            RETURNING {SNAPSHOT_COLUMNS}
            "#
        ))
        .bind(draft.company_id().0)
        .bind(draft.posting_id().0)
        .bind(draft.title())
        .bind(i64::from(draft.total_applicants()))
        .bind(now_millis().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        snapshot_from_row(&row)
    }

    async fn delete(&self, posting_id: PostingId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posting_snapshots WHERE posting_id = ?")
            .bind(posting_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posting_snapshots")
            .fetch_one(&self.pool)
            .await?;

        Ok(total.max(0) as u64)
    }

    async fn count_by_company(
        &self,
        limit: u32,
    ) -> Result<Vec<CompanySnapshotCount>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT company_id, COUNT(*) AS total
            FROM posting_snapshots
            GROUP BY company_id
            ORDER BY total DESC, company_id ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CompanySnapshotCount, StoreError> {
                let total: i64 = row.try_get("total")?;
                Ok(CompanySnapshotCount {
                    company_id: CompanyId(row.try_get("company_id")?),
                    active_postings: total.max(0) as u64,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RunLease for SqliteSnapshotStore {
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = now_millis().timestamp_millis();
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_millis);

        // An expired lease is taken over in place; a live one leaves the row untouched.
        let result = sqlx::query(
            r#"
            INSERT INTO run_leases (name, holder, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE run_leases.expires_at <= excluded.acquired_at
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM run_leases WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Notification table access for both the reconciliation sink and the inbox API.
#[derive(Debug, Clone)]
pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(
        &self,
        filter: &str,
        bind: Option<i64>,
    ) -> Result<Vec<Notification>, StoreError> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications {filter} \
             ORDER BY created_at DESC, rowid DESC"
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, StoreError> {
    let id: String = row.try_get("id")?;
    let priority = match row.try_get::<Option<i64>, _>("priority")? {
        Some(code) => Some(Priority::from_code(code).ok_or_else(|| {
            StoreError::Corrupt(format!("notification {id} has priority {code}"))
        })?),
        None => None,
    };
    let read_at = row
        .try_get::<Option<i64>, _>("read_at")?
        .and_then(from_millis);
    let created: i64 = row.try_get("created_at")?;
    let created_at = from_millis(created).ok_or_else(|| {
        StoreError::Corrupt(format!("notification {id} has timestamp {created}"))
    })?;

    Ok(Notification {
        recipient_user_id: UserId(row.try_get("recipient_user_id")?),
        recipient_company_id: CompanyId(row.try_get("recipient_company_id")?),
        kind: row.try_get("kind")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        source_posting_id: PostingId(row.try_get("source_posting_id")?),
        priority,
        extra_data: row.try_get("extra_data")?,
        is_read: row.try_get::<i64, _>("is_read")? != 0,
        read_at,
        created_at,
        id: NotificationId(id),
    })
}

#[async_trait]
impl NotificationSink for SqliteNotificationStore {
    async fn create_isolated(&self, draft: NotificationDraft) -> Result<Notification, StoreError> {
        let notification = draft.into_notification(NotificationId::generate(), now_millis());

        // Dropping `tx` without commit rolls the insert back.
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&notification.id.0)
        .bind(notification.recipient_user_id.0)
        .bind(notification.recipient_company_id.0)
        .bind(&notification.kind)
        .bind(&notification.subject)
        .bind(&notification.body)
        .bind(notification.source_posting_id.0)
        .bind(notification.priority.map(Priority::code))
        .bind(&notification.extra_data)
        .bind(i64::from(notification.is_read))
        .bind(notification.read_at.map(|at| at.timestamp_millis()))
        .bind(notification.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(notification)
    }
}

#[async_trait]
impl NotificationInbox for SqliteNotificationStore {
    async fn get(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn list(&self, page: Page) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(page.limit()))
        .bind(i64::from(page.offset()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn list_unread(&self) -> Result<Vec<Notification>, StoreError> {
        self.fetch_many("WHERE is_read = 0", None).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError> {
        self.fetch_many("WHERE recipient_user_id = ?", Some(user_id.0))
            .await
    }

    async fn list_for_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<Notification>, StoreError> {
        self.fetch_many("WHERE recipient_company_id = ?", Some(company_id.0))
            .await
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError> {
        sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?) WHERE id = ?",
        )
        .bind(now_millis().timestamp_millis())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    async fn mark_all_read_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? \
             WHERE recipient_user_id = ? AND is_read = 0",
        )
        .bind(now_millis().timestamp_millis())
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_all_read_for_company(&self, company_id: CompanyId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? \
             WHERE recipient_company_id = ? AND is_read = 0",
        )
        .bind(now_millis().timestamp_millis())
        .bind(company_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &NotificationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
