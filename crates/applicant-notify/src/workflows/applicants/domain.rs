use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Employer account that owns one or more postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub i64);

/// Job posting identifier as exposed by the warehouse view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Generated identifier of a stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Recipient used when a notification targets the employer account rather than a person.
pub const COMPANY_LEVEL_RECIPIENT: UserId = UserId(0);

/// Kind tag carried by every notification emitted from a reconciliation run.
pub const NEW_APPLICATION_KIND: &str = "NEW_APPLICATION";

/// Live applicant total for one active posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub company_id: CompanyId,
    pub posting_id: PostingId,
    pub title: String,
    pub total_applicants: u32,
}

impl AggregateRecord {
    /// Build a record from raw warehouse columns, rejecting totals that cannot be a count.
    pub fn from_raw(
        company_id: i64,
        posting_id: i64,
        title: impl Into<String>,
        total_applicants: i64,
    ) -> Result<Self, DraftError> {
        let posting_id = PostingId(posting_id);
        Ok(Self {
            company_id: CompanyId(company_id),
            posting_id,
            title: title.into(),
            total_applicants: checked_total(posting_id, total_applicants)?,
        })
    }
}

/// Last observed applicant total for a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub company_id: CompanyId,
    pub posting_id: PostingId,
    pub title: String,
    pub total_applicants: u32,
    pub last_updated_at: DateTime<Utc>,
}

/// Validated payload for creating or refreshing a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDraft {
    company_id: CompanyId,
    posting_id: PostingId,
    title: String,
    total_applicants: u32,
}

impl SnapshotDraft {
    pub fn new(
        company_id: CompanyId,
        posting_id: PostingId,
        title: impl Into<String>,
        total_applicants: i64,
    ) -> Result<Self, DraftError> {
        Ok(Self {
            company_id,
            posting_id,
            title: title.into(),
            total_applicants: checked_total(posting_id, total_applicants)?,
        })
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn posting_id(&self) -> PostingId {
        self.posting_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn total_applicants(&self) -> u32 {
        self.total_applicants
    }
}

impl TryFrom<&AggregateRecord> for SnapshotDraft {
    type Error = DraftError;

    fn try_from(record: &AggregateRecord) -> Result<Self, Self::Error> {
        Self::new(
            record.company_id,
            record.posting_id,
            record.title.clone(),
            i64::from(record.total_applicants),
        )
    }
}

/// Delta between the live total and the stored baseline for one posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncrementRecord {
    pub company_id: CompanyId,
    pub posting_id: PostingId,
    pub title: String,
    pub previous_total: u32,
    pub current_total: u32,
    pub new_applicants: u32,
}

impl IncrementRecord {
    pub fn has_increment(&self) -> bool {
        self.new_applicants > 0
    }
}

/// Urgency tier stored alongside a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const fn code(self) -> i64 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            _ => None,
        }
    }
}

/// Persisted notification addressed to an employer (and optionally a user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_user_id: UserId,
    pub recipient_company_id: CompanyId,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub source_posting_id: PostingId,
    pub priority: Option<Priority>,
    pub extra_data: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Validated payload for [`NotificationSink::create_isolated`](super::NotificationSink::create_isolated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    recipient_user_id: UserId,
    recipient_company_id: CompanyId,
    kind: String,
    subject: String,
    body: String,
    source_posting_id: PostingId,
    priority: Option<Priority>,
    extra_data: Option<String>,
}

impl NotificationDraft {
    pub fn new(
        recipient_user_id: UserId,
        recipient_company_id: CompanyId,
        kind: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        source_posting_id: PostingId,
    ) -> Result<Self, DraftError> {
        let kind = non_blank("kind", kind.into())?;
        let subject = non_blank("subject", subject.into())?;
        let body = non_blank("body", body.into())?;

        Ok(Self {
            recipient_user_id,
            recipient_company_id,
            kind,
            subject,
            body,
            source_posting_id,
            priority: None,
            extra_data: None,
        })
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_extra_data(mut self, extra_data: impl Into<String>) -> Self {
        self.extra_data = Some(extra_data.into());
        self
    }

    pub fn recipient_user_id(&self) -> UserId {
        self.recipient_user_id
    }

    pub fn recipient_company_id(&self) -> CompanyId {
        self.recipient_company_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn source_posting_id(&self) -> PostingId {
        self.source_posting_id
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn extra_data(&self) -> Option<&str> {
        self.extra_data.as_deref()
    }

    /// Materialize the row that a sink will persist for this draft.
    pub fn into_notification(
        self,
        id: NotificationId,
        created_at: DateTime<Utc>,
    ) -> Notification {
        Notification {
            id,
            recipient_user_id: self.recipient_user_id,
            recipient_company_id: self.recipient_company_id,
            kind: self.kind,
            subject: self.subject,
            body: self.body,
            source_posting_id: self.source_posting_id,
            priority: self.priority,
            extra_data: self.extra_data,
            is_read: false,
            read_at: None,
            created_at,
        }
    }
}

/// Construction-time validation failures for drafts and records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("posting {posting_id:?} reported a negative applicant total ({total})")]
    NegativeTotal { posting_id: PostingId, total: i64 },
    #[error("posting {posting_id:?} reported an applicant total too large to track ({total})")]
    TotalOutOfRange { posting_id: PostingId, total: i64 },
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
    #[error("{field} must be between {min} and {max} characters (found {found})")]
    FieldLength {
        field: &'static str,
        min: usize,
        max: usize,
        found: usize,
    },
    #[error("{field} must be between {min} and {max} (found {found})")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        found: i64,
    },
}

fn checked_total(posting_id: PostingId, total: i64) -> Result<u32, DraftError> {
    if total < 0 {
        return Err(DraftError::NegativeTotal { posting_id, total });
    }
    u32::try_from(total).map_err(|_| DraftError::TotalOutOfRange { posting_id, total })
}

fn non_blank(field: &'static str, value: String) -> Result<String, DraftError> {
    if value.trim().is_empty() {
        Err(DraftError::BlankField { field })
    } else {
        Ok(value)
    }
}
