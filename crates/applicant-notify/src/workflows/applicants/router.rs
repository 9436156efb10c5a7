use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    CompanyId, DraftError, NotificationDraft, NotificationId, PostingId, Priority, UserId,
};
use super::repository::{
    NotificationInbox, NotificationSink, Page, RunLease, SnapshotStore, StoreError,
};
use super::service::{ReconcileError, ReconciliationService};
use super::source::AggregateSource;

const SUBJECT_MIN_CHARS: usize = 5;
const SUBJECT_MAX_CHARS: usize = 30;

/// Routes that trigger runs and inspect or prune the stored baselines.
pub fn processing_router<A, S, N>(service: Arc<ReconciliationService<A, S, N>>) -> Router
where
    A: AggregateSource + 'static,
    S: SnapshotStore + RunLease + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/processing/notify-applications",
            post(run_handler::<A, S, N>),
        )
        .route(
            "/api/v1/processing/postings-summary",
            get(summary_handler::<A, S, N>),
        )
        .route(
            "/api/v1/processing/snapshot-stats",
            get(stats_handler::<A, S, N>),
        )
        .route(
            "/api/v1/processing/inactive-snapshots",
            delete(prune_handler::<A, S, N>),
        )
        .with_state(service)
}

/// Inbox routes over the notification table.
pub fn notification_router<I>(inbox: Arc<I>) -> Router
where
    I: NotificationSink + NotificationInbox + 'static,
{
    Router::new()
        .route(
            "/api/v1/notifications",
            get(list_handler::<I>).post(create_handler::<I>),
        )
        .route("/api/v1/notifications/unread", get(unread_handler::<I>))
        .route(
            "/api/v1/notifications/:notification_id",
            get(get_handler::<I>).delete(delete_handler::<I>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            patch(mark_read_handler::<I>),
        )
        .route(
            "/api/v1/users/:user_id/notifications",
            get(user_handler::<I>),
        )
        .route(
            "/api/v1/users/:user_id/notifications/read-all",
            patch(user_read_all_handler::<I>),
        )
        .route(
            "/api/v1/companies/:company_id/notifications",
            get(company_handler::<I>),
        )
        .route(
            "/api/v1/companies/:company_id/notifications/read-all",
            patch(company_read_all_handler::<I>),
        )
        .with_state(inbox)
}

pub(crate) async fn run_handler<A, S, N>(
    State(service): State<Arc<ReconciliationService<A, S, N>>>,
) -> Response
where
    A: AggregateSource + 'static,
    S: SnapshotStore + RunLease + 'static,
    N: NotificationSink + 'static,
{
    match service.run_reconciliation().await {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => reconcile_failure(err),
    }
}

pub(crate) async fn summary_handler<A, S, N>(
    State(service): State<Arc<ReconciliationService<A, S, N>>>,
) -> Response
where
    A: AggregateSource + 'static,
    S: SnapshotStore + RunLease + 'static,
    N: NotificationSink + 'static,
{
    match service.summarize_active_state().await {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => reconcile_failure(err),
    }
}

pub(crate) async fn stats_handler<A, S, N>(
    State(service): State<Arc<ReconciliationService<A, S, N>>>,
) -> Response
where
    A: AggregateSource + 'static,
    S: SnapshotStore + RunLease + 'static,
    N: NotificationSink + 'static,
{
    match service.snapshot_stats().await {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(err) => reconcile_failure(err),
    }
}

pub(crate) async fn prune_handler<A, S, N>(
    State(service): State<Arc<ReconciliationService<A, S, N>>>,
) -> Response
where
    A: AggregateSource + 'static,
    S: SnapshotStore + RunLease + 'static,
    N: NotificationSink + 'static,
{
    match service.prune_inactive_snapshots().await {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => reconcile_failure(err),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

/// Inbound payload for manually created notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_user_id: i64,
    pub recipient_company_id: i64,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub source_posting_id: i64,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub extra_data: Option<String>,
}

impl CreateNotificationRequest {
    fn into_draft(self) -> Result<NotificationDraft, DraftError> {
        let found = self.subject.chars().count();
        if !(SUBJECT_MIN_CHARS..=SUBJECT_MAX_CHARS).contains(&found) {
            return Err(DraftError::FieldLength {
                field: "subject",
                min: SUBJECT_MIN_CHARS,
                max: SUBJECT_MAX_CHARS,
                found,
            });
        }

        let mut draft = NotificationDraft::new(
            UserId(self.recipient_user_id),
            CompanyId(self.recipient_company_id),
            self.kind,
            self.subject,
            self.body,
            PostingId(self.source_posting_id),
        )?;
        if let Some(priority) = self.priority {
            draft = draft.with_priority(priority);
        }
        if let Some(extra_data) = self.extra_data {
            draft = draft.with_extra_data(extra_data);
        }
        Ok(draft)
    }
}

pub(crate) async fn list_handler<I>(
    State(inbox): State<Arc<I>>,
    Query(params): Query<ListParams>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    let page = match Page::new(
        params.limit.unwrap_or(Page::MAX_LIMIT),
        params.offset.unwrap_or(0),
    ) {
        Ok(page) => page,
        Err(err) => return invalid_request(err),
    };

    match inbox.list(page).await {
        Ok(notifications) => (StatusCode::OK, axum::Json(notifications)).into_response(),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn create_handler<I>(
    State(inbox): State<Arc<I>>,
    axum::Json(request): axum::Json<CreateNotificationRequest>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    let draft = match request.into_draft() {
        Ok(draft) => draft,
        Err(err) => return invalid_request(err),
    };

    match inbox.create_isolated(draft).await {
        Ok(notification) => (StatusCode::CREATED, axum::Json(notification)).into_response(),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn unread_handler<I>(State(inbox): State<Arc<I>>) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    match inbox.list_unread().await {
        Ok(notifications) => (StatusCode::OK, axum::Json(notifications)).into_response(),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn get_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(notification_id): Path<String>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    let id = NotificationId(notification_id);
    match inbox.get(&id).await {
        Ok(Some(notification)) => (StatusCode::OK, axum::Json(notification)).into_response(),
        Ok(None) => not_found(&id),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn delete_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(notification_id): Path<String>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    let id = NotificationId(notification_id);
    match inbox.delete(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(&id),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn mark_read_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(notification_id): Path<String>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    let id = NotificationId(notification_id);
    match inbox.mark_read(&id).await {
        Ok(Some(notification)) => (StatusCode::OK, axum::Json(notification)).into_response(),
        Ok(None) => not_found(&id),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn user_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(user_id): Path<i64>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    match inbox.list_for_user(UserId(user_id)).await {
        Ok(notifications) => (StatusCode::OK, axum::Json(notifications)).into_response(),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn user_read_all_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(user_id): Path<i64>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    match inbox.mark_all_read_for_user(UserId(user_id)).await {
        Ok(updated) => (StatusCode::OK, axum::Json(json!({ "updated": updated }))).into_response(),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn company_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(company_id): Path<i64>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    match inbox.list_for_company(CompanyId(company_id)).await {
        Ok(notifications) => (StatusCode::OK, axum::Json(notifications)).into_response(),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn company_read_all_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(company_id): Path<i64>,
) -> Response
where
    I: NotificationSink + NotificationInbox + 'static,
{
    match inbox.mark_all_read_for_company(CompanyId(company_id)).await {
        Ok(updated) => (StatusCode::OK, axum::Json(json!({ "updated": updated }))).into_response(),
        Err(err) => store_failure(err),
    }
}

fn reconcile_failure(err: ReconcileError) -> Response {
    let status = match err {
        ReconcileError::RunInProgress => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn invalid_request(err: DraftError) -> Response {
    let payload = json!({
        "error": err.to_string(),
    });
    (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
}

fn not_found(id: &NotificationId) -> Response {
    let payload = json!({
        "error": "notification not found",
        "notification_id": id.0,
    });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

fn store_failure(err: StoreError) -> Response {
    error!(error = %err, "notification store request failed");
    let payload = json!({
        "error": err.to_string(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
