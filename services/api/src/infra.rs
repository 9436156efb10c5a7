use applicant_notify::config::AppConfig;
use applicant_notify::db;
use applicant_notify::error::AppError;
use applicant_notify::workflows::applicants::{
    AggregateSource, ReconciliationService, SqliteNotificationStore, SqliteSnapshotStore,
    WarehouseSource,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type StoreBackedService<A> =
    ReconciliationService<A, SqliteSnapshotStore, SqliteNotificationStore>;

/// Snapshot and notification stores sharing one migrated pool.
#[derive(Clone)]
pub(crate) struct Stores {
    pub(crate) snapshots: Arc<SqliteSnapshotStore>,
    pub(crate) notifications: Arc<SqliteNotificationStore>,
}

pub(crate) async fn open_stores(config: &AppConfig) -> Result<Stores, AppError> {
    let pool = db::connect(&config.store.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("notification store ready");

    Ok(Stores {
        snapshots: Arc::new(SqliteSnapshotStore::new(pool.clone())),
        notifications: Arc::new(SqliteNotificationStore::new(pool)),
    })
}

pub(crate) async fn warehouse_source(config: &AppConfig) -> Result<WarehouseSource, AppError> {
    let warehouse = config.warehouse()?;
    let pool = db::connect_read_only(&warehouse.url).await?;
    let source = WarehouseSource::new(pool, &warehouse.view)?;
    info!(view = %warehouse.view, "warehouse source ready");
    Ok(source)
}

pub(crate) fn build_service<A>(
    source: A,
    stores: &Stores,
    config: &AppConfig,
) -> StoreBackedService<A>
where
    A: AggregateSource + 'static,
{
    ReconciliationService::new(
        Arc::new(source),
        stores.snapshots.clone(),
        stores.notifications.clone(),
        config.reconciliation.clone(),
    )
}
