use crate::cli::ServeArgs;
use crate::infra::{build_service, open_stores, warehouse_source, AppState};
use crate::routes::with_notification_routes;
use applicant_notify::config::AppConfig;
use applicant_notify::error::AppError;
use applicant_notify::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let stores = open_stores(&config).await?;
    let source = warehouse_source(&config).await?;
    let service = Arc::new(build_service(source, &stores, &config));

    let app = with_notification_routes(service, stores.notifications.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        advance_policy = ?config.reconciliation.advance_policy,
        "applicant notifier ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
