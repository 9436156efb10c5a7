use crate::infra::{build_service, open_stores, warehouse_source};
use applicant_notify::config::AppConfig;
use applicant_notify::error::AppError;
use applicant_notify::telemetry;
use applicant_notify::workflows::applicants::CsvExportSource;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Read totals from a CSV export of the aggregate view instead of the warehouse
    #[arg(long, value_name = "PATH")]
    pub(crate) from_csv: Option<PathBuf>,
}

fn prepare() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

// Stdout carries only the JSON document; logs go to stderr.
fn render_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(value).map_err(std::io::Error::from)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = render_json(value)?;
    println!("{rendered}");
    Ok(())
}

pub(crate) async fn run_reconciliation(args: RunArgs) -> Result<(), AppError> {
    let config = prepare()?;
    let stores = open_stores(&config).await?;

    let summary = match args.from_csv {
        Some(path) => {
            build_service(CsvExportSource::new(path), &stores, &config)
                .run_reconciliation()
                .await?
        }
        None => {
            build_service(warehouse_source(&config).await?, &stores, &config)
                .run_reconciliation()
                .await?
        }
    };

    print_json(&summary)
}

pub(crate) async fn run_summary() -> Result<(), AppError> {
    let config = prepare()?;
    let stores = open_stores(&config).await?;
    let service = build_service(warehouse_source(&config).await?, &stores, &config);

    print_json(&service.summarize_active_state().await?)
}

pub(crate) async fn run_prune() -> Result<(), AppError> {
    let config = prepare()?;
    let stores = open_stores(&config).await?;
    let service = build_service(warehouse_source(&config).await?, &stores, &config);

    print_json(&service.prune_inactive_snapshots().await?)
}

pub(crate) async fn run_stats() -> Result<(), AppError> {
    let config = prepare()?;
    let stores = open_stores(&config).await?;
    let service = build_service(warehouse_source(&config).await?, &stores, &config);

    print_json(&service.snapshot_stats().await?)
}
