use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};

use super::domain::{AggregateRecord, DraftError};

/// Read-only access to the live per-posting applicant totals.
///
/// Implementations return one record per active posting. A posting missing from the
/// result is considered inactive by the maintenance path.
#[async_trait]
pub trait AggregateSource: Send + Sync {
    async fn fetch_current_totals(&self) -> Result<Vec<AggregateRecord>, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("warehouse query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("invalid warehouse view name '{0}'")]
    InvalidView(String),
    #[error("failed to read aggregate export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid aggregate export: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    InvalidRecord(#[from] DraftError),
    #[error("aggregate source unavailable: {0}")]
    Unavailable(String),
}

/// Queries the pre-aggregated applicants view on the analytical warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseSource {
    pool: SqlitePool,
    query: String,
}

impl WarehouseSource {
    pub fn new(pool: SqlitePool, view: &str) -> Result<Self, SourceError> {
        if !is_plain_identifier(view) {
            return Err(SourceError::InvalidView(view.to_string()));
        }

        let query = format!(
            "SELECT company_id, posting_id, title, total_applicants FROM {view} ORDER BY posting_id"
        );
        Ok(Self { pool, query })
    }
}

#[async_trait]
impl AggregateSource for WarehouseSource {
    async fn fetch_current_totals(&self) -> Result<Vec<AggregateRecord>, SourceError> {
        let rows = sqlx::query(&self.query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<AggregateRecord, SourceError> {
                let record = AggregateRecord::from_raw(
                    row.try_get::<i64, _>("company_id")?,
                    row.try_get::<i64, _>("posting_id")?,
                    row.try_get::<String, _>("title")?,
                    row.try_get::<i64, _>("total_applicants")?,
                )?;
                Ok(record)
            })
            .collect()
    }
}

// The view name is interpolated into SQL, so only dotted identifiers pass.
fn is_plain_identifier(view: &str) -> bool {
    let mut chars = view.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Reads an offline CSV export of the applicants view.
///
/// Expected headers: `company_id,posting_id,title,total_applicants`.
#[derive(Debug, Clone)]
pub struct CsvExportSource {
    path: PathBuf,
}

impl CsvExportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AggregateSource for CsvExportSource {
    async fn fetch_current_totals(&self) -> Result<Vec<AggregateRecord>, SourceError> {
        let bytes = tokio::fs::read(&self.path).await?;
        parse_export(bytes.as_slice())
    }
}

#[derive(Debug, Deserialize)]
struct ExportRow {
    company_id: i64,
    posting_id: i64,
    title: String,
    total_applicants: i64,
}

pub fn parse_export<R: Read>(reader: R) -> Result<Vec<AggregateRecord>, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for row in csv_reader.deserialize::<ExportRow>() {
        let row = row?;
        records.push(AggregateRecord::from_raw(
            row.company_id,
            row.posting_id,
            row.title,
            row.total_applicants,
        )?);
    }

    Ok(records)
}
