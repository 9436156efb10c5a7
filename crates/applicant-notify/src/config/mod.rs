use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_WAREHOUSE_VIEW: &str = "applicants_per_posting";
const DEFAULT_LEASE_TTL_SECS: u64 = 600;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Decides which postings get their snapshot advanced after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotAdvancePolicy {
    /// Every observed posting advances, even when its notification failed.
    #[default]
    Always,
    /// Postings whose notification failed keep their previous baseline so the
    /// next run reports the same delta again.
    DeliveredOnly,
}

impl SnapshotAdvancePolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "always" => Ok(Self::Always),
            "delivered-only" | "delivered_only" => Ok(Self::DeliveredOnly),
            _ => Err(ConfigError::InvalidAdvancePolicy {
                value: value.to_string(),
            }),
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
    /// Unset when `WAREHOUSE_URL` is missing; only warehouse-backed commands need it.
    pub warehouse: Option<WarehouseConfig>,
    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database_url = required("DATABASE_URL")?;
        let view = env::var("WAREHOUSE_VIEW")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WAREHOUSE_VIEW.to_string());
        let warehouse = required("WAREHOUSE_URL")
            .ok()
            .map(|url| WarehouseConfig { url, view });

        let advance_policy =
            SnapshotAdvancePolicy::parse(&env::var("SNAPSHOT_ADVANCE_POLICY").unwrap_or_default())?;
        let lease_ttl_secs = match env::var("RUN_LEASE_TTL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidLeaseTtl)?,
            Err(_) => DEFAULT_LEASE_TTL_SECS,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            store: StoreConfig { database_url },
            warehouse,
            reconciliation: ReconciliationConfig {
                advance_policy,
                lease_ttl: Duration::from_secs(lease_ttl_secs),
            },
        })
    }

    /// Warehouse settings, or `ConfigError::Missing` when `WAREHOUSE_URL` was unset.
    pub fn warehouse(&self) -> Result<&WarehouseConfig, ConfigError> {
        self.warehouse
            .as_ref()
            .ok_or(ConfigError::Missing { key: "WAREHOUSE_URL" })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing { key })
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Relational store holding snapshots, notifications and run leases.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
}

/// Read-only analytical source exposing the per-posting applicant view.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub url: String,
    pub view: String,
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub advance_policy: SnapshotAdvancePolicy,
    pub lease_ttl: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            advance_policy: SnapshotAdvancePolicy::Always,
            lease_ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    Missing { key: &'static str },
    InvalidAdvancePolicy { value: String },
    InvalidLeaseTtl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::Missing { key } => write!(f, "{key} must be set"),
            ConfigError::InvalidAdvancePolicy { value } => write!(
                f,
                "SNAPSHOT_ADVANCE_POLICY must be 'always' or 'delivered-only' (found '{value}')"
            ),
            ConfigError::InvalidLeaseTtl => {
                write!(f, "RUN_LEASE_TTL_SECS must be a positive number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::Missing { .. }
            | ConfigError::InvalidAdvancePolicy { .. }
            | ConfigError::InvalidLeaseTtl => None,
        }
    }
}
