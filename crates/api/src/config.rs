use chrono::Duration;
use domain::services::ClaimSettings;
use serde::Deserialize;
use std::net::SocketAddr;

/// Defaults shipped with the binary, also used to build test configurations.
const DEFAULTS: &str = include_str!("../../../config/default.toml");

/// Longest accepted lease, threshold or retention window.
pub const MAX_WINDOW_DAYS: i64 = 3650;

fn max_window() -> Duration {
    Duration::days(MAX_WINDOW_DAYS)
}

/// Caps a window at `MAX_WINDOW_DAYS` so timestamp arithmetic cannot
/// overflow. Out-of-range values are rejected by `validate`.
fn clamp_window(window: Option<Duration>) -> Duration {
    window.map_or_else(max_window, |d| d.min(max_window()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub claims: ClaimsConfig,
    pub watchdog: WatchdogConfig,
    pub document_store: DocumentStoreConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

/// Where request rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process memory. Rows are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimsConfig {
    #[serde(default = "default_lease_duration_minutes")]
    pub lease_duration_minutes: i64,

    /// How long a claim or complete waits for the row lock.
    #[serde(default = "default_lock_timeout_millis")]
    pub lock_timeout_millis: u64,

    #[serde(default = "default_unclaimed_limit")]
    pub unclaimed_limit: u32,
}

/// Unit for the overdue and timeout thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdUnit {
    Minutes,
    Hours,
    Days,
}

impl ThresholdUnit {
    /// `None` when `amount` does not fit a `Duration`.
    pub fn try_duration(&self, amount: i64) -> Option<Duration> {
        match self {
            ThresholdUnit::Minutes => Duration::try_minutes(amount),
            ThresholdUnit::Hours => Duration::try_hours(amount),
            ThresholdUnit::Days => Duration::try_days(amount),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound of the random delay before each job's first run.
    #[serde(default = "default_initial_jitter_secs")]
    pub initial_jitter_secs: u64,

    #[serde(default = "default_overdue_threshold")]
    pub overdue_threshold: i64,

    #[serde(default = "default_hours")]
    pub overdue_threshold_unit: ThresholdUnit,

    #[serde(default = "default_alert_interval_minutes")]
    pub overdue_alert_interval_minutes: u64,

    #[serde(default = "default_timeout_threshold")]
    pub timeout_threshold: i64,

    #[serde(default = "default_hours")]
    pub timeout_threshold_unit: ThresholdUnit,

    #[serde(default = "default_timeout_sweep_interval_minutes")]
    pub timeout_sweep_interval_minutes: u64,

    #[serde(default = "default_backlog_threshold")]
    pub backlog_threshold: i64,

    #[serde(default = "default_alert_interval_minutes")]
    pub backlog_alert_interval_minutes: u64,

    #[serde(default = "default_retention_age_days")]
    pub retention_age_days: i64,

    #[serde(default = "default_retention_cleanup_interval_minutes")]
    pub retention_cleanup_interval_minutes: u64,

    #[serde(default = "default_pool_metrics_interval_secs")]
    pub pool_metrics_interval_secs: u64,
}

impl WatchdogConfig {
    pub fn overdue_threshold(&self) -> Duration {
        clamp_window(
            self.overdue_threshold_unit
                .try_duration(self.overdue_threshold),
        )
    }

    pub fn timeout_threshold(&self) -> Duration {
        clamp_window(
            self.timeout_threshold_unit
                .try_duration(self.timeout_threshold),
        )
    }

    pub fn retention_age(&self) -> Duration {
        clamp_window(Duration::try_days(self.retention_age_days))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentStoreConfig {
    /// Base URL of the report store. Empty keeps reports in memory.
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_document_store_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Operator webhook. Empty logs alerts only.
    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "default_notifier_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_backend() -> StorageBackend {
    StorageBackend::Postgres
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_lease_duration_minutes() -> i64 {
    domain::services::claim::DEFAULT_LEASE_MINUTES
}
fn default_lock_timeout_millis() -> u64 {
    domain::services::claim::DEFAULT_LOCK_TIMEOUT_MILLIS
}
fn default_unclaimed_limit() -> u32 {
    domain::services::claim::DEFAULT_UNCLAIMED_LIMIT
}
fn default_true() -> bool {
    true
}
fn default_initial_jitter_secs() -> u64 {
    60
}
fn default_hours() -> ThresholdUnit {
    ThresholdUnit::Hours
}
fn default_overdue_threshold() -> i64 {
    12
}
fn default_alert_interval_minutes() -> u64 {
    720
}
fn default_timeout_threshold() -> i64 {
    48
}
fn default_timeout_sweep_interval_minutes() -> u64 {
    30
}
fn default_backlog_threshold() -> i64 {
    100
}
fn default_retention_age_days() -> i64 {
    7
}
fn default_retention_cleanup_interval_minutes() -> u64 {
    60
}
fn default_pool_metrics_interval_secs() -> u64 {
    60
}
fn default_document_store_timeout_ms() -> u64 {
    10_000
}
fn default_notifier_timeout_ms() -> u64 {
    5_000
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// A lease, threshold or retention window must be positive and no longer
/// than `MAX_WINDOW_DAYS`.
fn check_window(name: &str, window: Option<Duration>) -> Result<Duration, ConfigValidationError> {
    match window {
        Some(d) if d > Duration::zero() && d <= max_window() => Ok(d),
        _ => Err(ConfigValidationError::InvalidValue(format!(
            "{} must be positive and at most {} days",
            name, MAX_WINDOW_DAYS
        ))),
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with SAR__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("SAR").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Build a configuration from the embedded defaults plus overrides.
    ///
    /// Does not touch the file system or environment, and skips validation
    /// so tests can build partial configurations.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "SAR__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        check_window(
            "claims.lease_duration_minutes",
            Duration::try_minutes(self.claims.lease_duration_minutes),
        )?;

        if self.claims.lock_timeout_millis == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "claims.lock_timeout_millis must be positive".to_string(),
            ));
        }

        let watchdog = &self.watchdog;
        let overdue = check_window(
            "watchdog.overdue_threshold",
            watchdog
                .overdue_threshold_unit
                .try_duration(watchdog.overdue_threshold),
        )?;
        let timeout = check_window(
            "watchdog.timeout_threshold",
            watchdog
                .timeout_threshold_unit
                .try_duration(watchdog.timeout_threshold),
        )?;

        if overdue >= timeout {
            return Err(ConfigValidationError::InvalidValue(
                "watchdog.overdue_threshold must be shorter than watchdog.timeout_threshold"
                    .to_string(),
            ));
        }

        if watchdog.backlog_threshold < 0 {
            return Err(ConfigValidationError::InvalidValue(
                "watchdog.backlog_threshold cannot be negative".to_string(),
            ));
        }

        check_window(
            "watchdog.retention_age_days",
            Duration::try_days(watchdog.retention_age_days),
        )?;

        let intervals = [
            ("overdue_alert_interval_minutes", watchdog.overdue_alert_interval_minutes),
            ("timeout_sweep_interval_minutes", watchdog.timeout_sweep_interval_minutes),
            ("backlog_alert_interval_minutes", watchdog.backlog_alert_interval_minutes),
            (
                "retention_cleanup_interval_minutes",
                watchdog.retention_cleanup_interval_minutes,
            ),
            ("pool_metrics_interval_secs", watchdog.pool_metrics_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "watchdog.{} must be positive",
                name
            )));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    pub fn claim_settings(&self) -> ClaimSettings {
        ClaimSettings {
            lease_duration: clamp_window(Duration::try_minutes(
                self.claims.lease_duration_minutes,
            )),
            lock_timeout: std::time::Duration::from_millis(self.claims.lock_timeout_millis),
            unclaimed_limit: self.claims.unclaimed_limit,
        }
    }
}
