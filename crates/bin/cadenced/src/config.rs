//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `cadence.toml` (or the path given on the command line). Every
//! field has a sensible default so the file is optional. Environment
//! variables take precedence over file values.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use cadence_adapter_http_reqwest::Config as InvokerConfig;
use cadence_adapter_storage_sqlite_sqlx::pool::Config as StorageConfig;
use cadence_adapter_storage_sqlite_sqlx::session_queue::QueueSettings;
use cadence_app::dispatcher::DispatcherSettings;
use cadence_app::services::scheduler_cycle::CycleSettings;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
    pub max_connections: i64,
}

/// Claiming and rescheduling loop.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub batch_size: i64,
    /// Upper bound of a single cycle; a slower cycle is abandoned.
    pub cycle_timeout_secs: u64,
    /// IANA zone in which schedules are evaluated.
    pub timezone: String,
    /// Due rows older than this are never claimed. `0` disables the bound.
    pub stale_window_secs: u64,
    pub lookahead_secs: u64,
    /// Enables the stale-lock sweep when set.
    pub lock_timeout_secs: Option<u64>,
    /// Enables execution-log purging when set.
    pub log_retention_days: Option<u32>,
}

/// Session-based message consumer.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue name shared with the scheduler.
    pub queue: String,
    pub session_pool: i64,
    pub batch_size: i64,
    pub process_pool: i64,
    pub retry_delay_secs: u64,
    pub accept_timeout_secs: u64,
    pub receive_timeout_secs: u64,
    /// Lease of an accepted session; renewed on activity.
    pub session_lock_secs: u64,
    pub max_delivery_count: u32,
}

/// Outbound action calls.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `path` (if present), apply environment-variable
    /// overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Apply `CADENCE_*` overrides read through `lookup`.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|val| val.parse().ok())
        }

        if let Some(val) = lookup("CADENCE_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = parsed(&lookup, "CADENCE_TICK_INTERVAL_SECS") {
            self.scheduler.tick_interval_secs = val;
        }
        if let Some(val) = parsed(&lookup, "CADENCE_BATCH_SIZE") {
            self.scheduler.batch_size = val;
        }
        if let Some(val) = lookup("CADENCE_TIMEZONE") {
            self.scheduler.timezone = val;
        }
        if let Some(val) = parsed(&lookup, "CADENCE_LOCK_TIMEOUT_SECS") {
            self.scheduler.lock_timeout_secs = Some(val);
        }
        if let Some(val) = lookup("CADENCE_QUEUE") {
            self.worker.queue = val;
        }
        if let Some(val) = parsed(&lookup, "CADENCE_SESSION_POOL") {
            self.worker.session_pool = val;
        }
        if let Some(val) = parsed(&lookup, "CADENCE_PROCESS_POOL") {
            self.worker.process_pool = val;
        }
        if let Some(val) = lookup("CADENCE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::Validation("scheduler.tick_interval_secs must be non-zero".to_string()));
        }
        if self.scheduler.cycle_timeout_secs == 0 {
            return Err(ConfigError::Validation("scheduler.cycle_timeout_secs must be non-zero".to_string()));
        }
        self.timezone()?;
        if let Some(lock_timeout) = self.scheduler.lock_timeout_secs {
            let stale_window = self.scheduler.stale_window_secs;
            if lock_timeout == 0 || (stale_window > 0 && lock_timeout >= stale_window) {
                return Err(ConfigError::Validation(format!(
                    "scheduler.lock_timeout_secs must be between 1 and stale_window_secs ({stale_window})"
                )));
            }
        }
        if self.worker.queue.trim().is_empty() {
            return Err(ConfigError::Validation("worker.queue must not be empty".to_string()));
        }
        Ok(())
    }

    /// Parse the configured scheduling zone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unknown IANA name.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(&self.scheduler.timezone)
            .map_err(|_| ConfigError::Validation(format!("unknown timezone {:?}", self.scheduler.timezone)))
    }

    /// Settings of one scheduler cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unknown time zone.
    pub fn cycle_settings(&self) -> Result<CycleSettings, ConfigError> {
        let defaults = CycleSettings::default();
        let scheduler = &self.scheduler;
        Ok(CycleSettings {
            batch_size: positive(scheduler.batch_size).unwrap_or(defaults.batch_size),
            stale_window: (scheduler.stale_window_secs > 0).then(|| Duration::from_secs(scheduler.stale_window_secs)),
            lookahead: Duration::from_secs(scheduler.lookahead_secs),
            timezone: self.timezone()?,
        })
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_secs)
    }

    #[must_use]
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.cycle_timeout_secs)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.scheduler.lock_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn log_retention(&self) -> Option<chrono::Duration> {
        self.scheduler
            .log_retention_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }

    /// Dispatcher settings; non-positive sizes fall back to defaults.
    #[must_use]
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        let worker = &self.worker;
        DispatcherSettings {
            session_pool: positive(worker.session_pool).unwrap_or(0),
            batch_size: positive(worker.batch_size).unwrap_or(0),
            process_pool: positive(worker.process_pool).unwrap_or(0),
            retry_delay: Duration::from_secs(worker.retry_delay_secs),
            accept_timeout: Duration::from_secs(worker.accept_timeout_secs),
            receive_timeout: Duration::from_secs(worker.receive_timeout_secs),
            ..DispatcherSettings::default()
        }
        .normalized()
    }

    #[must_use]
    pub fn queue_settings(&self) -> QueueSettings {
        let defaults = QueueSettings::default();
        QueueSettings {
            queue: self.worker.queue.clone(),
            lease: if self.worker.session_lock_secs == 0 {
                defaults.lease
            } else {
                Duration::from_secs(self.worker.session_lock_secs)
            },
            max_delivery_count: self.worker.max_delivery_count.max(1),
            ..defaults
        }
    }

    #[must_use]
    pub fn storage_config(&self) -> StorageConfig {
        let mut storage = StorageConfig::new(self.database.url.clone());
        if let Some(max) = positive(self.database.max_connections) {
            storage.max_connections = u32::try_from(max).unwrap_or(u32::MAX);
        }
        storage
    }

    #[must_use]
    pub fn invoker_config(&self) -> InvokerConfig {
        let defaults = InvokerConfig::default();
        InvokerConfig {
            timeout: if self.http.timeout_secs == 0 {
                defaults.timeout
            } else {
                Duration::from_secs(self.http.timeout_secs)
            },
            ..defaults
        }
    }
}

fn positive(value: i64) -> Option<usize> {
    usize::try_from(value).ok().filter(|v| *v > 0)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:cadence.db?mode=rwc".to_string(),
            max_connections: 8,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            batch_size: 100,
            cycle_timeout_secs: 3600,
            timezone: "UTC".to_string(),
            stale_window_secs: 600,
            lookahead_secs: 0,
            lock_timeout_secs: None,
            log_retention_days: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "automate_queue".to_string(),
            session_pool: 20,
            batch_size: 5,
            process_pool: 1,
            retry_delay_secs: 5,
            accept_timeout_secs: 5,
            receive_timeout_secs: 10,
            session_lock_secs: 300,
            max_delivery_count: 10,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "cadenced=info,cadence_app=info,cadence_adapter_storage_sqlite_sqlx=info,sqlx=warn".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
