//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

/// Worker threads when nothing else is configured.
///
/// Kept small: job bodies share a handful of IMAP/calendar connections.
pub const DEFAULT_MAX_WORKERS: usize = 2;
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "bg-job";
pub const DEFAULT_ERROR_CAPACITY: usize = 50;
pub const DEFAULT_RETENTION_MAX_AGE: Duration = Duration::from_secs(3600);
pub const DEFAULT_RETENTION_INTERVAL: Duration = Duration::from_secs(300);

pub const ENV_WORKERS: &str = "SECRETARY_JOB_WORKERS";
pub const ENV_ERROR_CAPACITY: &str = "SECRETARY_JOB_ERROR_CAPACITY";
pub const ENV_RETENTION_SECS: &str = "SECRETARY_JOB_RETENTION_SECS";
pub const ENV_RETENTION_INTERVAL_SECS: &str = "SECRETARY_JOB_RETENTION_INTERVAL_SECS";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Periodic cleanup of finished jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// How often the sweeper runs
    pub interval: Duration,
    /// Finished jobs older than this are removed
    pub max_age: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETENTION_INTERVAL,
            max_age: DEFAULT_RETENTION_MAX_AGE,
        }
    }
}

/// Job engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEngineConfig {
    /// Maximum concurrently running job bodies
    pub max_workers: usize,
    /// Worker threads are named `{prefix}-{n}`
    pub thread_name_prefix: String,
    /// Per-job bound on retained per-item error messages
    pub error_capacity: usize,
    /// Background retention sweep; `None` leaves cleanup to the caller
    pub retention: Option<RetentionConfig>,
}

impl Default for JobEngineConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            error_capacity: DEFAULT_ERROR_CAPACITY,
            retention: None,
        }
    }
}

impl JobEngineConfig {
    /// Zero is treated as one.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Load from `SECRETARY_JOB_*` environment variables.
    ///
    /// Unset variables keep their defaults. Retention is enabled when either
    /// retention variable is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(workers) = parse::<usize, _>(&lookup, ENV_WORKERS)? {
            config = config.with_max_workers(workers);
        }
        if let Some(capacity) = parse::<usize, _>(&lookup, ENV_ERROR_CAPACITY)? {
            config = config.with_error_capacity(capacity);
        }

        let max_age = parse::<u64, _>(&lookup, ENV_RETENTION_SECS)?;
        let interval = parse::<u64, _>(&lookup, ENV_RETENTION_INTERVAL_SECS)?;
        if max_age.is_some() || interval.is_some() {
            let defaults = RetentionConfig::default();
            config = config.with_retention(RetentionConfig {
                interval: interval.map(Duration::from_secs).unwrap_or(defaults.interval),
                max_age: max_age.map(Duration::from_secs).unwrap_or(defaults.max_age),
            });
        }

        Ok(config)
    }
}

fn parse<T, L>(lookup: &L, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = JobEngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, JobEngineConfig::default());
        assert_eq!(config.max_workers, 2);
        assert!(config.retention.is_none());
    }

    #[test]
    fn reads_all_variables() {
        let config = JobEngineConfig::from_lookup(lookup(&[
            (ENV_WORKERS, "4"),
            (ENV_ERROR_CAPACITY, " 25 "),
            (ENV_RETENTION_SECS, "600"),
            (ENV_RETENTION_INTERVAL_SECS, "30"),
        ]))
        .unwrap();

        assert_eq!(config.max_workers, 4);
        assert_eq!(config.error_capacity, 25);
        assert_eq!(
            config.retention,
            Some(RetentionConfig {
                interval: Duration::from_secs(30),
                max_age: Duration::from_secs(600),
            })
        );
    }

    #[test]
    fn retention_interval_alone_enables_default_max_age() {
        let config =
            JobEngineConfig::from_lookup(lookup(&[(ENV_RETENTION_INTERVAL_SECS, "60")])).unwrap();
        let retention = config.retention.unwrap();
        assert_eq!(retention.interval, Duration::from_secs(60));
        assert_eq!(retention.max_age, DEFAULT_RETENTION_MAX_AGE);
    }

    #[test]
    fn zero_workers_clamps_to_one() {
        let config = JobEngineConfig::from_lookup(lookup(&[(ENV_WORKERS, "0")])).unwrap();
        assert_eq!(config.max_workers, 1);
    }

    #[test]
    fn malformed_value_is_rejected() {
        let err = JobEngineConfig::from_lookup(lookup(&[(ENV_WORKERS, "two")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: ENV_WORKERS,
                value: "two".to_string()
            }
        );
    }
}
