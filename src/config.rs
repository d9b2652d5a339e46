//! Runtime configuration.
//!
//! Everything is read from the environment once, when the runtime is built:
//!
//! | Variable                    | Meaning                                   | Default             |
//! |-----------------------------|-------------------------------------------|---------------------|
//! | `KERNRT_THREAD_POOL`        | pool capacity, `0` runs work synchronously | available parallelism |
//! | `KERNRT_BARRIER_TIMEOUT_MS` | barrier watchdog, `0` waits forever       | `0`                 |
//! | `KERNRT_LOCKS`              | number of module-visible locks            | `64`                |
//! | `KERNRT_LOG`                | log level filter                          | `info`              |
use crate::error::ConfigError;
use log::LevelFilter;
use std::{str::FromStr, time::Duration};

pub const THREAD_POOL_VAR: &str = "KERNRT_THREAD_POOL";
pub const BARRIER_TIMEOUT_VAR: &str = "KERNRT_BARRIER_TIMEOUT_MS";
pub const LOCKS_VAR: &str = "KERNRT_LOCKS";
pub const LOG_VAR: &str = "KERNRT_LOG";

const DEFAULT_LOCKS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of outstanding pool threads
    pub thread_pool: usize,
    /// `None` lets barriers spin forever
    pub barrier_timeout: Option<Duration>,
    pub locks: usize,
    pub log_level: LevelFilter,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_pool: default_pool_capacity(),
            barrier_timeout: None,
            locks: DEFAULT_LOCKS,
            log_level: LevelFilter::Info,
        }
    }
}

fn default_pool_capacity() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZero::get)
}

impl RuntimeConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a variable that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a variable that does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(capacity) = parse(&lookup, THREAD_POOL_VAR)? {
            config.thread_pool = capacity;
        }
        if let Some(millis) = parse::<u64, _>(&lookup, BARRIER_TIMEOUT_VAR)? {
            config.barrier_timeout = (millis != 0).then(|| Duration::from_millis(millis));
        }
        if let Some(locks) = parse(&lookup, LOCKS_VAR)? {
            config.locks = locks;
        }
        if let Some(level) = parse(&lookup, LOG_VAR)? {
            config.log_level = level;
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.thread_pool >= 1);
        assert_eq!(config.locks, 64);
        assert_eq!(config.barrier_timeout, None);
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("KERNRT_THREAD_POOL", "0"),
            ("KERNRT_BARRIER_TIMEOUT_MS", " 250 "),
            ("KERNRT_LOCKS", "3"),
            ("KERNRT_LOG", "TRACE"),
        ]))
        .unwrap();

        assert_eq!(config.thread_pool, 0);
        assert_eq!(config.barrier_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.locks, 3);
        assert_eq!(config.log_level, LevelFilter::Trace);
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let config =
            RuntimeConfig::from_lookup(lookup(&[("KERNRT_BARRIER_TIMEOUT_MS", "0")])).unwrap();
        assert_eq!(config.barrier_timeout, None);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            RuntimeConfig::from_lookup(lookup(&[("KERNRT_THREAD_POOL", "-1")])),
            Err(ConfigError::Invalid {
                key: THREAD_POOL_VAR,
                value: "-1".to_string(),
            })
        );
        assert!(RuntimeConfig::from_lookup(lookup(&[("KERNRT_LOG", "loud")])).is_err());
        assert!(RuntimeConfig::from_lookup(lookup(&[("KERNRT_LOCKS", "many")])).is_err());
    }
}
