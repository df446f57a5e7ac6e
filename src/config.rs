//! Configuration loading from environment variables.
//!
//! All values come from `ZCIO_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing;
//! [`load_strict`] reports them instead.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `ZCIO_CACHE_CAPACITY` | 268435456 | Address space reserved for file buffers (bytes) |
//! | `ZCIO_CACHE_MANAGER` | cached | Eviction policy: naive, cached, lazy or lru |
//! | `ZCIO_EVICTION_WARN_THRESHOLD` | 100 | Evictions in one reserve before a warning |
//! | `ZCIO_LOG_LEVEL` | info | `EnvFilter` directives |
//! | `ZCIO_LOG_FORMAT` | json | json or pretty |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::file_cache::{FileCacheConfig, DEFAULT_CAPACITY, DEFAULT_EVICTION_WARN_THRESHOLD};
use crate::telemetry::{LogConfig, LogFormat};

pub const ENV_CACHE_CAPACITY: &str = "ZCIO_CACHE_CAPACITY";
pub const ENV_CACHE_MANAGER: &str = "ZCIO_CACHE_MANAGER";
pub const ENV_EVICTION_WARN_THRESHOLD: &str = "ZCIO_EVICTION_WARN_THRESHOLD";
pub const ENV_LOG_LEVEL: &str = "ZCIO_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "ZCIO_LOG_FORMAT";

/// Smallest accepted cache capacity.
pub const MIN_CACHE_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value} is not a valid number")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key}={value} is below the minimum of {min}")]
    BelowMinimum {
        key: &'static str,
        value: usize,
        min: usize,
    },

    #[error("Unknown cache manager: {0} (expected naive, cached, lazy or lru)")]
    UnknownManager(String),

    #[error("Invalid log format: {0} (expected json or pretty)")]
    InvalidLogFormat(String),

    #[error("Invalid log level {value}: {reason}")]
    InvalidLogLevel { value: String, reason: String },
}

/// Eviction policy backing the file cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    /// Landlord recomputing the minimum credit density each pass.
    Naive,
    /// Landlord with a cached minimum credit density.
    #[default]
    Cached,
    /// Landlord with deferred charging over a density heap.
    Lazy,
    /// Least recently used.
    Lru,
}

impl FromStr for ManagerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "cached" => Ok(Self::Cached),
            "lazy" => Ok(Self::Lazy),
            "lru" => Ok(Self::Lru),
            other => Err(ConfigError::UnknownManager(other.to_string())),
        }
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Naive => "naive",
            Self::Cached => "cached",
            Self::Lazy => "lazy",
            Self::Lru => "lru",
        };
        f.write_str(name)
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub cache_capacity: usize,
    pub cache_manager: ManagerKind,
    pub eviction_warn_threshold: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub file_cache: FileCacheConfig,
    pub manager: ManagerKind,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse an env var with `FromStr`, returning `default` on missing or invalid.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

fn load_file_cache_config() -> FileCacheConfig {
    let capacity = parse_usize(ENV_CACHE_CAPACITY, DEFAULT_CAPACITY);
    let warn = parse_usize(ENV_EVICTION_WARN_THRESHOLD, DEFAULT_EVICTION_WARN_THRESHOLD);
    FileCacheConfig {
        capacity: capacity.max(MIN_CACHE_CAPACITY),
        eviction_warn_threshold: warn.max(1),
    }
}

fn load_log_config() -> LogConfig {
    let level = std::env::var(ENV_LOG_LEVEL)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "info".to_string());
    LogConfig {
        format: parse_or(ENV_LOG_FORMAT, LogFormat::Json),
        level,
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        file_cache: load_file_cache_config(),
        manager: parse_or(ENV_CACHE_MANAGER, ManagerKind::default()),
        log: load_log_config(),
    }
}

/// Like [`load`], but every set variable must parse and respect its floor.
pub fn load_strict() -> Result<EnvConfig, ConfigError> {
    let number = |key: &'static str, min: usize| -> Result<(), ConfigError> {
        let Ok(raw) = std::env::var(key) else {
            return Ok(());
        };
        let value = raw.trim().parse::<usize>().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: raw.clone(),
        })?;
        if value < min {
            return Err(ConfigError::BelowMinimum { key, value, min });
        }
        Ok(())
    };
    number(ENV_CACHE_CAPACITY, MIN_CACHE_CAPACITY)?;
    number(ENV_EVICTION_WARN_THRESHOLD, 1)?;

    if let Ok(raw) = std::env::var(ENV_CACHE_MANAGER) {
        raw.parse::<ManagerKind>()?;
    }
    if let Ok(raw) = std::env::var(ENV_LOG_FORMAT) {
        raw.parse::<LogFormat>()
            .map_err(|_| ConfigError::InvalidLogFormat(raw.trim().to_string()))?;
    }
    let config = load();
    EnvFilter::try_new(&config.log.level).map_err(|e| ConfigError::InvalidLogLevel {
        value: config.log.level.clone(),
        reason: e.to_string(),
    })?;
    Ok(config)
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            cache_capacity: self.file_cache.capacity,
            cache_manager: self.manager,
            eviction_warn_threshold: self.file_cache.eviction_warn_threshold,
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        ENV_CACHE_CAPACITY,
        ENV_CACHE_MANAGER,
        ENV_EVICTION_WARN_THRESHOLD,
        ENV_LOG_LEVEL,
        ENV_LOG_FORMAT,
    ];

    pub(crate) fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.file_cache.capacity, 256 * 1024 * 1024);
        assert_eq!(cfg.file_cache.eviction_warn_threshold, 100);
        assert_eq!(cfg.manager, ManagerKind::Cached);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert!(cfg.log.output_path.is_none());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_CACHE_CAPACITY, "8388608");
        std::env::set_var(ENV_CACHE_MANAGER, "Lazy");
        std::env::set_var(ENV_EVICTION_WARN_THRESHOLD, "7");
        std::env::set_var(ENV_LOG_LEVEL, "zcio=debug");
        std::env::set_var(ENV_LOG_FORMAT, "pretty");
        let cfg = load();
        assert_eq!(cfg.file_cache.capacity, 8 * 1024 * 1024);
        assert_eq!(cfg.manager, ManagerKind::Lazy);
        assert_eq!(cfg.file_cache.eviction_warn_threshold, 7);
        assert_eq!(cfg.log.level, "zcio=debug");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_CACHE_CAPACITY, "lots");
        std::env::set_var(ENV_CACHE_MANAGER, "fifo");
        std::env::set_var(ENV_LOG_FORMAT, "xml");
        let cfg = load();
        assert_eq!(cfg.file_cache.capacity, DEFAULT_CAPACITY);
        assert_eq!(cfg.manager, ManagerKind::Cached);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_apply() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_CACHE_CAPACITY, "4096");
        std::env::set_var(ENV_EVICTION_WARN_THRESHOLD, "0");
        let cfg = load();
        assert_eq!(cfg.file_cache.capacity, MIN_CACHE_CAPACITY);
        assert_eq!(cfg.file_cache.eviction_warn_threshold, 1);
        clear_env_vars();
    }

    #[test]
    fn test_strict_reports_bad_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        assert!(load_strict().is_ok());

        std::env::set_var(ENV_CACHE_CAPACITY, "4096");
        assert_eq!(
            load_strict().unwrap_err(),
            ConfigError::BelowMinimum {
                key: ENV_CACHE_CAPACITY,
                value: 4096,
                min: MIN_CACHE_CAPACITY,
            }
        );
        std::env::remove_var(ENV_CACHE_CAPACITY);

        std::env::set_var(ENV_EVICTION_WARN_THRESHOLD, "-3");
        assert!(matches!(load_strict(), Err(ConfigError::InvalidNumber { .. })));
        std::env::remove_var(ENV_EVICTION_WARN_THRESHOLD);

        std::env::set_var(ENV_CACHE_MANAGER, "fifo");
        assert_eq!(
            load_strict().unwrap_err(),
            ConfigError::UnknownManager("fifo".to_string())
        );
        std::env::remove_var(ENV_CACHE_MANAGER);

        std::env::set_var(ENV_LOG_FORMAT, "xml");
        assert_eq!(
            load_strict().unwrap_err(),
            ConfigError::InvalidLogFormat("xml".to_string())
        );
        std::env::remove_var(ENV_LOG_FORMAT);

        std::env::set_var(ENV_LOG_LEVEL, "zcio=loud");
        assert!(matches!(
            load_strict(),
            Err(ConfigError::InvalidLogLevel { value, .. }) if value == "zcio=loud"
        ));
        std::env::set_var(ENV_LOG_LEVEL, "warn,zcio::file_cache=trace");
        assert!(load_strict().is_ok());
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_serializes() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load().effective_config();
        let json = serde_json::to_value(&eff).unwrap();
        assert_eq!(json["cache_capacity"], 256 * 1024 * 1024);
        assert_eq!(json["cache_manager"], "cached");
        assert_eq!(json["eviction_warn_threshold"], 100);
        assert_eq!(json["log_format"], "json");
    }
}
