//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration directly from environment variables.

use crate::config::{self, EffectiveConfig, EnvConfig};

use super::{EXIT_CONFIG, EXIT_OK};

/// Print the effective config as JSON to stdout.
pub fn run_show() -> i32 {
    print_config(&config::load().effective_config())
}

/// Print default config values (no env overrides) as JSON to stdout.
pub fn run_defaults() -> i32 {
    print_config(&EnvConfig::default().effective_config())
}

/// Check every set `ZCIO_*` variable.
///
/// Returns 0 if valid, 2 on the first invalid value.
pub fn run_validate() -> i32 {
    match config::load_strict() {
        Ok(_) => {
            println!("Configuration is valid.");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            EXIT_CONFIG
        }
    }
}

fn print_config(cfg: &EffectiveConfig) -> i32 {
    match serde_json::to_string_pretty(cfg) {
        Ok(json) => {
            println!("{json}");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            EXIT_CONFIG
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};
    use crate::config::{ENV_CACHE_CAPACITY, ENV_CACHE_MANAGER, ENV_LOG_LEVEL};

    #[test]
    fn test_validate_passes_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        assert_eq!(run_validate(), EXIT_OK, "default config should pass validation");
    }

    #[test]
    fn test_validate_fails_on_unknown_manager() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_CACHE_MANAGER, "clock");
        assert_eq!(run_validate(), EXIT_CONFIG);
        clear_env_vars();
    }

    #[test]
    fn test_validate_fails_below_floor() {
        // load() would clamp this silently; validate reports it.
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_CACHE_CAPACITY, "1");
        assert_eq!(run_validate(), EXIT_CONFIG);
        clear_env_vars();
    }

    #[test]
    fn test_validate_fails_on_bad_log_level() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_LOG_LEVEL, "zcio=loud");
        assert_eq!(run_validate(), EXIT_CONFIG);
        clear_env_vars();
    }

    #[test]
    fn test_defaults_ignore_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_CACHE_MANAGER, "lazy");
        let defaults = EnvConfig::default().effective_config();
        assert_eq!(defaults.cache_manager, config::ManagerKind::Cached);
        assert_eq!(config::load().effective_config().cache_manager, config::ManagerKind::Lazy);
        assert_eq!(run_defaults(), EXIT_OK);
        clear_env_vars();
    }
}
