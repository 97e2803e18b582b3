// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.
//!
//! All tunables have documented defaults; nothing is required. Breaker
//! thresholds, window sizes, and trial budgets are deployment-specific,
//! so they are exposed here instead of hard-coded.

use std::time::Duration;

/// Circuit breaker tunables, applied per dependency.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within [`BreakerConfig::failure_window`] that trip the
    /// breaker from closed to open.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    pub failure_window: Duration,
    /// How long an open breaker denies calls before admitting a trial.
    pub cool_down: Duration,
    /// Maximum concurrent trial calls while half-open. Admission beyond
    /// the cap is denied, not queued.
    pub half_open_max_trials: u32,
    /// Consecutive half-open successes required to close the breaker.
    pub half_open_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(10),
            cool_down: Duration::from_secs(30),
            half_open_max_trials: 1,
            half_open_success_threshold: 3,
        }
    }
}

/// Call executor tunables.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline applied to a call when the step does not specify its own.
    pub default_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
        }
    }
}

/// Retry policy for compensating actions.
///
/// Compensations are never skipped; once this budget is exhausted the
/// failure is escalated to the operator alerting channel.
#[derive(Debug, Clone)]
pub struct CompensationRetryConfig {
    /// Maximum attempts per compensating action (including the first).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub base_backoff: Duration,
    /// Upper bound on the backoff delay.
    pub max_backoff: Duration,
}

impl Default for CompensationRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Sagaline configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Circuit breaker tunables.
    pub breaker: BreakerConfig,
    /// Call executor tunables.
    pub executor: ExecutorConfig,
    /// Compensation retry tunables.
    pub compensation: CompensationRetryConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All optional (with defaults):
    /// - `SAGALINE_FAILURE_THRESHOLD`: failures tripping the breaker (default: 5)
    /// - `SAGALINE_FAILURE_WINDOW_MS`: rolling failure window (default: 10000)
    /// - `SAGALINE_COOL_DOWN_MS`: open-state cool-down (default: 30000)
    /// - `SAGALINE_HALF_OPEN_MAX_TRIALS`: concurrent trial budget (default: 1)
    /// - `SAGALINE_HALF_OPEN_SUCCESSES`: successes to close (default: 3)
    /// - `SAGALINE_CALL_TIMEOUT_MS`: default call deadline (default: 5000)
    /// - `SAGALINE_COMPENSATION_MAX_ATTEMPTS`: retry budget (default: 5)
    /// - `SAGALINE_COMPENSATION_BASE_BACKOFF_MS`: backoff base (default: 100)
    /// - `SAGALINE_COMPENSATION_MAX_BACKOFF_MS`: backoff cap (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let failure_threshold = parse_var("SAGALINE_FAILURE_THRESHOLD", 5u32)?;
        let failure_window_ms = parse_var("SAGALINE_FAILURE_WINDOW_MS", 10_000u64)?;
        let cool_down_ms = parse_var("SAGALINE_COOL_DOWN_MS", 30_000u64)?;
        let half_open_max_trials = parse_var("SAGALINE_HALF_OPEN_MAX_TRIALS", 1u32)?;
        let half_open_success_threshold = parse_var("SAGALINE_HALF_OPEN_SUCCESSES", 3u32)?;
        let call_timeout_ms = parse_var("SAGALINE_CALL_TIMEOUT_MS", 5_000u64)?;
        let max_attempts = parse_var("SAGALINE_COMPENSATION_MAX_ATTEMPTS", 5u32)?;
        let base_backoff_ms = parse_var("SAGALINE_COMPENSATION_BASE_BACKOFF_MS", 100u64)?;
        let max_backoff_ms = parse_var("SAGALINE_COMPENSATION_MAX_BACKOFF_MS", 5_000u64)?;

        if failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "SAGALINE_FAILURE_THRESHOLD",
                "must be at least 1",
            ));
        }
        if half_open_max_trials == 0 {
            return Err(ConfigError::Invalid(
                "SAGALINE_HALF_OPEN_MAX_TRIALS",
                "must be at least 1",
            ));
        }
        if max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "SAGALINE_COMPENSATION_MAX_ATTEMPTS",
                "must be at least 1",
            ));
        }

        Ok(Self {
            breaker: BreakerConfig {
                failure_threshold,
                failure_window: Duration::from_millis(failure_window_ms),
                cool_down: Duration::from_millis(cool_down_ms),
                half_open_max_trials,
                half_open_success_threshold,
            },
            executor: ExecutorConfig {
                default_timeout: Duration::from_millis(call_timeout_ms),
            },
            compensation: CompensationRetryConfig {
                max_attempts,
                base_backoff: Duration::from_millis(base_backoff_ms),
                max_backoff: Duration::from_millis(max_backoff_ms),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(name, "must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    const ALL_VARS: &[&str] = &[
        "SAGALINE_FAILURE_THRESHOLD",
        "SAGALINE_FAILURE_WINDOW_MS",
        "SAGALINE_COOL_DOWN_MS",
        "SAGALINE_HALF_OPEN_MAX_TRIALS",
        "SAGALINE_HALF_OPEN_SUCCESSES",
        "SAGALINE_CALL_TIMEOUT_MS",
        "SAGALINE_COMPENSATION_MAX_ATTEMPTS",
        "SAGALINE_COMPENSATION_BASE_BACKOFF_MS",
        "SAGALINE_COMPENSATION_MAX_BACKOFF_MS",
    ];

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in ALL_VARS {
            guard.remove(var);
        }

        let config = Config::from_env().unwrap();

        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.failure_window, Duration::from_secs(10));
        assert_eq!(config.breaker.cool_down, Duration::from_secs(30));
        assert_eq!(config.breaker.half_open_max_trials, 1);
        assert_eq!(config.breaker.half_open_success_threshold, 3);
        assert_eq!(config.executor.default_timeout, Duration::from_secs(5));
        assert_eq!(config.compensation.max_attempts, 5);
        assert_eq!(config.compensation.base_backoff, Duration::from_millis(100));
        assert_eq!(config.compensation.max_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_config_custom_breaker_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in ALL_VARS {
            guard.remove(var);
        }
        guard.set("SAGALINE_FAILURE_THRESHOLD", "3");
        guard.set("SAGALINE_FAILURE_WINDOW_MS", "10000");
        guard.set("SAGALINE_COOL_DOWN_MS", "5000");

        let config = Config::from_env().unwrap();

        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.failure_window, Duration::from_secs(10));
        assert_eq!(config.breaker.cool_down, Duration::from_secs(5));
    }

    #[test]
    fn test_config_invalid_threshold() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in ALL_VARS {
            guard.remove(var);
        }
        guard.set("SAGALINE_FAILURE_THRESHOLD", "not_a_number");

        let result = Config::from_env();
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("SAGALINE_FAILURE_THRESHOLD", _)
        ));
    }

    #[test]
    fn test_config_zero_threshold_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in ALL_VARS {
            guard.remove(var);
        }
        guard.set("SAGALINE_FAILURE_THRESHOLD", "0");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_zero_trial_budget_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in ALL_VARS {
            guard.remove(var);
        }
        guard.set("SAGALINE_HALF_OPEN_MAX_TRIALS", "0");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_negative_value_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in ALL_VARS {
            guard.remove(var);
        }
        guard.set("SAGALINE_COOL_DOWN_MS", "-5");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_error_display() {
        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
