// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Upper bound for `KILN_HOLD_TTL_SECS`.
pub const MAX_HOLD_TTL_SECS: u64 = 7 * SECS_PER_DAY;

/// Upper bound for `KILN_GIFTCARD_VALIDITY_DAYS`.
pub const MAX_GIFTCARD_VALIDITY_DAYS: u64 = 36_500;

const SECS_PER_DAY: u64 = 24 * 3600;

/// Kiln core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Maximum pooled database connections
    pub max_db_connections: u32,
    /// How long a giftcard hold reserves balance before it expires
    pub hold_ttl: Duration,
    /// How long an issued giftcard stays valid
    pub giftcard_validity: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `KILN_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `KILN_MAX_DB_CONNECTIONS`: pool size (default: 10)
    /// - `KILN_HOLD_TTL_SECS`: giftcard hold lifetime, at most one week (default: 900)
    /// - `KILN_GIFTCARD_VALIDITY_DAYS`: giftcard validity, 1 to 36500 days (default: 365)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("KILN_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("KILN_DATABASE_URL"))?;

        let max_db_connections: u32 = std::env::var("KILN_MAX_DB_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("KILN_MAX_DB_CONNECTIONS", "must be a positive integer")
            })?;
        if max_db_connections == 0 {
            return Err(ConfigError::Invalid(
                "KILN_MAX_DB_CONNECTIONS",
                "must be a positive integer",
            ));
        }

        let hold_ttl_secs: u64 = std::env::var("KILN_HOLD_TTL_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("KILN_HOLD_TTL_SECS", "must be a number of seconds"))?;
        if !(1..=MAX_HOLD_TTL_SECS).contains(&hold_ttl_secs) {
            return Err(ConfigError::Invalid(
                "KILN_HOLD_TTL_SECS",
                "must be between 1 and 604800 (one week)",
            ));
        }

        let validity_days: u64 = std::env::var("KILN_GIFTCARD_VALIDITY_DAYS")
            .unwrap_or_else(|_| "365".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("KILN_GIFTCARD_VALIDITY_DAYS", "must be a number of days")
            })?;
        if !(1..=MAX_GIFTCARD_VALIDITY_DAYS).contains(&validity_days) {
            return Err(ConfigError::Invalid(
                "KILN_GIFTCARD_VALIDITY_DAYS",
                "must be between 1 and 36500",
            ));
        }

        Ok(Self {
            database_url,
            max_db_connections,
            hold_ttl: Duration::from_secs(hold_ttl_secs),
            giftcard_validity: Duration::from_secs(validity_days * SECS_PER_DAY),
        })
    }

    /// Whether the database URL points at SQLite.
    pub fn is_sqlite(&self) -> bool {
        self.database_url.starts_with("sqlite:")
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

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

    fn clear_optional(guard: &mut EnvGuard) {
        guard.remove("KILN_MAX_DB_CONNECTIONS");
        guard.remove("KILN_HOLD_TTL_SECS");
        guard.remove("KILN_GIFTCARD_VALIDITY_DAYS");
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("KILN_DATABASE_URL", "postgres://localhost/kiln");
        clear_optional(&mut guard);

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/kiln");
        assert_eq!(config.max_db_connections, 10);
        assert_eq!(config.hold_ttl, Duration::from_secs(900));
        assert_eq!(config.giftcard_validity, Duration::from_secs(365 * 86400));
        assert!(!config.is_sqlite());
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("KILN_DATABASE_URL", "sqlite:studio.db");
        guard.set("KILN_MAX_DB_CONNECTIONS", "3");
        guard.set("KILN_HOLD_TTL_SECS", "120");
        guard.set("KILN_GIFTCARD_VALIDITY_DAYS", "30");

        let config = Config::from_env().unwrap();

        assert!(config.is_sqlite());
        assert_eq!(config.max_db_connections, 3);
        assert_eq!(config.hold_ttl, Duration::from_secs(120));
        assert_eq!(config.giftcard_validity, Duration::from_secs(30 * 86400));
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("KILN_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KILN_DATABASE_URL")));
        assert!(err.to_string().contains("KILN_DATABASE_URL"));
    }

    #[test]
    fn test_config_invalid_hold_ttl() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("KILN_DATABASE_URL", "postgres://localhost/kiln");
        clear_optional(&mut guard);
        guard.set("KILN_HOLD_TTL_SECS", "soon");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("KILN_HOLD_TTL_SECS", _)));

        guard.set("KILN_HOLD_TTL_SECS", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("KILN_HOLD_TTL_SECS", _)));
    }

    #[test]
    fn test_config_hold_ttl_upper_bound() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("KILN_DATABASE_URL", "postgres://localhost/kiln");
        clear_optional(&mut guard);

        guard.set("KILN_HOLD_TTL_SECS", "604800");
        assert_eq!(
            Config::from_env().unwrap().hold_ttl,
            Duration::from_secs(MAX_HOLD_TTL_SECS)
        );

        guard.set("KILN_HOLD_TTL_SECS", "604801");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("KILN_HOLD_TTL_SECS", _)));
    }

    #[test]
    fn test_config_invalid_giftcard_validity() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("KILN_DATABASE_URL", "postgres://localhost/kiln");
        clear_optional(&mut guard);

        for value in ["forever", "-1", "0", "36501", "18446744073709551615"] {
            guard.set("KILN_GIFTCARD_VALIDITY_DAYS", value);
            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid("KILN_GIFTCARD_VALIDITY_DAYS", _)),
                "{} should be rejected",
                value
            );
        }

        guard.set("KILN_GIFTCARD_VALIDITY_DAYS", "36500");
        assert_eq!(
            Config::from_env().unwrap().giftcard_validity,
            Duration::from_secs(36_500 * 86400)
        );
    }

    #[test]
    fn test_config_zero_connections_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("KILN_DATABASE_URL", "postgres://localhost/kiln");
        clear_optional(&mut guard);
        guard.set("KILN_MAX_DB_CONNECTIONS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("KILN_MAX_DB_CONNECTIONS", _)));
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
