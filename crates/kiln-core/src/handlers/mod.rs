// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain handlers.
//!
//! Each handler validates its input, builds full records (IDs, timestamps)
//! and calls into [`Persistence`]. Handlers are transport-agnostic; the HTTP
//! layer in `kiln-server` maps their [`CoreError`](crate::error::CoreError)s
//! to status codes.

pub mod booking;
pub mod catalog;
pub mod delivery;
pub mod giftcard;
pub mod timecard;

use std::sync::Arc;

use chrono::Duration;

use crate::config::{Config, ConfigError, MAX_GIFTCARD_VALIDITY_DAYS, MAX_HOLD_TTL_SECS};
use crate::persistence::Persistence;

/// Default lifetime of a giftcard hold.
pub const DEFAULT_HOLD_TTL_SECS: i64 = 900;

/// Default validity of an issued giftcard.
pub const DEFAULT_GIFTCARD_VALIDITY_DAYS: i64 = 365;

/// Shared state for the domain handlers.
#[derive(Clone)]
pub struct HandlerState {
    /// Persistence implementation.
    pub persistence: Arc<dyn Persistence>,
    /// How long a hold reserves balance.
    pub hold_ttl: Duration,
    /// How long an issued giftcard can be spent.
    pub giftcard_validity: Duration,
}

impl HandlerState {
    /// Create handler state with default hold TTL and giftcard validity.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence,
            hold_ttl: Duration::seconds(DEFAULT_HOLD_TTL_SECS),
            giftcard_validity: Duration::days(DEFAULT_GIFTCARD_VALIDITY_DAYS),
        }
    }

    /// Create handler state using the durations from `config`.
    ///
    /// Durations outside the bounds [`Config::from_env`] enforces are rejected.
    pub fn from_config(
        persistence: Arc<dyn Persistence>,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        let hold_ttl = bounded_duration(
            config.hold_ttl,
            std::time::Duration::from_secs(MAX_HOLD_TTL_SECS),
            "KILN_HOLD_TTL_SECS",
        )?;
        let giftcard_validity = bounded_duration(
            config.giftcard_validity,
            std::time::Duration::from_secs(MAX_GIFTCARD_VALIDITY_DAYS * 24 * 3600),
            "KILN_GIFTCARD_VALIDITY_DAYS",
        )?;

        Ok(Self {
            persistence,
            hold_ttl,
            giftcard_validity,
        })
    }

    /// Override the hold TTL.
    pub fn with_hold_ttl(mut self, hold_ttl: Duration) -> Self {
        self.hold_ttl = hold_ttl;
        self
    }
}

fn bounded_duration(
    value: std::time::Duration,
    max: std::time::Duration,
    var: &'static str,
) -> Result<Duration, ConfigError> {
    if value.is_zero() || value > max {
        return Err(ConfigError::Invalid(var, "out of range"));
    }
    Duration::from_std(value).map_err(|_| ConfigError::Invalid(var, "out of range"))
}

/// Validate free-form `details` JSON: absent becomes `{}`, anything but an
/// object is rejected.
pub(crate) fn details_object(
    details: Option<serde_json::Value>,
) -> Result<serde_json::Value, crate::error::CoreError> {
    match details {
        None | Some(serde_json::Value::Null) => Ok(serde_json::json!({})),
        Some(value @ serde_json::Value::Object(_)) => Ok(value),
        Some(_) => Err(crate::error::CoreError::validation(
            "details",
            "must be a JSON object",
        )),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::persistence::SqlitePersistence;

    pub(crate) async fn test_state() -> HandlerState {
        let persistence = SqlitePersistence::in_memory()
            .await
            .expect("Failed to create in-memory SQLite persistence");
        HandlerState::new(Arc::new(persistence))
    }
}
