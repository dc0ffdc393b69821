// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that expires lapsed giftcard holds.
//!
//! Each pass:
//! 1. Marks active holds whose `expires_at` has passed as `expired`, in batches
//! 2. Cancels `pending` bookings whose hold is no longer active, freeing
//!    their seats
//!
//! Lapsed holds already stop reserving balance on their own; the sweeper
//! makes that visible in hold and booking status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::error::Result;
use crate::persistence::Persistence;
use crate::status::BookingStatus;

/// Configuration for the hold sweeper.
#[derive(Debug, Clone)]
pub struct HoldSweeperConfig {
    /// Whether the sweeper runs at all.
    pub enabled: bool,
    /// Time between passes.
    pub poll_interval: Duration,
    /// Maximum holds or bookings handled per batch.
    pub batch_size: i64,
}

impl Default for HoldSweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

impl HoldSweeperConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `KILN_HOLD_SWEEP_ENABLED`: `true`/`1` or `false`/`0` (default: true)
    /// - `KILN_HOLD_SWEEP_INTERVAL_SECS`: seconds between passes (default: 60)
    /// - `KILN_HOLD_SWEEP_BATCH_SIZE`: max rows per batch (default: 100)
    ///
    /// Unset variables take their default; set but malformed ones are errors.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();

        let enabled = match std::env::var("KILN_HOLD_SWEEP_ENABLED") {
            Err(_) => defaults.enabled,
            Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::Invalid(
                        "KILN_HOLD_SWEEP_ENABLED",
                        "must be true, false, 1 or 0",
                    ));
                }
            },
        };

        let poll_interval = match std::env::var("KILN_HOLD_SWEEP_INTERVAL_SECS") {
            Err(_) => defaults.poll_interval,
            Ok(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid(
                        "KILN_HOLD_SWEEP_INTERVAL_SECS",
                        "must be a positive number of seconds",
                    ));
                }
            },
        };

        let batch_size = match std::env::var("KILN_HOLD_SWEEP_BATCH_SIZE") {
            Err(_) => defaults.batch_size,
            Ok(v) => match v.trim().parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid(
                        "KILN_HOLD_SWEEP_BATCH_SIZE",
                        "must be a positive integer",
                    ));
                }
            },
        };

        Ok(Self {
            enabled,
            poll_interval,
            batch_size,
        })
    }
}

/// Counts from one sweeper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Holds marked expired.
    pub holds_expired: u64,
    /// Pending bookings cancelled.
    pub bookings_cancelled: u64,
}

/// Background worker that expires lapsed holds.
pub struct HoldSweeper {
    persistence: Arc<dyn Persistence>,
    config: HoldSweeperConfig,
    shutdown: Arc<Notify>,
}

impl HoldSweeper {
    /// Create a new hold sweeper.
    pub fn new(persistence: Arc<dyn Persistence>, config: HoldSweeperConfig) -> Self {
        Self {
            persistence,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweeper loop until shutdown is signalled.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Hold sweeper disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Hold sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Hold sweeper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Hold sweep failed");
                    }
                }
            }
        }

        info!("Hold sweeper stopped");
    }

    /// Run a single pass.
    pub async fn run_once(&self) -> Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();

        loop {
            let expired = self
                .persistence
                .expire_holds(Utc::now(), self.config.batch_size)
                .await?;
            outcome.holds_expired += expired;
            if expired < self.config.batch_size as u64 {
                break;
            }
        }

        loop {
            let lapsed = self
                .persistence
                .list_pending_bookings_with_lapsed_holds(self.config.batch_size)
                .await?;
            let batch_len = lapsed.len();
            let mut cancelled_in_batch = 0u64;

            for booking in lapsed {
                let cancelled = self
                    .persistence
                    .update_booking_status(
                        &booking.booking_id,
                        BookingStatus::Pending.as_str(),
                        BookingStatus::Cancelled.as_str(),
                        Utc::now(),
                    )
                    .await?;
                if cancelled {
                    cancelled_in_batch += 1;
                    debug!(booking_id = %booking.booking_id, "Cancelled booking with lapsed hold");
                } else {
                    warn!(
                        booking_id = %booking.booking_id,
                        "Booking changed state before it could be cancelled"
                    );
                }
            }

            outcome.bookings_cancelled += cancelled_in_batch;
            // Stop on a short batch, or when nothing in a full batch could be
            // cancelled (it would be returned again).
            if batch_len < self.config.batch_size as usize || cancelled_in_batch == 0 {
                break;
            }
        }

        if outcome != SweepOutcome::default() {
            info!(
                holds_expired = outcome.holds_expired,
                bookings_cancelled = outcome.bookings_cancelled,
                "Hold sweep completed"
            );
        } else {
            debug!("Hold sweep completed, nothing to do");
        }

        Ok(outcome)
    }
}
