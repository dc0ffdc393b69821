// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kiln Core - Pottery Studio Backend
//!
//! This crate holds the business logic of the studio: the class catalog,
//! bookings with per-slot capacity, giftcards with expiring balance holds,
//! employee timecards and tracking of finished pieces. All state lives in a
//! relational store, PostgreSQL or SQLite, behind the [`persistence::Persistence`]
//! trait.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 kiln-server                    │
//! │        (axum HTTP API, JSON envelope)          │
//! └───────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌───────────────────────────────────────────────┐      ┌──────────────┐
//! │             kiln-core handlers                 │◄─────│ HoldSweeper  │
//! │ catalog · booking · giftcard · timecard ·      │      │ (background) │
//! │ delivery                                       │      └──────────────┘
//! └───────────────────────────────────────────────┘
//!                         │ Arc<dyn Persistence>
//!                         ▼
//! ┌──────────────────────┐  ┌─────────────────────┐
//! │ PostgresPersistence  │  │ SqlitePersistence   │
//! │ (FOR UPDATE locks)   │  │ (conditional writes)│
//! └──────────────────────┘  └─────────────────────┘
//! ```
//!
//! # Atomic Operations
//!
//! | Operation | Guarantee |
//! |-----------|-----------|
//! | `insert_booking_within_capacity` | Seats in a slot never exceed product capacity |
//! | `place_hold` | Active holds never exceed the card balance |
//! | `capture_hold` | Balance deduction, hold status and ledger entry commit together |
//! | `open_time_entry` | At most one open entry per employee (partial unique index) |
//!
//! # Booking Status State Machine
//!
//! ```text
//!   pending ──confirm──► confirmed ──► attended
//!      │                    │    └───► no_show
//!      └──────cancel────────┴───► cancelled
//! ```
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `KILN_DATABASE_URL` | Yes | - | `postgres://...` or `sqlite:...` |
//! | `KILN_MAX_DB_CONNECTIONS` | No | `10` | Pool size |
//! | `KILN_HOLD_TTL_SECS` | No | `900` | Giftcard hold lifetime |
//! | `KILN_GIFTCARD_VALIDITY_DAYS` | No | `365` | Giftcard expiry after issue |
//! | `KILN_HOLD_SWEEP_ENABLED` | No | `true` | Run the hold sweeper |
//! | `KILN_HOLD_SWEEP_INTERVAL_SECS` | No | `60` | Sweeper period |
//! | `KILN_HOLD_SWEEP_BATCH_SIZE` | No | `100` | Rows per sweeper batch |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types with stable error codes
//! - [`handlers`]: Domain operations
//! - [`hold_sweeper`]: Background expiry of lapsed holds
//! - [`migrations`]: Embedded schema migrations
//! - [`persistence`]: Storage trait, records and backends
//! - [`slots`]: Slot aggregation
//! - [`status`], [`technique`]: Column enums
//! - [`timesheet`]: Worked-time arithmetic

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types with stable machine-readable codes.
pub mod error;

/// Domain handlers for catalog, bookings, giftcards, timecards and deliveries.
pub mod handlers;

/// Background worker that expires lapsed giftcard holds.
pub mod hold_sweeper;

/// Embedded database migrations.
pub mod migrations;

/// Persistence trait, records and the Postgres/SQLite backends.
pub mod persistence;

/// Slot aggregation over bookings.
pub mod slots;

/// Status enums stored as text columns.
pub mod status;

/// Techniques and product kinds.
pub mod technique;

/// Worked-time and pay computation.
pub mod timesheet;

pub use error::{CoreError, Result};
pub use handlers::HandlerState;
