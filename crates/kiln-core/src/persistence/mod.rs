// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for kiln-core.
//!
//! This module defines the persistence abstraction and backend implementations.
//! Handlers build fully-formed records (IDs, timestamps) and hand them to the
//! backend; operations that must be atomic (seat reservation, balance holds,
//! captures) are single trait methods so each backend can use whatever locking
//! its database offers.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;

use crate::error::CoreError;

/// Product record from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRecord {
    /// Unique identifier for the product.
    pub product_id: String,
    /// Display name, e.g. "Clase de Torno".
    pub name: String,
    /// Product kind (class, workshop, open_studio, merchandise).
    pub kind: String,
    /// Technique taught, if known.
    pub technique: Option<String>,
    /// Price per participant.
    pub price_cents: i64,
    /// Seats per slot.
    pub capacity: i32,
    /// Length of one slot.
    pub duration_minutes: i32,
    /// Whether the product can be booked.
    pub active: bool,
    /// Free-form product data (description, materials, age range, ...).
    pub details: Json<serde_json::Value>,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
}

/// Booking record from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookingRecord {
    /// Unique identifier for the booking.
    pub booking_id: String,
    /// Product being booked.
    pub product_id: String,
    /// Customer full name.
    pub customer_name: String,
    /// Customer email.
    pub customer_email: String,
    /// Start of the slot, truncated to the minute.
    pub slot_start: DateTime<Utc>,
    /// Seats taken.
    pub participants: i32,
    /// Current status (pending, confirmed, cancelled, attended, no_show).
    pub status: String,
    /// Technique for this booking.
    pub technique: Option<String>,
    /// Total price for all participants.
    pub price_cents: i64,
    /// Giftcard hold paying for the booking.
    pub hold_id: Option<String>,
    /// Giftcard paying for the booking.
    pub giftcard_code: Option<String>,
    /// Free-form booking data (notes, dietary info, source channel, ...).
    pub details: Json<serde_json::Value>,
    /// When the booking was created.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Giftcard record from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GiftcardRecord {
    /// Redemption code (`KILN-XXXX-XXXX`).
    pub code: String,
    /// Amount loaded at issue.
    pub initial_cents: i64,
    /// Current balance (captured and redeemed amounts already deducted).
    pub balance_cents: i64,
    /// Status (active, void).
    pub status: String,
    /// Who bought the card.
    pub purchaser_name: String,
    /// Who receives the card.
    pub recipient_name: Option<String>,
    /// Where the card is sent.
    pub recipient_email: Option<String>,
    /// Dedication printed on the card.
    pub message: Option<String>,
    /// After this time the card cannot be spent.
    pub expires_at: DateTime<Utc>,
    /// When the card was issued.
    pub created_at: DateTime<Utc>,
}

/// Balance hold record from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HoldRecord {
    /// Unique identifier for the hold.
    pub hold_id: String,
    /// Giftcard the balance is reserved on.
    pub giftcard_code: String,
    /// Reserved amount.
    pub amount_cents: i64,
    /// Status (active, captured, released, expired).
    pub status: String,
    /// Caller reference, usually a booking ID.
    pub reference: Option<String>,
    /// When the reservation lapses if not captured.
    pub expires_at: DateTime<Utc>,
    /// When the hold was placed.
    pub created_at: DateTime<Utc>,
    /// When the hold left the active state.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Giftcard ledger entry from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TransactionRecord {
    /// Database primary key.
    pub id: i64,
    /// Giftcard this entry belongs to.
    pub giftcard_code: String,
    /// Entry kind (issue, capture, redeem, refund, void).
    pub kind: String,
    /// Signed balance change.
    pub amount_cents: i64,
    /// Balance after the entry was applied.
    pub balance_after_cents: i64,
    /// Caller reference.
    pub reference: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Employee record from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmployeeRecord {
    /// Unique identifier for the employee.
    pub employee_id: String,
    /// Full name.
    pub name: String,
    /// Contact email.
    pub email: Option<String>,
    /// Job role (instructor, front desk, ...).
    pub role: Option<String>,
    /// Hourly pay.
    pub hourly_rate_cents: i64,
    /// Inactive employees cannot clock in.
    pub active: bool,
    /// When the employee was added.
    pub created_at: DateTime<Utc>,
}

/// Time entry record from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TimeEntryRecord {
    /// Unique identifier for the entry.
    pub entry_id: String,
    /// Employee who clocked in.
    pub employee_id: String,
    /// Shift start.
    pub clock_in: DateTime<Utc>,
    /// Shift end; `None` while the employee is clocked in.
    pub clock_out: Option<DateTime<Utc>>,
    /// Optional note.
    pub note: Option<String>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

/// Delivery record from the persistence layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeliveryRecord {
    /// Unique identifier for the delivery.
    pub delivery_id: String,
    /// Booking the pieces were made in.
    pub booking_id: Option<String>,
    /// Customer picking the pieces up.
    pub customer_name: String,
    /// Where to notify the customer.
    pub customer_email: Option<String>,
    /// Number of pieces.
    pub pieces: i32,
    /// Status (firing, glazing, ready, picked_up, cancelled).
    pub status: String,
    /// Studio notes.
    pub notes: Option<String>,
    /// When the pieces became ready.
    pub ready_at: Option<DateTime<Utc>>,
    /// When the customer collected them.
    pub picked_up_at: Option<DateTime<Utc>>,
    /// When the delivery was created.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Outcome of inserting a new booking into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatInsert {
    /// The booking was stored.
    Inserted,
    /// The slot does not have enough seats; nothing was written.
    Full {
        /// Seats still free in the slot.
        remaining: i32,
    },
}

/// Outcome of moving an existing booking to another slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatReservation {
    /// Seats were taken.
    Reserved,
    /// The slot does not have enough seats.
    Full {
        /// Seats still free in the slot.
        remaining: i32,
    },
    /// The booking changed state concurrently.
    Stale,
}

/// Filter options for listing bookings.
#[derive(Debug, Clone, Default)]
pub struct ListBookingsFilter {
    /// Only bookings for this product.
    pub product_id: Option<String>,
    /// Only bookings in this status.
    pub status: Option<String>,
    /// Only bookings for this customer.
    pub customer_email: Option<String>,
    /// Slots starting at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Slots starting before this time.
    pub to: Option<DateTime<Utc>>,
    /// Maximum rows returned.
    pub limit: Option<i64>,
}

/// Guarded status change for a delivery.
#[derive(Debug, Clone)]
pub struct DeliveryTransition<'a> {
    /// Delivery to update.
    pub delivery_id: &'a str,
    /// Status observed before the change.
    pub expected: &'a str,
    /// New status.
    pub to: &'a str,
    /// Set when entering `ready`.
    pub ready_at: Option<DateTime<Utc>>,
    /// Set when entering `picked_up`.
    pub picked_up_at: Option<DateTime<Utc>>,
    /// Update timestamp.
    pub now: DateTime<Utc>,
}

/// Persistence interface used by the studio handlers.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn health_check(&self) -> Result<bool, CoreError>;

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    async fn insert_product(&self, product: &ProductRecord) -> Result<(), CoreError>;

    async fn get_product(&self, product_id: &str) -> Result<Option<ProductRecord>, CoreError>;

    async fn list_products(&self, active_only: bool) -> Result<Vec<ProductRecord>, CoreError>;

    /// Returns false when the product does not exist.
    async fn set_product_active(&self, product_id: &str, active: bool)
    -> Result<bool, CoreError>;

    // ------------------------------------------------------------------
    // Bookings
    // ------------------------------------------------------------------

    /// Insert a booking if its slot still has room for `booking.participants`.
    ///
    /// The capacity check and the insert happen atomically with respect to
    /// other reservations for the same product.
    async fn insert_booking_within_capacity(
        &self,
        booking: &BookingRecord,
    ) -> Result<SeatInsert, CoreError>;

    /// Move a booking to a new slot if it is still in `expected_status` and
    /// the new slot has room (excluding the booking's own seats).
    async fn reschedule_booking_within_capacity(
        &self,
        booking_id: &str,
        expected_status: &str,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SeatReservation, CoreError>;

    async fn get_booking(&self, booking_id: &str) -> Result<Option<BookingRecord>, CoreError>;

    async fn list_bookings(
        &self,
        filter: &ListBookingsFilter,
    ) -> Result<Vec<BookingRecord>, CoreError>;

    /// Bookings that occupy seats in `[from, to)` for a product.
    async fn list_seat_holding_bookings(
        &self,
        product_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookingRecord>, CoreError>;

    /// Change status only if the booking is still in `expected`.
    /// Returns false when the guard did not match.
    async fn update_booking_status(
        &self,
        booking_id: &str,
        expected: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError>;

    async fn list_bookings_missing_technique(&self) -> Result<Vec<BookingRecord>, CoreError>;

    async fn set_booking_technique(
        &self,
        booking_id: &str,
        technique: &str,
    ) -> Result<bool, CoreError>;

    /// Pending bookings whose giftcard hold is no longer active.
    async fn list_pending_bookings_with_lapsed_holds(
        &self,
        limit: i64,
    ) -> Result<Vec<BookingRecord>, CoreError>;

    // ------------------------------------------------------------------
    // Giftcards
    // ------------------------------------------------------------------

    /// Insert a giftcard together with its `issue` ledger entry.
    async fn insert_giftcard(&self, giftcard: &GiftcardRecord) -> Result<(), CoreError>;

    async fn get_giftcard(&self, code: &str) -> Result<Option<GiftcardRecord>, CoreError>;

    /// Sum of active, unexpired holds on a giftcard.
    async fn held_cents(&self, code: &str, now: DateTime<Utc>) -> Result<i64, CoreError>;

    /// Reserve balance. Fails with `InsufficientBalance` when the available
    /// balance at `now` is below `hold.amount_cents`.
    async fn place_hold(&self, hold: &HoldRecord, now: DateTime<Utc>) -> Result<(), CoreError>;

    async fn get_hold(&self, hold_id: &str) -> Result<Option<HoldRecord>, CoreError>;

    async fn list_holds(&self, code: &str) -> Result<Vec<HoldRecord>, CoreError>;

    /// Deduct an active hold from the balance. An expired hold is marked
    /// expired and `HoldExpired` is returned.
    async fn capture_hold(
        &self,
        hold_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(HoldRecord, GiftcardRecord), CoreError>;

    /// Release an active hold. Released and expired holds are returned as-is.
    async fn release_hold(&self, hold_id: &str, now: DateTime<Utc>)
    -> Result<HoldRecord, CoreError>;

    /// Deduct immediately against the available balance.
    async fn redeem(
        &self,
        code: &str,
        amount_cents: i64,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GiftcardRecord, CoreError>;

    /// Credit the balance, capped at the initial amount.
    async fn refund(
        &self,
        code: &str,
        amount_cents: i64,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GiftcardRecord, CoreError>;

    /// Void the card and release its active holds.
    async fn void_giftcard(&self, code: &str, now: DateTime<Utc>)
    -> Result<GiftcardRecord, CoreError>;

    async fn list_transactions(&self, code: &str) -> Result<Vec<TransactionRecord>, CoreError>;

    /// Mark up to `limit` lapsed active holds as expired.
    async fn expire_holds(&self, now: DateTime<Utc>, limit: i64) -> Result<u64, CoreError>;

    // ------------------------------------------------------------------
    // Timecards
    // ------------------------------------------------------------------

    async fn insert_employee(&self, employee: &EmployeeRecord) -> Result<(), CoreError>;

    async fn get_employee(&self, employee_id: &str) -> Result<Option<EmployeeRecord>, CoreError>;

    async fn list_employees(&self, active_only: bool) -> Result<Vec<EmployeeRecord>, CoreError>;

    async fn set_employee_active(
        &self,
        employee_id: &str,
        active: bool,
    ) -> Result<bool, CoreError>;

    /// Insert an open entry. Fails with `AlreadyClockedIn` if one exists.
    async fn open_time_entry(&self, entry: &TimeEntryRecord) -> Result<(), CoreError>;

    /// Close the employee's open entry, if any.
    async fn close_open_time_entry(
        &self,
        employee_id: &str,
        clock_out: DateTime<Utc>,
    ) -> Result<Option<TimeEntryRecord>, CoreError>;

    async fn get_time_entry(&self, entry_id: &str) -> Result<Option<TimeEntryRecord>, CoreError>;

    async fn update_time_entry(
        &self,
        entry_id: &str,
        clock_in: DateTime<Utc>,
        clock_out: Option<DateTime<Utc>>,
    ) -> Result<bool, CoreError>;

    /// Entries overlapping `[from, to)`, optionally for a single employee.
    async fn list_time_entries(
        &self,
        employee_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntryRecord>, CoreError>;

    // ------------------------------------------------------------------
    // Deliveries
    // ------------------------------------------------------------------

    async fn insert_delivery(&self, delivery: &DeliveryRecord) -> Result<(), CoreError>;

    async fn get_delivery(&self, delivery_id: &str) -> Result<Option<DeliveryRecord>, CoreError>;

    async fn list_deliveries(&self, status: Option<&str>)
    -> Result<Vec<DeliveryRecord>, CoreError>;

    /// Returns false when the delivery is no longer in `transition.expected`.
    async fn update_delivery_status(
        &self,
        transition: &DeliveryTransition<'_>,
    ) -> Result<bool, CoreError>;

    /// Ready deliveries whose `ready_at` is before `ready_before`.
    async fn list_uncollected_deliveries(
        &self,
        ready_before: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, CoreError>;
}

/// Check giftcard usability at `now`.
pub(crate) fn ensure_spendable(card: &GiftcardRecord, now: DateTime<Utc>) -> Result<(), CoreError> {
    if card.status != "active" {
        return Err(CoreError::GiftcardInactive {
            code: card.code.clone(),
            reason: card.status.clone(),
        });
    }
    if card.expires_at <= now {
        return Err(CoreError::GiftcardInactive {
            code: card.code.clone(),
            reason: "expired".to_string(),
        });
    }
    Ok(())
}
