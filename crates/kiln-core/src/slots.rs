// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calendar slot aggregation.
//!
//! A slot is the set of bookings for one product that share a `slot_start`.
//! Only bookings in a seat-holding status (pending, confirmed, attended)
//! count towards `booked`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

use crate::persistence::{BookingRecord, ProductRecord};
use crate::status::BookingStatus;

/// Occupancy of one product slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    /// Product the slot belongs to.
    pub product_id: String,
    /// Slot start.
    pub start: DateTime<Utc>,
    /// Slot end (`start + duration_minutes`).
    pub end: DateTime<Utc>,
    /// Seats taken by seat-holding bookings.
    pub booked: i32,
    /// Seats per slot.
    pub capacity: i32,
    /// `max(capacity - booked, 0)`.
    pub remaining: i32,
}

impl Slot {
    /// A slot with no bookings.
    pub fn empty(product: &ProductRecord, start: DateTime<Utc>) -> Self {
        Self::with_booked(product, start, 0)
    }

    fn with_booked(product: &ProductRecord, start: DateTime<Utc>, booked: i32) -> Self {
        Self {
            product_id: product.product_id.clone(),
            start,
            end: start + Duration::minutes(i64::from(product.duration_minutes)),
            booked,
            capacity: product.capacity,
            remaining: (product.capacity - booked).max(0),
        }
    }

    /// Whether `participants` more seats fit.
    pub fn fits(&self, participants: i32) -> bool {
        participants <= self.remaining
    }
}

/// Group seat-holding bookings of `product` into slots, ordered by start.
///
/// Bookings for other products or with an unknown status are ignored.
pub fn aggregate_slots(product: &ProductRecord, bookings: &[BookingRecord]) -> Vec<Slot> {
    let mut booked: BTreeMap<DateTime<Utc>, i32> = BTreeMap::new();

    for booking in bookings {
        if booking.product_id != product.product_id {
            continue;
        }
        let holds_seat = booking
            .status
            .parse::<BookingStatus>()
            .map(|s| s.holds_seat())
            .unwrap_or(false);
        if !holds_seat {
            continue;
        }
        let seats = booked.entry(booking.slot_start).or_insert(0);
        *seats = seats.saturating_add(booking.participants);
    }

    booked
        .into_iter()
        .map(|(start, seats)| Slot::with_booked(product, start, seats))
        .collect()
}

/// Truncate a slot start to the whole minute.
pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::minutes(1)).unwrap_or(at)
}
