// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Booking handlers: availability, creation and lifecycle.
//!
//! ```text
//!            ┌──────── cancel ────────┐
//!            │                        ▼
//! pending ──confirm──► confirmed ──► cancelled
//!                          │
//!                          ├──► attended
//!                          └──► no_show
//! ```
//!
//! Bookings paid by giftcard start as `pending` with a balance hold; the hold
//! is captured on confirmation. Bookings without a giftcard are paid
//! elsewhere and start as `confirmed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::persistence::{BookingRecord, ListBookingsFilter, SeatInsert, SeatReservation};
use crate::slots::{Slot, aggregate_slots, truncate_to_minute};
use crate::status::{BookingStatus, HoldStatus};
use crate::technique::{ProductKind, Technique};

use super::catalog::{get_product, product_technique};
use super::{HandlerState, details_object, giftcard};

/// Input for [`create_booking`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    /// Product to book.
    pub product_id: String,
    /// Customer full name.
    pub customer_name: String,
    /// Customer email.
    pub customer_email: String,
    /// Slot start; truncated to the minute.
    pub slot_start: DateTime<Utc>,
    /// Seats requested.
    pub participants: i32,
    /// Requested technique; defaults to the product's.
    #[serde(default)]
    pub technique: Option<Technique>,
    /// Pay with this giftcard.
    #[serde(default)]
    pub giftcard_code: Option<String>,
    /// Free-form booking data.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Result of [`check_availability`].
#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    /// Current occupancy of the slot.
    pub slot: Slot,
    /// Seats requested.
    pub requested: i32,
    /// Whether the request fits.
    pub available: bool,
}

fn require_future(field: &str, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if at <= now {
        return Err(CoreError::validation(field, "must be in the future"));
    }
    Ok(())
}

async fn require_booking(state: &HandlerState, booking_id: &str) -> Result<BookingRecord> {
    state
        .persistence
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| CoreError::not_found("booking", booking_id))
}

/// Current status of a booking, for errors raised after a guard failed.
async fn current_status(state: &HandlerState, booking_id: &str) -> String {
    match state.persistence.get_booking(booking_id).await {
        Ok(Some(b)) => b.status,
        _ => "unknown".to_string(),
    }
}

/// Occupancy of every booked slot of a product in `[from, to)`.
pub async fn list_slots(
    state: &HandlerState,
    product_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Slot>> {
    if from >= to {
        return Err(CoreError::validation("to", "must be after 'from'"));
    }
    let product = get_product(state, product_id).await?;
    let bookings = state
        .persistence
        .list_seat_holding_bookings(product_id, from, to)
        .await?;

    Ok(aggregate_slots(&product, &bookings))
}

/// Whether `participants` seats are free in the slot starting at `start`.
pub async fn check_availability(
    state: &HandlerState,
    product_id: &str,
    start: DateTime<Utc>,
    participants: i32,
) -> Result<Availability> {
    if participants < 1 {
        return Err(CoreError::validation("participants", "must be at least 1"));
    }
    let start = truncate_to_minute(start);
    let product = get_product(state, product_id).await?;
    let bookings = state
        .persistence
        .list_seat_holding_bookings(product_id, start, start + chrono::Duration::minutes(1))
        .await?;

    let slot = aggregate_slots(&product, &bookings)
        .into_iter()
        .find(|s| s.start == start)
        .unwrap_or_else(|| Slot::empty(&product, start));

    Ok(Availability {
        available: product.active && slot.fits(participants),
        requested: participants,
        slot,
    })
}

/// Create a booking, placing a giftcard hold when paid by giftcard.
///
/// # Errors
///
/// - `VALIDATION_ERROR` for bad input, an inactive product or a merchandise product
/// - `PRODUCT_NOT_FOUND`
/// - `TECHNIQUE_MISMATCH` when the requested technique is not taught
/// - `SLOT_FULL` when the slot has fewer free seats than requested
/// - giftcard errors from placing the hold
#[instrument(
    skip(state, input),
    fields(product_id = %input.product_id, slot_start = %input.slot_start)
)]
pub async fn create_booking(state: &HandlerState, input: NewBooking) -> Result<BookingRecord> {
    let now = Utc::now();

    if input.participants < 1 {
        return Err(CoreError::validation("participants", "must be at least 1"));
    }
    let customer_name = input.customer_name.trim();
    if customer_name.is_empty() {
        return Err(CoreError::validation("customer_name", "must not be empty"));
    }
    let customer_email = input.customer_email.trim();
    if !customer_email.contains('@') {
        return Err(CoreError::validation("customer_email", "must be an email address"));
    }
    let slot_start = truncate_to_minute(input.slot_start);
    require_future("slot_start", slot_start, now)?;
    let details = details_object(input.details)?;

    let product = get_product(state, &input.product_id).await?;
    if !product.active {
        return Err(CoreError::validation("product_id", "product is not active"));
    }
    if !product.kind.parse::<ProductKind>()?.is_bookable() {
        return Err(CoreError::validation("product_id", "product cannot be booked"));
    }

    let offered = product_technique(&product)?;
    if let (Some(offered), Some(requested)) = (offered, input.technique)
        && !offered.accepts(requested)
    {
        return Err(CoreError::TechniqueMismatch {
            product_id: product.product_id.clone(),
            product_technique: offered.as_str().to_string(),
            requested: requested.as_str().to_string(),
        });
    }
    let technique = input.technique.or(offered);

    let price_cents = product
        .price_cents
        .checked_mul(i64::from(input.participants))
        .ok_or_else(|| CoreError::validation("participants", "price overflow"))?;

    let booking_id = Uuid::new_v4().to_string();
    let giftcard_code = input
        .giftcard_code
        .as_deref()
        .map(giftcard::normalize_code)
        .filter(|c| !c.is_empty());

    let hold = match &giftcard_code {
        Some(code) => Some(giftcard::place_hold(state, code, price_cents, Some(&booking_id)).await?),
        None => None,
    };

    let booking = BookingRecord {
        booking_id,
        product_id: product.product_id.clone(),
        customer_name: customer_name.to_string(),
        customer_email: customer_email.to_string(),
        slot_start,
        participants: input.participants,
        status: if hold.is_some() {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        }
        .as_str()
        .to_string(),
        technique: technique.map(|t| t.as_str().to_string()),
        price_cents,
        hold_id: hold.as_ref().map(|h| h.hold_id.clone()),
        giftcard_code,
        details: Json(details),
        created_at: now,
        updated_at: now,
    };

    let outcome = state
        .persistence
        .insert_booking_within_capacity(&booking)
        .await
        .and_then(|insert| match insert {
            SeatInsert::Inserted => Ok(()),
            SeatInsert::Full { remaining } => Err(CoreError::SlotFull {
                product_id: booking.product_id.clone(),
                slot_start,
                remaining,
                requested: booking.participants,
            }),
        });

    if let Err(e) = outcome {
        if let Some(hold) = &hold
            && let Err(release_err) = giftcard::release_hold(state, &hold.hold_id).await
        {
            warn!(
                hold_id = %hold.hold_id,
                error = %release_err,
                "Failed to release hold after booking was rejected"
            );
        }
        return Err(e);
    }

    info!(
        booking_id = %booking.booking_id,
        status = %booking.status,
        participants = booking.participants,
        price_cents = booking.price_cents,
        "Booking created"
    );
    Ok(booking)
}

/// Confirm a pending booking, capturing its giftcard hold.
///
/// If the hold has lapsed the booking is cancelled and `HOLD_EXPIRED` is
/// returned.
#[instrument(skip(state))]
pub async fn confirm_booking(state: &HandlerState, booking_id: &str) -> Result<BookingRecord> {
    let booking = require_booking(state, booking_id).await?;
    let status: BookingStatus = booking.status.parse()?;
    if status != BookingStatus::Pending {
        return Err(CoreError::invalid_state(
            "booking",
            booking_id,
            BookingStatus::Pending.as_str(),
            status.as_str(),
        ));
    }

    let mut captured = None;
    if let Some(hold_id) = &booking.hold_id {
        match giftcard::capture_hold(state, hold_id).await {
            Ok(capture) => captured = Some(capture),
            Err(e @ CoreError::HoldExpired { .. }) => {
                state
                    .persistence
                    .update_booking_status(
                        booking_id,
                        BookingStatus::Pending.as_str(),
                        BookingStatus::Cancelled.as_str(),
                        Utc::now(),
                    )
                    .await?;
                warn!("Booking cancelled because its giftcard hold expired");
                return Err(e);
            }
            Err(e) => return Err(e),
        }
    }

    let confirmed = state
        .persistence
        .update_booking_status(
            booking_id,
            BookingStatus::Pending.as_str(),
            BookingStatus::Confirmed.as_str(),
            Utc::now(),
        )
        .await?;

    if !confirmed {
        if let Some(capture) = &captured {
            giftcard::refund(
                state,
                &capture.giftcard.code,
                capture.hold.amount_cents,
                Some(booking_id),
            )
            .await?;
        }
        return Err(CoreError::invalid_state(
            "booking",
            booking_id,
            BookingStatus::Pending.as_str(),
            current_status(state, booking_id).await,
        ));
    }

    info!("Booking confirmed");
    require_booking(state, booking_id).await
}

/// Cancel a booking.
///
/// Pending bookings give their hold back; confirmed bookings paid by
/// giftcard are refunded to the card. A refund the card no longer accepts
/// (voided, expired) is logged and the booking still ends up cancelled.
#[instrument(skip(state))]
pub async fn cancel_booking(state: &HandlerState, booking_id: &str) -> Result<BookingRecord> {
    let booking = require_booking(state, booking_id).await?;
    let status: BookingStatus = booking.status.parse()?;

    match status {
        BookingStatus::Pending => {
            if let Some(hold_id) = &booking.hold_id {
                giftcard::release_hold(state, hold_id).await?;
            }
            let cancelled = state
                .persistence
                .update_booking_status(
                    booking_id,
                    BookingStatus::Pending.as_str(),
                    BookingStatus::Cancelled.as_str(),
                    Utc::now(),
                )
                .await?;
            if !cancelled {
                return Err(CoreError::invalid_state(
                    "booking",
                    booking_id,
                    BookingStatus::Pending.as_str(),
                    current_status(state, booking_id).await,
                ));
            }
        }
        BookingStatus::Confirmed => {
            let cancelled = state
                .persistence
                .update_booking_status(
                    booking_id,
                    BookingStatus::Confirmed.as_str(),
                    BookingStatus::Cancelled.as_str(),
                    Utc::now(),
                )
                .await?;
            if !cancelled {
                return Err(CoreError::invalid_state(
                    "booking",
                    booking_id,
                    BookingStatus::Confirmed.as_str(),
                    current_status(state, booking_id).await,
                ));
            }

            if let Some(hold_id) = &booking.hold_id
                && let Some(hold) = state.persistence.get_hold(hold_id).await?
                && hold.status == HoldStatus::Captured.as_str()
            {
                // Cancellation is committed; refund failures are logged, not returned
                match giftcard::refund(
                    state,
                    &hold.giftcard_code,
                    hold.amount_cents,
                    Some(booking_id),
                )
                .await
                {
                    Ok(card) => info!(
                        code = %card.code,
                        amount_cents = hold.amount_cents,
                        "Cancelled booking refunded to giftcard"
                    ),
                    Err(e) => warn!(
                        code = %hold.giftcard_code,
                        amount_cents = hold.amount_cents,
                        error_code = e.error_code(),
                        error = %e,
                        "Cancelled booking could not be refunded to giftcard"
                    ),
                }
            }
        }
        other => {
            return Err(CoreError::invalid_state(
                "booking",
                booking_id,
                "pending or confirmed",
                other.as_str(),
            ));
        }
    }

    info!("Booking cancelled");
    require_booking(state, booking_id).await
}

/// Record whether the customer showed up.
#[instrument(skip(state))]
pub async fn mark_attendance(
    state: &HandlerState,
    booking_id: &str,
    attended: bool,
) -> Result<BookingRecord> {
    let booking = require_booking(state, booking_id).await?;
    let status: BookingStatus = booking.status.parse()?;
    if status != BookingStatus::Confirmed {
        return Err(CoreError::invalid_state(
            "booking",
            booking_id,
            BookingStatus::Confirmed.as_str(),
            status.as_str(),
        ));
    }

    let to = if attended {
        BookingStatus::Attended
    } else {
        BookingStatus::NoShow
    };
    let updated = state
        .persistence
        .update_booking_status(
            booking_id,
            BookingStatus::Confirmed.as_str(),
            to.as_str(),
            Utc::now(),
        )
        .await?;
    if !updated {
        return Err(CoreError::invalid_state(
            "booking",
            booking_id,
            BookingStatus::Confirmed.as_str(),
            current_status(state, booking_id).await,
        ));
    }

    info!(status = %to, "Attendance recorded");
    require_booking(state, booking_id).await
}

/// Move a pending or confirmed booking to another slot of the same product.
#[instrument(skip(state))]
pub async fn reschedule_booking(
    state: &HandlerState,
    booking_id: &str,
    new_start: DateTime<Utc>,
) -> Result<BookingRecord> {
    let now = Utc::now();
    let new_start = truncate_to_minute(new_start);
    require_future("slot_start", new_start, now)?;

    let booking = require_booking(state, booking_id).await?;
    let status: BookingStatus = booking.status.parse()?;
    if !matches!(status, BookingStatus::Pending | BookingStatus::Confirmed) {
        return Err(CoreError::invalid_state(
            "booking",
            booking_id,
            "pending or confirmed",
            status.as_str(),
        ));
    }

    match state
        .persistence
        .reschedule_booking_within_capacity(booking_id, status.as_str(), new_start, now)
        .await?
    {
        SeatReservation::Reserved => {}
        SeatReservation::Full { remaining } => {
            return Err(CoreError::SlotFull {
                product_id: booking.product_id,
                slot_start: new_start,
                remaining,
                requested: booking.participants,
            });
        }
        SeatReservation::Stale => {
            return Err(CoreError::invalid_state(
                "booking",
                booking_id,
                status.as_str(),
                current_status(state, booking_id).await,
            ));
        }
    }

    info!(
        from = %booking.slot_start,
        to = %new_start,
        "Booking rescheduled"
    );
    require_booking(state, booking_id).await
}

/// Get a booking by ID.
pub async fn get_booking(state: &HandlerState, booking_id: &str) -> Result<BookingRecord> {
    require_booking(state, booking_id).await
}

/// List bookings matching `filter`.
pub async fn list_bookings(
    state: &HandlerState,
    filter: &ListBookingsFilter,
) -> Result<Vec<BookingRecord>> {
    if let Some(status) = &filter.status {
        status.parse::<BookingStatus>()?;
    }
    if let Some(limit) = filter.limit
        && limit < 1
    {
        return Err(CoreError::validation("limit", "must be at least 1"));
    }
    state.persistence.list_bookings(filter).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::catalog::{NewProduct, create_product, set_product_active};
    use crate::handlers::giftcard::{IssueGiftcard, get_balance, issue_giftcard, void_giftcard};
    use crate::handlers::test_support::test_state;
    use crate::persistence::ProductRecord;
    use chrono::{Duration, Timelike};

    async fn product(state: &HandlerState, name: &str, capacity: i32) -> ProductRecord {
        create_product(
            state,
            NewProduct {
                name: name.to_string(),
                kind: ProductKind::Class,
                technique: None,
                price_cents: 2_500,
                capacity,
                duration_minutes: 120,
                details: None,
            },
        )
        .await
        .unwrap()
    }

    async fn card(state: &HandlerState, amount_cents: i64) -> String {
        issue_giftcard(
            state,
            IssueGiftcard {
                amount_cents,
                purchaser_name: "Luis".to_string(),
                recipient_name: None,
                recipient_email: None,
                message: None,
            },
        )
        .await
        .unwrap()
        .code
    }

    fn tomorrow() -> DateTime<Utc> {
        truncate_to_minute(Utc::now() + Duration::days(1))
    }

    fn request(product_id: &str, slot_start: DateTime<Utc>, participants: i32) -> NewBooking {
        NewBooking {
            product_id: product_id.to_string(),
            customer_name: "Ana García".to_string(),
            customer_email: "ana@example.com".to_string(),
            slot_start,
            participants,
            technique: None,
            giftcard_code: None,
            details: Some(serde_json::json!({"source": "web"})),
        }
    }

    #[tokio::test]
    async fn test_create_booking_without_giftcard_is_confirmed() {
        let state = test_state().await;
        let p = product(&state, "Clase de Torno", 6).await;

        let start = tomorrow() + Duration::seconds(42);
        let booking = create_booking(&state, request(&p.product_id, start, 2))
            .await
            .unwrap();

        assert_eq!(booking.status, "confirmed");
        assert_eq!(booking.price_cents, 5_000);
        assert_eq!(booking.technique.as_deref(), Some("wheel"));
        assert_eq!(booking.slot_start.second(), 0);
        assert_eq!(booking.details.0["source"], "web");
    }

    #[tokio::test]
    async fn test_create_booking_validation() {
        let state = test_state().await;
        let p = product(&state, "Torno", 6).await;

        let past = request(&p.product_id, Utc::now() - Duration::hours(1), 1);
        assert!(matches!(
            create_booking(&state, past).await.unwrap_err(),
            CoreError::ValidationError { ref field, .. } if field == "slot_start"
        ));

        assert!(create_booking(&state, request(&p.product_id, tomorrow(), 0)).await.is_err());

        let mut bad_email = request(&p.product_id, tomorrow(), 1);
        bad_email.customer_email = "ana".to_string();
        assert!(create_booking(&state, bad_email).await.is_err());

        assert_eq!(
            create_booking(&state, request("missing", tomorrow(), 1))
                .await
                .unwrap_err()
                .error_code(),
            "PRODUCT_NOT_FOUND"
        );

        set_product_active(&state, &p.product_id, false).await.unwrap();
        assert_eq!(
            create_booking(&state, request(&p.product_id, tomorrow(), 1))
                .await
                .unwrap_err()
                .error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[tokio::test]
    async fn test_merchandise_not_bookable() {
        let state = test_state().await;
        let mug = create_product(
            &state,
            NewProduct {
                name: "Mug".to_string(),
                kind: ProductKind::Merchandise,
                technique: None,
                price_cents: 1_500,
                capacity: 100,
                duration_minutes: 1,
                details: None,
            },
        )
        .await
        .unwrap();

        let err = create_booking(&state, request(&mug.product_id, tomorrow(), 1))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_technique_mismatch() {
        let state = test_state().await;
        let wheel = product(&state, "Torno", 6).await;
        let mixed = product(&state, "Torno y pintura", 6).await;

        let mut req = request(&wheel.product_id, tomorrow(), 1);
        req.technique = Some(Technique::Painting);
        assert_eq!(
            create_booking(&state, req).await.unwrap_err().error_code(),
            "TECHNIQUE_MISMATCH"
        );

        let mut req = request(&mixed.product_id, tomorrow(), 1);
        req.technique = Some(Technique::Painting);
        let booking = create_booking(&state, req).await.unwrap();
        assert_eq!(booking.technique.as_deref(), Some("painting"));
    }

    #[tokio::test]
    async fn test_slot_full() {
        let state = test_state().await;
        let p = product(&state, "Torno", 4).await;
        let start = tomorrow();

        create_booking(&state, request(&p.product_id, start, 3)).await.unwrap();
        match create_booking(&state, request(&p.product_id, start, 2))
            .await
            .unwrap_err()
        {
            CoreError::SlotFull {
                remaining,
                requested,
                ..
            } => {
                assert_eq!(remaining, 1);
                assert_eq!(requested, 2);
            }
            other => panic!("Expected SlotFull, got {:?}", other),
        }

        let availability = check_availability(&state, &p.product_id, start, 1)
            .await
            .unwrap();
        assert!(availability.available);
        assert_eq!(availability.slot.booked, 3);
        let availability = check_availability(&state, &p.product_id, start, 2)
            .await
            .unwrap();
        assert!(!availability.available);
    }

    #[tokio::test]
    async fn test_full_slot_releases_giftcard_hold() {
        let state = test_state().await;
        let p = product(&state, "Torno", 1).await;
        let code = card(&state, 10_000).await;
        let start = tomorrow();

        create_booking(&state, request(&p.product_id, start, 1)).await.unwrap();

        let mut req = request(&p.product_id, start, 1);
        req.giftcard_code = Some(code.clone());
        assert_eq!(
            create_booking(&state, req).await.unwrap_err().error_code(),
            "SLOT_FULL"
        );

        let balance = get_balance(&state, &code).await.unwrap();
        assert_eq!(balance.held_cents, 0);
        assert_eq!(balance.available_cents, 10_000);
    }

    #[tokio::test]
    async fn test_giftcard_booking_confirm_and_cancel_refunds() {
        let state = test_state().await;
        let p = product(&state, "Torno", 6).await;
        let code = card(&state, 10_000).await;

        let mut req = request(&p.product_id, tomorrow(), 2);
        req.giftcard_code = Some(code.to_lowercase());
        let booking = create_booking(&state, req).await.unwrap();
        assert_eq!(booking.status, "pending");
        assert_eq!(booking.giftcard_code.as_deref(), Some(code.as_str()));
        assert_eq!(get_balance(&state, &code).await.unwrap().held_cents, 5_000);

        let confirmed = confirm_booking(&state, &booking.booking_id).await.unwrap();
        assert_eq!(confirmed.status, "confirmed");
        let balance = get_balance(&state, &code).await.unwrap();
        assert_eq!(balance.balance_cents, 5_000);
        assert_eq!(balance.held_cents, 0);

        let cancelled = cancel_booking(&state, &booking.booking_id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert_eq!(get_balance(&state, &code).await.unwrap().balance_cents, 10_000);

        assert_eq!(
            cancel_booking(&state, &booking.booking_id)
                .await
                .unwrap_err()
                .error_code(),
            "INVALID_STATE"
        );
    }

    #[tokio::test]
    async fn test_cancel_confirmed_booking_on_voided_card() {
        let state = test_state().await;
        let p = product(&state, "Torno", 6).await;
        let code = card(&state, 10_000).await;

        let mut req = request(&p.product_id, tomorrow(), 2);
        req.giftcard_code = Some(code.clone());
        let booking = create_booking(&state, req).await.unwrap();
        confirm_booking(&state, &booking.booking_id).await.unwrap();
        void_giftcard(&state, &code).await.unwrap();

        let cancelled = cancel_booking(&state, &booking.booking_id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert_eq!(
            get_booking(&state, &booking.booking_id).await.unwrap().status,
            "cancelled"
        );

        // Nothing was credited back to the void card
        let balance = get_balance(&state, &code).await.unwrap();
        assert_eq!(balance.status, "void");
        assert_eq!(balance.balance_cents, 0);

        // Seats are free again
        let again = create_booking(&state, request(&p.product_id, tomorrow(), 6)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_pending_releases_hold() {
        let state = test_state().await;
        let p = product(&state, "Torno", 6).await;
        let code = card(&state, 10_000).await;

        let mut req = request(&p.product_id, tomorrow(), 1);
        req.giftcard_code = Some(code.clone());
        let booking = create_booking(&state, req).await.unwrap();

        cancel_booking(&state, &booking.booking_id).await.unwrap();
        let balance = get_balance(&state, &code).await.unwrap();
        assert_eq!(balance.held_cents, 0);
        assert_eq!(balance.balance_cents, 10_000);
    }

    #[tokio::test]
    async fn test_confirm_with_expired_hold_cancels_booking() {
        let state = test_state().await.with_hold_ttl(Duration::milliseconds(-1));
        let p = product(&state, "Torno", 6).await;
        let code = card(&state, 10_000).await;

        let mut req = request(&p.product_id, tomorrow(), 1);
        req.giftcard_code = Some(code);
        let booking = create_booking(&state, req).await.unwrap();

        assert_eq!(
            confirm_booking(&state, &booking.booking_id)
                .await
                .unwrap_err()
                .error_code(),
            "HOLD_EXPIRED"
        );
        assert_eq!(
            get_booking(&state, &booking.booking_id).await.unwrap().status,
            "cancelled"
        );
    }

    #[tokio::test]
    async fn test_giftcard_without_enough_balance() {
        let state = test_state().await;
        let p = product(&state, "Torno", 6).await;
        let code = card(&state, 1_000).await;

        let mut req = request(&p.product_id, tomorrow(), 1);
        req.giftcard_code = Some(code);
        assert_eq!(
            create_booking(&state, req).await.unwrap_err().error_code(),
            "INSUFFICIENT_BALANCE"
        );
        assert!(
            list_bookings(&state, &ListBookingsFilter::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_attendance_only_from_confirmed() {
        let state = test_state().await;
        let p = product(&state, "Torno", 6).await;
        let booking = create_booking(&state, request(&p.product_id, tomorrow(), 1))
            .await
            .unwrap();

        let attended = mark_attendance(&state, &booking.booking_id, false).await.unwrap();
        assert_eq!(attended.status, "no_show");

        assert_eq!(
            mark_attendance(&state, &booking.booking_id, true)
                .await
                .unwrap_err()
                .error_code(),
            "INVALID_STATE"
        );
    }

    #[tokio::test]
    async fn test_reschedule() {
        let state = test_state().await;
        let p = product(&state, "Torno", 3).await;
        let first = tomorrow();
        let second = first + Duration::hours(3);

        let mine = create_booking(&state, request(&p.product_id, first, 2)).await.unwrap();
        create_booking(&state, request(&p.product_id, second, 2)).await.unwrap();

        assert_eq!(
            reschedule_booking(&state, &mine.booking_id, second)
                .await
                .unwrap_err()
                .error_code(),
            "SLOT_FULL"
        );

        let third = second + Duration::hours(3);
        let moved = reschedule_booking(&state, &mine.booking_id, third).await.unwrap();
        assert_eq!(moved.slot_start, third);

        let slots = list_slots(&state, &p.product_id, first, third + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start, second);
        assert_eq!(slots[1].start, third);

        cancel_booking(&state, &mine.booking_id).await.unwrap();
        assert_eq!(
            reschedule_booking(&state, &mine.booking_id, first)
                .await
                .unwrap_err()
                .error_code(),
            "INVALID_STATE"
        );
    }

    #[tokio::test]
    async fn test_list_bookings_rejects_unknown_status() {
        let state = test_state().await;
        let filter = ListBookingsFilter {
            status: Some("shipped".to_string()),
            ..Default::default()
        };
        assert_eq!(
            list_bookings(&state, &filter).await.unwrap_err().error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[tokio::test]
    async fn test_list_slots_requires_ordered_range() {
        let state = test_state().await;
        let p = product(&state, "Torno", 3).await;
        let at = tomorrow();
        assert!(list_slots(&state, &p.product_id, at, at).await.is_err());
    }
}
