// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delivery handlers: tracking finished pieces until pickup.

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::persistence::{DeliveryRecord, DeliveryTransition};
use crate::status::DeliveryStatus;

use super::HandlerState;

/// Input for [`create_delivery`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewDelivery {
    /// Booking the pieces were made in.
    #[serde(default)]
    pub booking_id: Option<String>,
    /// Defaults to the booking's customer.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Defaults to the booking's customer.
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Number of pieces.
    pub pieces: i32,
    /// Studio notes.
    #[serde(default)]
    pub notes: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Start tracking pieces; they enter the kiln as `firing`.
#[instrument(skip(state, input), fields(booking_id = ?input.booking_id))]
pub async fn create_delivery(state: &HandlerState, input: NewDelivery) -> Result<DeliveryRecord> {
    if input.pieces < 1 {
        return Err(CoreError::validation("pieces", "must be at least 1"));
    }

    let booking_id = trimmed(input.booking_id);
    let booking = match &booking_id {
        Some(id) => Some(
            state
                .persistence
                .get_booking(id)
                .await?
                .ok_or_else(|| CoreError::not_found("booking", id))?,
        ),
        None => None,
    };

    let customer_name = trimmed(input.customer_name)
        .or_else(|| booking.as_ref().map(|b| b.customer_name.clone()))
        .ok_or_else(|| CoreError::validation("customer_name", "required without a booking"))?;
    let customer_email =
        trimmed(input.customer_email).or_else(|| booking.as_ref().map(|b| b.customer_email.clone()));

    let now = Utc::now();
    let delivery = DeliveryRecord {
        delivery_id: Uuid::new_v4().to_string(),
        booking_id,
        customer_name,
        customer_email,
        pieces: input.pieces,
        status: DeliveryStatus::Firing.as_str().to_string(),
        notes: trimmed(input.notes),
        ready_at: None,
        picked_up_at: None,
        created_at: now,
        updated_at: now,
    };

    state.persistence.insert_delivery(&delivery).await?;

    info!(
        delivery_id = %delivery.delivery_id,
        pieces = delivery.pieces,
        "Delivery created"
    );
    Ok(delivery)
}

/// Get a delivery by ID.
pub async fn get_delivery(state: &HandlerState, delivery_id: &str) -> Result<DeliveryRecord> {
    state
        .persistence
        .get_delivery(delivery_id)
        .await?
        .ok_or_else(|| CoreError::not_found("delivery", delivery_id))
}

/// List deliveries, optionally in one status.
pub async fn list_deliveries(
    state: &HandlerState,
    status: Option<DeliveryStatus>,
) -> Result<Vec<DeliveryRecord>> {
    state
        .persistence
        .list_deliveries(status.as_ref().map(DeliveryStatus::as_str))
        .await
}

/// Move a delivery to its next status.
#[instrument(skip(state))]
pub async fn advance_delivery(
    state: &HandlerState,
    delivery_id: &str,
    to: DeliveryStatus,
) -> Result<DeliveryRecord> {
    let delivery = get_delivery(state, delivery_id).await?;
    let from: DeliveryStatus = delivery.status.parse()?;
    if !from.can_transition_to(to) {
        return Err(CoreError::invalid_state(
            "delivery",
            delivery_id,
            format!("a status that can move to '{}'", to),
            from.as_str(),
        ));
    }

    let now = Utc::now();
    let transition = DeliveryTransition {
        delivery_id,
        expected: from.as_str(),
        to: to.as_str(),
        ready_at: (to == DeliveryStatus::Ready).then_some(now),
        picked_up_at: (to == DeliveryStatus::PickedUp).then_some(now),
        now,
    };

    if !state.persistence.update_delivery_status(&transition).await? {
        let actual = state
            .persistence
            .get_delivery(delivery_id)
            .await?
            .map(|d| d.status)
            .unwrap_or_else(|| "unknown".to_string());
        return Err(CoreError::invalid_state(
            "delivery",
            delivery_id,
            from.as_str(),
            actual,
        ));
    }

    info!(from = %from, to = %to, "Delivery advanced");
    get_delivery(state, delivery_id).await
}

/// Ready deliveries nobody has picked up for at least `older_than_days`.
pub async fn list_uncollected(
    state: &HandlerState,
    older_than_days: i64,
) -> Result<Vec<DeliveryRecord>> {
    if older_than_days < 0 {
        return Err(CoreError::validation("older_than_days", "must not be negative"));
    }
    let cutoff = Duration::try_days(older_than_days)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| CoreError::validation("older_than_days", "is too large"))?;
    state.persistence.list_uncollected_deliveries(cutoff).await
}
