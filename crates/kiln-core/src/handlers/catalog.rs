// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product catalog handlers.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use sqlx::types::Json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::persistence::ProductRecord;
use crate::technique::{ProductKind, Technique};

use super::{HandlerState, details_object};

/// Input for [`create_product`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// What the product sells.
    pub kind: ProductKind,
    /// Technique taught; derived from the name when absent.
    #[serde(default)]
    pub technique: Option<Technique>,
    /// Price per participant.
    pub price_cents: i64,
    /// Seats per slot.
    pub capacity: i32,
    /// Slot length.
    pub duration_minutes: i32,
    /// Free-form product data.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Technique stored on the product, or derived from its name.
pub fn product_technique(product: &ProductRecord) -> Result<Option<Technique>> {
    match &product.technique {
        Some(stored) => stored.parse().map(Some),
        None => Ok(Technique::from_product_name(&product.name)),
    }
}

/// Create a product.
#[instrument(skip(state, input), fields(name = %input.name))]
pub async fn create_product(state: &HandlerState, input: NewProduct) -> Result<ProductRecord> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(CoreError::validation("name", "must not be empty"));
    }
    if input.price_cents < 0 {
        return Err(CoreError::validation("price_cents", "must not be negative"));
    }
    if input.capacity < 1 {
        return Err(CoreError::validation("capacity", "must be at least 1"));
    }
    if input.duration_minutes < 1 {
        return Err(CoreError::validation("duration_minutes", "must be at least 1"));
    }

    let technique = input
        .technique
        .or_else(|| Technique::from_product_name(name));

    let product = ProductRecord {
        product_id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        kind: input.kind.as_str().to_string(),
        technique: technique.map(|t| t.as_str().to_string()),
        price_cents: input.price_cents,
        capacity: input.capacity,
        duration_minutes: input.duration_minutes,
        active: true,
        details: Json(details_object(input.details)?),
        created_at: Utc::now(),
    };

    state.persistence.insert_product(&product).await?;

    info!(
        product_id = %product.product_id,
        technique = ?product.technique,
        "Product created"
    );
    Ok(product)
}

/// Get a product by ID.
pub async fn get_product(state: &HandlerState, product_id: &str) -> Result<ProductRecord> {
    state
        .persistence
        .get_product(product_id)
        .await?
        .ok_or_else(|| CoreError::not_found("product", product_id))
}

/// List products, optionally only active ones.
pub async fn list_products(state: &HandlerState, active_only: bool) -> Result<Vec<ProductRecord>> {
    state.persistence.list_products(active_only).await
}

/// Activate or deactivate a product. Existing bookings are not touched.
#[instrument(skip(state))]
pub async fn set_product_active(
    state: &HandlerState,
    product_id: &str,
    active: bool,
) -> Result<ProductRecord> {
    if !state
        .persistence
        .set_product_active(product_id, active)
        .await?
    {
        return Err(CoreError::not_found("product", product_id));
    }

    info!(active, "Product availability changed");
    get_product(state, product_id).await
}

/// Fill in the technique of bookings stored without one.
///
/// Uses the product's technique, or derives it from the product name.
/// Bookings whose product yields no technique are left alone. Returns the
/// number of bookings updated.
#[instrument(skip(state))]
pub async fn reconcile_techniques(state: &HandlerState) -> Result<u64> {
    let bookings = state.persistence.list_bookings_missing_technique().await?;
    let mut techniques: HashMap<String, Option<Technique>> = HashMap::new();
    let mut updated = 0u64;

    for booking in &bookings {
        let technique = match techniques.get(&booking.product_id) {
            Some(cached) => *cached,
            None => {
                let resolved = match state.persistence.get_product(&booking.product_id).await? {
                    Some(product) => product_technique(&product)?,
                    None => None,
                };
                techniques.insert(booking.product_id.clone(), resolved);
                resolved
            }
        };

        let Some(technique) = technique else {
            debug!(booking_id = %booking.booking_id, "No technique derivable for booking");
            continue;
        };

        if state
            .persistence
            .set_booking_technique(&booking.booking_id, technique.as_str())
            .await?
        {
            updated += 1;
        }
    }

    info!(
        scanned = bookings.len(),
        updated, "Booking techniques reconciled"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_state;
    use crate::persistence::{BookingRecord, Persistence};
    use chrono::Duration;

    fn new_product(name: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            kind: ProductKind::Class,
            technique: None,
            price_cents: 4000,
            capacity: 8,
            duration_minutes: 120,
            details: Some(serde_json::json!({"level": "beginner"})),
        }
    }

    #[tokio::test]
    async fn test_create_product_derives_technique() {
        let state = test_state().await;
        let product = create_product(&state, new_product("  Clase de Torno  "))
            .await
            .unwrap();

        assert_eq!(product.name, "Clase de Torno");
        assert_eq!(product.technique.as_deref(), Some("wheel"));
        assert!(product.active);

        let fetched = get_product(&state, &product.product_id).await.unwrap();
        assert_eq!(fetched.details.0["level"], "beginner");
    }

    #[tokio::test]
    async fn test_explicit_technique_wins() {
        let state = test_state().await;
        let mut input = new_product("Torno");
        input.technique = Some(Technique::Mixed);
        let product = create_product(&state, input).await.unwrap();
        assert_eq!(product.technique.as_deref(), Some("mixed"));
    }

    #[tokio::test]
    async fn test_create_product_validation() {
        let state = test_state().await;

        let mut blank = new_product("   ");
        blank.name = "  ".to_string();
        assert_eq!(
            create_product(&state, blank).await.unwrap_err().error_code(),
            "VALIDATION_ERROR"
        );

        let mut no_seats = new_product("Torno");
        no_seats.capacity = 0;
        assert!(matches!(
            create_product(&state, no_seats).await.unwrap_err(),
            CoreError::ValidationError { ref field, .. } if field == "capacity"
        ));

        let mut negative = new_product("Torno");
        negative.price_cents = -1;
        assert!(create_product(&state, negative).await.is_err());

        let mut array_details = new_product("Torno");
        array_details.details = Some(serde_json::json!(["x"]));
        assert!(create_product(&state, array_details).await.is_err());
    }

    #[tokio::test]
    async fn test_set_product_active() {
        let state = test_state().await;
        let product = create_product(&state, new_product("Pintura")).await.unwrap();

        let inactive = set_product_active(&state, &product.product_id, false)
            .await
            .unwrap();
        assert!(!inactive.active);
        assert!(list_products(&state, true).await.unwrap().is_empty());
        assert_eq!(list_products(&state, false).await.unwrap().len(), 1);

        let err = set_product_active(&state, "missing", true).await.unwrap_err();
        assert_eq!(err.error_code(), "PRODUCT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reconcile_techniques() {
        let state = test_state().await;
        let wheel = create_product(&state, new_product("Torno")).await.unwrap();
        let mut unnamed = new_product("Date night");
        unnamed.technique = None;
        let unknown = create_product(&state, unnamed).await.unwrap();
        assert!(unknown.technique.is_none());

        let now = Utc::now();
        for product in [&wheel, &unknown] {
            let booking = BookingRecord {
                booking_id: Uuid::new_v4().to_string(),
                product_id: product.product_id.clone(),
                customer_name: "Ana".to_string(),
                customer_email: "ana@example.com".to_string(),
                slot_start: now + Duration::days(1),
                participants: 1,
                status: "confirmed".to_string(),
                technique: None,
                price_cents: 4000,
                hold_id: None,
                giftcard_code: None,
                details: Json(serde_json::json!({})),
                created_at: now,
                updated_at: now,
            };
            state
                .persistence
                .insert_booking_within_capacity(&booking)
                .await
                .unwrap();
        }

        assert_eq!(reconcile_techniques(&state).await.unwrap(), 1);
        // Second run finds nothing new to fill in
        assert_eq!(reconcile_techniques(&state).await.unwrap(), 0);

        let remaining = state.persistence.list_bookings_missing_technique().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].product_id, unknown.product_id);
    }
}
