// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route table.

pub mod bookings;
pub mod deliveries;
pub mod giftcards;
pub mod health;
pub mod products;
pub mod timecards;

use axum::Router;
use axum::routing::{get, post, put};

use crate::AppState;

/// All routes, before state and middleware are attached.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        // Catalog
        .route(
            "/api/products",
            post(products::create_product).get(products::list_products),
        )
        .route("/api/products/{id}", get(products::get_product))
        .route("/api/products/{id}/active", post(products::set_active))
        .route("/api/products/{id}/slots", get(bookings::list_slots))
        .route(
            "/api/products/{id}/availability",
            get(bookings::check_availability),
        )
        // Bookings
        .route(
            "/api/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/api/bookings/{id}", get(bookings::get_booking))
        .route("/api/bookings/{id}/confirm", post(bookings::confirm))
        .route("/api/bookings/{id}/cancel", post(bookings::cancel))
        .route("/api/bookings/{id}/attendance", post(bookings::attendance))
        .route("/api/bookings/{id}/reschedule", post(bookings::reschedule))
        // Giftcards
        .route("/api/giftcards", post(giftcards::issue))
        .route("/api/giftcards/{code}", get(giftcards::balance))
        .route(
            "/api/giftcards/{code}/holds",
            get(giftcards::list_holds).post(giftcards::place_hold),
        )
        .route(
            "/api/giftcards/{code}/transactions",
            get(giftcards::list_transactions),
        )
        .route("/api/giftcards/{code}/redeem", post(giftcards::redeem))
        .route("/api/giftcards/{code}/refund", post(giftcards::refund))
        .route("/api/giftcards/{code}/void", post(giftcards::void))
        .route("/api/holds/{id}/capture", post(giftcards::capture_hold))
        .route("/api/holds/{id}/release", post(giftcards::release_hold))
        // Timecards
        .route(
            "/api/employees",
            post(timecards::create_employee).get(timecards::list_employees),
        )
        .route("/api/employees/{id}", get(timecards::get_employee))
        .route(
            "/api/employees/{id}/deactivate",
            post(timecards::deactivate_employee),
        )
        .route("/api/employees/{id}/clock-in", post(timecards::clock_in))
        .route("/api/employees/{id}/clock-out", post(timecards::clock_out))
        .route("/api/employees/{id}/entries", get(timecards::list_entries))
        .route("/api/time-entries/{id}", put(timecards::adjust_entry))
        .route("/api/timecards/summary", get(timecards::summary))
        // Deliveries
        .route(
            "/api/deliveries",
            post(deliveries::create_delivery).get(deliveries::list_deliveries),
        )
        .route(
            "/api/deliveries/uncollected",
            get(deliveries::list_uncollected),
        )
        .route("/api/deliveries/{id}", get(deliveries::get_delivery))
        .route("/api/deliveries/{id}/status", post(deliveries::advance))
        // Maintenance
        .route(
            "/api/admin/reconcile-techniques",
            post(products::reconcile_techniques),
        )
}
