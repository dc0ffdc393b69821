// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL integration tests for kiln-core.
//!
//! Tests automatically spin up a PostgreSQL container using testcontainers.
//! Optionally set TEST_KILN_DATABASE_URL to use an external database. Tests
//! are skipped when neither is available.
//!
//! Run with:
//! ```bash
//! cargo test -p kiln-core --test postgres_test
//! ```

#[macro_use]
mod common;

use chrono::{Duration, Utc};

use kiln_core::handlers::booking::{NewBooking, cancel_booking, confirm_booking, create_booking};
use kiln_core::handlers::catalog::{NewProduct, create_product};
use kiln_core::handlers::giftcard::{
    IssueGiftcard, capture_hold, get_balance, issue_giftcard, list_transactions, place_hold,
    redeem, refund, void_giftcard,
};
use kiln_core::handlers::timecard::{NewEmployee, clock_in, clock_out, create_employee};
use kiln_core::persistence::{Persistence, ProductRecord};
use kiln_core::technique::ProductKind;
use kiln_core::{CoreError, HandlerState};

async fn wheel_class(state: &HandlerState, capacity: i32) -> ProductRecord {
    create_product(
        state,
        NewProduct {
            name: "Clase de Torno".to_string(),
            kind: ProductKind::Class,
            technique: None,
            price_cents: 2_500,
            capacity,
            duration_minutes: 120,
            details: None,
        },
    )
    .await
    .expect("Failed to create product")
}

fn booking_for(product: &ProductRecord, participants: i32, code: Option<&str>) -> NewBooking {
    NewBooking {
        product_id: product.product_id.clone(),
        customer_name: "Marta".to_string(),
        customer_email: "marta@example.com".to_string(),
        slot_start: Utc::now() + Duration::days(3),
        participants,
        technique: None,
        giftcard_code: code.map(str::to_string),
        details: None,
    }
}

async fn card(state: &HandlerState, amount_cents: i64) -> String {
    issue_giftcard(
        state,
        IssueGiftcard {
            amount_cents,
            purchaser_name: "Elena".to_string(),
            recipient_name: Some("Marta".to_string()),
            recipient_email: None,
            message: None,
        },
    )
    .await
    .expect("Failed to issue giftcard")
    .code
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health_check() {
    let ctx = skip_if_no_db!();
    assert!(ctx.persistence.health_check().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_never_exceed_capacity() {
    let ctx = skip_if_no_db!();
    let product = wheel_class(&ctx.state, 3).await;
    let mut input = booking_for(&product, 1, None);
    input.slot_start = Utc::now() + Duration::days(5);

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let state = ctx.state.clone();
            let input = input.clone();
            tokio::spawn(async move { create_booking(&state, input).await })
        })
        .collect();

    let mut booked = 0;
    let mut full = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => booked += 1,
            Err(CoreError::SlotFull { .. }) => full += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    assert_eq!(booked, 3);
    assert_eq!(full, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_holds_never_exceed_balance() {
    let ctx = skip_if_no_db!();
    let code = card(&ctx.state, 10_000).await;

    let attempts: Vec<_> = (0..6)
        .map(|_| {
            let state = ctx.state.clone();
            let code = code.clone();
            tokio::spawn(async move { place_hold(&state, &code, 3_000, None).await })
        })
        .collect();

    let mut placed = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => placed += 1,
            Err(CoreError::InsufficientBalance { .. }) => {}
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    assert_eq!(placed, 3);
    let balance = get_balance(&ctx.state, &code).await.unwrap();
    assert_eq!(balance.held_cents, 9_000);
    assert_eq!(balance.available_cents, 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_booking_paid_by_giftcard() {
    let ctx = skip_if_no_db!();
    let product = wheel_class(&ctx.state, 6).await;
    let code = card(&ctx.state, 10_000).await;

    let booking = create_booking(&ctx.state, booking_for(&product, 2, Some(&code)))
        .await
        .unwrap();
    assert_eq!(booking.status, "pending");
    assert_eq!(
        get_balance(&ctx.state, &code).await.unwrap().held_cents,
        5_000
    );

    let confirmed = confirm_booking(&ctx.state, &booking.booking_id)
        .await
        .unwrap();
    assert_eq!(confirmed.status, "confirmed");
    let balance = get_balance(&ctx.state, &code).await.unwrap();
    assert_eq!(balance.balance_cents, 5_000);
    assert_eq!(balance.held_cents, 0);

    let cancelled = cancel_booking(&ctx.state, &booking.booking_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(
        get_balance(&ctx.state, &code).await.unwrap().balance_cents,
        10_000
    );

    let kinds: Vec<String> = list_transactions(&ctx.state, &code)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(kinds, vec!["issue", "capture", "refund"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capture_twice_is_rejected() {
    let ctx = skip_if_no_db!();
    let code = card(&ctx.state, 4_000).await;
    let hold = place_hold(&ctx.state, &code, 1_500, Some("order-7"))
        .await
        .unwrap();

    let capture = capture_hold(&ctx.state, &hold.hold_id).await.unwrap();
    assert_eq!(capture.giftcard.balance_cents, 2_500);
    assert_eq!(
        capture_hold(&ctx.state, &hold.hold_id)
            .await
            .unwrap_err()
            .error_code(),
        "INVALID_STATE"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refund_capped_and_void() {
    let ctx = skip_if_no_db!();
    let code = card(&ctx.state, 5_000).await;

    let after_redeem = redeem(&ctx.state, &code, 2_000, None).await.unwrap();
    assert_eq!(after_redeem.balance_cents, 3_000);

    let after_refund = refund(&ctx.state, &code, 9_000, None).await.unwrap();
    assert_eq!(after_refund.balance_cents, 5_000);

    let voided = void_giftcard(&ctx.state, &code.to_lowercase()).await.unwrap();
    assert_eq!(voided.status, "void");
    assert_eq!(voided.balance_cents, 0);
    assert_eq!(
        redeem(&ctx.state, &code, 100, None)
            .await
            .unwrap_err()
            .error_code(),
        "GIFTCARD_INACTIVE"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_open_time_entry() {
    let ctx = skip_if_no_db!();
    let employee = create_employee(
        &ctx.state,
        NewEmployee {
            name: "Carmen".to_string(),
            email: None,
            role: Some("instructor".to_string()),
            hourly_rate_cents: 1_600,
        },
    )
    .await
    .unwrap();

    clock_in(&ctx.state, &employee.employee_id, None)
        .await
        .unwrap();
    assert_eq!(
        clock_in(&ctx.state, &employee.employee_id, None)
            .await
            .unwrap_err()
            .error_code(),
        "ALREADY_CLOCKED_IN"
    );

    let closed = clock_out(&ctx.state, &employee.employee_id).await.unwrap();
    assert!(closed.clock_out.is_some());
    clock_in(&ctx.state, &employee.employee_id, None)
        .await
        .unwrap();
}
