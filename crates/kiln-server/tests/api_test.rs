// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API tests over an in-memory SQLite database.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, DurationRound, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use kiln_core::HandlerState;
use kiln_core::persistence::SqlitePersistence;
use kiln_server::{AppState, app};

async fn test_app() -> Router {
    let persistence = SqlitePersistence::in_memory()
        .await
        .expect("Failed to create in-memory SQLite persistence");
    app(AppState::new(HandlerState::new(Arc::new(persistence))))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn slot_start(days_ahead: i64) -> String {
    (Utc::now() + Duration::days(days_ahead))
        .duration_trunc(Duration::hours(1))
        .unwrap()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

async fn create_class(app: &Router, capacity: i32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/products",
        Some(json!({
            "name": "Clase de Torno",
            "kind": "class",
            "price_cents": 3000,
            "capacity": capacity,
            "duration_minutes": 120
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["product_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn test_product_routes() {
    let app = test_app().await;
    let product_id = create_class(&app, 4).await;

    let (status, body) = send(&app, Method::GET, &format!("/api/products/{}", product_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["technique"], "wheel");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/products/{}/active", product_id),
        Some(json!({"active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], false);

    let (_, body) = send(&app, Method::GET, "/api/products?active_only=true", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    let (_, body) = send(&app, Method::GET, "/api/products", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::GET, "/api/products/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "PRODUCT_NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/products",
        Some(json!({"name": "Torno"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/products",
        Some(json!({
            "name": "Torno",
            "kind": "class",
            "price_cents": 3000,
            "capacity": 0,
            "duration_minutes": 60
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_booking_flow_with_giftcard() {
    let app = test_app().await;
    let product_id = create_class(&app, 2).await;
    let start = slot_start(3);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/giftcards",
        Some(json!({"amount_cents": 10000, "purchaser_name": "Elena"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = body["data"]["code"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(json!({
            "product_id": product_id,
            "customer_name": "Marta",
            "customer_email": "marta@example.com",
            "slot_start": start,
            "participants": 2,
            "giftcard_code": code.to_lowercase()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    let booking_id = body["data"]["booking_id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, Method::GET, &format!("/api/giftcards/{}", code), None).await;
    assert_eq!(body["data"]["held_cents"], 6000);
    assert_eq!(body["data"]["available_cents"], 4000);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/products/{}/availability?start={}&participants=1",
            product_id, start
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], false);
    assert_eq!(body["data"]["slot"]["remaining"], 0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(json!({
            "product_id": product_id,
            "customer_name": "Pablo",
            "customer_email": "pablo@example.com",
            "slot_start": start,
            "participants": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "SLOT_FULL");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/bookings/{}/confirm", booking_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "confirmed");

    let (_, body) = send(&app, Method::GET, &format!("/api/giftcards/{}", code), None).await;
    assert_eq!(body["data"]["balance_cents"], 4000);
    assert_eq!(body["data"]["held_cents"], 0);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/bookings/{}/attendance", booking_id),
        Some(json!({"attended": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "attended");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/bookings/{}/cancel", booking_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE");

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/bookings?product_id={}&status=attended", product_id),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/giftcards/{}/transactions", code),
        None,
    )
    .await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["issue", "capture"]);
}

#[tokio::test]
async fn test_giftcard_holds_and_void() {
    let app = test_app().await;
    let (_, body) = send(
        &app,
        Method::POST,
        "/api/giftcards",
        Some(json!({"amount_cents": 5000, "purchaser_name": "Elena"})),
    )
    .await;
    let code = body["data"]["code"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/giftcards/{}/holds", code),
        Some(json!({"amount_cents": 6000})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INSUFFICIENT_BALANCE");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/giftcards/{}/holds", code),
        Some(json!({"amount_cents": 2000, "reference": "shop-12"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let hold_id = body["data"]["hold_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/holds/{}/capture", hold_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["giftcard"]["balance_cents"], 3000);
    assert_eq!(body["data"]["hold"]["status"], "captured");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/giftcards/{}/redeem", code),
        Some(json!({"amount_cents": 500})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &app,
        Method::POST,
        &format!("/api/giftcards/{}/refund", code),
        Some(json!({"amount_cents": 99999})),
    )
    .await;
    assert_eq!(body["data"]["balance_cents"], 5000);

    let (status, body) = send(&app, Method::POST, &format!("/api/giftcards/{}/void", code), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "void");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/giftcards/{}/redeem", code),
        Some(json!({"amount_cents": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "GIFTCARD_INACTIVE");

    let (status, body) = send(&app, Method::POST, "/api/holds/missing/release", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "HOLD_NOT_FOUND");
}

#[tokio::test]
async fn test_timecard_routes() {
    let app = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/employees",
        Some(json!({"name": "Carmen", "role": "instructor", "hourly_rate_cents": 1800})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let employee_id = body["data"]["employee_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/employees/{}/clock-in", employee_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let entry_id = body["data"]["entry_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/employees/{}/clock-in", employee_id),
        Some(json!({"note": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "ALREADY_CLOCKED_IN");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/employees/{}/clock-out", employee_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/employees/{}/clock-out", employee_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "NOT_CLOCKED_IN");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/time-entries/{}", entry_id),
        Some(json!({
            "clock_in": "2025-03-03T09:00:00Z",
            "clock_out": "2025-03-03T11:30:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["clock_out"], "2025-03-03T11:30:00Z");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/timecards/summary?from=2025-03-03T00:00:00Z&to=2025-03-04T00:00:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["total_minutes"], 150);
    assert_eq!(body["data"][0]["pay_cents"], 4500);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/employees/{}/entries?from=2025-03-03T00:00:00Z&to=2025-03-04T00:00:00Z",
            employee_id
        ),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/timecards/summary?from=yesterday",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_delivery_routes() {
    let app = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/deliveries",
        Some(json!({"customer_name": "Ana", "pieces": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "firing");
    let delivery_id = body["data"]["delivery_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/deliveries/{}/status", delivery_id),
        Some(json!({"status": "ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["ready_at"].is_string());

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/deliveries/uncollected?older_than_days=0",
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::GET, "/api/deliveries/uncollected", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/deliveries/uncollected?older_than_days=1000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");

    let (_, body) = send(&app, Method::GET, "/api/deliveries?status=firing", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/deliveries/{}/status", delivery_id),
        Some(json!({"status": "glazing"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_reconcile_techniques_route() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::POST, "/api/admin/reconcile-techniques", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 0);
}
