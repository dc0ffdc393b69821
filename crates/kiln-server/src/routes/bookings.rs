// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Slot and booking routes.

use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use kiln_core::handlers::booking::{self, Availability, NewBooking};
use kiln_core::persistence::{BookingRecord, ListBookingsFilter};
use kiln_core::slots::Slot;

use crate::AppState;
use crate::error::ApiError;
use crate::response::{ApiJson, ApiQuery, ApiResponse, ApiResult, Created};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start: DateTime<Utc>,
    #[serde(default = "one")]
    pub participants: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBookingsQuery {
    pub product_id: Option<String>,
    pub status: Option<String>,
    pub customer_email: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl From<ListBookingsQuery> for ListBookingsFilter {
    fn from(query: ListBookingsQuery) -> Self {
        Self {
            product_id: query.product_id,
            status: query.status,
            customer_email: query.customer_email,
            from: query.from,
            to: query.to,
            limit: query.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub attended: bool,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub slot_start: DateTime<Utc>,
}

pub async fn list_slots(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> ApiResult<Vec<Slot>> {
    let slots = booking::list_slots(&state.handlers, &product_id, range.from, range.to).await?;
    Ok(ApiResponse::ok(slots))
}

pub async fn check_availability(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    ApiQuery(query): ApiQuery<AvailabilityQuery>,
) -> ApiResult<Availability> {
    let availability =
        booking::check_availability(&state.handlers, &product_id, query.start, query.participants)
            .await?;
    Ok(ApiResponse::ok(availability))
}

pub async fn create_booking(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewBooking>,
) -> Result<Created<BookingRecord>, ApiError> {
    Ok(Created(booking::create_booking(&state.handlers, input).await?))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListBookingsQuery>,
) -> ApiResult<Vec<BookingRecord>> {
    let filter = ListBookingsFilter::from(query);
    Ok(ApiResponse::ok(
        booking::list_bookings(&state.handlers, &filter).await?,
    ))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BookingRecord> {
    Ok(ApiResponse::ok(booking::get_booking(&state.handlers, &id).await?))
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BookingRecord> {
    Ok(ApiResponse::ok(
        booking::confirm_booking(&state.handlers, &id).await?,
    ))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BookingRecord> {
    Ok(ApiResponse::ok(
        booking::cancel_booking(&state.handlers, &id).await?,
    ))
}

pub async fn attendance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AttendanceRequest>,
) -> ApiResult<BookingRecord> {
    Ok(ApiResponse::ok(
        booking::mark_attendance(&state.handlers, &id, body.attended).await?,
    ))
}

pub async fn reschedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RescheduleRequest>,
) -> ApiResult<BookingRecord> {
    Ok(ApiResponse::ok(
        booking::reschedule_booking(&state.handlers, &id, body.slot_start).await?,
    ))
}
