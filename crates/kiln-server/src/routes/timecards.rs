// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Employee and timecard routes.

use axum::body::Bytes;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use kiln_core::handlers::timecard::{self, NewEmployee};
use kiln_core::persistence::{EmployeeRecord, TimeEntryRecord};
use kiln_core::timesheet::TimecardSummary;

use crate::AppState;
use crate::error::ApiError;
use crate::response::{ApiJson, ApiQuery, ApiResponse, ApiResult, Created};

use super::bookings::RangeQuery;
use super::products::ActiveOnlyQuery;

#[derive(Debug, Default, Deserialize)]
pub struct ClockInRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustEntryRequest {
    pub clock_in: DateTime<Utc>,
    #[serde(default)]
    pub clock_out: Option<DateTime<Utc>>,
}

pub async fn create_employee(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewEmployee>,
) -> Result<Created<EmployeeRecord>, ApiError> {
    Ok(Created(
        timecard::create_employee(&state.handlers, input).await?,
    ))
}

pub async fn list_employees(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ActiveOnlyQuery>,
) -> ApiResult<Vec<EmployeeRecord>> {
    Ok(ApiResponse::ok(
        timecard::list_employees(&state.handlers, query.active_only).await?,
    ))
}

pub async fn get_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<EmployeeRecord> {
    Ok(ApiResponse::ok(
        timecard::get_employee(&state.handlers, &id).await?,
    ))
}

pub async fn deactivate_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<EmployeeRecord> {
    Ok(ApiResponse::ok(
        timecard::deactivate_employee(&state.handlers, &id).await?,
    ))
}

/// The body is optional; an empty one clocks in without a note.
pub async fn clock_in(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Created<TimeEntryRecord>, ApiError> {
    let request: ClockInRequest = if body.is_empty() {
        ClockInRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    Ok(Created(
        timecard::clock_in(&state.handlers, &id, request.note).await?,
    ))
}

pub async fn clock_out(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TimeEntryRecord> {
    Ok(ApiResponse::ok(
        timecard::clock_out(&state.handlers, &id).await?,
    ))
}

pub async fn list_entries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> ApiResult<Vec<TimeEntryRecord>> {
    Ok(ApiResponse::ok(
        timecard::list_entries(&state.handlers, &id, range.from, range.to).await?,
    ))
}

pub async fn adjust_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AdjustEntryRequest>,
) -> ApiResult<TimeEntryRecord> {
    Ok(ApiResponse::ok(
        timecard::adjust_entry(&state.handlers, &id, body.clock_in, body.clock_out).await?,
    ))
}

pub async fn summary(
    State(state): State<AppState>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> ApiResult<Vec<TimecardSummary>> {
    Ok(ApiResponse::ok(
        timecard::timecard_summary(&state.handlers, range.from, range.to).await?,
    ))
}
