// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delivery routes.

use axum::extract::{Path, State};
use serde::Deserialize;

use kiln_core::handlers::delivery::{self, NewDelivery};
use kiln_core::persistence::DeliveryRecord;
use kiln_core::status::DeliveryStatus;

use crate::AppState;
use crate::error::ApiError;
use crate::response::{ApiJson, ApiQuery, ApiResponse, ApiResult, Created};

/// Pieces ready this long without pickup count as uncollected.
const DEFAULT_UNCOLLECTED_DAYS: i64 = 14;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UncollectedQuery {
    #[serde(default)]
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub status: DeliveryStatus,
}

pub async fn create_delivery(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewDelivery>,
) -> Result<Created<DeliveryRecord>, ApiError> {
    Ok(Created(
        delivery::create_delivery(&state.handlers, input).await?,
    ))
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult<Vec<DeliveryRecord>> {
    Ok(ApiResponse::ok(
        delivery::list_deliveries(&state.handlers, query.status).await?,
    ))
}

pub async fn list_uncollected(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UncollectedQuery>,
) -> ApiResult<Vec<DeliveryRecord>> {
    let days = query.older_than_days.unwrap_or(DEFAULT_UNCOLLECTED_DAYS);
    Ok(ApiResponse::ok(
        delivery::list_uncollected(&state.handlers, days).await?,
    ))
}

pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeliveryRecord> {
    Ok(ApiResponse::ok(
        delivery::get_delivery(&state.handlers, &id).await?,
    ))
}

pub async fn advance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AdvanceRequest>,
) -> ApiResult<DeliveryRecord> {
    Ok(ApiResponse::ok(
        delivery::advance_delivery(&state.handlers, &id, body.status).await?,
    ))
}
