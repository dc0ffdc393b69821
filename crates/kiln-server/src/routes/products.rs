// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Catalog routes.

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use kiln_core::handlers::catalog::{self, NewProduct};
use kiln_core::persistence::ProductRecord;

use crate::AppState;
use crate::error::ApiError;
use crate::response::{ApiJson, ApiQuery, ApiResponse, ApiResult, Created};

#[derive(Debug, Deserialize)]
pub struct ActiveOnlyQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub updated: u64,
}

pub async fn create_product(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<Created<ProductRecord>, ApiError> {
    Ok(Created(catalog::create_product(&state.handlers, input).await?))
}

pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ActiveOnlyQuery>,
) -> ApiResult<Vec<ProductRecord>> {
    let products = catalog::list_products(&state.handlers, query.active_only).await?;
    Ok(ApiResponse::ok(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ProductRecord> {
    Ok(ApiResponse::ok(catalog::get_product(&state.handlers, &id).await?))
}

pub async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SetActiveRequest>,
) -> ApiResult<ProductRecord> {
    let product = catalog::set_product_active(&state.handlers, &id, body.active).await?;
    Ok(ApiResponse::ok(product))
}

pub async fn reconcile_techniques(State(state): State<AppState>) -> ApiResult<ReconcileResponse> {
    let updated = catalog::reconcile_techniques(&state.handlers).await?;
    Ok(ApiResponse::ok(ReconcileResponse { updated }))
}
