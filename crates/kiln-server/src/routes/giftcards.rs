// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Giftcard and hold routes.

use axum::extract::{Path, State};
use serde::Deserialize;

use kiln_core::handlers::giftcard::{self, GiftcardBalance, HoldCapture, IssueGiftcard};
use kiln_core::persistence::{GiftcardRecord, HoldRecord, TransactionRecord};

use crate::AppState;
use crate::error::ApiError;
use crate::response::{ApiJson, ApiResponse, ApiResult, Created};

/// Body for holds, redemptions and refunds.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

pub async fn issue(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<IssueGiftcard>,
) -> Result<Created<GiftcardRecord>, ApiError> {
    Ok(Created(giftcard::issue_giftcard(&state.handlers, input).await?))
}

pub async fn balance(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<GiftcardBalance> {
    Ok(ApiResponse::ok(
        giftcard::get_balance(&state.handlers, &code).await?,
    ))
}

pub async fn list_holds(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Vec<HoldRecord>> {
    Ok(ApiResponse::ok(
        giftcard::list_holds(&state.handlers, &code).await?,
    ))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Vec<TransactionRecord>> {
    Ok(ApiResponse::ok(
        giftcard::list_transactions(&state.handlers, &code).await?,
    ))
}

pub async fn place_hold(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ApiJson(body): ApiJson<AmountRequest>,
) -> Result<Created<HoldRecord>, ApiError> {
    let hold = giftcard::place_hold(
        &state.handlers,
        &code,
        body.amount_cents,
        body.reference.as_deref(),
    )
    .await?;
    Ok(Created(hold))
}

pub async fn redeem(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ApiJson(body): ApiJson<AmountRequest>,
) -> ApiResult<GiftcardRecord> {
    let card = giftcard::redeem(
        &state.handlers,
        &code,
        body.amount_cents,
        body.reference.as_deref(),
    )
    .await?;
    Ok(ApiResponse::ok(card))
}

pub async fn refund(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ApiJson(body): ApiJson<AmountRequest>,
) -> ApiResult<GiftcardRecord> {
    let card = giftcard::refund(
        &state.handlers,
        &code,
        body.amount_cents,
        body.reference.as_deref(),
    )
    .await?;
    Ok(ApiResponse::ok(card))
}

pub async fn void(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<GiftcardRecord> {
    Ok(ApiResponse::ok(
        giftcard::void_giftcard(&state.handlers, &code).await?,
    ))
}

pub async fn capture_hold(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<HoldCapture> {
    Ok(ApiResponse::ok(
        giftcard::capture_hold(&state.handlers, &id).await?,
    ))
}

pub async fn release_hold(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<HoldRecord> {
    Ok(ApiResponse::ok(
        giftcard::release_hold(&state.handlers, &id).await?,
    ))
}
