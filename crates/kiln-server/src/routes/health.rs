// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

use crate::AppState;
use crate::response::ApiResponse;

/// Body of `/health`.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// `healthy` or `unhealthy`.
    pub status: &'static str,
    /// Whether the database answered.
    pub database: bool,
    /// Crate version.
    pub version: &'static str,
    /// Seconds since start.
    pub uptime_secs: u64,
}

/// Report database reachability; `503` when it is down.
pub async fn health(State(state): State<AppState>) -> Response {
    let database = match state.handlers.persistence.health_check().await {
        Ok(ok) => ok,
        Err(e) => {
            warn!(error = %e, "Health check failed");
            false
        }
    };

    let body = ApiResponse::ok(HealthStatus {
        status: if database { "healthy" } else { "unhealthy" },
        database,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    });

    if database {
        body.into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}
