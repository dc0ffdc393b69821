// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API error type and its HTTP mapping.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use kiln_core::CoreError;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A domain operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The request body or query string could not be decoded.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// Machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.error_code(),
            Self::BadRequest(_) => "VALIDATION_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self.error_code() {
            code if code.ends_with("NOT_FOUND") => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "SLOT_FULL"
            | "INSUFFICIENT_BALANCE"
            | "INVALID_STATE"
            | "ALREADY_CLOCKED_IN"
            | "NOT_CLOCKED_IN"
            | "TECHNIQUE_MISMATCH" => StatusCode::CONFLICT,
            "HOLD_EXPIRED" => StatusCode::GONE,
            "GIFTCARD_INACTIVE" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error_code();

        if status.is_server_error() {
            error!(error_code = code, error = %self, "Request failed");
        } else {
            warn!(error_code = code, error = %self, "Request rejected");
        }

        let body = json!({
            "success": false,
            "error_code": code,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
