// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kiln Server - HTTP API for the studio backend
//!
//! Thin axum layer over [`kiln_core::handlers`]. Every success is wrapped as
//! `{"success": true, "data": ...}`; every failure as
//! `{"success": false, "error_code": ..., "message": ...}` with the status
//! chosen by [`error::ApiError::status`].

pub mod config;
pub mod error;
pub mod response;
pub mod routes;

use std::time::Instant;

use axum::Router;
use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use kiln_core::HandlerState;

/// Shared state for the API routes.
#[derive(Clone)]
pub struct AppState {
    /// Domain handler state.
    pub handlers: HandlerState,
    /// Process start, for `/health`.
    pub started_at: Instant,
}

impl AppState {
    /// Create app state starting the uptime clock now.
    pub fn new(handlers: HandlerState) -> Self {
        Self {
            handlers,
            started_at: Instant::now(),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
