// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST + WebSocket API for UI clients.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::DaemonState;

/// Build the axum `Router` with all API routes.
pub fn build_router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route("/api/status", get(http::status))
        .route("/api/devices", get(http::list_devices))
        .route("/api/devices/{id}", get(http::get_device))
        .route("/api/devices/{id}/scene", post(http::post_scene))
        .route("/api/devices/{id}/display", post(http::post_display))
        .route("/api/devices/{id}/brightness", post(http::post_brightness))
        .route("/api/devices/{id}/driver", post(http::post_driver))
        .route("/api/devices/{id}/reset", post(http::post_reset))
        .route("/api/scenes", get(http::list_scenes))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
