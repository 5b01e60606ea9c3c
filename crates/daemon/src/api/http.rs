// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers mirroring the bus command sections.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::router::{self, Section};
use crate::state::{build_info, DaemonState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub build_info: String,
    pub uptime_secs: u64,
    pub device_count: usize,
    /// True when the previous run ended without a graceful shutdown.
    pub stale_heartbeat: bool,
}

/// `GET /api/status`
pub async fn status(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "running".to_owned(),
        build_info: build_info().to_owned(),
        uptime_secs: s.started_at.elapsed().as_secs(),
        device_count: s.devices.len(),
        stale_heartbeat: s.stale_heartbeat_at_boot,
    })
}

/// `GET /api/devices`
pub async fn list_devices(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    Json(s.device_views().await)
}

/// `GET /api/devices/{id}`
pub async fn get_device(
    State(s): State<Arc<DaemonState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.devices.get(&id) {
        Some(entry) => Json(s.device_view(&entry).await).into_response(),
        None => crate::error::DaemonError::NotFound(format!("unknown device {id}"))
            .to_http_response()
            .into_response(),
    }
}

/// `GET /api/scenes`
pub async fn list_scenes(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    let scenes: Vec<_> = s.scenes.list().into_iter().cloned().collect();
    Json(scenes)
}

/// `POST /api/devices/{id}/scene` — switch or play-control the scene.
///
/// Body is the scene payload with `name` (for `set`) and an optional
/// `action` of `set|pause|resume|stop`.
pub async fn post_scene(
    State(s): State<Arc<DaemonState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let action = body.get("action").and_then(Value::as_str).unwrap_or("set").to_owned();
    run_command(&s, &id, Section::Scene, &action, body).await
}

/// `POST /api/devices/{id}/display` — `{on: bool}`.
pub async fn post_display(
    State(s): State<Arc<DaemonState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    run_command(&s, &id, Section::Display, "set", body).await
}

/// `POST /api/devices/{id}/brightness` — `{value: 0..100}`.
pub async fn post_brightness(
    State(s): State<Arc<DaemonState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    run_command(&s, &id, Section::Brightness, "set", body).await
}

/// `POST /api/devices/{id}/driver` — `{driver: "real"|"mock"}`.
pub async fn post_driver(
    State(s): State<Arc<DaemonState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    run_command(&s, &id, Section::Driver, "set", body).await
}

/// `POST /api/devices/{id}/reset` — payload ignored.
pub async fn post_reset(
    State(s): State<Arc<DaemonState>>,
    Path(id): Path<String>,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let payload = body.map(|Json(v)| v).unwrap_or_else(|| serde_json::json!({}));
    run_command(&s, &id, Section::Reset, "set", payload).await
}

async fn run_command(
    state: &Arc<DaemonState>,
    device: &str,
    section: Section,
    action: &str,
    payload: Value,
) -> axum::response::Response {
    let cmd = match router::validate(section, action, &payload, &state.scenes) {
        Ok(cmd) => cmd,
        Err(e) => return e.to_http_response().into_response(),
    };
    match router::dispatch(state, device, cmd).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.to_http_response().into_response(),
    }
}
