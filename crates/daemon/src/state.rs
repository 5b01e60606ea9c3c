// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon state and the runtime event hub.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::device::{Capabilities, DeviceEntry, DeviceKind, DeviceRegistry, DriverMode};
use crate::runtime::manager::{SceneStatus, SceneStatusView};
use crate::runtime::metrics::MetricsSnapshot;
use crate::scene::SceneRegistry;
use crate::store::StateStore;
use crate::watchdog::{LivenessRecord, Watchdog};

/// Build identifier reported on `/api/status` and scene-state broadcasts.
pub fn build_info() -> &'static str {
    concat!("pidicond ", env!("CARGO_PKG_VERSION"))
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Events fanned out to the bus publisher and WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// A device's authoritative state changed.
    DeviceUpdate { device: String, state: DeviceView },
    /// A scene lifecycle transition.
    SceneSwitch {
        device: String,
        #[serde(rename = "currentScene")]
        current_scene: Option<String>,
        #[serde(rename = "generationId")]
        generation_id: u64,
        status: SceneStatus,
        ts: u64,
    },
    /// Periodic render metrics snapshot.
    MetricsUpdate { device: String, metrics: MetricsSnapshot },
    /// A scene-originated payload for the device's ok channel.
    SceneOk { device: String, payload: Value },
}

/// Cloneable handle for emitting runtime events.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<RuntimeEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Emit an event; delivery to lagging subscribers is best-effort.
    pub fn emit(&self, event: RuntimeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared daemon state.
pub struct DaemonState {
    pub config: DaemonConfig,
    pub store: Arc<StateStore>,
    pub devices: DeviceRegistry,
    pub scenes: Arc<SceneRegistry>,
    pub watchdog: Arc<Watchdog>,
    pub events: EventSink,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
    /// True when the restored heartbeat indicated an abrupt prior shutdown.
    pub stale_heartbeat_at_boot: bool,
    pub bus: Option<async_nats::Client>,
}

impl DaemonState {
    /// Aggregate view of one device: persisted state + lifecycle + health +
    /// performance.
    pub async fn device_view(&self, entry: &Arc<DeviceEntry>) -> DeviceView {
        let persisted = self.store.persisted_device(&entry.id);
        DeviceView {
            id: entry.id.clone(),
            kind: entry.kind,
            driver: entry.driver().await,
            capabilities: entry.capabilities,
            display_on: persisted.display_on,
            brightness: persisted.brightness,
            play_state: persisted.play_state,
            active_scene: persisted.active_scene,
            scene: entry.scene_status.read().await.clone(),
            health: self.watchdog.get(&entry.id).await,
            performance: entry.metrics.read().await.clone(),
        }
    }

    pub async fn device_views(&self) -> Vec<DeviceView> {
        let mut views = Vec::with_capacity(self.devices.len());
        for entry in self.devices.list() {
            views.push(self.device_view(&entry).await);
        }
        views
    }
}

/// Wire-format device view for the API and `device_update` events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub id: String,
    pub kind: DeviceKind,
    pub driver: DriverMode,
    pub capabilities: Capabilities,
    pub display_on: bool,
    pub brightness: u8,
    pub play_state: String,
    pub active_scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneStatusView>,
    pub health: Option<LivenessRecord>,
    pub performance: MetricsSnapshot,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
