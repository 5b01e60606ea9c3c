// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device registry: identity, capabilities, and hot-swappable transports.

pub mod frame;
pub mod http_panel;
pub mod matrix;
pub mod mock;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::runtime::manager::SceneStatusView;
use crate::runtime::metrics::MetricsSnapshot;
use crate::runtime::worker::WorkerMsg;
use crate::store::{keys, StateStore};

pub use frame::Frame;
pub use mock::MockTransport;
pub use transport::{ProbeOutcome, Transport};

/// Supported device classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Pixoo64,
    Matrix,
}

impl DeviceKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Pixoo64 => Capabilities {
                width: 64,
                height: 64,
                color_depth: 24,
                supports_text: true,
                supports_audio: true,
            },
            Self::Matrix => Capabilities {
                width: 32,
                height: 8,
                color_depth: 24,
                supports_text: true,
                supports_audio: false,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pixoo64 => "pixoo64",
            Self::Matrix => "matrix",
        }
    }
}

/// Static display capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub width: u16,
    pub height: u16,
    pub color_depth: u8,
    pub supports_text: bool,
    pub supports_audio: bool,
}

/// Driver selection: real hardware or the recording mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    Real,
    Mock,
}

impl DriverMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Mock => "mock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "real" => Some(Self::Real),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

/// One registered device.
///
/// The entry owns both transports; `driver` selects which one the render
/// loop and watchdog see. Swapping the driver never touches scene state.
pub struct DeviceEntry {
    pub id: String,
    pub kind: DeviceKind,
    pub capabilities: Capabilities,
    driver: RwLock<DriverMode>,
    real: Arc<dyn Transport>,
    mock: Arc<MockTransport>,
    /// Worker mailbox, registered once when the device worker is spawned.
    mailbox: OnceLock<mpsc::Sender<WorkerMsg>>,
    pub cancel: CancellationToken,
    /// Worker-published lifecycle view (worker is the only writer).
    pub scene_status: RwLock<Option<SceneStatusView>>,
    /// Worker-published render metrics snapshot (worker is the only writer).
    pub metrics: RwLock<MetricsSnapshot>,
}

impl DeviceEntry {
    pub fn new(
        id: String,
        kind: DeviceKind,
        driver: DriverMode,
        real: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            capabilities: kind.capabilities(),
            driver: RwLock::new(driver),
            real,
            mock: Arc::new(MockTransport::new()),
            mailbox: OnceLock::new(),
            cancel,
            scene_status: RwLock::new(None),
            metrics: RwLock::new(MetricsSnapshot::default()),
        })
    }

    pub async fn driver(&self) -> DriverMode {
        *self.driver.read().await
    }

    /// Atomically swap the active driver. Returns the previous mode.
    pub async fn set_driver(&self, mode: DriverMode) -> DriverMode {
        let mut guard = self.driver.write().await;
        std::mem::replace(&mut *guard, mode)
    }

    /// The transport currently selected by the driver mode.
    pub async fn transport(&self) -> Arc<dyn Transport> {
        match *self.driver.read().await {
            DriverMode::Real => Arc::clone(&self.real),
            DriverMode::Mock => Arc::clone(&self.mock) as Arc<dyn Transport>,
        }
    }

    /// The recording mock, for tests and the mock driver path.
    pub fn mock(&self) -> &Arc<MockTransport> {
        &self.mock
    }

    pub fn register_mailbox(&self, tx: mpsc::Sender<WorkerMsg>) {
        let _ = self.mailbox.set(tx);
    }

    pub fn mailbox(&self) -> Option<&mpsc::Sender<WorkerMsg>> {
        self.mailbox.get()
    }
}

/// Immutable map of all configured devices.
pub struct DeviceRegistry {
    devices: BTreeMap<String, Arc<DeviceEntry>>,
}

impl DeviceRegistry {
    /// Build the registry from configured device specs, consulting the
    /// store for a persisted driver choice.
    pub fn build(
        config: &DaemonConfig,
        store: &StateStore,
        bus: Option<async_nats::Client>,
        shutdown: &CancellationToken,
    ) -> Self {
        let mut devices = BTreeMap::new();
        for spec in &config.devices {
            if devices.contains_key(&spec.id) {
                tracing::warn!(device = %spec.id, "duplicate device spec ignored");
                continue;
            }
            let real: Arc<dyn Transport> = match spec.kind {
                DeviceKind::Pixoo64 => Arc::new(http_panel::HttpPanelTransport::new(
                    &spec.id,
                    config.push_timeout(),
                    config.probe_timeout(),
                )),
                DeviceKind::Matrix => Arc::new(matrix::MatrixTransport::new(
                    &spec.id,
                    &config.bus_prefix,
                    bus.clone(),
                    config.probe_timeout(),
                )),
            };
            let default = if spec.mock { DriverMode::Mock } else { DriverMode::Real };
            let driver = store
                .persisted_device(&spec.id)
                .driver
                .as_deref()
                .and_then(DriverMode::parse)
                .unwrap_or(default);
            let entry =
                DeviceEntry::new(spec.id.clone(), spec.kind, driver, real, shutdown.child_token());
            tracing::info!(device = %spec.id, kind = spec.kind.as_str(), driver = driver.as_str(), "device registered");
            devices.insert(spec.id.clone(), entry);
        }
        Self { devices }
    }

    /// Registry over preconstructed entries. Used by tests.
    pub fn from_entries(entries: Vec<Arc<DeviceEntry>>) -> Self {
        let devices = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self { devices }
    }

    pub fn get(&self, id: &str) -> Option<Arc<DeviceEntry>> {
        self.devices.get(id).map(Arc::clone)
    }

    pub fn list(&self) -> Vec<Arc<DeviceEntry>> {
        self.devices.values().map(Arc::clone).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Hot-swap a device's driver, persist the choice, and ask the worker
    /// to re-render the current scene so the new transport has the frame.
    pub async fn switch_driver(
        &self,
        store: &StateStore,
        id: &str,
        mode: DriverMode,
    ) -> Result<DriverMode, crate::error::DaemonError> {
        let entry = self
            .get(id)
            .ok_or_else(|| crate::error::DaemonError::NotFound(format!("unknown device {id}")))?;
        let prev = entry.set_driver(mode).await;
        store.device_set_critical(id, keys::DRIVER, serde_json::json!(mode.as_str()))?;
        Ok(prev)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
