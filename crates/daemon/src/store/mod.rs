// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative state store: namespaced in-memory keyed state with a
//! write-behind journal.
//!
//! Device and daemon namespaces are durable; the scene namespace is volatile
//! scratch space handed to scene instances. Ordinary writes are journaled
//! after a debounce window; critical writes (display power, brightness,
//! active scene, play state) flush immediately so an abrupt restart cannot
//! lose a user-visible change.

pub mod journal;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;
use journal::{DaemonMeta, JournalDoc};

pub use journal::keys;

struct StoreInner {
    daemon: DaemonMeta,
    devices: std::collections::BTreeMap<String, Map<String, Value>>,
    /// Volatile scene scratch state, keyed by (device, scene).
    scene: HashMap<(String, String), Map<String, Value>>,
    /// Unknown top-level document keys, preserved across rewrites.
    extra: Map<String, Value>,
    dirty: bool,
    persist: bool,
    write_failures: u32,
}

impl StoreInner {
    fn to_doc(&self) -> JournalDoc {
        JournalDoc {
            version: journal::FORMAT_VERSION,
            updated_at: journal::iso8601_now(),
            daemon: self.daemon.clone(),
            devices: self.devices.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// Keyed, namespaced state with debounced durable persistence.
pub struct StateStore {
    path: PathBuf,
    debounce: Duration,
    inner: Mutex<StoreInner>,
    dirty_notify: Notify,
}

impl StateStore {
    pub fn new(path: PathBuf, debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            path,
            debounce,
            inner: Mutex::new(StoreInner {
                daemon: DaemonMeta::default(),
                devices: Default::default(),
                scene: HashMap::new(),
                extra: Map::new(),
                dirty: false,
                persist: true,
                write_failures: 0,
            }),
            dirty_notify: Notify::new(),
        })
    }

    /// An in-memory store for tests: journaling and timers disabled.
    pub fn in_memory() -> Arc<Self> {
        let store = Self::new(PathBuf::from("/dev/null"), Duration::from_millis(0));
        store.disable_persistence();
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned lock only means another thread panicked mid-write of
        // plain data; the map contents are still coherent.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Stop all journaling. Used by tests.
    pub fn disable_persistence(&self) {
        self.lock().persist = false;
    }

    // -- Device namespace -----------------------------------------------------

    pub fn device_get(&self, device: &str, key: &str) -> Option<Value> {
        self.lock().devices.get(device).and_then(|m| m.get(key)).cloned()
    }

    /// Write a device key. Infallible; schedules a debounced flush.
    pub fn device_set(&self, device: &str, key: &str, value: Value) {
        {
            let mut inner = self.lock();
            inner.devices.entry(device.to_owned()).or_default().insert(key.to_owned(), value);
            inner.dirty = true;
        }
        self.dirty_notify.notify_one();
    }

    /// Write a device key and flush immediately. The flush result is
    /// surfaced so callers of intentional user actions can report failures.
    pub fn device_set_critical(
        &self,
        device: &str,
        key: &str,
        value: Value,
    ) -> Result<(), DaemonError> {
        self.device_set(device, key, value);
        self.flush()
    }

    /// Typed view of a device's persisted state.
    pub fn persisted_device(&self, device: &str) -> PersistedDevice {
        let inner = self.lock();
        let map = inner.devices.get(device);
        PersistedDevice::from_map(map)
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.lock().devices.keys().cloned().collect()
    }

    // -- Scene namespace (volatile) -------------------------------------------

    pub fn scene_get(&self, device: &str, scene: &str, key: &str) -> Option<Value> {
        self.lock().scene.get(&(device.to_owned(), scene.to_owned())).and_then(|m| m.get(key)).cloned()
    }

    pub fn scene_set(&self, device: &str, scene: &str, key: &str, value: Value) {
        self.lock()
            .scene
            .entry((device.to_owned(), scene.to_owned()))
            .or_default()
            .insert(key.to_owned(), value);
    }

    /// Drop a scene instance's scratch state. Called on stop/supersede so a
    /// context cannot leak across generations.
    pub fn scene_clear(&self, device: &str, scene: &str) {
        self.lock().scene.remove(&(device.to_owned(), scene.to_owned()));
    }

    // -- Daemon namespace -----------------------------------------------------

    pub fn daemon_meta(&self) -> DaemonMeta {
        self.lock().daemon.clone()
    }

    pub fn set_daemon_start(&self, ts: u64) -> Result<(), DaemonError> {
        {
            let mut inner = self.lock();
            inner.daemon.start_ts = ts;
            inner.daemon.heartbeat_ts = ts;
            inner.dirty = true;
        }
        self.flush()
    }

    /// Refresh the heartbeat timestamp; debounced, never critical.
    pub fn set_heartbeat(&self, ts: u64) {
        {
            let mut inner = self.lock();
            inner.daemon.heartbeat_ts = ts;
            inner.dirty = true;
        }
        self.dirty_notify.notify_one();
    }

    // -- Snapshot / restore ---------------------------------------------------

    /// Snapshot the durable state as a journal document.
    pub fn snapshot(&self) -> JournalDoc {
        self.lock().to_doc()
    }

    /// Replace durable state from a journal document.
    pub fn restore(&self, doc: JournalDoc) {
        let mut inner = self.lock();
        inner.daemon = doc.daemon;
        inner.devices = doc.devices;
        inner.extra = doc.extra;
        inner.dirty = false;
    }

    /// Load the journal from disk. A missing or malformed file resets to
    /// empty state; neither is fatal.
    pub fn restore_from_disk(&self) {
        match journal::load(&self.path) {
            Ok(doc) => {
                tracing::info!(path = %self.path.display(), devices = doc.devices.len(), "restored runtime state");
                self.restore(doc);
            }
            Err(e) if e.downcast_ref::<std::io::Error>().map(|io| io.kind())
                == Some(std::io::ErrorKind::NotFound) =>
            {
                tracing::info!(path = %self.path.display(), "no state file; starting empty");
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "state file unreadable; starting empty");
            }
        }
    }

    /// Synchronous durable flush. Idempotent: a clean store is a no-op.
    pub fn flush(&self) -> Result<(), DaemonError> {
        let doc = {
            let mut inner = self.lock();
            if !inner.persist || !inner.dirty {
                return Ok(());
            }
            inner.dirty = false;
            inner.to_doc()
        };
        match journal::save(&self.path, &doc) {
            Ok(()) => Ok(()),
            Err(e) => {
                let failures = {
                    let mut inner = self.lock();
                    inner.dirty = true;
                    inner.write_failures += 1;
                    inner.write_failures
                };
                tracing::error!(path = %self.path.display(), failures, err = %e, "state flush failed");
                Err(DaemonError::Persistence(format!("flush to {}: {e}", self.path.display())))
            }
        }
    }

    /// Background journal task: coalesces dirty marks into one flush per
    /// debounce window.
    pub fn spawn_journal(self: &Arc<Self>, shutdown: CancellationToken) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = store.dirty_notify.notified() => {}
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(store.debounce) => {}
                }
                // Write failures are already logged; the journal keeps going.
                let _ = store.flush();
            }
        });
    }
}

/// Typed view of one device's persisted state, with daemon defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedDevice {
    pub display_on: bool,
    pub brightness: u8,
    pub active_scene: Option<String>,
    pub active_scene_payload: Value,
    pub play_state: String,
    pub logging_level: Option<String>,
    pub driver: Option<String>,
}

impl Default for PersistedDevice {
    fn default() -> Self {
        Self {
            display_on: true,
            brightness: 100,
            active_scene: None,
            active_scene_payload: Value::Null,
            play_state: "stopped".to_owned(),
            logging_level: None,
            driver: None,
        }
    }
}

impl PersistedDevice {
    fn from_map(map: Option<&Map<String, Value>>) -> Self {
        let Some(map) = map else { return Self::default() };
        let default = Self::default();
        Self {
            display_on: map.get(keys::DISPLAY_ON).and_then(Value::as_bool).unwrap_or(default.display_on),
            brightness: map
                .get(keys::BRIGHTNESS)
                .and_then(Value::as_u64)
                .map(|v| v.min(100) as u8)
                .unwrap_or(default.brightness),
            active_scene: map
                .get(keys::ACTIVE_SCENE)
                .and_then(Value::as_str)
                .map(str::to_owned),
            active_scene_payload: map.get(keys::ACTIVE_SCENE_PAYLOAD).cloned().unwrap_or(Value::Null),
            play_state: map
                .get(keys::PLAY_STATE)
                .and_then(Value::as_str)
                .unwrap_or(&default.play_state)
                .to_owned(),
            logging_level: map
                .get(keys::LOGGING_LEVEL)
                .and_then(Value::as_str)
                .map(str::to_owned),
            driver: map.get(keys::DRIVER).and_then(Value::as_str).map(str::to_owned),
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
