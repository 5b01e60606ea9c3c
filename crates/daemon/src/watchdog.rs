// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Independent per-device liveness watchdog.
//!
//! The watchdog runs on its own timer and probes devices through the
//! transport's probe-only interface. It is the single source of truth for
//! `lastSeenTs` and device health; the render path never writes liveness,
//! and the watchdog never reads render metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::device::DriverMode;
use crate::state::{epoch_ms, DaemonState, RuntimeEvent};

/// Consecutive failures before a device is reported degraded.
const DEGRADED_AFTER: u32 = 2;
/// Consecutive failures before a device is reported offline.
const OFFLINE_AFTER: u32 = 3;
/// Probe pause after a remediation command was issued for a device.
const REMEDIATION_COOLDOWN: Duration = Duration::from_secs(120);
/// Probe spacing once a device is offline; capped at the last entry.
const BACKOFF_SCHEDULE: [Duration; 7] = [
    Duration::from_secs(60),
    Duration::from_secs(120),
    Duration::from_secs(300),
    Duration::from_secs(600),
    Duration::from_secs(1800),
    Duration::from_secs(3600),
    Duration::from_secs(86_400),
];

/// Health classification for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    Degraded,
    Offline,
}

/// Result of the most recent probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCheck {
    pub ts: u64,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The watchdog-owned liveness record for one device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessRecord {
    /// Millis of the last *successful probe*. `None` for the mock driver.
    pub last_seen_ts: Option<u64>,
    pub status: HealthStatus,
    pub last_check: Option<LastCheck>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<u64>,
}

impl LivenessRecord {
    fn fresh() -> Self {
        Self {
            last_seen_ts: None,
            status: HealthStatus::Online,
            last_check: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            offline_since: None,
            recovered_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct ProbeSchedule {
    cooldown_until: Option<Instant>,
    backoff_idx: usize,
    next_probe_at: Option<Instant>,
}

/// Liveness records and probe scheduling state for all devices.
pub struct Watchdog {
    records: RwLock<HashMap<String, LivenessRecord>>,
    schedules: RwLock<HashMap<String, ProbeSchedule>>,
}

impl Watchdog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { records: RwLock::new(HashMap::new()), schedules: RwLock::new(HashMap::new()) })
    }

    pub async fn get(&self, device: &str) -> Option<LivenessRecord> {
        self.records.read().await.get(device).cloned()
    }

    pub async fn is_offline(&self, device: &str) -> bool {
        self.records
            .read()
            .await
            .get(device)
            .is_some_and(|r| r.status == HealthStatus::Offline)
    }

    /// Whether a probe is due, honoring remediation cooldown and offline
    /// backoff.
    pub async fn probe_due(&self, device: &str, now: Instant) -> bool {
        let schedules = self.schedules.read().await;
        let Some(sched) = schedules.get(device) else { return true };
        if sched.cooldown_until.is_some_and(|until| now < until) {
            return false;
        }
        !sched.next_probe_at.is_some_and(|at| now < at)
    }

    /// Pause probes for the remediation cooldown window.
    pub async fn note_remediation(&self, device: &str) {
        let mut schedules = self.schedules.write().await;
        let sched = schedules.entry(device.to_owned()).or_default();
        sched.cooldown_until = Some(Instant::now() + REMEDIATION_COOLDOWN);
        tracing::info!(device, cooldown_secs = REMEDIATION_COOLDOWN.as_secs(), "watchdog: remediation cooldown engaged");
    }

    /// User-initiated reset: clear counters, cooldown, and backoff.
    ///
    /// Lock order is records before schedules, matching the probe paths.
    pub async fn reset(&self, device: &str) {
        {
            let mut records = self.records.write().await;
            if let Some(record) = records.get_mut(device) {
                record.consecutive_failures = 0;
                record.consecutive_successes = 0;
            }
        }
        self.schedules.write().await.remove(device);
        tracing::info!(device, "watchdog: counters reset");
    }

    /// Mock driver: reported online with no last-seen timestamp.
    pub async fn mark_mock(&self, device: &str) -> bool {
        let mut records = self.records.write().await;
        let record = records.entry(device.to_owned()).or_insert_with(LivenessRecord::fresh);
        let changed = record.status != HealthStatus::Online || record.last_seen_ts.is_some();
        record.status = HealthStatus::Online;
        record.last_seen_ts = None;
        record.last_check = None;
        record.offline_since = None;
        changed
    }

    /// Record a successful probe. Returns true when the status changed.
    pub async fn record_success(&self, device: &str, latency_ms: u64) -> bool {
        let now = epoch_ms();
        let mut records = self.records.write().await;
        let record = records.entry(device.to_owned()).or_insert_with(LivenessRecord::fresh);
        let prev_status = record.status;

        record.consecutive_successes += 1;
        record.consecutive_failures = 0;
        record.last_seen_ts = Some(now);
        record.last_check = Some(LastCheck { ts: now, success: true, latency_ms, error: None });
        if prev_status != HealthStatus::Online {
            record.recovered_at = Some(now);
            tracing::info!(device, latency_ms, "watchdog: device recovered");
        }
        record.status = HealthStatus::Online;
        record.offline_since = None;
        drop(records);

        // A success resets the backoff schedule.
        self.schedules.write().await.remove(device);

        prev_status != HealthStatus::Online
    }

    /// Record a failed probe. Returns true when the status changed.
    pub async fn record_failure(&self, device: &str, latency_ms: u64, error: String) -> bool {
        let now = epoch_ms();
        let mut records = self.records.write().await;
        let record = records.entry(device.to_owned()).or_insert_with(LivenessRecord::fresh);
        let prev_status = record.status;

        record.consecutive_failures += 1;
        record.consecutive_successes = 0;
        record.last_check =
            Some(LastCheck { ts: now, success: false, latency_ms, error: Some(error.clone()) });
        record.status = if record.consecutive_failures >= OFFLINE_AFTER {
            HealthStatus::Offline
        } else if record.consecutive_failures >= DEGRADED_AFTER {
            HealthStatus::Degraded
        } else {
            prev_status
        };
        if record.status == HealthStatus::Offline && record.offline_since.is_none() {
            record.offline_since = Some(now);
        }
        let failures = record.consecutive_failures;
        let went_offline = record.status == HealthStatus::Offline;
        let changed = record.status != prev_status;
        drop(records);

        tracing::warn!(device, failures, err = %error, "watchdog: probe failed");

        if went_offline {
            let mut schedules = self.schedules.write().await;
            let sched = schedules.entry(device.to_owned()).or_default();
            let delay = BACKOFF_SCHEDULE[sched.backoff_idx.min(BACKOFF_SCHEDULE.len() - 1)];
            sched.next_probe_at = Some(Instant::now() + delay);
            sched.backoff_idx = (sched.backoff_idx + 1).min(BACKOFF_SCHEDULE.len() - 1);
        }

        changed
    }
}

/// Spawn the background watchdog task: one timer for all devices.
pub fn spawn_watchdog(state: Arc<DaemonState>) {
    let interval = state.config.health_check_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            for entry in state.devices.list() {
                if entry.cancel.is_cancelled() {
                    continue;
                }

                if entry.driver().await == DriverMode::Mock {
                    if state.watchdog.mark_mock(&entry.id).await {
                        emit_update(&state, &entry).await;
                    }
                    continue;
                }

                if !state.watchdog.probe_due(&entry.id, Instant::now()).await {
                    continue;
                }

                let transport = entry.transport().await;
                let outcome = transport.health_check().await;
                let changed = if outcome.success {
                    state.watchdog.record_success(&entry.id, outcome.latency_ms).await
                } else {
                    let error = outcome.error.unwrap_or_else(|| "probe failed".to_owned());
                    state.watchdog.record_failure(&entry.id, outcome.latency_ms, error).await
                };
                if changed {
                    emit_update(&state, &entry).await;
                }
            }
        }
    });
}

async fn emit_update(state: &Arc<DaemonState>, entry: &Arc<crate::device::DeviceEntry>) {
    let view = state.device_view(entry).await;
    state.events.emit(RuntimeEvent::DeviceUpdate { device: entry.id.clone(), state: view });
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
