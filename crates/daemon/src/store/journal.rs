// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk journal format: load/save the runtime state document with atomic
//! writes. Unknown keys at every level ride along through `#[serde(flatten)]`
//! so older daemons can rewrite files produced by newer ones.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FORMAT_VERSION: u32 = 2;

/// The persisted runtime state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalDoc {
    #[serde(default)]
    pub version: u32,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
    #[serde(default)]
    pub daemon: DaemonMeta,
    /// Per-device persisted state, keyed by device ID. Values stay as raw
    /// JSON maps so keys this build does not know about survive a rewrite.
    #[serde(default)]
    pub devices: BTreeMap<String, Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Durable daemon metadata, restored to detect stale heartbeats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonMeta {
    /// Epoch millis of the last daemon start.
    #[serde(rename = "startTs", default)]
    pub start_ts: u64,
    /// Epoch millis of the last heartbeat write.
    #[serde(rename = "heartbeatTs", default)]
    pub heartbeat_ts: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Well-known per-device keys.
pub mod keys {
    pub const DISPLAY_ON: &str = "displayOn";
    pub const BRIGHTNESS: &str = "brightness";
    pub const ACTIVE_SCENE: &str = "activeScene";
    pub const ACTIVE_SCENE_PAYLOAD: &str = "activeScenePayload";
    pub const PLAY_STATE: &str = "playState";
    pub const LOGGING_LEVEL: &str = "loggingLevel";
    pub const DRIVER: &str = "driver";
}

/// Load a journal document from disk.
pub fn load(path: &Path) -> anyhow::Result<JournalDoc> {
    let contents = std::fs::read_to_string(path)?;
    let doc: JournalDoc = serde_json::from_str(&contents)?;
    Ok(doc)
}

/// Save a journal document atomically (write tmp + rename).
pub fn save(path: &Path, doc: &JournalDoc) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Return the current UTC time as an ISO 8601 string (e.g. "2026-02-14T01:23:45Z").
pub fn iso8601_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs();
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;
    // Civil calendar from days since epoch (Howard Hinnant's algorithm).
    let days = secs / 86400;
    let z = days as i64 + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}T{hours:02}:{minutes:02}:{seconds:02}Z")
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
