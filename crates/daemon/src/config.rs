// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::str::FromStr;
use std::time::Duration;

use crate::device::DeviceKind;

/// Configuration for the pidicon daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "pidicond", about = "Controller daemon for networked pixel displays")]
pub struct DaemonConfig {
    /// Host to bind the web API on.
    #[arg(long, default_value = "0.0.0.0", env = "PIDICON_WEB_HOST")]
    pub web_host: String,

    /// Port for the web API and WebSocket stream.
    #[arg(long, default_value_t = 10829, env = "PIXOO_WEB_PORT")]
    pub web_port: u16,

    /// Message bus URL. If unset, bus ingress/egress is disabled.
    #[arg(long, env = "PIDICON_BUS_URL")]
    pub bus_url: Option<String>,

    /// Auth token for the message bus.
    #[arg(long, env = "PIDICON_BUS_TOKEN")]
    pub bus_token: Option<String>,

    /// Subject prefix for bus commands and broadcasts.
    #[arg(long, default_value = "pidicon", env = "PIDICON_BUS_PREFIX")]
    pub bus_prefix: String,

    /// Path of the persisted runtime state file.
    #[arg(long, default_value = "/data/runtime-state.json", env = "PIDICON_STATE_FILE")]
    pub state_file: std::path::PathBuf,

    /// State journal debounce window in milliseconds.
    #[arg(long, default_value_t = 2000, env = "PIDICON_STATE_DEBOUNCE_MS")]
    pub state_debounce_ms: u64,

    /// Devices to control, as `<id>=<kind>` (kind: pixoo64 | matrix).
    /// Append `@mock` to start a device on the mock driver.
    #[arg(long = "device", env = "PIDICON_DEVICES", value_delimiter = ',')]
    pub devices: Vec<DeviceSpec>,

    /// Watchdog health-check interval in milliseconds.
    #[arg(long, default_value_t = 10000, env = "PIDICON_HEALTH_CHECK_MS")]
    pub health_check_ms: u64,

    /// Frame push timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "PIDICON_PUSH_TIMEOUT_MS")]
    pub push_timeout_ms: u64,

    /// Watchdog probe timeout in milliseconds.
    #[arg(long, default_value_t = 3000, env = "PIDICON_PROBE_TIMEOUT_MS")]
    pub probe_timeout_ms: u64,

    /// Daemon heartbeat refresh interval in milliseconds.
    #[arg(long, default_value_t = 30000, env = "PIDICON_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Metrics broadcast interval in milliseconds.
    #[arg(long, default_value_t = 2000, env = "PIDICON_METRICS_MS")]
    pub metrics_ms: u64,
}

impl DaemonConfig {
    pub fn state_debounce(&self) -> Duration {
        Duration::from_millis(self.state_debounce_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_ms)
    }
}

/// One `--device` argument: `<id>=<kind>[@mock]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub id: String,
    pub kind: DeviceKind,
    pub mock: bool,
}

impl FromStr for DeviceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected <id>=<kind>, got {s:?}"))?;
        let (kind_str, mock) = match rest.split_once('@') {
            Some((k, "mock")) => (k, true),
            Some((_, other)) => return Err(format!("unknown device modifier {other:?}")),
            None => (rest, false),
        };
        let kind = match kind_str {
            "pixoo64" => DeviceKind::Pixoo64,
            "matrix" => DeviceKind::Matrix,
            other => return Err(format!("unknown device kind {other:?}")),
        };
        if id.is_empty() {
            return Err("device id must not be empty".to_owned());
        }
        Ok(Self { id: id.to_owned(), kind, mock })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
