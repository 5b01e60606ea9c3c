// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command router: parses and validates ingress commands from the bus and
//! the REST API, and dispatches them to the owning device worker.
//!
//! Subject grammar: `{prefix}.{deviceId}.{section}.{action}`. Device IDs may
//! contain dots (IP addresses), so the subject is parsed from the right:
//! the last token is the action, the one before it the section, and the
//! remainder is the device ID.

use serde_json::Value;

use crate::device::DriverMode;
use crate::error::DaemonError;
use crate::runtime::{DeviceCommand, PlayAction};
use crate::scene::SceneRegistry;

pub use crate::runtime::dispatch;

/// Ingress command sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Scene,
    Driver,
    State,
    Reset,
    Display,
    Brightness,
}

impl Section {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scene" => Some(Self::Scene),
            "driver" => Some(Self::Driver),
            "state" => Some(Self::State),
            "reset" => Some(Self::Reset),
            "display" => Some(Self::Display),
            "brightness" => Some(Self::Brightness),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Driver => "driver",
            Self::State => "state",
            Self::Reset => "reset",
            Self::Display => "display",
            Self::Brightness => "brightness",
        }
    }

    /// Sections whose errors carry the device's current persisted state so
    /// clients can reconcile.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Scene | Self::State | Self::Display | Self::Brightness)
    }
}

/// Result of parsing one bus subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectParse {
    Command { device: String, section: Section, action: String },
    /// One of our own response/broadcast subjects; skipped silently.
    SelfEgress,
    /// Not a recognized command subject; logged and dropped.
    Invalid,
}

/// Parse `{prefix}.{deviceId}.{section}.{action}`.
pub fn parse_subject(prefix: &str, subject: &str) -> SubjectParse {
    let Some(suffix) = subject.strip_prefix(prefix).and_then(|s| s.strip_prefix('.')) else {
        return SubjectParse::Invalid;
    };
    if suffix.ends_with(".ok") || suffix.ends_with(".error") {
        return SubjectParse::SelfEgress;
    }
    let mut parts = suffix.rsplitn(3, '.');
    let (Some(action), Some(section_str), Some(device)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return SubjectParse::Invalid;
    };
    let Some(section) = Section::parse(section_str) else {
        return SubjectParse::Invalid;
    };
    // Our own scene/state broadcast shares the command grammar.
    if section == Section::Scene && action == "state" {
        return SubjectParse::SelfEgress;
    }
    if device.is_empty() {
        return SubjectParse::Invalid;
    }
    SubjectParse::Command {
        device: device.to_owned(),
        section,
        action: action.to_owned(),
    }
}

/// Legacy continuation-frame marker. The render loop is the only legitimate
/// frame producer, so these payloads are always dropped.
pub fn is_continuation_frame(payload: &Value) -> bool {
    payload.get("animationFrame").and_then(Value::as_bool).unwrap_or(false)
}

/// Validate an ingress envelope into a device command.
pub fn validate(
    section: Section,
    action: &str,
    payload: &Value,
    scenes: &SceneRegistry,
) -> Result<DeviceCommand, DaemonError> {
    if is_continuation_frame(payload) {
        return Err(DaemonError::Validation("legacy animation frame dropped".to_owned()));
    }

    match (section, action) {
        (Section::Scene, "set") => {
            let name = require_str(payload, "name")?;
            ensure_scene(scenes, name)?;
            Ok(DeviceCommand::SwitchScene { name: name.to_owned(), payload: payload.clone() })
        }
        (Section::Scene, "pause") => Ok(DeviceCommand::SceneAction { action: PlayAction::Pause }),
        (Section::Scene, "resume") => Ok(DeviceCommand::SceneAction { action: PlayAction::Resume }),
        (Section::Scene, "stop") => Ok(DeviceCommand::SceneAction { action: PlayAction::Stop }),
        (Section::State, "upd") => {
            let name = require_str(payload, "scene")?;
            ensure_scene(scenes, name)?;
            let inner = payload.get("payload").cloned().unwrap_or(Value::Null);
            Ok(DeviceCommand::SwitchScene { name: name.to_owned(), payload: inner })
        }
        (Section::Driver, "set") => {
            let driver = require_str(payload, "driver")?;
            let mode = DriverMode::parse(driver)
                .ok_or_else(|| DaemonError::Validation(format!("unknown driver {driver:?}")))?;
            Ok(DeviceCommand::SwitchDriver { mode })
        }
        (Section::Reset, "set") => Ok(DeviceCommand::Reset),
        (Section::Display, "set") => {
            let on = payload
                .get("on")
                .and_then(Value::as_bool)
                .ok_or_else(|| DaemonError::Validation("display requires boolean `on`".to_owned()))?;
            Ok(DeviceCommand::SetDisplay { on })
        }
        (Section::Brightness, "set") => {
            let value = payload
                .get("value")
                .and_then(Value::as_u64)
                .ok_or_else(|| DaemonError::Validation("brightness requires `value`".to_owned()))?;
            if value > 100 {
                return Err(DaemonError::Validation(format!(
                    "brightness {value} out of range 0..=100"
                )));
            }
            Ok(DeviceCommand::SetBrightness { value: value as u8 })
        }
        (section, action) => Err(DaemonError::Validation(format!(
            "unknown action {action:?} for section {}",
            section.as_str()
        ))),
    }
}

fn require_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str, DaemonError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DaemonError::Validation(format!("missing required field `{key}`")))
}

fn ensure_scene(scenes: &SceneRegistry, name: &str) -> Result<(), DaemonError> {
    if scenes.contains(name) {
        Ok(())
    } else {
        Err(DaemonError::NotFound(format!("unknown scene {name}")))
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
