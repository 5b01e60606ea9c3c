// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus command subscriber.
//!
//! Subscribes to `{prefix}.>` and routes recognized command subjects through
//! the command router. Responses go out on `{prefix}.{device}.ok` and
//! `{prefix}.{device}.error`; our own egress subjects are skipped.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::router::{self, SubjectParse};
use crate::state::DaemonState;

/// Spawn the bus subscriber as a background task.
pub fn spawn_subscriber(state: Arc<DaemonState>, client: async_nats::Client) {
    tokio::spawn(async move {
        if let Err(e) = run_subscriber(state, client).await {
            tracing::error!(err = %e, "bus subscriber failed");
        }
    });
}

async fn run_subscriber(
    state: Arc<DaemonState>,
    client: async_nats::Client,
) -> anyhow::Result<()> {
    let subject = format!("{}.>", state.config.bus_prefix);
    let mut sub = client.subscribe(subject).await?;
    let shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = sub.next() => {
                let Some(msg) = msg else { break };
                let responses = handle_message(&state, msg.subject.as_str(), &msg.payload).await;
                for (subject, payload) in responses {
                    if let Err(e) = client.publish(subject, payload).await {
                        tracing::warn!(err = %e, "bus response publish failed");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Handle one bus message. Returns the responses to publish.
pub(crate) async fn handle_message(
    state: &Arc<DaemonState>,
    subject: &str,
    payload: &[u8],
) -> Vec<(String, Bytes)> {
    let prefix = &state.config.bus_prefix;
    let (device, section, action) = match router::parse_subject(prefix, subject) {
        SubjectParse::Command { device, section, action } => (device, section, action),
        SubjectParse::SelfEgress => return vec![],
        SubjectParse::Invalid => {
            tracing::debug!(subject, "dropping unrecognized bus subject");
            return vec![];
        }
    };

    let payload: Value = if payload.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(subject, err = %e, "invalid command payload");
                return vec![error_response(state, &device, section.as_str(), &action, &Value::Null,
                    &crate::error::DaemonError::Validation(format!("invalid JSON payload: {e}")), section.is_critical())];
            }
        }
    };

    if router::is_continuation_frame(&payload) {
        tracing::debug!(device = %device, subject, "dropping legacy continuation frame");
        return vec![];
    }

    let cmd = match router::validate(section, &action, &payload, &state.scenes) {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::warn!(device = %device, section = section.as_str(), action = %action, err = %e, "command rejected");
            return vec![error_response(state, &device, section.as_str(), &action, &payload, &e, section.is_critical())];
        }
    };

    match router::dispatch(state, &device, cmd).await {
        Ok(view) => {
            let body = json!({
                "ok": true,
                "section": section.as_str(),
                "action": action,
                "state": view,
            });
            vec![(
                format!("{prefix}.{device}.ok"),
                Bytes::from(serde_json::to_vec(&body).unwrap_or_default()),
            )]
        }
        Err(e) => {
            tracing::warn!(device = %device, section = section.as_str(), action = %action, err = %e, "command failed");
            vec![error_response(state, &device, section.as_str(), &action, &payload, &e, section.is_critical())]
        }
    }
}

fn error_response(
    state: &Arc<DaemonState>,
    device: &str,
    section: &str,
    action: &str,
    payload: &Value,
    error: &crate::error::DaemonError,
    include_state: bool,
) -> (String, Bytes) {
    let mut body = json!({
        "error": {
            "code": error.code(),
            "message": error.message(),
        },
        "context": {
            "section": section,
            "action": action,
            "payload": payload,
        },
    });
    if include_state {
        // Current persisted state lets clients reconcile after a rejected
        // critical command.
        let persisted = state.store.persisted_device(device);
        body["state"] = json!({
            "displayOn": persisted.display_on,
            "brightness": persisted.brightness,
            "activeScene": persisted.active_scene,
            "playState": persisted.play_state,
        });
    }
    (
        format!("{}.{device}.error", state.config.bus_prefix),
        Bytes::from(serde_json::to_vec(&body).unwrap_or_default()),
    )
}

#[cfg(test)]
#[path = "subscriber_tests.rs"]
mod tests;
