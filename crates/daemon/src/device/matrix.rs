// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport for the 32x8 matrix.
//!
//! Frames and control writes are published over the message bus; the stats
//! probe goes over the matrix firmware's HTTP endpoint because the bus path
//! gives no request/response confirmation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::frame::Frame;
use super::transport::{ProbeOutcome, Transport};

pub struct MatrixTransport {
    host: String,
    subject_prefix: String,
    bus: Option<async_nats::Client>,
    probe_client: Client,
}

impl MatrixTransport {
    pub fn new(
        host: &str,
        bus_prefix: &str,
        bus: Option<async_nats::Client>,
        probe_timeout: Duration,
    ) -> Self {
        let probe_client = Client::builder().timeout(probe_timeout).build().unwrap_or_default();
        Self {
            host: host.to_owned(),
            subject_prefix: format!("{bus_prefix}.{host}"),
            bus,
            probe_client,
        }
    }

    async fn publish(&self, suffix: &str, body: serde_json::Value) -> anyhow::Result<()> {
        let Some(ref bus) = self.bus else {
            anyhow::bail!("matrix {}: message bus not configured", self.host);
        };
        let subject = format!("{}.{suffix}", self.subject_prefix);
        let payload = serde_json::to_vec(&body)?;
        bus.publish(subject, payload.into()).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for MatrixTransport {
    async fn push(&self, frame: &Frame) -> anyhow::Result<()> {
        self.publish(
            "frame",
            json!({
                "width": frame.width(),
                "height": frame.height(),
                "rgb": frame.to_base64(),
            }),
        )
        .await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.publish("frame", json!({ "clear": true })).await
    }

    async fn set_brightness(&self, value: u8) -> anyhow::Result<()> {
        self.publish("settings", json!({ "brightness": value.min(100) })).await
    }

    async fn set_power(&self, on: bool) -> anyhow::Result<()> {
        self.publish("settings", json!({ "power": on })).await
    }

    async fn health_check(&self) -> ProbeOutcome {
        let started = Instant::now();
        let url = format!("http://{}/api/stats", self.host);
        let result = self
            .probe_client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => ProbeOutcome::ok(latency_ms),
            Err(e) => ProbeOutcome::failed(latency_ms, e.to_string()),
        }
    }
}
