// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport for the 64x64 HTTP-driven panel.
//!
//! The panel accepts a single `POST /post` endpoint taking a JSON command
//! envelope. Frames go out as base64 RGB via `Draw/SendHttpGif`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::frame::Frame;
use super::transport::{ProbeOutcome, Transport};

pub struct HttpPanelTransport {
    url: String,
    client: Client,
    probe_client: Client,
    /// Monotone picture id required by the panel's draw command.
    pic_id: std::sync::atomic::AtomicU32,
}

impl HttpPanelTransport {
    pub fn new(host: &str, push_timeout: Duration, probe_timeout: Duration) -> Self {
        let client = Client::builder().timeout(push_timeout).build().unwrap_or_default();
        let probe_client = Client::builder().timeout(probe_timeout).build().unwrap_or_default();
        Self {
            url: format!("http://{host}/post"),
            client,
            probe_client,
            pic_id: std::sync::atomic::AtomicU32::new(1),
        }
    }

    async fn command(&self, body: &serde_json::Value) -> anyhow::Result<()> {
        let resp = self.client.post(&self.url).json(body).send().await?;
        resp.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpPanelTransport {
    async fn push(&self, frame: &Frame) -> anyhow::Result<()> {
        let pic_id = self.pic_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.command(&json!({
            "Command": "Draw/SendHttpGif",
            "PicNum": 1,
            "PicWidth": frame.width(),
            "PicOffset": 0,
            "PicID": pic_id,
            "PicSpeed": 1000,
            "PicData": frame.to_base64(),
        }))
        .await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.command(&json!({ "Command": "Draw/ClearHttpText" })).await?;
        self.command(&json!({ "Command": "Draw/ResetHttpGifId" })).await
    }

    async fn set_brightness(&self, value: u8) -> anyhow::Result<()> {
        self.command(&json!({ "Command": "Channel/SetBrightness", "Brightness": value.min(100) }))
            .await
    }

    async fn set_power(&self, on: bool) -> anyhow::Result<()> {
        self.command(&json!({ "Command": "Channel/OnOffScreen", "OnOff": i32::from(on) })).await
    }

    async fn health_check(&self) -> ProbeOutcome {
        let started = Instant::now();
        let result = self
            .probe_client
            .post(&self.url)
            .json(&json!({ "Command": "Channel/GetAllConf" }))
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
