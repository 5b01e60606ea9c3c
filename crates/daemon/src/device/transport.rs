// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardware-facing transport interface.
//!
//! A transport hides the wire format of one device class. Frame pushes and
//! control writes go through the same adapter the render loop uses; the
//! watchdog uses only `health_check`, which never contends with pushes.

use async_trait::async_trait;
use serde::Serialize;

use super::frame::Frame;

/// Outcome of one watchdog probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn ok(latency_ms: u64) -> Self {
        Self { success: true, latency_ms, error: None }
    }

    pub fn failed(latency_ms: u64, error: impl Into<String>) -> Self {
        Self { success: false, latency_ms, error: Some(error.into()) }
    }
}

/// Device transport adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Push one rendered frame to the device.
    async fn push(&self, frame: &Frame) -> anyhow::Result<()>;

    /// Blank the device screen.
    async fn clear(&self) -> anyhow::Result<()>;

    /// Set panel brightness (0..=100).
    async fn set_brightness(&self, value: u8) -> anyhow::Result<()>;

    /// Switch the display on or off.
    async fn set_power(&self, on: bool) -> anyhow::Result<()>;

    /// Lightweight liveness probe. Never errors; failures are reported in
    /// the outcome so the watchdog can count them.
    async fn health_check(&self) -> ProbeOutcome;
}
