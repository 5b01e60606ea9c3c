// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device render metrics. In-memory only; liveness lives in the
//! watchdog, never here.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Exponential moving average weight for the fps estimate.
const FPS_EMA_ALPHA: f64 = 0.2;

/// Render metrics owned by a device's render loop.
#[derive(Debug, Default)]
pub struct RenderMetrics {
    frame_count: u64,
    last_frametime_ms: u64,
    fps_ema: f64,
    pushes: u64,
    skipped: u64,
    errors: u64,
    last_frame_at: Option<Instant>,
}

impl RenderMetrics {
    pub fn record_frame(&mut self, frametime: Duration) {
        self.frame_count += 1;
        self.last_frametime_ms = frametime.as_millis() as u64;
        let now = Instant::now();
        if let Some(prev) = self.last_frame_at {
            let interval = now.duration_since(prev).as_secs_f64();
            if interval > 0.0 {
                let instantaneous = 1.0 / interval;
                self.fps_ema = if self.fps_ema == 0.0 {
                    instantaneous
                } else {
                    FPS_EMA_ALPHA * instantaneous + (1.0 - FPS_EMA_ALPHA) * self.fps_ema
                };
            }
        }
        self.last_frame_at = Some(now);
    }

    pub fn record_push(&mut self) {
        self.pushes += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frame_count: self.frame_count,
            last_frametime_ms: self.last_frametime_ms,
            fps: (self.fps_ema * 10.0).round() / 10.0,
            pushes: self.pushes,
            skipped: self.skipped,
            errors: self.errors,
        }
    }
}

/// Wire-format metrics snapshot.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub frame_count: u64,
    pub last_frametime_ms: u64,
    pub fps: f64,
    pub pushes: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
