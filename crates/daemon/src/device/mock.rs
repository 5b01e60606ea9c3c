// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock transport: records every call for inspection and never touches the
//! network. Doubles as the test harness for the runtime and watchdog.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::frame::Frame;
use super::transport::{ProbeOutcome, Transport};

#[derive(Debug, Default)]
pub struct MockTransport {
    pushes: AtomicU64,
    clears: AtomicU64,
    probes: AtomicU64,
    last_frame: Mutex<Option<Frame>>,
    last_brightness: Mutex<Option<u8>>,
    last_power: Mutex<Option<bool>>,
    fail_push: AtomicBool,
    fail_probe: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_count(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    pub fn clear_count(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.last_frame.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    pub fn last_brightness(&self) -> Option<u8> {
        *self.last_brightness.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn last_power(&self) -> Option<bool> {
        *self.last_power.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make subsequent pushes fail (transport-error path).
    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent probes fail while pushes keep working.
    pub fn set_fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn push(&self, frame: &Frame) -> anyhow::Result<()> {
        if self.fail_push.load(Ordering::Relaxed) {
            anyhow::bail!("mock push failure");
        }
        self.pushes.fetch_add(1, Ordering::Relaxed);
        *self.last_frame.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(frame.clone());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.clears.fetch_add(1, Ordering::Relaxed);
        *self.last_frame.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }

    async fn set_brightness(&self, value: u8) -> anyhow::Result<()> {
        *self.last_brightness.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(value);
        Ok(())
    }

    async fn set_power(&self, on: bool) -> anyhow::Result<()> {
        *self.last_power.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(on);
        Ok(())
    }

    async fn health_check(&self) -> ProbeOutcome {
        self.probes.fetch_add(1, Ordering::Relaxed);
        if self.fail_probe.load(Ordering::Relaxed) {
            ProbeOutcome::failed(0, "mock probe failure")
        } else {
            ProbeOutcome::ok(0)
        }
    }
}
