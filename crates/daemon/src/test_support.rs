// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests: scripted scenes, a test registry, and a
//! daemon-state builder wired to mock transports.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::device::{DeviceEntry, DeviceKind, DeviceRegistry, DriverMode, MockTransport};
use crate::scene::{Scene, SceneContext, SceneDescriptor, SceneRegistry};
use crate::state::{DaemonState, EventSink};
use crate::store::StateStore;
use crate::watchdog::Watchdog;

pub fn test_config() -> DaemonConfig {
    crate::ensure_crypto();
    DaemonConfig {
        web_host: "127.0.0.1".to_owned(),
        web_port: 0,
        bus_url: None,
        bus_token: None,
        bus_prefix: "pidicon".to_owned(),
        state_file: "/dev/null".into(),
        state_debounce_ms: 2000,
        devices: vec![],
        health_check_ms: 10_000,
        push_timeout_ms: 5000,
        probe_timeout_ms: 3000,
        heartbeat_ms: 30_000,
        metrics_ms: 2000,
    }
}

// -- Scripted scenes ------------------------------------------------------

/// Looping scene; cadence from payload `frametime` (default 50 ms).
#[derive(Default)]
pub struct OkLoopScene;

#[async_trait::async_trait]
impl Scene for OkLoopScene {
    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        let renders = ctx.state_get("renders").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        ctx.state_set("renders", json!(renders));
        ctx.canvas.fill([0, renders as u8, 0]);
        let frametime = ctx.payload_u64("frametime").unwrap_or(50);
        Ok(Some(Duration::from_millis(frametime)))
    }
}

/// One-shot scene filling the payload color (default red).
#[derive(Default)]
pub struct OneShotScene;

#[async_trait::async_trait]
impl Scene for OneShotScene {
    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        let color = crate::scene::builtin::parse_color(ctx.payload.get("color")).unwrap_or([255, 0, 0]);
        ctx.canvas.fill(color);
        Ok(None)
    }
}

/// Fails in `init`.
#[derive(Default)]
pub struct BadInitScene;

#[async_trait::async_trait]
impl Scene for BadInitScene {
    async fn init(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<()> {
        anyhow::bail!("scripted init failure")
    }

    async fn render(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        Ok(None)
    }
}

/// Fails on every render.
#[derive(Default)]
pub struct BadRenderScene;

#[async_trait::async_trait]
impl Scene for BadRenderScene {
    async fn render(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        anyhow::bail!("scripted render failure")
    }
}

/// First frame succeeds, later frames fail.
#[derive(Default)]
pub struct FlakyRenderScene {
    frames: u64,
}

#[async_trait::async_trait]
impl Scene for FlakyRenderScene {
    async fn render(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        self.frames += 1;
        if self.frames == 1 {
            Ok(Some(Duration::from_millis(10)))
        } else {
            anyhow::bail!("scripted render failure after first frame")
        }
    }
}

/// Counts cleanup invocations; cleanup itself fails so tests can verify the
/// error is swallowed.
pub static CLEANUPS: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

#[derive(Default)]
pub struct CleanupTrackingScene;

#[async_trait::async_trait]
impl Scene for CleanupTrackingScene {
    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        ctx.canvas.fill([1, 1, 1]);
        Ok(Some(Duration::from_millis(500)))
    }

    async fn cleanup(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<()> {
        CLEANUPS.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        anyhow::bail!("scripted cleanup failure")
    }
}

pub fn test_registry() -> Arc<SceneRegistry> {
    let mut registry = SceneRegistry::empty();
    registry.register(SceneDescriptor::new("ok-loop", true), || Box::<OkLoopScene>::default());
    registry.register(SceneDescriptor::new("one-shot", false), || Box::<OneShotScene>::default());
    registry.register(SceneDescriptor::new("bad-init", false), || Box::<BadInitScene>::default());
    registry
        .register(SceneDescriptor::new("bad-render", true), || Box::<BadRenderScene>::default());
    registry
        .register(SceneDescriptor::new("flaky", true), || Box::<FlakyRenderScene>::default());
    registry.register(SceneDescriptor::new("tracking", true), || {
        Box::<CleanupTrackingScene>::default()
    });
    Arc::new(registry)
}

// -- Daemon state ----------------------------------------------------------

/// A mock-driver device entry whose `real` slot is also a mock, so driver
/// switches stay observable.
pub fn mock_entry(id: &str) -> (Arc<DeviceEntry>, Arc<MockTransport>) {
    let real = Arc::new(MockTransport::new());
    let entry = DeviceEntry::new(
        id.to_owned(),
        DeviceKind::Pixoo64,
        DriverMode::Mock,
        Arc::clone(&real) as Arc<dyn crate::device::Transport>,
        CancellationToken::new(),
    );
    (entry, real)
}

pub fn test_state_with(entries: Vec<Arc<DeviceEntry>>) -> Arc<DaemonState> {
    test_state_with_config(entries, test_config())
}

pub fn test_state_with_config(
    entries: Vec<Arc<DeviceEntry>>,
    config: DaemonConfig,
) -> Arc<DaemonState> {
    Arc::new(DaemonState {
        config,
        store: StateStore::in_memory(),
        devices: DeviceRegistry::from_entries(entries),
        scenes: test_registry(),
        watchdog: Watchdog::new(),
        events: EventSink::new(),
        shutdown: CancellationToken::new(),
        started_at: std::time::Instant::now(),
        stale_heartbeat_at_boot: false,
        bus: None,
    })
}
