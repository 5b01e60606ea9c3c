// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;

use crate::device::{Frame, MockTransport, Transport};
use crate::runtime::metrics::RenderMetrics;
use crate::state::{EventSink, RuntimeEvent};
use crate::store::StateStore;
use crate::test_support::{test_registry, CLEANUPS};

use super::{SceneManager, SceneStatus};

struct Fixture {
    manager: SceneManager,
    mock: Arc<MockTransport>,
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
    events: EventSink,
    metrics: RenderMetrics,
}

fn fixture() -> Fixture {
    let store = StateStore::in_memory();
    let events = EventSink::new();
    let manager = SceneManager::new(
        "dev-1".to_owned(),
        Frame::new(16, 16),
        Arc::clone(&store),
        test_registry(),
        events.clone(),
    );
    let mock = Arc::new(MockTransport::new());
    let transport = Arc::clone(&mock) as Arc<dyn Transport>;
    Fixture { manager, mock, transport, store, events, metrics: RenderMetrics::default() }
}

// ── switch ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn switch_unknown_scene_is_not_found() {
    let mut f = fixture();
    let err = f.manager.switch(&f.transport, "nope", json!({})).await.expect_err("must fail");
    assert_eq!(err.code(), "NOT_FOUND");
    assert!(f.manager.status().is_none());
}

#[tokio::test]
async fn switch_starts_running_and_persists() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({"frametime": 20})).await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    assert_eq!(f.manager.status(), Some(SceneStatus::Running));
    assert!(f.manager.armed_deadline().is_some(), "first render must be enqueued");

    let persisted = f.store.persisted_device("dev-1");
    assert_eq!(persisted.active_scene.as_deref(), Some("ok-loop"));
    assert_eq!(persisted.active_scene_payload, json!({"frametime": 20}));
    assert_eq!(persisted.play_state, "playing");
    Ok(())
}

#[tokio::test]
async fn every_switch_allocates_a_new_generation() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.manager.current_generation(), 1);

    // Same name, same payload: still a new generation.
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.manager.current_generation(), 2);

    f.manager.switch(&f.transport, "one-shot", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.manager.current_generation(), 3);
    Ok(())
}

#[tokio::test]
async fn switch_broadcasts_switching_then_running() -> anyhow::Result<()> {
    let mut f = fixture();
    let mut rx = f.events.subscribe();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let first = rx.try_recv()?;
    let second = rx.try_recv()?;
    match (first, second) {
        (
            RuntimeEvent::SceneSwitch { status: SceneStatus::Switching, generation_id: g1, .. },
            RuntimeEvent::SceneSwitch { status: SceneStatus::Running, generation_id: g2, .. },
        ) => {
            assert_eq!(g1, g2);
        }
        other => anyhow::bail!("expected switching then running, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn scene_change_clears_screen_same_scene_does_not() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.mock.clear_count(), 1, "first scene clears");

    f.manager.switch(&f.transport, "ok-loop", json!({"x": 1})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.mock.clear_count(), 1, "same-scene switch with clear=false must not clear");

    f.manager.switch(&f.transport, "ok-loop", json!({"clear": true})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.mock.clear_count(), 2, "clear=true forces a clear");

    f.manager.switch(&f.transport, "one-shot", json!({"clear": false})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.mock.clear_count(), 3, "different scene always clears");
    Ok(())
}

#[tokio::test]
async fn cleanup_failure_does_not_block_next_scene() -> anyhow::Result<()> {
    let mut f = fixture();
    let before = CLEANUPS.load(std::sync::atomic::Ordering::Relaxed);
    f.manager.switch(&f.transport, "tracking", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    assert_eq!(CLEANUPS.load(std::sync::atomic::Ordering::Relaxed), before + 1);
    assert_eq!(f.manager.status(), Some(SceneStatus::Running));
    Ok(())
}

#[tokio::test]
async fn init_failure_stops_generation_and_keeps_previous_persisted_scene() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut rx = f.events.subscribe();
    let err = f.manager.switch(&f.transport, "bad-init", json!({})).await.expect_err("init fails");
    assert_eq!(err.code(), "SCENE_ERROR");
    assert!(f.manager.status().is_none(), "failed generation is discarded");

    // The new scene never reached RUNNING, so the persisted current scene is
    // still the previous one.
    let persisted = f.store.persisted_device("dev-1");
    assert_eq!(persisted.active_scene.as_deref(), Some("ok-loop"));

    // switching then stopped for the failed generation.
    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let RuntimeEvent::SceneSwitch { status, .. } = event {
            statuses.push(status);
        }
    }
    assert_eq!(statuses, vec![SceneStatus::Switching, SceneStatus::Stopped]);
    Ok(())
}

// ── pause / resume / stop ─────────────────────────────────────────────────

#[tokio::test]
async fn pause_without_running_scene_is_validation_error() {
    let mut f = fixture();
    assert_eq!(f.manager.pause().expect_err("no scene").code(), "VALIDATION");
}

#[tokio::test]
async fn pause_and_resume_round_trip() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    f.manager.pause().map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.manager.status(), Some(SceneStatus::Paused));
    assert!(f.manager.armed_deadline().is_none(), "pending frame canceled");
    assert_eq!(f.store.persisted_device("dev-1").play_state, "paused");

    f.manager.resume().map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.manager.status(), Some(SceneStatus::Running));
    assert!(f.manager.armed_deadline().is_some(), "next frame re-enqueued");
    assert_eq!(f.store.persisted_device("dev-1").play_state, "playing");

    // Pause does not allocate a generation.
    assert_eq!(f.manager.current_generation(), 1);
    Ok(())
}

#[tokio::test]
async fn stop_clears_screen_and_is_idempotent() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.manager.render_frame(&f.transport, &mut f.metrics).await;
    assert_eq!(f.mock.push_count(), 1);

    f.manager.stop(&f.transport).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let view = f.manager.status_view().ok_or_else(|| anyhow::anyhow!("view"))?;
    assert_eq!(view.status, SceneStatus::Stopped);
    assert_eq!(f.mock.clear_count(), 2, "switch clear + stop clear");
    assert_eq!(f.store.persisted_device("dev-1").play_state, "stopped");

    // Idempotent on an already-stopped device.
    f.manager.stop(&f.transport).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(f.mock.clear_count(), 2);
    Ok(())
}

#[tokio::test]
async fn stop_then_switch_restarts_from_a_fresh_generation() -> anyhow::Result<()> {
    let mut f = fixture();
    for round in 1..=5u64 {
        f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
        f.manager.render_frame(&f.transport, &mut f.metrics).await;
        assert_eq!(f.manager.status(), Some(SceneStatus::Running));
        f.manager.stop(&f.transport).await.map_err(|e| anyhow::anyhow!("{e}"))?;
        assert_eq!(f.manager.current_generation(), round);
    }
    assert_eq!(f.mock.push_count(), 5, "every restart renders from frame zero");
    Ok(())
}

// ── rendering ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn render_frame_pushes_and_rearms() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({"frametime": 30})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    f.manager.render_frame(&f.transport, &mut f.metrics).await;
    assert_eq!(f.mock.push_count(), 1);
    assert!(f.manager.armed_deadline().is_some());

    let snapshot = f.metrics.snapshot();
    assert_eq!(snapshot.frame_count, 1);
    assert_eq!(snapshot.pushes, 1);
    assert_eq!(snapshot.errors, 0);
    Ok(())
}

#[tokio::test]
async fn one_shot_render_ends_loop_but_stays_running() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "one-shot", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.manager.render_frame(&f.transport, &mut f.metrics).await;

    assert_eq!(f.mock.push_count(), 1);
    assert_eq!(f.manager.status(), Some(SceneStatus::Running));
    assert!(f.manager.armed_deadline().is_none(), "one-shot must not re-arm");
    Ok(())
}

#[tokio::test]
async fn zero_delay_loop_rearms_immediately_and_counts_skipped() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({"frametime": 0})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.manager.render_frame(&f.transport, &mut f.metrics).await;

    assert!(f.manager.armed_deadline().is_some(), "looping scene re-arms at 0ms");
    assert!(f.metrics.snapshot().skipped >= 1, "overrunning its own cadence counts as skipped");
    Ok(())
}

#[tokio::test]
async fn first_render_failure_stops_the_instance() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "bad-render", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.manager.render_frame(&f.transport, &mut f.metrics).await;

    assert!(f.manager.status().is_none());
    assert_eq!(f.mock.push_count(), 0, "no frame reaches the transport");
    assert_eq!(f.metrics.snapshot().errors, 1);
    Ok(())
}

#[tokio::test]
async fn later_render_failures_keep_the_loop_alive() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "flaky", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    f.manager.render_frame(&f.transport, &mut f.metrics).await;
    assert_eq!(f.mock.push_count(), 1);

    f.manager.render_frame(&f.transport, &mut f.metrics).await;
    assert_eq!(f.manager.status(), Some(SceneStatus::Running), "loop continues after error");
    assert!(f.manager.armed_deadline().is_some());
    assert_eq!(f.metrics.snapshot().errors, 1);
    assert_eq!(f.mock.push_count(), 1, "failed frame is dropped");
    Ok(())
}

#[tokio::test]
async fn transport_push_failure_counts_error_and_continues() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.mock.set_fail_push(true);

    f.manager.render_frame(&f.transport, &mut f.metrics).await;
    assert_eq!(f.manager.status(), Some(SceneStatus::Running));
    assert!(f.manager.armed_deadline().is_some(), "push errors never stop the loop");
    assert_eq!(f.metrics.snapshot().errors, 1);
    assert_eq!(f.metrics.snapshot().pushes, 0);
    Ok(())
}

// ── generation preemption ─────────────────────────────────────────────────

#[tokio::test]
async fn stale_render_now_is_dropped() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let old_generation = f.manager.current_generation();

    f.manager.switch(&f.transport, "one-shot", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    f.manager.render_now(&f.transport, &mut f.metrics, old_generation).await;
    assert_eq!(f.mock.push_count(), 0, "stale generation must not reach the transport");

    let current = f.manager.current_generation();
    f.manager.render_now(&f.transport, &mut f.metrics, current).await;
    assert_eq!(f.mock.push_count(), 1);
    Ok(())
}

#[tokio::test]
async fn at_most_one_live_instance_at_any_time() -> anyhow::Result<()> {
    let mut f = fixture();
    f.manager.switch(&f.transport, "ok-loop", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.manager.switch(&f.transport, "flaky", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    f.manager.switch(&f.transport, "one-shot", json!({})).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    // The manager holds a single Option<instance>; the view must reflect
    // exactly the newest generation.
    let view = f.manager.status_view().ok_or_else(|| anyhow::anyhow!("view"))?;
    assert_eq!(view.scene, "one-shot");
    assert_eq!(view.generation_id, 3);
    Ok(())
}
