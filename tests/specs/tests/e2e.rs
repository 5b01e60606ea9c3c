// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against the real daemon binary.

use serde_json::json;

use pidicon_specs::DaemonProcess;
use pidicond::store::journal;

const DEVICE: &str = "192.168.1.100";

#[tokio::test]
async fn status_reports_running_daemon() -> anyhow::Result<()> {
    let daemon = DaemonProcess::spawn(DEVICE).await?;
    let status = daemon.get_json("/api/status").await?;
    assert_eq!(status["status"], "running");
    assert_eq!(status["deviceCount"], 1);
    Ok(())
}

#[tokio::test]
async fn cold_restart_preserves_display_power() -> anyhow::Result<()> {
    let mut daemon = DaemonProcess::spawn(DEVICE).await?;

    let view = daemon.post_json(&format!("/api/devices/{DEVICE}/display"), &json!({"on": false})).await?;
    assert_eq!(view["displayOn"], false);

    // A power change is a critical write: the file must already hold it.
    let doc = journal::load(&daemon.state_file)?;
    assert_eq!(doc.devices[DEVICE]["displayOn"], json!(false));

    let state_file = daemon.state_file.clone();
    daemon.kill_hard()?;

    let restarted = DaemonProcess::respawn(DEVICE, state_file).await?;
    let view = restarted.get_json(&format!("/api/devices/{DEVICE}")).await?;
    assert_eq!(view["displayOn"], false, "restored display power after restart");
    Ok(())
}

#[tokio::test]
async fn critical_brightness_write_survives_power_pull() -> anyhow::Result<()> {
    let mut daemon = DaemonProcess::spawn(DEVICE).await?;

    daemon
        .post_json(&format!("/api/devices/{DEVICE}/brightness"), &json!({"value": 42}))
        .await?;
    // Pull the plug well inside the debounce window.
    let state_file = daemon.state_file.clone();
    daemon.kill_hard()?;

    let restarted = DaemonProcess::respawn(DEVICE, state_file).await?;
    let view = restarted.get_json(&format!("/api/devices/{DEVICE}")).await?;
    assert_eq!(view["brightness"], 42, "critical write must not wait for the debounce");
    Ok(())
}

#[tokio::test]
async fn stop_then_play_restarts_with_fresh_generation() -> anyhow::Result<()> {
    let daemon = DaemonProcess::spawn(DEVICE).await?;
    let scene_url = format!("/api/devices/{DEVICE}/scene");

    let mut last_generation = 0u64;
    for _ in 0..5 {
        let view = daemon
            .post_json(&scene_url, &json!({"name": "performance-test", "frametime": 50}))
            .await?;
        assert_eq!(view["scene"]["status"], "running");
        let generation = view["scene"]["generationId"].as_u64().unwrap_or(0);
        assert!(generation > last_generation, "each restart allocates a fresh generation");
        last_generation = generation;

        let view = daemon.post_json(&scene_url, &json!({"action": "stop"})).await?;
        assert_eq!(view["scene"]["status"], "stopped");
        assert_eq!(view["playState"], "stopped");
    }
    Ok(())
}

#[tokio::test]
async fn running_scene_resumes_after_restart() -> anyhow::Result<()> {
    let mut daemon = DaemonProcess::spawn(DEVICE).await?;

    daemon
        .post_json(&format!("/api/devices/{DEVICE}/scene"), &json!({"name": "clock"}))
        .await?;
    let state_file = daemon.state_file.clone();
    daemon.kill_hard()?;

    let restarted = DaemonProcess::respawn(DEVICE, state_file).await?;
    let view = restarted.get_json(&format!("/api/devices/{DEVICE}")).await?;
    assert_eq!(view["activeScene"], "clock");
    assert_eq!(view["playState"], "playing");
    assert_eq!(view["scene"]["status"], "running", "playing scene resumes on boot");
    Ok(())
}

#[tokio::test]
async fn parameter_update_is_authoritative_and_persisted() -> anyhow::Result<()> {
    let daemon = DaemonProcess::spawn(DEVICE).await?;
    let scene_url = format!("/api/devices/{DEVICE}/scene");

    let first = daemon.post_json(&scene_url, &json!({"name": "fill", "color": "#ff0000"})).await?;
    let g1 = first["scene"]["generationId"].as_u64().unwrap_or(0);

    let second = daemon.post_json(&scene_url, &json!({"name": "fill", "color": "#0000ff"})).await?;
    let g2 = second["scene"]["generationId"].as_u64().unwrap_or(0);
    assert!(g2 > g1, "same scene, new payload still allocates a generation");

    // The persisted payload is the newest one.
    let doc = journal::load(&daemon.state_file)?;
    assert_eq!(doc.devices[DEVICE]["activeScenePayload"]["color"], json!("#0000ff"));
    Ok(())
}

#[tokio::test]
async fn stale_heartbeat_is_flagged_after_abrupt_exit() -> anyhow::Result<()> {
    let mut daemon = DaemonProcess::spawn(DEVICE).await?;
    let state_file = daemon.state_file.clone();

    // Age the heartbeat far past 2x the refresh interval, then die hard.
    daemon.kill_hard()?;
    let mut doc = journal::load(&state_file)?;
    doc.daemon.heartbeat_ts = doc.daemon.heartbeat_ts.saturating_sub(3_600_000);
    journal::save(&state_file, &doc)?;

    let restarted = DaemonProcess::respawn(DEVICE, state_file).await?;
    let status = restarted.get_json("/api/status").await?;
    assert_eq!(status["staleHeartbeat"], true);
    Ok(())
}
