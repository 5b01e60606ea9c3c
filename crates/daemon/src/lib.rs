// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pidicon: controller daemon for networked pixel displays.

pub mod api;
pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod router;
pub mod runtime;
pub mod scene;
pub mod state;
pub mod store;
pub mod watchdog;

#[cfg(test)]
pub mod test_support;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::device::DeviceRegistry;
use crate::runtime::manager::SceneStatus;
use crate::scene::SceneRegistry;
use crate::state::{epoch_ms, DaemonState, EventSink, RuntimeEvent};
use crate::store::StateStore;
use crate::watchdog::Watchdog;

/// Exit code for SIGINT shutdown.
const EXIT_SIGINT: u8 = 130;
/// Exit code for SIGTERM shutdown after a successful flush.
const EXIT_SIGTERM: u8 = 143;
/// Bounded time for the final shutdown flush.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the daemon until shutdown. Returns the process exit code.
pub async fn run(config: DaemonConfig) -> anyhow::Result<u8> {
    ensure_crypto();

    let shutdown = CancellationToken::new();
    let signal_kind = Arc::new(AtomicU8::new(0));
    spawn_signal_handler(shutdown.clone(), Arc::clone(&signal_kind));

    // Restore authoritative state before anything talks to hardware.
    let store = StateStore::new(config.state_file.clone(), config.state_debounce());
    store.restore_from_disk();
    let stale_heartbeat_at_boot = detect_stale_heartbeat(&store, &config);
    if stale_heartbeat_at_boot {
        tracing::warn!("previous heartbeat is stale; last run likely ended abruptly");
    }
    if let Err(e) = store.set_daemon_start(epoch_ms()) {
        // First-flush writability check: not fatal, but worth shouting about.
        tracing::error!(err = %e, "state file is not writable");
    }
    store.spawn_journal(shutdown.clone());

    let bus = bus::connect(&config).await?;
    let scenes = Arc::new(SceneRegistry::builtin());
    tracing::info!(scenes = scenes.len(), "scene registry loaded");

    let devices = DeviceRegistry::build(&config, &store, bus.clone(), &shutdown);
    if devices.is_empty() {
        tracing::warn!("no devices configured");
    }

    let state = Arc::new(DaemonState {
        store: Arc::clone(&store),
        devices,
        scenes,
        watchdog: Watchdog::new(),
        events: EventSink::new(),
        shutdown: shutdown.clone(),
        started_at: std::time::Instant::now(),
        stale_heartbeat_at_boot,
        bus,
        config,
    });

    let mut workers = Vec::new();
    for entry in state.devices.list() {
        workers.push(runtime::spawn_worker(Arc::clone(&state), entry));
    }
    watchdog::spawn_watchdog(Arc::clone(&state));
    bus::spawn(Arc::clone(&state));
    spawn_heartbeat(Arc::clone(&state));
    spawn_metrics_broadcast(Arc::clone(&state));

    let addr = format!("{}:{}", state.config.web_host, state.config.web_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, devices = state.devices.len(), "pidicond listening");

    let router = api::build_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // Shutdown: workers wind down (pending timers die with their tasks),
    // then the final flush runs last.
    for worker in workers {
        if tokio::time::timeout(Duration::from_secs(2), worker).await.is_err() {
            tracing::warn!("device worker did not stop in time");
        }
    }

    let flush_ok = final_flush(&store).await;
    let code = match (signal_kind.load(Ordering::Relaxed), flush_ok) {
        (_, false) => 1,
        (2, true) => EXIT_SIGINT,
        (15, true) => EXIT_SIGTERM,
        (_, true) => 0,
    };
    tracing::info!(code, "shutdown complete");
    Ok(code)
}

/// Bounded final flush. Failure is logged and reflected in the exit code
/// but never aborts the remaining shutdown.
async fn final_flush(store: &Arc<StateStore>) -> bool {
    let store = Arc::clone(store);
    let flush = tokio::task::spawn_blocking(move || store.flush());
    match tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, flush).await {
        Ok(Ok(Ok(()))) => true,
        Ok(Ok(Err(e))) => {
            tracing::error!(err = %e, "shutdown flush failed");
            false
        }
        Ok(Err(e)) => {
            tracing::error!(err = %e, "shutdown flush task died");
            false
        }
        Err(_) => {
            tracing::error!(timeout_secs = SHUTDOWN_FLUSH_TIMEOUT.as_secs(), "shutdown flush timed out");
            false
        }
    }
}

/// A heartbeat much older than its refresh interval means the previous run
/// terminated without a graceful flush (or a long outage; either way the
/// state file lags reality).
fn detect_stale_heartbeat(store: &StateStore, config: &DaemonConfig) -> bool {
    let meta = store.daemon_meta();
    if meta.heartbeat_ts == 0 {
        return false;
    }
    epoch_ms().saturating_sub(meta.heartbeat_ts) > config.heartbeat_ms.saturating_mul(2)
}

fn spawn_signal_handler(shutdown: CancellationToken, kind: Arc<AtomicU8>) {
    tokio::spawn(async move {
        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(err = %e, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(err = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("SIGINT received; shutting down");
                kind.store(2, Ordering::Relaxed);
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received; shutting down");
                kind.store(15, Ordering::Relaxed);
            }
        }
        shutdown.cancel();
    });
}

/// Periodic daemon heartbeat into the durable store (debounced write).
fn spawn_heartbeat(state: Arc<DaemonState>) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(state.config.heartbeat_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => state.store.set_heartbeat(epoch_ms()),
            }
        }
    });
}

/// Periodic `metrics_update` broadcast for devices with an active loop.
fn spawn_metrics_broadcast(state: Arc<DaemonState>) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(state.config.metrics_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            for entry in state.devices.list() {
                let active = entry
                    .scene_status
                    .read()
                    .await
                    .as_ref()
                    .is_some_and(|v| v.status == SceneStatus::Running && v.loop_scheduled);
                if active {
                    let metrics = entry.metrics.read().await.clone();
                    state.events.emit(RuntimeEvent::MetricsUpdate {
                        device: entry.id.clone(),
                        metrics,
                    });
                }
            }
        }
    });
}
