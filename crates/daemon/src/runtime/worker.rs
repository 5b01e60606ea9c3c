// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device worker: the single writer for one device's lifecycle, render
//! loop, and transport pushes.
//!
//! The worker owns a mailbox and a frame deadline and drives both from one
//! biased select, so commands are always applied between frames and two
//! renders can never be in flight for the same device. Devices are fully
//! independent; workers share nothing but the store and event hub.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::device::{DeviceEntry, DriverMode, Frame};
use crate::error::DaemonError;
use crate::state::{DaemonState, DeviceView, RuntimeEvent};
use crate::store::keys;

use super::manager::SceneManager;
use super::metrics::RenderMetrics;

/// Mailbox depth per device. Command bursts beyond this apply backpressure
/// to the ingress side rather than ballooning memory.
const MAILBOX_DEPTH: usize = 32;

/// Play-control actions on the active scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayAction {
    Pause,
    Resume,
    Stop,
}

/// A validated device command.
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    SwitchScene { name: String, payload: Value },
    SceneAction { action: PlayAction },
    SetDisplay { on: bool },
    SetBrightness { value: u8 },
    SwitchDriver { mode: DriverMode },
    Reset,
}

/// Messages accepted by a device worker.
pub enum WorkerMsg {
    Command {
        cmd: DeviceCommand,
        reply: oneshot::Sender<Result<DeviceView, DaemonError>>,
    },
    /// Re-render the current frame, gated on the generation it was issued
    /// for. Stale requests are dropped.
    RenderNow { generation: u64 },
}

/// Send a command to a device worker and await the authoritative result.
pub async fn dispatch(
    state: &DaemonState,
    device_id: &str,
    cmd: DeviceCommand,
) -> Result<DeviceView, DaemonError> {
    let entry = state
        .devices
        .get(device_id)
        .ok_or_else(|| DaemonError::NotFound(format!("unknown device {device_id}")))?;
    let mailbox = entry
        .mailbox()
        .ok_or_else(|| DaemonError::Internal(format!("device {device_id} has no worker")))?;
    let (reply_tx, reply_rx) = oneshot::channel();
    mailbox
        .send(WorkerMsg::Command { cmd, reply: reply_tx })
        .await
        .map_err(|_| DaemonError::Internal(format!("worker for {device_id} is gone")))?;
    reply_rx
        .await
        .map_err(|_| DaemonError::Internal(format!("worker for {device_id} dropped the reply")))?
}

/// Spawn the worker task for one device.
pub fn spawn_worker(state: Arc<DaemonState>, entry: Arc<DeviceEntry>) -> JoinHandle<()> {
    let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
    entry.register_mailbox(tx);

    tokio::spawn(async move {
        let canvas = Frame::new(entry.capabilities.width, entry.capabilities.height);
        let manager = SceneManager::new(
            entry.id.clone(),
            canvas,
            Arc::clone(&state.store),
            Arc::clone(&state.scenes),
            state.events.clone(),
        );
        let mut worker = Worker { state, entry, rx, manager, metrics: RenderMetrics::default() };
        worker.restore().await;
        worker.run().await;
    })
}

struct Worker {
    state: Arc<DaemonState>,
    entry: Arc<DeviceEntry>,
    rx: mpsc::Receiver<WorkerMsg>,
    manager: SceneManager,
    metrics: RenderMetrics,
}

impl Worker {
    /// Re-apply persisted device state after a restart. The devices have no
    /// storage of their own, so the daemon is authoritative here.
    async fn restore(&mut self) {
        let persisted = self.state.store.persisted_device(&self.entry.id);
        let transport = self.entry.transport().await;

        if let Err(e) = transport.set_power(persisted.display_on).await {
            tracing::warn!(device = %self.entry.id, err = %e, "restore: set_power failed");
        }
        if let Err(e) = transport.set_brightness(persisted.brightness).await {
            tracing::warn!(device = %self.entry.id, err = %e, "restore: set_brightness failed");
        }

        if persisted.play_state == "playing" {
            if let Some(scene) = persisted.active_scene {
                tracing::info!(device = %self.entry.id, scene = %scene, "resuming persisted scene");
                if let Err(e) = self
                    .manager
                    .switch(&transport, &scene, persisted.active_scene_payload)
                    .await
                {
                    tracing::warn!(device = %self.entry.id, scene = %scene, err = %e, "persisted scene failed to resume");
                }
            }
        }
        self.sync_views().await;
    }

    async fn run(&mut self) {
        loop {
            let deadline = self.manager.armed_deadline();
            tokio::select! {
                biased;

                _ = self.entry.cancel.cancelled() => break,

                // Commands always win over the frame timer, so a 0ms cadence
                // cannot starve ingress.
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.handle(msg).await,
                        None => break,
                    }
                }

                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                        // Unreachable arm; disabled below when no deadline.
                        None => std::future::pending::<()>().await,
                    }
                }, if deadline.is_some() => {
                    let transport = self.entry.transport().await;
                    self.manager.render_frame(&transport, &mut self.metrics).await;
                    self.sync_views().await;
                }
            }
        }

        // Shutdown: pending timers die with the task; give the scene its
        // cleanup hook.
        let transport = self.entry.transport().await;
        self.manager.shutdown(&transport).await;
    }

    async fn handle(&mut self, msg: WorkerMsg) {
        match msg {
            WorkerMsg::Command { cmd, reply } => {
                let result = self.apply(cmd).await;
                // Publish the worker-owned views before building the reply,
                // so the caller sees the post-command state.
                self.sync_views().await;
                let result = match result {
                    Ok(()) => Ok(self.state.device_view(&self.entry).await),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            WorkerMsg::RenderNow { generation } => {
                let transport = self.entry.transport().await;
                self.manager.render_now(&transport, &mut self.metrics, generation).await;
                self.sync_views().await;
            }
        }
    }

    async fn apply(&mut self, cmd: DeviceCommand) -> Result<(), DaemonError> {
        let device_id = self.entry.id.clone();
        match cmd {
            DeviceCommand::SwitchScene { name, payload } => {
                let transport = self.entry.transport().await;
                self.manager.switch(&transport, &name, payload).await
            }
            DeviceCommand::SceneAction { action } => {
                let transport = self.entry.transport().await;
                match action {
                    PlayAction::Pause => self.manager.pause(),
                    PlayAction::Resume => self.manager.resume(),
                    PlayAction::Stop => self.manager.stop(&transport).await,
                }
            }
            DeviceCommand::SetDisplay { on } => {
                // Persist intent first: a power command against an offline
                // device must still survive a restart.
                self.state.store.device_set_critical(
                    &device_id,
                    keys::DISPLAY_ON,
                    Value::Bool(on),
                )?;
                if on && self.state.watchdog.is_offline(&device_id).await {
                    self.state.watchdog.note_remediation(&device_id).await;
                }
                let transport = self.entry.transport().await;
                transport
                    .set_power(on)
                    .await
                    .map_err(|e| DaemonError::Transport(format!("set_power: {e}")))?;
                self.emit_device_update().await;
                Ok(())
            }
            DeviceCommand::SetBrightness { value } => {
                self.state.store.device_set_critical(
                    &device_id,
                    keys::BRIGHTNESS,
                    Value::from(value),
                )?;
                let transport = self.entry.transport().await;
                transport
                    .set_brightness(value)
                    .await
                    .map_err(|e| DaemonError::Transport(format!("set_brightness: {e}")))?;
                self.emit_device_update().await;
                Ok(())
            }
            DeviceCommand::SwitchDriver { mode } => {
                let prev =
                    self.state.devices.switch_driver(&self.state.store, &device_id, mode).await?;
                tracing::info!(device = %device_id, from = prev.as_str(), to = mode.as_str(), "driver switched");
                // Repaint at the same generation so the new transport holds
                // the current frame.
                let transport = self.entry.transport().await;
                let generation = self.manager.current_generation();
                self.manager.render_now(&transport, &mut self.metrics, generation).await;
                self.emit_device_update().await;
                Ok(())
            }
            DeviceCommand::Reset => {
                self.state.watchdog.reset(&device_id).await;
                let transport = self.entry.transport().await;
                let generation = self.manager.current_generation();
                self.manager.render_now(&transport, &mut self.metrics, generation).await;
                self.emit_device_update().await;
                Ok(())
            }
        }
    }

    async fn emit_device_update(&self) {
        let view = self.state.device_view(&self.entry).await;
        self.state.events.emit(RuntimeEvent::DeviceUpdate {
            device: self.entry.id.clone(),
            state: view,
        });
    }

    /// Publish the worker-owned lifecycle and metrics views on the entry.
    async fn sync_views(&self) {
        *self.entry.scene_status.write().await = self.manager.status_view();
        *self.entry.metrics.write().await = self.metrics.snapshot();
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
