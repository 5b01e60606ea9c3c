// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device scene lifecycle state machine.
//!
//! States: Idle → Switching → Running ⇄ Paused → Stopped. Stopped is
//! terminal for a generation; every `switch` allocates the next generation,
//! so any asynchronous work tagged with an older generation can be dropped
//! without side effect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{Frame, Transport};
use crate::error::DaemonError;
use crate::scene::{Scene, SceneContext, SceneRegistry};
use crate::state::{epoch_ms, EventSink, RuntimeEvent};
use crate::store::{keys, StateStore};

use super::metrics::RenderMetrics;

/// Lifecycle status of a scene instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Switching,
    Running,
    Paused,
    Stopped,
}

/// Worker-published lifecycle view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneStatusView {
    pub scene: String,
    pub generation_id: u64,
    pub status: SceneStatus,
    pub started_ts: u64,
    pub loop_scheduled: bool,
}

/// Fallback cadence when a looping scene errors before telling us one.
const ERROR_RETRY_DELAY: Duration = Duration::from_secs(1);

struct ActiveInstance {
    name: String,
    generation: u64,
    status: SceneStatus,
    payload: Value,
    scene: Box<dyn Scene>,
    wants_loop: bool,
    started_ts: u64,
    next_deadline: Option<Instant>,
    last_delay: Duration,
    frames: u64,
}

/// The per-device lifecycle state machine. Lives inside the device worker;
/// the worker task is the only caller, so every transition is serialized.
pub struct SceneManager {
    device_id: String,
    store: Arc<StateStore>,
    scenes: Arc<SceneRegistry>,
    events: EventSink,
    canvas: Frame,
    active: Option<ActiveInstance>,
    next_generation: u64,
    /// Name of the most recent instance, surviving stop, for clear-on-change
    /// decisions and stopped-state views.
    last_name: Option<String>,
    last_generation: u64,
}

impl SceneManager {
    pub fn new(
        device_id: String,
        canvas: Frame,
        store: Arc<StateStore>,
        scenes: Arc<SceneRegistry>,
        events: EventSink,
    ) -> Self {
        Self {
            device_id,
            store,
            scenes,
            events,
            canvas,
            active: None,
            next_generation: 0,
            last_name: None,
            last_generation: 0,
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.active.as_ref().map_or(self.last_generation, |i| i.generation)
    }

    pub fn status(&self) -> Option<SceneStatus> {
        self.active.as_ref().map(|i| i.status)
    }

    /// The armed frame deadline, if the instance is running a loop.
    pub fn armed_deadline(&self) -> Option<Instant> {
        let inst = self.active.as_ref()?;
        if inst.status == SceneStatus::Running {
            inst.next_deadline
        } else {
            None
        }
    }

    pub fn status_view(&self) -> Option<SceneStatusView> {
        if let Some(inst) = &self.active {
            Some(SceneStatusView {
                scene: inst.name.clone(),
                generation_id: inst.generation,
                status: inst.status,
                started_ts: inst.started_ts,
                loop_scheduled: inst.next_deadline.is_some(),
            })
        } else {
            self.last_name.as_ref().map(|name| SceneStatusView {
                scene: name.clone(),
                generation_id: self.last_generation,
                status: SceneStatus::Stopped,
                started_ts: 0,
                loop_scheduled: false,
            })
        }
    }

    fn broadcast(&self, scene: Option<String>, generation: u64, status: SceneStatus) {
        self.events.emit(RuntimeEvent::SceneSwitch {
            device: self.device_id.clone(),
            current_scene: scene,
            generation_id: generation,
            status,
            ts: epoch_ms(),
        });
    }

    /// Switch to `name` with `payload`. Always allocates a new generation;
    /// repeated switches to the same scene are how parameter changes land.
    pub async fn switch(
        &mut self,
        transport: &Arc<dyn Transport>,
        name: &str,
        payload: Value,
    ) -> Result<(), DaemonError> {
        let (descriptor, scene) = self
            .scenes
            .instantiate(name)
            .ok_or_else(|| DaemonError::NotFound(format!("unknown scene {name}")))?;

        self.next_generation += 1;
        let generation = self.next_generation;

        // Retire the previous instance. Cleanup failures must not prevent
        // the new scene from starting.
        self.retire_active(transport).await;

        let clear_requested = payload.get("clear").and_then(Value::as_bool).unwrap_or(false);
        let scene_changed = self.last_name.as_deref() != Some(name);
        if scene_changed || clear_requested {
            self.canvas.clear();
            if let Err(e) = transport.clear().await {
                tracing::warn!(device = %self.device_id, err = %e, "screen clear failed");
            }
        }

        let prev_name = self.last_name.clone();
        let prev_generation = self.last_generation;
        self.last_name = Some(name.to_owned());
        self.last_generation = generation;
        self.broadcast(Some(name.to_owned()), generation, SceneStatus::Switching);

        let mut inst = ActiveInstance {
            name: name.to_owned(),
            generation,
            status: SceneStatus::Switching,
            payload,
            scene,
            wants_loop: descriptor.wants_loop,
            started_ts: epoch_ms(),
            next_deadline: None,
            last_delay: ERROR_RETRY_DELAY,
            frames: 0,
        };

        let init_result = {
            let mut ctx = SceneContext::new(
                &mut self.canvas,
                &self.device_id,
                &inst.name,
                &inst.payload,
                inst.generation,
                &self.store,
                &self.events,
            );
            inst.scene.init(&mut ctx).await
        };

        if let Err(e) = init_result {
            tracing::error!(device = %self.device_id, scene = %name, generation, err = %e, "scene init failed");
            self.store.scene_clear(&self.device_id, name);
            // The failed generation was never promoted; the previous scene
            // stays current for clients.
            self.last_name = prev_name.clone();
            self.last_generation = prev_generation;
            self.broadcast(prev_name, prev_generation, SceneStatus::Stopped);
            return Err(DaemonError::Scene(format!("init of {name}: {e}")));
        }

        inst.status = SceneStatus::Running;
        inst.next_deadline = Some(Instant::now());
        self.active = Some(inst);

        // The switch is authoritative state; make it durable before frames flow.
        self.store.device_set(&self.device_id, keys::ACTIVE_SCENE, Value::String(name.to_owned()));
        self.store.device_set(
            &self.device_id,
            keys::ACTIVE_SCENE_PAYLOAD,
            self.active.as_ref().map(|i| i.payload.clone()).unwrap_or(Value::Null),
        );
        let persisted = self.store.device_set_critical(
            &self.device_id,
            keys::PLAY_STATE,
            Value::String("playing".to_owned()),
        );

        self.broadcast(Some(name.to_owned()), generation, SceneStatus::Running);
        persisted
    }

    /// Retire the current instance: cleanup (best-effort) and drop it.
    async fn retire_active(&mut self, _transport: &Arc<dyn Transport>) {
        let Some(mut inst) = self.active.take() else { return };
        if inst.status == SceneStatus::Stopped {
            return;
        }
        inst.next_deadline = None;
        let mut ctx = SceneContext::new(
            &mut self.canvas,
            &self.device_id,
            &inst.name,
            &inst.payload,
            inst.generation,
            &self.store,
            &self.events,
        );
        if let Err(e) = inst.scene.cleanup(&mut ctx).await {
            tracing::warn!(device = %self.device_id, scene = %inst.name, err = %e, "scene cleanup failed");
        }
        self.store.scene_clear(&self.device_id, &inst.name);
    }

    /// RUNNING → PAUSED. The pending frame is canceled; cleanup is not called.
    pub fn pause(&mut self) -> Result<(), DaemonError> {
        let inst = self
            .active
            .as_mut()
            .filter(|i| i.status == SceneStatus::Running)
            .ok_or_else(|| DaemonError::Validation("no running scene to pause".to_owned()))?;
        inst.status = SceneStatus::Paused;
        inst.next_deadline = None;
        let name = inst.name.clone();
        let generation = inst.generation;
        let persisted = self.store.device_set_critical(
            &self.device_id,
            keys::PLAY_STATE,
            Value::String("paused".to_owned()),
        );
        self.broadcast(Some(name), generation, SceneStatus::Paused);
        persisted
    }

    /// PAUSED → RUNNING; the next frame is re-enqueued immediately.
    pub fn resume(&mut self) -> Result<(), DaemonError> {
        let inst = self
            .active
            .as_mut()
            .filter(|i| i.status == SceneStatus::Paused)
            .ok_or_else(|| DaemonError::Validation("no paused scene to resume".to_owned()))?;
        inst.status = SceneStatus::Running;
        inst.next_deadline = Some(Instant::now());
        let name = inst.name.clone();
        let generation = inst.generation;
        let persisted = self.store.device_set_critical(
            &self.device_id,
            keys::PLAY_STATE,
            Value::String("playing".to_owned()),
        );
        self.broadcast(Some(name), generation, SceneStatus::Running);
        persisted
    }

    /// RUNNING/PAUSED → STOPPED: cancel pending frame, cleanup, clear screen.
    /// Idempotent when nothing is live.
    pub async fn stop(&mut self, transport: &Arc<dyn Transport>) -> Result<(), DaemonError> {
        if self.active.is_none() {
            return Ok(());
        }
        let (name, generation) = self
            .active
            .as_ref()
            .map(|i| (i.name.clone(), i.generation))
            .unwrap_or_default();
        self.retire_active(transport).await;
        self.canvas.clear();
        if let Err(e) = transport.clear().await {
            tracing::warn!(device = %self.device_id, err = %e, "screen clear failed");
        }
        let persisted = self.store.device_set_critical(
            &self.device_id,
            keys::PLAY_STATE,
            Value::String("stopped".to_owned()),
        );
        self.broadcast(Some(name), generation, SceneStatus::Stopped);
        persisted
    }

    /// Render one frame now if `generation` is still current. Stale
    /// generations are dropped without touching the transport.
    pub async fn render_now(
        &mut self,
        transport: &Arc<dyn Transport>,
        metrics: &mut RenderMetrics,
        generation: u64,
    ) {
        let current = self.active.as_ref().map(|i| (i.generation, i.status));
        match current {
            Some((gen, SceneStatus::Running)) if gen == generation => {
                self.render_frame(transport, metrics).await;
            }
            _ => {
                tracing::debug!(
                    device = %self.device_id,
                    generation,
                    current = self.current_generation(),
                    "dropping stale render request"
                );
            }
        }
    }

    /// Drive one frame: render, push, re-arm with skew compensation.
    ///
    /// The next deadline is `t_start + delay`, not push-end + delay, so long
    /// frames never accumulate drift beyond one interval; a frame that
    /// overruns its own cadence re-arms immediately and counts as skipped.
    pub async fn render_frame(
        &mut self,
        transport: &Arc<dyn Transport>,
        metrics: &mut RenderMetrics,
    ) {
        let Some(inst) = self.active.as_mut().filter(|i| i.status == SceneStatus::Running) else {
            return;
        };
        inst.next_deadline = None;
        let t_start = Instant::now();

        let render_result = {
            let mut ctx = SceneContext::new(
                &mut self.canvas,
                &self.device_id,
                &inst.name,
                &inst.payload,
                inst.generation,
                &self.store,
                &self.events,
            );
            inst.scene.render(&mut ctx).await
        };

        match render_result {
            Ok(delay) => {
                if let Err(e) = transport.push(&self.canvas).await {
                    metrics.record_error();
                    tracing::warn!(device = %self.device_id, scene = %inst.name, err = %e, "frame push failed");
                } else {
                    metrics.record_push();
                }
                inst.frames += 1;
                metrics.record_frame(t_start.elapsed());

                let ends_loop = match delay {
                    None => true,
                    Some(d) => !inst.wants_loop && d.is_zero(),
                };
                if ends_loop {
                    inst.next_deadline = None;
                    tracing::debug!(device = %self.device_id, scene = %inst.name, "render loop ended");
                } else if let Some(d) = delay {
                    inst.last_delay = d;
                    let mut next = t_start + d;
                    if next <= Instant::now() {
                        metrics.record_skip();
                        next = Instant::now();
                    }
                    inst.next_deadline = Some(next);
                }
            }
            Err(e) => {
                metrics.record_error();
                if inst.frames == 0 {
                    // First frame of a fresh generation: unrecoverable.
                    tracing::error!(device = %self.device_id, scene = %inst.name, err = %e, "first render failed; stopping scene");
                    let name = inst.name.clone();
                    let generation = inst.generation;
                    self.retire_active(transport).await;
                    self.broadcast(Some(name), generation, SceneStatus::Stopped);
                } else {
                    tracing::warn!(device = %self.device_id, scene = %inst.name, err = %e, "render failed; frame dropped");
                    inst.next_deadline = Some(t_start + inst.last_delay);
                }
            }
        }
    }

    /// Graceful shutdown: best-effort cleanup without persisting or
    /// broadcasting a transition.
    pub async fn shutdown(&mut self, transport: &Arc<dyn Transport>) {
        self.retire_active(transport).await;
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
