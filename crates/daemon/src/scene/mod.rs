// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene interface: lifecycle hooks, per-instance context, and the registry
//! of built-in scenes.

pub mod builtin;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::device::{DeviceKind, Frame};
use crate::state::{EventSink, RuntimeEvent};
use crate::store::StateStore;

pub use registry::SceneRegistry;

/// A unit of rendering behavior with lifecycle hooks.
///
/// Scene code is trusted but isolated: errors from any hook are caught by
/// the runtime and can never take down the daemon.
#[async_trait]
pub trait Scene: Send + Sync {
    /// Called once before the first render of an instance.
    async fn init(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Produce one frame into `ctx.canvas` and return the delay until the
    /// next desired frame. `None` ends the loop (the normal outcome for
    /// one-shot scenes).
    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>>;

    /// Invoked on stop or supersede. Errors are logged, never propagated.
    async fn cleanup(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Static scene metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescriptor {
    pub name: String,
    pub wants_loop: bool,
    /// Device kinds the scene supports; empty means all.
    pub device_kinds: Vec<DeviceKind>,
    pub tags: Vec<String>,
    pub hidden: bool,
    pub sort_order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,
}

impl SceneDescriptor {
    pub fn new(name: &str, wants_loop: bool) -> Self {
        Self {
            name: name.to_owned(),
            wants_loop,
            device_kinds: Vec::new(),
            tags: Vec::new(),
            hidden: false,
            sort_order: 0,
            config_schema: None,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_owned()).collect();
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_config_schema(mut self, schema: Value) -> Self {
        self.config_schema = Some(schema);
        self
    }
}

/// Per-render context handed to scene hooks.
///
/// A context is built fresh for each hook invocation and carries the
/// instance's generation; it never outlives the generation it was built for.
pub struct SceneContext<'a> {
    pub canvas: &'a mut Frame,
    pub device_id: &'a str,
    pub payload: &'a Value,
    pub generation: u64,
    scene_name: &'a str,
    store: &'a StateStore,
    events: &'a EventSink,
}

impl<'a> SceneContext<'a> {
    pub fn new(
        canvas: &'a mut Frame,
        device_id: &'a str,
        scene_name: &'a str,
        payload: &'a Value,
        generation: u64,
        store: &'a StateStore,
        events: &'a EventSink,
    ) -> Self {
        Self { canvas, device_id, payload, generation, scene_name, store, events }
    }

    /// Scene-scoped scratch state, bound to (device, scene). Volatile.
    pub fn state_get(&self, key: &str) -> Option<Value> {
        self.store.scene_get(self.device_id, self.scene_name, key)
    }

    pub fn state_set(&self, key: &str, value: Value) {
        self.store.scene_set(self.device_id, self.scene_name, key, value);
    }

    /// Publish a scene-originated payload on the device's ok channel.
    pub fn publish_ok(&self, payload: Value) {
        self.events.emit(RuntimeEvent::SceneOk {
            device: self.device_id.to_owned(),
            payload,
        });
    }

    /// A payload field as u64, if present.
    pub fn payload_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }

    pub fn payload_bool(&self, key: &str) -> Option<bool> {
        self.payload.get(key).and_then(Value::as_bool)
    }
}
