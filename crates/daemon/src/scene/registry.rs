// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene registry: name → metadata + instance factory, populated eagerly at
//! startup. Scenes are trusted code in the daemon's own trust boundary.

use std::collections::BTreeMap;

use super::{builtin, Scene, SceneDescriptor};

pub type SceneFactory = fn() -> Box<dyn Scene>;

pub struct SceneRegistration {
    pub descriptor: SceneDescriptor,
    factory: SceneFactory,
}

pub struct SceneRegistry {
    scenes: BTreeMap<String, SceneRegistration>,
}

impl SceneRegistry {
    pub fn empty() -> Self {
        Self { scenes: BTreeMap::new() }
    }

    /// The built-in scene set.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (descriptor, factory) in builtin::all() {
            registry.register(descriptor, factory);
        }
        registry
    }

    pub fn register(&mut self, descriptor: SceneDescriptor, factory: SceneFactory) {
        let name = descriptor.name.clone();
        if self.scenes.insert(name.clone(), SceneRegistration { descriptor, factory }).is_some() {
            tracing::warn!(scene = %name, "scene re-registered; previous module replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&SceneDescriptor> {
        self.scenes.get(name).map(|r| &r.descriptor)
    }

    /// Build a fresh instance of the named scene.
    pub fn instantiate(&self, name: &str) -> Option<(SceneDescriptor, Box<dyn Scene>)> {
        self.scenes.get(name).map(|r| (r.descriptor.clone(), (r.factory)()))
    }

    /// Visible scenes ordered by (sort_order, name), for the API picker.
    pub fn list(&self) -> Vec<&SceneDescriptor> {
        let mut all: Vec<_> =
            self.scenes.values().map(|r| &r.descriptor).filter(|d| !d.hidden).collect();
        all.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        all
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
