// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene runtime: per-device lifecycle state machine, render loop, and
//! metrics.

pub mod manager;
pub mod metrics;
pub mod worker;

pub use manager::{SceneManager, SceneStatus, SceneStatusView};
pub use metrics::{MetricsSnapshot, RenderMetrics};
pub use worker::{dispatch, spawn_worker, DeviceCommand, PlayAction, WorkerMsg};
