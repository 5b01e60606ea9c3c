// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-bus ingress and egress.

pub mod publisher;
pub mod subscriber;

use std::sync::Arc;

use crate::config::DaemonConfig;
use crate::state::DaemonState;

/// Connect to the message bus. Retries the initial connect so the daemon
/// can start before the bus does.
pub async fn connect(config: &DaemonConfig) -> anyhow::Result<Option<async_nats::Client>> {
    let Some(ref url) = config.bus_url else {
        tracing::info!("message bus not configured; bus ingress disabled");
        return Ok(None);
    };
    let mut opts = async_nats::ConnectOptions::new();
    if let Some(ref token) = config.bus_token {
        opts = opts.token(token.clone());
    }
    opts = opts.retry_on_initial_connect();

    tracing::info!(url = %url, prefix = %config.bus_prefix, "connecting to message bus");
    let client = opts.connect(url).await?;
    tracing::info!("message bus connected");
    Ok(Some(client))
}

/// Spawn the bus subscriber and publisher tasks, if a bus is configured.
pub fn spawn(state: Arc<DaemonState>) {
    let Some(client) = state.bus.clone() else { return };
    subscriber::spawn_subscriber(Arc::clone(&state), client.clone());
    publisher::spawn_publisher(state, client);
}
