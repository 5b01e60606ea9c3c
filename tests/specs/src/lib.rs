// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end daemon tests.
//!
//! Spawns the real `pidicond` binary as a subprocess with mock-driver
//! devices and exercises it over the REST API.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `pidicond` binary.
pub fn daemon_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("pidicond")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `pidicond` process that is killed on drop.
pub struct DaemonProcess {
    child: Child,
    port: u16,
    pub state_file: PathBuf,
    _state_dir: Option<tempfile::TempDir>,
}

impl DaemonProcess {
    /// Spawn the daemon with one mock pixoo64 device and a fresh state file.
    pub async fn spawn(device: &str) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let state_file = dir.path().join("runtime-state.json");
        Self::spawn_with_state(device, state_file, Some(dir)).await
    }

    /// Spawn against an existing state file (for restart tests).
    pub async fn respawn(device: &str, state_file: PathBuf) -> anyhow::Result<Self> {
        Self::spawn_with_state(device, state_file, None).await
    }

    async fn spawn_with_state(
        device: &str,
        state_file: PathBuf,
        dir: Option<tempfile::TempDir>,
    ) -> anyhow::Result<Self> {
        ensure_crypto();
        let port = free_port()?;
        let child = Command::new(daemon_binary())
            .arg("--web-host")
            .arg("127.0.0.1")
            .arg("--web-port")
            .arg(port.to_string())
            .arg("--device")
            .arg(format!("{device}=pixoo64@mock"))
            .arg("--state-file")
            .arg(&state_file)
            .arg("--state-debounce-ms")
            .arg("200")
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let daemon = Self { child, port, state_file, _state_dir: dir };
        daemon.wait_ready().await?;
        Ok(daemon)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    async fn wait_ready(&self) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        for _ in 0..100 {
            if let Ok(resp) = client.get(self.url("/api/status")).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("daemon did not become ready on port {}", self.port)
    }

    pub async fn get_json(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let resp = reqwest::get(self.url(path)).await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let client = reqwest::Client::new();
        let resp = client.post(self.url(path)).json(body).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Kill the process without any graceful shutdown (simulated power pull).
    pub fn kill_hard(&mut self) -> anyhow::Result<()> {
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
