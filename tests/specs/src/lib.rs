// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `fleet-agent` binary as a subprocess and exercises it
//! over its health HTTP port and its management gRPC port.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `fleet-agent` binary.
pub fn agent_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("fleet-agent")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `fleet-agent` process that is killed on drop.
pub struct AgentProcess {
    child: Child,
    health_port: u16,
    mgmt_port: u16,
    _buffer_dir: tempfile::TempDir,
}

impl AgentProcess {
    /// Spawn the agent with an isolated buffer directory, no configured
    /// gateways, and fresh health/mgmt ports.
    pub fn start() -> anyhow::Result<Self> {
        let binary = agent_binary();
        anyhow::ensure!(binary.exists(), "fleet-agent binary not found at {}", binary.display());

        let health_port = free_port()?;
        let mgmt_port = free_port()?;
        let buffer_dir = tempfile::tempdir()?;

        let child = Command::new(&binary)
            .args([
                "--gateways",
                "",
                "--agent-id",
                "smoke-test-agent",
                "--health-port",
                &health_port.to_string(),
                "--mgmt-port",
                &mgmt_port.to_string(),
                "--buffer-dir",
                &buffer_dir.path().to_string_lossy(),
                "--log-level",
                "warn",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, health_port, mgmt_port, _buffer_dir: buffer_dir })
    }

    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.health_port)
    }

    pub fn mgmt_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.mgmt_port)
    }

    /// Poll `/healthz` until it responds, or fail after `timeout`.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.health_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("fleet-agent did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Send SIGTERM and wait up to `timeout` for the process to exit.
    pub async fn terminate_and_wait(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let pid = nix::unistd::Pid::from_raw(self.child.id() as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("fleet-agent did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
