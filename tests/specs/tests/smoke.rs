// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `fleet-agent` binary and
//! exercise its health HTTP port and management gRPC port.

use std::time::Duration;

use futures_util::StreamExt;
use wire::proto;
use wire::proto::management_client::ManagementClient;

use fleet_specs::AgentProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn healthz_and_ready_come_up() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let healthz = client.get(format!("{}/healthz", agent.health_url())).send().await?;
    assert_eq!(healthz.status(), reqwest::StatusCode::OK);

    // Readiness flips once startup finishes, which wait_healthy already
    // implies since the health server binds only after other subsystems
    // are spawned, but poll briefly in case it lags.
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let ready = client.get(format!("{}/ready", agent.health_url())).send().await?;
        if ready.status() == reqwest::StatusCode::OK {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("agent never became ready");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

async fn mgmt_client(agent: &AgentProcess) -> anyhow::Result<ManagementClient<tonic::transport::Channel>> {
    let channel = tonic::transport::Channel::from_shared(agent.mgmt_url())
        .map_err(|err| anyhow::anyhow!("{err}"))?
        .connect()
        .await?;
    Ok(ManagementClient::new(channel))
}

#[tokio::test]
async fn get_config_reports_a_missing_file_as_an_error_not_a_crash() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let mut client = mgmt_client(&agent).await?;
    let resp = client.get_config(proto::GetConfigRequest { path: "/etc/nginx/nginx.conf".into() }).await?.into_inner();
    // There is no nginx installed in the test sandbox; the handler must
    // surface the read failure in `error`, never fail the RPC itself.
    assert!(resp.content.is_empty());
    assert!(!resp.error.is_empty());
    Ok(())
}

#[tokio::test]
async fn validate_config_rejects_malformed_content() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let mut client = mgmt_client(&agent).await?;
    let resp = client.validate_config(proto::ValidateConfigRequest { content: "server { listen 80".into() }).await?.into_inner();
    assert!(!resp.valid);
    assert!(!resp.errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn reload_nginx_fails_cleanly_when_nginx_is_not_running() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let mut client = mgmt_client(&agent).await?;
    let resp = client.reload_nginx(proto::Empty {}).await?.into_inner();
    assert!(!resp.ok);
    assert!(!resp.error.is_empty());
    Ok(())
}

#[tokio::test]
async fn execute_streams_shell_output_back_to_the_caller() -> anyhow::Result<()> {
    let agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let mut client = mgmt_client(&agent).await?;
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let outbound = tokio_stream::wrappers::ReceiverStream::new(rx);
    let mut inbound = client.execute(outbound).await?.into_inner();

    tx.send(proto::ExecFrame { data: b"echo exec-smoke-marker\n".to_vec(), eof: false }).await?;

    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("execute stream never echoed the marker");
        }
        match tokio::time::timeout(Duration::from_secs(1), inbound.next()).await {
            Ok(Some(Ok(frame))) => {
                collected.extend_from_slice(&frame.data);
                if String::from_utf8_lossy(&collected).contains("exec-smoke-marker") {
                    break;
                }
            }
            Ok(Some(Err(err))) => anyhow::bail!("execute stream error: {err}"),
            Ok(None) => anyhow::bail!("execute stream ended before the marker appeared"),
            Err(_) => continue,
        }
    }

    tx.send(proto::ExecFrame { data: Vec::new(), eof: true }).await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_signal_drains_and_exits() -> anyhow::Result<()> {
    let mut agent = AgentProcess::start()?;
    agent.wait_healthy(TIMEOUT).await?;

    let status = agent.terminate_and_wait(Duration::from_secs(5)).await?;
    assert!(status.success() || status.code().is_none(), "expected a clean exit, got {status:?}");
    Ok(())
}
