// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end coverage of server command dispatch (SPEC_FULL.md Section
//! 4.C3): a fake nginx control surface records which action fired, and a
//! scratch log file proves `LogRequest` tailing reaches the outbound
//! channel as a `wire::AgentMessage`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent::config::{CliArgs, LogFormat, ResolvedConfig};
use agent::mgmt::nginx_ctl::{NginxControl, NginxCtlError};
use agent::session::dispatch::{dispatch, DispatchContext};

#[derive(Default)]
struct FakeNginx {
    reloads: AtomicUsize,
    restarts: AtomicUsize,
    stops: AtomicUsize,
}

impl NginxControl for FakeNginx {
    fn reload(&self) -> Result<(), NginxCtlError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restart(&self) -> Result<(), NginxCtlError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), NginxCtlError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn test_config(access_log: String, error_log: String, format: LogFormat) -> ResolvedConfig {
    let mut cli = CliArgs::default();
    cli.access_log_path = Some(access_log);
    cli.error_log_path = Some(error_log);
    cli.log_format = Some(match format {
        LogFormat::Combined => "combined".to_owned(),
        LogFormat::Json => "json".to_owned(),
    });
    ResolvedConfig::load(&cli).expect("resolve test config")
}

fn test_context(nginx: Arc<FakeNginx>, config: ResolvedConfig, outbound: mpsc::Sender<wire::proto::AgentMessage>) -> Arc<DispatchContext> {
    Arc::new(DispatchContext {
        agent_id: "agent-under-test".into(),
        hostname: "host-under-test".into(),
        config: Arc::new(config),
        nginx,
        updater: None,
        outbound,
    })
}

#[tokio::test]
async fn action_command_reload_invokes_nginx_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let access = dir.path().join("access.log");
    let error = dir.path().join("error.log");
    std::fs::write(&access, "").expect("write access log");
    std::fs::write(&error, "").expect("write error log");

    let nginx = Arc::new(FakeNginx::default());
    let (tx, _rx) = mpsc::channel(8);
    let ctx = test_context(
        nginx.clone(),
        test_config(access.to_string_lossy().into_owned(), error.to_string_lossy().into_owned(), LogFormat::Combined),
        tx,
    );

    let cmd = wire::ServerCommand {
        command_id: "cmd-1".into(),
        action: wire::ServerCommandAction::Action(wire::ActionCommand { action_type: "reload".into() }),
    };
    dispatch(cmd, ctx, CancellationToken::new()).await;

    assert_eq!(nginx.reloads.load(Ordering::SeqCst), 1);
    assert_eq!(nginx.restarts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_action_type_is_ignored_without_touching_nginx() {
    let dir = tempfile::tempdir().expect("tempdir");
    let access = dir.path().join("access.log");
    let error = dir.path().join("error.log");
    std::fs::write(&access, "").expect("write access log");
    std::fs::write(&error, "").expect("write error log");

    let nginx = Arc::new(FakeNginx::default());
    let (tx, _rx) = mpsc::channel(8);
    let ctx = test_context(
        nginx.clone(),
        test_config(access.to_string_lossy().into_owned(), error.to_string_lossy().into_owned(), LogFormat::Combined),
        tx,
    );

    let cmd = wire::ServerCommand {
        command_id: "cmd-2".into(),
        action: wire::ServerCommandAction::Action(wire::ActionCommand { action_type: "defenestrate".into() }),
    };
    dispatch(cmd, ctx, CancellationToken::new()).await;

    assert_eq!(nginx.reloads.load(Ordering::SeqCst), 0);
    assert_eq!(nginx.restarts.load(Ordering::SeqCst), 0);
    assert_eq!(nginx.stops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn log_request_tails_existing_lines_onto_the_outbound_channel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let access = dir.path().join("access.log");
    let error = dir.path().join("error.log");
    let line = r#"127.0.0.1 - - [01/Aug/2026:00:00:00 +0000] "GET /ok HTTP/1.1" 200 12 "-" "curl/8""#;
    std::fs::write(&access, format!("{line}\n")).expect("write access log");
    std::fs::write(&error, "").expect("write error log");

    let nginx = Arc::new(FakeNginx::default());
    let (tx, mut rx) = mpsc::channel(8);
    let ctx = test_context(
        nginx,
        test_config(access.to_string_lossy().into_owned(), error.to_string_lossy().into_owned(), LogFormat::Combined),
        tx,
    );

    let cmd = wire::ServerCommand {
        command_id: "cmd-3".into(),
        action: wire::ServerCommandAction::LogRequest(wire::LogRequest { log_type: "access".into(), tail_lines: 5, follow: false }),
    };
    dispatch(cmd, ctx, CancellationToken::new()).await;

    let message = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("did not time out")
        .expect("received a message");
    assert_eq!(message.agent_id, "agent-under-test");
}
