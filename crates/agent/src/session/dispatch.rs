// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch: translates an inbound [`wire::ServerCommand`] into
//! local action, per SPEC_FULL.md Section 4.C3.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{LogFormat, ResolvedConfig};
use crate::mgmt::nginx_ctl::NginxControl;
use crate::update::Updater;

/// Shared context every dispatch call needs.
pub struct DispatchContext {
    pub agent_id: String,
    pub hostname: String,
    pub config: Arc<ResolvedConfig>,
    pub nginx: Arc<dyn NginxControl>,
    pub updater: Option<Arc<Updater>>,
    pub outbound: mpsc::Sender<wire::proto::AgentMessage>,
}

pub async fn dispatch(cmd: wire::ServerCommand, ctx: Arc<DispatchContext>, cancel: CancellationToken) {
    match cmd.action {
        wire::ServerCommandAction::LogRequest(req) => handle_log_request(req, ctx, cancel).await,
        wire::ServerCommandAction::Action(action) => handle_action(action, ctx).await,
        wire::ServerCommandAction::Update(update) => handle_update(update, ctx).await,
    }
}

async fn handle_log_request(req: wire::LogRequest, ctx: Arc<DispatchContext>, cancel: CancellationToken) {
    let path = match req.log_type.as_str() {
        "error" => ctx.config.error_log_path.clone(),
        _ => ctx.config.access_log_path.clone(),
    };

    if req.tail_lines > 0 {
        for entry in tail_lines(&path, req.tail_lines as usize, &req.log_type, &ctx.agent_id, &ctx.hostname, ctx.config.log_format) {
            send_log_entry(&ctx, entry).await;
        }
    }

    if req.follow {
        tokio::spawn(follow_log(path, req.log_type, ctx, cancel));
    }
}

async fn handle_action(action: wire::ActionCommand, ctx: Arc<DispatchContext>) {
    let result = match action.action_type.as_str() {
        "reload" => ctx.nginx.reload(),
        "restart" => ctx.nginx.restart(),
        "stop" => ctx.nginx.stop(),
        other => {
            tracing::warn!(action = other, "unknown action command type");
            return;
        }
    };
    if let Err(err) = result {
        tracing::warn!(action = action.action_type, error = %err, "action command failed");
    }
}

async fn handle_update(update: wire::UpdateCommand, ctx: Arc<DispatchContext>) {
    let Some(updater) = &ctx.updater else {
        tracing::info!("update command received but no updater is configured; dropping");
        return;
    };
    let url = if update.update_url.is_empty() { None } else { Some(update.update_url.as_str()) };
    if let Err(err) = updater.check_and_apply(url).await {
        tracing::warn!(error = %err, "self-update failed");
    }
}

fn tail_lines(
    path: &str,
    n: usize,
    log_type: &str,
    agent_id: &str,
    hostname: &str,
    format: LogFormat,
) -> Vec<wire::LogEntry> {
    let Ok(contents) = std::fs::read_to_string(path) else { return Vec::new() };
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..]
        .iter()
        .filter_map(|line| parse_for_log_type(line, log_type, agent_id, hostname, format))
        .collect()
}

fn parse_for_log_type(line: &str, log_type: &str, agent_id: &str, hostname: &str, format: LogFormat) -> Option<wire::LogEntry> {
    // Reuses the same combined/json parsing the live tailer uses, so an
    // ad-hoc `LogRequest` sees identical field extraction.
    match format {
        LogFormat::Combined => crate::collectors::log_tail::parse_combined(line, log_type, agent_id, hostname),
        LogFormat::Json => crate::collectors::log_tail::parse_json(line, log_type, agent_id, hostname),
    }
}

async fn follow_log(path: String, log_type: String, ctx: Arc<DispatchContext>, cancel: CancellationToken) {
    let log_type_static: &'static str = Box::leak(log_type.into_boxed_str());
    let (tx, mut rx) = mpsc::channel(256);
    let tailer = crate::collectors::log_tail::LogTailer::new(
        path.into(),
        log_type_static,
        ctx.agent_id.clone(),
        ctx.hostname.clone(),
        ctx.config.log_format,
    );
    let follow_cancel = cancel.clone();
    tokio::spawn(tailer.run(tx, follow_cancel));

    while let Some(entry) = rx.recv().await {
        send_log_entry(&ctx, entry).await;
        if cancel.is_cancelled() {
            break;
        }
    }
}

async fn send_log_entry(ctx: &Arc<DispatchContext>, entry: wire::LogEntry) {
    let message = wire::AgentMessage {
        agent_id: ctx.agent_id.clone(),
        timestamp: entry.timestamp,
        payload: wire::Payload::LogEntry(entry),
    };
    let proto_msg: wire::proto::AgentMessage = (&message).into();
    let _ = ctx.outbound.send(proto_msg).await;
}
