// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal proxy (G3): `/terminal?agent_id=...` bridges a downstream
//! WebSocket directly to the named agent's `Management.Execute` stream. Each
//! WS binary frame becomes one `ExecFrame`; the bridge closes one side as
//! soon as the other closes.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tonic::transport::Channel;
use wire::proto;
use wire::proto::management_client::ManagementClient;

use crate::http::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalQuery {
    pub agent_id: String,
}

/// `GET /terminal?agent_id=...` — WebSocket upgrade, one per interactive
/// shell. Requires an active ingest session for `agent_id` so the gateway
/// knows a reachable address for its management endpoint.
pub async fn terminal_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TerminalQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let session = match state.sessions.get(&query.agent_id).await {
        Some(session) => session,
        None => return (axum::http::StatusCode::NOT_FOUND, "agent is not connected").into_response(),
    };

    let Some(host) = host_of(&session.remote_addr) else {
        return (axum::http::StatusCode::BAD_GATEWAY, "agent address is not reachable").into_response();
    };
    let mgmt_addr = format!("http://{host}:{port}", port = state.config.agent_mgmt_port);

    ws.on_upgrade(move |socket| bridge(socket, mgmt_addr)).into_response()
}

fn host_of(remote_addr: &str) -> Option<String> {
    remote_addr.rsplit_once(':').map(|(host, _)| host.trim_start_matches('[').trim_end_matches(']').to_owned()).filter(|host| host.parse::<IpAddr>().is_ok())
}

async fn bridge(socket: WebSocket, mgmt_addr: String) {
    let channel = match Channel::from_shared(mgmt_addr.clone()).and_then(|endpoint| Ok(endpoint.connect_lazy())) {
        Ok(channel) => channel,
        Err(err) => {
            tracing::warn!(mgmt_addr, error = %err, "could not build channel to agent management endpoint");
            return;
        }
    };
    let mut client = ManagementClient::new(channel);

    let (upstream_tx, upstream_rx) = mpsc::channel::<proto::ExecFrame>(64);
    let outbound = tokio_stream::wrappers::ReceiverStream::new(upstream_rx);

    let mut downstream = match client.execute(outbound).await {
        Ok(response) => response.into_inner(),
        Err(status) => {
            tracing::warn!(mgmt_addr, error = %status, "failed to open exec stream on agent");
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            frame = downstream.next() => {
                match frame {
                    Some(Ok(frame)) => {
                        if ws_tx.send(Message::Binary(frame.data.into())).await.is_err() {
                            break;
                        }
                        if frame.eof {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if upstream_tx.send(proto::ExecFrame { data: data.into(), eof: false }).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = upstream_tx.send(proto::ExecFrame { data: Vec::new(), eof: true }).await;
                        break;
                    }
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
