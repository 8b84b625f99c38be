// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager (C3): spawns one sender per configured gateway, each
//! running a perpetual connect/send/reconnect loop against the shared or
//! per-gateway buffer cursor.

pub mod dispatch;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::buffer::{Buffer, NextRecord};
use crate::config::{BufferMode, ResolvedConfig};
use crate::mgmt::nginx_ctl::NginxControl;
use crate::update::Updater;
use dispatch::DispatchContext;

const CONNECT_BACKOFF: Duration = Duration::from_secs(5);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(200);
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

pub struct SessionManager {
    config: Arc<ResolvedConfig>,
    agent_id: String,
    hostname: String,
    buffer: Arc<Buffer>,
    nginx: Arc<dyn NginxControl>,
    updater: Option<Arc<Updater>>,
}

impl SessionManager {
    pub fn new(
        config: Arc<ResolvedConfig>,
        agent_id: String,
        hostname: String,
        buffer: Arc<Buffer>,
        nginx: Arc<dyn NginxControl>,
        updater: Option<Arc<Updater>>,
    ) -> Self {
        Self { config, agent_id, hostname, buffer, nginx, updater }
    }

    /// Spawns one sender task per configured gateway and returns their
    /// join handles so the caller's shutdown barrier can await them.
    pub fn spawn_all(&self, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        self.config
            .gateways
            .iter()
            .cloned()
            .map(|gateway_addr| {
                let cursor_name = match self.config.buffer_mode {
                    BufferMode::Shared => "shared".to_owned(),
                    BufferMode::PerGateway => gateway_addr.clone(),
                };
                let sender = Sender {
                    gateway_addr,
                    cursor_name,
                    agent_id: self.agent_id.clone(),
                    hostname: self.hostname.clone(),
                    config: self.config.clone(),
                    buffer: self.buffer.clone(),
                    nginx: self.nginx.clone(),
                    updater: self.updater.clone(),
                };
                tokio::spawn(sender.run_loop(cancel.clone()))
            })
            .collect()
    }
}

struct Sender {
    gateway_addr: String,
    cursor_name: String,
    agent_id: String,
    hostname: String,
    config: Arc<ResolvedConfig>,
    buffer: Arc<Buffer>,
    nginx: Arc<dyn NginxControl>,
    updater: Option<Arc<Updater>>,
}

impl Sender {
    async fn run_loop(self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let endpoint = self.build_endpoint();
            let client = match wire::proto::fleet_client::FleetClient::connect(endpoint).await {
                Ok(client) => client,
                Err(err) => {
                    tracing::warn!(gateway = self.gateway_addr, error = %err, "connect failed, backing off");
                    if sleep_or_cancelled(CONNECT_BACKOFF, &cancel).await {
                        return;
                    }
                    continue;
                }
            };

            if self.drive_session(client, &cancel).await {
                return;
            }
            if sleep_or_cancelled(RECONNECT_BACKOFF, &cancel).await {
                return;
            }
        }
    }

    fn build_endpoint(&self) -> String {
        let scheme = if self.config.gateway_tls { "https" } else { "http" };
        format!("{scheme}://{}", self.gateway_addr)
    }

    /// Drives one connected session to completion. Returns `true` if the
    /// caller should stop entirely (cancellation), `false` to reconnect.
    async fn drive_session(
        &self,
        mut client: wire::proto::fleet_client::FleetClient<tonic::transport::Channel>,
        cancel: &CancellationToken,
    ) -> bool {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let outbound_stream = ReceiverStream::new(outbound_rx);

        let response = match client.stream(outbound_stream).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(gateway = self.gateway_addr, error = %err, "stream rpc rejected");
                return false;
            }
        };
        let mut inbound = response.into_inner();

        let ctx = Arc::new(DispatchContext {
            agent_id: self.agent_id.clone(),
            hostname: self.hostname.clone(),
            config: self.config.clone(),
            nginx: self.nginx.clone(),
            updater: self.updater.clone(),
            outbound: outbound_tx.clone(),
        });

        let receiver_cancel = cancel.clone();
        let receiver_ctx = ctx.clone();
        let receiver = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = receiver_cancel.cancelled() => break,
                    next = inbound.message() => {
                        match next {
                            Ok(Some(proto_cmd)) => {
                                match wire::ServerCommand::try_from(proto_cmd) {
                                    Ok(cmd) => {
                                        tokio::spawn(dispatch::dispatch(cmd, receiver_ctx.clone(), receiver_cancel.clone()));
                                    }
                                    Err(err) => tracing::warn!(error = %err, "failed to decode inbound server command"),
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                tracing::warn!(error = %err, "inbound stream error");
                                break;
                            }
                        }
                    }
                }
            }
        });

        let mut reader = match self.buffer.reader(&self.config.buffer_dir, &self.cursor_name) {
            Ok(reader) => reader,
            Err(err) => {
                tracing::error!(error = %err, "failed to open buffer reader");
                receiver.abort();
                return false;
            }
        };

        let send_result = self.send_loop(&mut reader, &outbound_tx, cancel).await;
        receiver.abort();
        send_result
    }

    /// Reads records from the buffer and forwards them on `outbound`. On
    /// decode failure the offset is acked (poison pill skipped); on send
    /// failure the loop returns without acking, so the record is
    /// redelivered on reconnect.
    async fn send_loop(
        &self,
        reader: &mut crate::buffer::BufferReader,
        outbound: &mpsc::Sender<wire::proto::AgentMessage>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            if cancel.is_cancelled() {
                return true;
            }

            match reader.read_next() {
                Ok(NextRecord::Empty) => {
                    if sleep_or_cancelled(EMPTY_POLL_INTERVAL, cancel).await {
                        return true;
                    }
                }
                Ok(NextRecord::Corrupt { resync, reason, .. }) => {
                    tracing::warn!(reason, "skipping corrupt buffer record");
                    let _ = reader.skip_corrupt(resync);
                }
                Ok(NextRecord::Ready { end, payload, .. }) => {
                    let decoded: Result<wire::proto::AgentMessage, _> = prost::Message::decode(payload.as_ref());
                    match decoded {
                        Err(err) => {
                            tracing::warn!(error = %err, "undecodable envelope, acking past poison pill");
                            let _ = reader.ack(end);
                        }
                        Ok(proto_msg) => {
                            if outbound.send(proto_msg).await.is_err() {
                                return false;
                            }
                            let _ = reader.ack(end);
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "buffer read error");
                    return false;
                }
            }
        }
    }
}

/// Sleeps for `duration` unless cancelled first. Returns `true` if
/// cancellation won the race.
async fn sleep_or_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = cancel.cancelled() => true,
    }
}
