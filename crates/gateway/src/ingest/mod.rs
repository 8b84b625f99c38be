// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway ingest (G1): the `fleet.v1.Fleet/Stream` server. One bidirectional
//! stream per connected agent, demultiplexed to the live fanout (G3) and the
//! writer batches (G2).

pub mod registry;

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::live;
use crate::writers::WriterHandles;
use registry::SessionRegistry;
use wire::proto;
use wire::proto::fleet_server::Fleet;

pub struct IngestService {
    sessions: SessionRegistry,
    live: live::Registry,
    writers: WriterHandles,
}

impl IngestService {
    pub fn new(sessions: SessionRegistry, live: live::Registry, writers: WriterHandles) -> Self {
        Self { sessions, live, writers }
    }
}

type CommandStream = Pin<Box<dyn Stream<Item = Result<proto::ServerCommand, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl Fleet for IngestService {
    type StreamStream = CommandStream;

    async fn stream(&self, request: Request<Streaming<proto::AgentMessage>>) -> Result<Response<Self::StreamStream>, Status> {
        let remote_addr = request.remote_addr().map(|addr| addr.to_string()).unwrap_or_default();
        let mut inbound = request.into_inner();

        let first = match inbound.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(status)) => return Err(status),
            None => return Err(Status::invalid_argument("stream closed before any envelope was sent")),
        };
        let first = wire::AgentMessage::try_from(first).map_err(|err| Status::invalid_argument(err.to_string()))?;
        let agent_id = first.agent_id.clone();

        let (_command_tx, command_rx) = mpsc::channel::<Result<proto::ServerCommand, Status>>(16);
        let session = Arc::new(registry::Session::new(agent_id.clone(), remote_addr));
        self.sessions.register(Arc::clone(&session)).await;

        let live = self.live.clone();
        let writers = self.writers.clone();
        let sessions = self.sessions.clone();
        let session_for_task = Arc::clone(&session);

        tokio::spawn(async move {
            route(&live, &writers, &session_for_task, &first).await;

            loop {
                tokio::select! {
                    biased;
                    _ = session_for_task.cancel.cancelled() => break,
                    next = inbound.next() => {
                        match next {
                            Some(Ok(raw)) => {
                                match wire::AgentMessage::try_from(raw) {
                                    Ok(envelope) => route(&live, &writers, &session_for_task, &envelope).await,
                                    Err(err) => tracing::warn!(agent_id = %session_for_task.agent_id, error = %err, "dropping undecodable envelope"),
                                }
                            }
                            Some(Err(status)) => {
                                tracing::info!(agent_id = %session_for_task.agent_id, error = %status, "agent stream closed with an error");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }

            sessions.remove_if_current(&session_for_task).await;
        });

        let stream: CommandStream = Box::pin(ReceiverStream::new(command_rx));
        Ok(Response::new(stream))
    }
}

async fn route(live: &live::Registry, writers: &WriterHandles, session: &registry::Session, envelope: &wire::AgentMessage) {
    session.touch();
    if let wire::Payload::Heartbeat(heartbeat) = &envelope.payload {
        session.record_heartbeat(heartbeat);
    }
    live.publish(envelope).await;
    writers.route(envelope);
}
