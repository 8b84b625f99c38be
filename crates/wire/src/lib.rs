// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wire types for the agent <-> gateway control channel: the
//! generated `fleet.v1` protobuf service definitions, domain-level
//! envelope types that convert to/from them, and the on-disk buffer
//! record framing used by the agent's durable log.

pub mod envelope;
pub mod record;

/// Generated protobuf types for the `fleet.v1` package.
pub mod proto {
    tonic::include_proto!("fleet.v1");
}

pub use envelope::{
    ActionCommand, AgentMessage, Heartbeat, Instance, LogEntry, LogRequest, Metrics, Payload,
    ServerCommand, ServerCommandAction, UpdateCommand,
};
pub use record::{BufferRecord, RecordError};
