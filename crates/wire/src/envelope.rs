// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain envelope types and their conversions to/from the generated
//! `fleet.v1` protobuf messages. Callers never touch `proto::*` directly
//! outside this module and the transport layers that dial/serve the RPC.

use serde::{Deserialize, Serialize};

use crate::proto;

/// A discovered NGINX worker/master process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub pid: u32,
    pub version: String,
    pub config_path: String,
    pub is_master: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub hostname: String,
    pub nginx_version: String,
    pub agent_version: String,
    pub uptime_s: u64,
    pub instances: Vec<Instance>,
    pub is_pod: bool,
    pub pod_ip: String,
    pub build_commit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub active: u64,
    pub reading: u64,
    pub writing: u64,
    pub waiting: u64,
    pub accepts: u64,
    pub handled: u64,
    pub requests: u64,
    /// Host CPU utilization, 0-100. Sampled alongside the nginx scrape.
    pub cpu_percent: f64,
    /// Host memory utilization, 0-100.
    pub memory_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub agent_id: String,
    pub hostname: String,
    pub log_type: String,
    pub remote_addr: String,
    pub method: String,
    pub uri: String,
    pub status: u32,
    pub bytes_sent: u64,
    pub request_time_ms: f64,
    pub user_agent: String,
    pub referrer: String,
    pub timestamp: i64,
}

/// The one-of payload variant carried by [`AgentMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Heartbeat(Heartbeat),
    Metrics(Metrics),
    LogEntry(LogEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub agent_id: String,
    pub timestamp: i64,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRequest {
    pub log_type: String,
    pub tail_lines: u32,
    pub follow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub action_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCommand {
    pub version: String,
    pub update_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerCommandAction {
    LogRequest(LogRequest),
    Action(ActionCommand),
    Update(UpdateCommand),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub command_id: String,
    pub action: ServerCommandAction,
}

impl From<&Instance> for proto::Instance {
    fn from(i: &Instance) -> Self {
        proto::Instance {
            pid: i.pid,
            version: i.version.clone(),
            config_path: i.config_path.clone(),
            is_master: i.is_master,
        }
    }
}

impl From<proto::Instance> for Instance {
    fn from(p: proto::Instance) -> Self {
        Instance { pid: p.pid, version: p.version, config_path: p.config_path, is_master: p.is_master }
    }
}

impl From<&Heartbeat> for proto::Heartbeat {
    fn from(h: &Heartbeat) -> Self {
        proto::Heartbeat {
            hostname: h.hostname.clone(),
            nginx_version: h.nginx_version.clone(),
            agent_version: h.agent_version.clone(),
            uptime_s: h.uptime_s,
            instances: h.instances.iter().map(proto::Instance::from).collect(),
            is_pod: h.is_pod,
            pod_ip: h.pod_ip.clone(),
            build_commit: h.build_commit.clone(),
        }
    }
}

impl From<proto::Heartbeat> for Heartbeat {
    fn from(p: proto::Heartbeat) -> Self {
        Heartbeat {
            hostname: p.hostname,
            nginx_version: p.nginx_version,
            agent_version: p.agent_version,
            uptime_s: p.uptime_s,
            instances: p.instances.into_iter().map(Instance::from).collect(),
            is_pod: p.is_pod,
            pod_ip: p.pod_ip,
            build_commit: p.build_commit,
        }
    }
}

impl From<&Metrics> for proto::Metrics {
    fn from(m: &Metrics) -> Self {
        proto::Metrics {
            active: m.active,
            reading: m.reading,
            writing: m.writing,
            waiting: m.waiting,
            accepts: m.accepts,
            handled: m.handled,
            requests: m.requests,
            cpu_percent: m.cpu_percent,
            memory_percent: m.memory_percent,
        }
    }
}

impl From<proto::Metrics> for Metrics {
    fn from(p: proto::Metrics) -> Self {
        Metrics {
            active: p.active,
            reading: p.reading,
            writing: p.writing,
            waiting: p.waiting,
            accepts: p.accepts,
            handled: p.handled,
            requests: p.requests,
            cpu_percent: p.cpu_percent,
            memory_percent: p.memory_percent,
        }
    }
}

impl From<&LogEntry> for proto::LogEntry {
    fn from(l: &LogEntry) -> Self {
        proto::LogEntry {
            agent_id: l.agent_id.clone(),
            hostname: l.hostname.clone(),
            log_type: l.log_type.clone(),
            remote_addr: l.remote_addr.clone(),
            method: l.method.clone(),
            uri: l.uri.clone(),
            status: l.status,
            bytes_sent: l.bytes_sent,
            request_time_ms: l.request_time_ms,
            user_agent: l.user_agent.clone(),
            referrer: l.referrer.clone(),
            timestamp: l.timestamp,
        }
    }
}

impl From<proto::LogEntry> for LogEntry {
    fn from(p: proto::LogEntry) -> Self {
        LogEntry {
            agent_id: p.agent_id,
            hostname: p.hostname,
            log_type: p.log_type,
            remote_addr: p.remote_addr,
            method: p.method,
            uri: p.uri,
            status: p.status,
            bytes_sent: p.bytes_sent,
            request_time_ms: p.request_time_ms,
            user_agent: p.user_agent,
            referrer: p.referrer,
            timestamp: p.timestamp,
        }
    }
}

/// Error converting a generated proto message into its domain type, raised
/// when a required `oneof` field is absent (malformed wire data).
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("missing payload field")]
    MissingPayload,
    #[error("missing action field")]
    MissingAction,
}

impl From<&AgentMessage> for proto::AgentMessage {
    fn from(m: &AgentMessage) -> Self {
        let payload = match &m.payload {
            Payload::Heartbeat(h) => proto::agent_message::Payload::Heartbeat(h.into()),
            Payload::Metrics(m) => proto::agent_message::Payload::Metrics(m.into()),
            Payload::LogEntry(l) => proto::agent_message::Payload::LogEntry(l.into()),
        };
        proto::AgentMessage { agent_id: m.agent_id.clone(), timestamp: m.timestamp, payload: Some(payload) }
    }
}

impl TryFrom<proto::AgentMessage> for AgentMessage {
    type Error = ConvertError;

    fn try_from(p: proto::AgentMessage) -> Result<Self, Self::Error> {
        let payload = match p.payload.ok_or(ConvertError::MissingPayload)? {
            proto::agent_message::Payload::Heartbeat(h) => Payload::Heartbeat(h.into()),
            proto::agent_message::Payload::Metrics(m) => Payload::Metrics(m.into()),
            proto::agent_message::Payload::LogEntry(l) => Payload::LogEntry(l.into()),
        };
        Ok(AgentMessage { agent_id: p.agent_id, timestamp: p.timestamp, payload })
    }
}

impl From<&ServerCommand> for proto::ServerCommand {
    fn from(c: &ServerCommand) -> Self {
        let action = match &c.action {
            ServerCommandAction::LogRequest(r) => {
                proto::server_command::Action::LogRequest(proto::LogRequest {
                    log_type: r.log_type.clone(),
                    tail_lines: r.tail_lines,
                    follow: r.follow,
                })
            }
            ServerCommandAction::Action(a) => {
                proto::server_command::Action::ActionCommand(proto::ActionCommand {
                    r#type: a.action_type.clone(),
                })
            }
            ServerCommandAction::Update(u) => {
                proto::server_command::Action::Update(proto::UpdateCommand {
                    version: u.version.clone(),
                    update_url: u.update_url.clone(),
                })
            }
        };
        proto::ServerCommand { command_id: c.command_id.clone(), action: Some(action) }
    }
}

impl TryFrom<proto::ServerCommand> for ServerCommand {
    type Error = ConvertError;

    fn try_from(p: proto::ServerCommand) -> Result<Self, Self::Error> {
        let action = match p.action.ok_or(ConvertError::MissingAction)? {
            proto::server_command::Action::LogRequest(r) => {
                ServerCommandAction::LogRequest(LogRequest {
                    log_type: r.log_type,
                    tail_lines: r.tail_lines,
                    follow: r.follow,
                })
            }
            proto::server_command::Action::ActionCommand(a) => {
                ServerCommandAction::Action(ActionCommand { action_type: a.r#type })
            }
            proto::server_command::Action::Update(u) => {
                ServerCommandAction::Update(UpdateCommand { version: u.version, update_url: u.update_url })
            }
        };
        Ok(ServerCommand { command_id: p.command_id, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_message_round_trips_through_proto() {
        let original = AgentMessage {
            agent_id: "host-1".to_owned(),
            timestamp: 1_700_000_000,
            payload: Payload::Metrics(Metrics {
                active: 10,
                reading: 1,
                writing: 2,
                waiting: 7,
                accepts: 100,
                handled: 100,
                requests: 400,
                cpu_percent: 42.5,
                memory_percent: 63.1,
            }),
        };
        let proto_msg: proto::AgentMessage = (&original).into();
        let decoded = AgentMessage::try_from(proto_msg).expect("decode");
        assert_eq!(original, decoded);
    }

    #[test]
    fn server_command_round_trips_through_proto() {
        let original = ServerCommand {
            command_id: "cmd-1".to_owned(),
            action: ServerCommandAction::LogRequest(LogRequest {
                log_type: "access".to_owned(),
                tail_lines: 100,
                follow: true,
            }),
        };
        let proto_cmd: proto::ServerCommand = (&original).into();
        let decoded = ServerCommand::try_from(proto_cmd).expect("decode");
        assert_eq!(original, decoded);
    }

    #[test]
    fn missing_payload_is_rejected() {
        let malformed = proto::AgentMessage { agent_id: "x".into(), timestamp: 0, payload: None };
        assert!(AgentMessage::try_from(malformed).is_err());
    }
}
