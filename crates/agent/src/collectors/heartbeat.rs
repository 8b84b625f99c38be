// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat + discovery: enumerates running NGINX processes, detects
//! pod/container context, and emits a [`wire::Heartbeat`] on each 1 s tick.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::Sink;

pub struct HeartbeatCollector {
    agent_id: String,
    hostname: String,
    nginx_config_path: String,
    started_at: Instant,
    agent_version: String,
}

impl HeartbeatCollector {
    pub fn new(agent_id: String, hostname: String, nginx_config_path: String) -> Self {
        Self {
            agent_id,
            hostname,
            nginx_config_path,
            started_at: Instant::now(),
            agent_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    pub async fn run(self, sink: Sink, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let heartbeat = self.build_heartbeat();
                    let message = wire::AgentMessage {
                        agent_id: self.agent_id.clone(),
                        timestamp: now_epoch_s(),
                        payload: wire::Payload::Heartbeat(heartbeat),
                    };
                    sink.emit(&message);
                }
            }
        }
    }

    fn build_heartbeat(&self) -> wire::Heartbeat {
        let instances = discover_nginx_instances(&self.nginx_config_path);
        let nginx_version = instances.first().map(|i| i.version.clone()).unwrap_or_default();
        let (is_pod, pod_ip) = detect_pod_context();

        wire::Heartbeat {
            hostname: self.hostname.clone(),
            nginx_version,
            agent_version: self.agent_version.clone(),
            uptime_s: self.started_at.elapsed().as_secs(),
            instances,
            is_pod,
            pod_ip,
            build_commit: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown").to_owned(),
        }
    }
}

/// Scans `/proc/*/cmdline` (on Linux) for `nginx: master process` and
/// `nginx: worker process` entries. Returns an empty list (not an error)
/// when `/proc` is unavailable, since discovery failure is not fatal.
fn discover_nginx_instances(config_path: &str) -> Vec<wire::Instance> {
    let mut instances = Vec::new();
    let Ok(entries) = std::fs::read_dir("/proc") else { return instances };

    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else { continue };
        let cmdline_path = entry.path().join("cmdline");
        let Ok(raw) = std::fs::read(&cmdline_path) else { continue };
        let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
        if !cmdline.trim_start().starts_with("nginx:") {
            continue;
        }
        let is_master = cmdline.contains("master process");
        instances.push(wire::Instance {
            pid,
            version: nginx_binary_version(),
            config_path: config_path.to_owned(),
            is_master,
        });
    }
    instances
}

fn nginx_binary_version() -> String {
    let output = std::process::Command::new("nginx").arg("-v").output();
    match output {
        Ok(out) => {
            let text = String::from_utf8_lossy(&out.stderr);
            text.lines().next().unwrap_or("").trim().to_owned()
        }
        Err(_) => String::new(),
    }
}

/// Whether the process appears to be running inside a container or pod,
/// per the same detection [`detect_pod_context`] uses for heartbeats.
pub fn in_container() -> bool {
    detect_pod_context().0
}

/// Detects container/pod context via well-known files and environment.
fn detect_pod_context() -> (bool, String) {
    let is_pod = std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
        || std::path::Path::new("/var/run/secrets/kubernetes.io").exists()
        || std::path::Path::new("/.dockerenv").exists();
    let pod_ip = std::env::var("POD_IP").unwrap_or_default();
    (is_pod, pod_ip)
}

fn now_epoch_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
