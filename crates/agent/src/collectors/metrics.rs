// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics scraper: polls the local NGINX `stub_status`-style endpoint on
//! a 1 s tick and emits a [`wire::Metrics`] envelope per tick, enriched
//! with a host CPU/memory sample read from `/proc`. Scrape failures are
//! logged, never block the ticker.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::Sink;

pub struct MetricsScraper {
    status_url: String,
    agent_id: String,
    client: reqwest::Client,
}

/// Jiffy counters from `/proc/stat`'s aggregate `cpu` line, used to derive a
/// percent busy between two samples.
#[derive(Debug, Clone, Copy)]
struct CpuJiffies {
    idle: u64,
    total: u64,
}

impl MetricsScraper {
    pub fn new(status_url: String, agent_id: String) -> Self {
        Self { status_url, agent_id, client: reqwest::Client::new() }
    }

    pub async fn run(self, sink: Sink, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut prev_cpu = read_cpu_jiffies();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.scrape_once().await {
                        Ok(mut metrics) => {
                            let cpu = read_cpu_jiffies();
                            metrics.cpu_percent = cpu_percent(prev_cpu, cpu);
                            metrics.memory_percent = read_memory_percent();
                            prev_cpu = cpu;

                            let message = wire::AgentMessage {
                                agent_id: self.agent_id.clone(),
                                timestamp: now_epoch_s(),
                                payload: wire::Payload::Metrics(metrics),
                            };
                            sink.emit(&message);
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "metrics scrape failed");
                        }
                    }
                }
            }
        }
    }

    async fn scrape_once(&self) -> Result<wire::Metrics, reqwest::Error> {
        let body = self.client.get(&self.status_url).send().await?.text().await?;
        Ok(parse_stub_status(&body))
    }
}

/// Reads the aggregate `cpu` line of `/proc/stat`. Returns `None` off Linux
/// or if the file is unreadable, in which case `cpu_percent` stays 0.
fn read_cpu_jiffies() -> Option<CpuJiffies> {
    let contents = std::fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line.split_whitespace().skip(1).filter_map(|v| v.parse().ok()).collect();
    // user, nice, system, idle, iowait, irq, softirq, steal, guest, guest_nice
    let idle = *fields.get(3)? + fields.get(4).copied().unwrap_or(0);
    let total = fields.iter().sum();
    Some(CpuJiffies { idle, total })
}

fn cpu_percent(prev: Option<CpuJiffies>, current: Option<CpuJiffies>) -> f64 {
    match (prev, current) {
        (Some(prev), Some(current)) => {
            let total_delta = current.total.saturating_sub(prev.total);
            if total_delta == 0 {
                return 0.0;
            }
            let idle_delta = current.idle.saturating_sub(prev.idle);
            (1.0 - idle_delta as f64 / total_delta as f64) * 100.0
        }
        _ => 0.0,
    }
}

/// Reads `MemTotal`/`MemAvailable` from `/proc/meminfo`. Returns 0.0 off
/// Linux or if the file is unreadable.
fn read_memory_percent() -> f64 {
    let Ok(contents) = std::fs::read_to_string("/proc/meminfo") else { return 0.0 };
    let mut total_kb = None;
    let mut available_kb = None;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = rest.split_whitespace().next().and_then(|v| v.parse::<f64>().ok());
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = rest.split_whitespace().next().and_then(|v| v.parse::<f64>().ok());
        }
    }
    match (total_kb, available_kb) {
        (Some(total), Some(available)) if total > 0.0 => (1.0 - available / total) * 100.0,
        _ => 0.0,
    }
}

/// Parses the classic NGINX `stub_status` text format:
/// ```text
/// Active connections: 3
/// server accepts handled requests
///  10 10 25
/// Reading: 0 Writing: 1 Waiting: 2
/// ```
fn parse_stub_status(body: &str) -> wire::Metrics {
    let mut metrics = wire::Metrics::default();
    let mut lines = body.lines();
    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix("Active connections:") {
            metrics.active = rest.trim().parse().unwrap_or(0);
        } else if line.trim() == "server accepts handled requests" {
            if let Some(totals) = lines.next() {
                let mut parts = totals.split_whitespace();
                metrics.accepts = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                metrics.handled = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                metrics.requests = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
            }
        } else if line.starts_with("Reading:") {
            for (key, value) in line.split_whitespace().zip(line.split_whitespace().skip(1)) {
                match key.trim_end_matches(':') {
                    "Reading" => metrics.reading = value.parse().unwrap_or(0),
                    "Writing" => metrics.writing = value.parse().unwrap_or(0),
                    "Waiting" => metrics.waiting = value.parse().unwrap_or(0),
                    _ => {}
                }
            }
        }
    }
    metrics
}

fn now_epoch_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
