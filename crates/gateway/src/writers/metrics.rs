// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics writer: batches each metrics envelope into two columnar-store
//! tables, since it carries two distinct series: nginx connection counters
//! into `nginx_metrics`, host CPU/memory into `system_metrics`.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::columnar::ColumnarClient;
use super::{collect_batch, retry_flush};

fn to_nginx_row(agent_id: &str, timestamp: i64, metrics: &wire::Metrics, ttl_days: i64) -> serde_json::Value {
    serde_json::json!({
        "agent_id": agent_id,
        "timestamp": timestamp,
        "ts_ms": timestamp * 1000,
        "active": metrics.active,
        "reading": metrics.reading,
        "writing": metrics.writing,
        "waiting": metrics.waiting,
        "accepts": metrics.accepts,
        "handled": metrics.handled,
        "requests": metrics.requests,
        "ttl_days": ttl_days,
    })
}

fn to_system_row(agent_id: &str, timestamp: i64, metrics: &wire::Metrics, ttl_days: i64) -> serde_json::Value {
    serde_json::json!({
        "agent_id": agent_id,
        "timestamp": timestamp,
        "ts_ms": timestamp * 1000,
        "cpu_percent": metrics.cpu_percent,
        "memory_percent": metrics.memory_percent,
        "ttl_days": ttl_days,
    })
}

pub async fn run(
    mut rx: mpsc::Receiver<(String, i64, wire::Metrics)>,
    columnar: ColumnarClient,
    batch_rows: usize,
    window: std::time::Duration,
    ttl_days: i64,
    cancel: CancellationToken,
) {
    while let Some(batch) = collect_batch(&mut rx, batch_rows, window, &cancel).await {
        let nginx_rows: Vec<serde_json::Value> =
            batch.iter().map(|(agent_id, ts, metrics)| to_nginx_row(agent_id, *ts, metrics, ttl_days)).collect();
        let system_rows: Vec<serde_json::Value> =
            batch.iter().map(|(agent_id, ts, metrics)| to_system_row(agent_id, *ts, metrics, ttl_days)).collect();

        let nginx_result = retry_flush(|| async { columnar.insert_rows("nginx_metrics", &nginx_rows).await }).await;
        if let Err(err) = nginx_result {
            tracing::warn!(error = %err, rows = nginx_rows.len(), "nginx metrics batch dropped after exhausting retries");
        }

        let system_result = retry_flush(|| async { columnar.insert_rows("system_metrics", &system_rows).await }).await;
        if let Err(err) = system_result {
            tracing::warn!(error = %err, rows = system_rows.len(), "system metrics batch dropped after exhausting retries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> wire::Metrics {
        wire::Metrics { active: 3, reading: 0, writing: 1, waiting: 2, accepts: 10, handled: 10, requests: 25, cpu_percent: 72.5, memory_percent: 48.0 }
    }

    #[test]
    fn nginx_row_carries_connection_counters_not_host_metrics() {
        let row = to_nginx_row("agent-1", 1_700_000_000, &sample_metrics(), 3);
        assert_eq!(row["active"], 3);
        assert_eq!(row["requests"], 25);
        assert!(row.get("cpu_percent").is_none());
    }

    #[test]
    fn system_row_carries_host_metrics_not_connection_counters() {
        let row = to_system_row("agent-1", 1_700_000_000, &sample_metrics(), 3);
        assert_eq!(row["cpu_percent"], 72.5);
        assert_eq!(row["memory_percent"], 48.0);
        assert!(row.get("active").is_none());
    }
}
