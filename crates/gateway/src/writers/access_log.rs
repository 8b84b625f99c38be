// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-log writer: batches `LogEntry` envelopes into the columnar
//! store's `access_logs` table.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::columnar::ColumnarClient;
use super::{collect_batch, retry_flush};

/// Row timestamps are written against `toDateTime(ts_ms / 1000)` rather than
/// the millisecond column directly, so the TTL declared on `access_logs`
/// (against the coarser `DateTime` column) applies uniformly regardless of
/// the envelope's own sub-second precision.
fn to_row(entry: &wire::LogEntry, ttl_days: i64) -> serde_json::Value {
    let ts_ms = entry.timestamp * 1000;
    serde_json::json!({
        "agent_id": entry.agent_id,
        "hostname": entry.hostname,
        "log_type": entry.log_type,
        "remote_addr": entry.remote_addr,
        "method": entry.method,
        "uri": entry.uri,
        "status": entry.status,
        "bytes_sent": entry.bytes_sent,
        "request_time_ms": entry.request_time_ms,
        "user_agent": entry.user_agent,
        "referrer": entry.referrer,
        "timestamp": entry.timestamp,
        "ts_ms": ts_ms,
        "ttl_days": ttl_days,
    })
}

pub async fn run(
    mut rx: mpsc::Receiver<wire::LogEntry>,
    columnar: ColumnarClient,
    batch_rows: usize,
    window: std::time::Duration,
    ttl_days: i64,
    cancel: CancellationToken,
) {
    while let Some(batch) = collect_batch(&mut rx, batch_rows, window, &cancel).await {
        let rows: Vec<serde_json::Value> = batch.iter().map(|entry| to_row(entry, ttl_days)).collect();
        let result = retry_flush(|| async { columnar.insert_rows("access_logs", &rows).await }).await;
        if let Err(err) = result {
            tracing::warn!(error = %err, rows = rows.len(), "access log batch dropped after exhausting retries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_carries_both_second_and_millisecond_timestamps() {
        let entry = wire::LogEntry {
            agent_id: "a1".into(),
            hostname: "h".into(),
            log_type: "access".into(),
            remote_addr: "127.0.0.1".into(),
            method: "GET".into(),
            uri: "/".into(),
            status: 200,
            bytes_sent: 512,
            request_time_ms: 1.5,
            user_agent: "ua".into(),
            referrer: String::new(),
            timestamp: 1_700_000_000,
        };
        let row = to_row(&entry, 7);
        assert_eq!(row["timestamp"], 1_700_000_000);
        assert_eq!(row["ts_ms"], 1_700_000_000_000i64);
        assert_eq!(row["ttl_days"], 7);
    }
}
