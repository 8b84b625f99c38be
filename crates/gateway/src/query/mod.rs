// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Analytics (G3): aggregate queries against the columnar store backing
//! `GET /api/analytics`.

use serde::Serialize;

use crate::writers::columnar::{ColumnarClient, ColumnarError};

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResponse {
    pub request_rate: Vec<serde_json::Value>,
    pub status_code_distribution: Vec<serde_json::Value>,
    pub top_endpoints: Vec<serde_json::Value>,
    pub latency_percentiles: Option<serde_json::Value>,
    pub latency_histogram: Vec<serde_json::Value>,
    pub per_server: Vec<serde_json::Value>,
    pub system_metrics: Vec<serde_json::Value>,
    pub gateway_metrics: Vec<serde_json::Value>,
    pub kpis: Kpis,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Kpis {
    pub request_rate: Kpi,
    pub error_rate: Kpi,
    pub p95_latency_ms: Kpi,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Kpi {
    pub current: f64,
    pub previous: f64,
    pub delta_pct: f64,
}

fn agent_filter(agent_id: Option<&str>) -> String {
    match agent_id {
        Some(id) => format!("AND agent_id = '{}'", id.replace('\'', "")),
        None => String::new(),
    }
}

async fn rows(columnar: &ColumnarClient, sql: &str) -> Result<Vec<serde_json::Value>, ColumnarError> {
    let response = columnar.query_json(sql).await?;
    Ok(response.get("data").and_then(|data| data.as_array()).cloned().unwrap_or_default())
}

async fn scalar(columnar: &ColumnarClient, sql: &str, field: &str) -> f64 {
    match rows(columnar, sql).await {
        Ok(rows) => rows.first().and_then(|row| row.get(field)).and_then(|v| v.as_f64()).unwrap_or(0.0),
        Err(err) => {
            tracing::warn!(error = %err, "analytics scalar query failed");
            0.0
        }
    }
}

fn delta_pct(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Build the full analytics response for the last `window_s` seconds,
/// optionally scoped to one agent.
pub async fn analytics(columnar: &ColumnarClient, window_s: i64, agent_id: Option<&str>) -> AnalyticsResponse {
    let filter = agent_filter(agent_id);

    let request_rate = rows(
        columnar,
        &format!(
            "SELECT toStartOfMinute(toDateTime(ts_ms / 1000)) AS minute, count(*) AS requests
             FROM access_logs WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}
             GROUP BY minute ORDER BY minute"
        ),
    )
    .await
    .unwrap_or_default();

    let status_code_distribution = rows(
        columnar,
        &format!(
            "SELECT status, count(*) AS requests FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}
             GROUP BY status ORDER BY requests DESC"
        ),
    )
    .await
    .unwrap_or_default();

    let top_endpoints = rows(
        columnar,
        &format!(
            "SELECT uri, count(*) AS requests, avg(request_time_ms) AS avg_request_time_ms FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}
             GROUP BY uri ORDER BY requests DESC LIMIT 20"
        ),
    )
    .await
    .unwrap_or_default();

    let latency_percentiles = rows(
        columnar,
        &format!(
            "SELECT quantile(0.5)(request_time_ms) AS p50, quantile(0.95)(request_time_ms) AS p95, quantile(0.99)(request_time_ms) AS p99
             FROM access_logs WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}"
        ),
    )
    .await
    .unwrap_or_default()
    .into_iter()
    .next();

    let latency_histogram = rows(
        columnar,
        &format!(
            "SELECT floor(request_time_ms / 50) * 50 AS bucket_ms, count(*) AS requests FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}
             GROUP BY bucket_ms ORDER BY bucket_ms"
        ),
    )
    .await
    .unwrap_or_default();

    let per_server = rows(
        columnar,
        &format!(
            "SELECT agent_id, count(*) AS requests FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}
             GROUP BY agent_id ORDER BY requests DESC"
        ),
    )
    .await
    .unwrap_or_default();

    let system_metrics = rows(
        columnar,
        &format!(
            "SELECT toStartOfMinute(toDateTime(ts_ms / 1000)) AS minute, avg(cpu_percent) AS cpu_percent, avg(memory_percent) AS memory_percent
             FROM system_metrics WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}
             GROUP BY minute ORDER BY minute"
        ),
    )
    .await
    .unwrap_or_default();

    // `nginx_metrics` *is* the gateway's own connection-counter series; it
    // is reported under the `gateway_metrics` response field rather than
    // fed into a second, identically-shaped table.
    let gateway_metrics = rows(
        columnar,
        &format!(
            "SELECT toStartOfMinute(toDateTime(ts_ms / 1000)) AS minute, avg(active) AS active, sum(requests) AS requests
             FROM nginx_metrics WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}
             GROUP BY minute ORDER BY minute"
        ),
    )
    .await
    .unwrap_or_default();

    let kpis = kpis(columnar, window_s, &filter).await;

    AnalyticsResponse {
        request_rate,
        status_code_distribution,
        top_endpoints,
        latency_percentiles,
        latency_histogram,
        per_server,
        system_metrics,
        gateway_metrics,
        kpis,
    }
}

async fn kpis(columnar: &ColumnarClient, window_s: i64, filter: &str) -> Kpis {
    let current_requests = scalar(
        columnar,
        &format!("SELECT count(*) / {window_s} AS value FROM access_logs WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}"),
        "value",
    )
    .await;
    let previous_requests = scalar(
        columnar,
        &format!(
            "SELECT count(*) / {window_s} AS value FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s} * 2) * 1000
               AND ts_ms < (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}"
        ),
        "value",
    )
    .await;

    let current_errors = scalar(
        columnar,
        &format!(
            "SELECT countIf(status >= 500) / greatest(count(*), 1) AS value FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}"
        ),
        "value",
    )
    .await;
    let previous_errors = scalar(
        columnar,
        &format!(
            "SELECT countIf(status >= 500) / greatest(count(*), 1) AS value FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s} * 2) * 1000
               AND ts_ms < (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}"
        ),
        "value",
    )
    .await;

    let current_p95 = scalar(
        columnar,
        &format!(
            "SELECT quantile(0.95)(request_time_ms) AS value FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}"
        ),
        "value",
    )
    .await;
    let previous_p95 = scalar(
        columnar,
        &format!(
            "SELECT quantile(0.95)(request_time_ms) AS value FROM access_logs
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window_s} * 2) * 1000
               AND ts_ms < (toUnixTimestamp(now()) - {window_s}) * 1000 {filter}"
        ),
        "value",
    )
    .await;

    Kpis {
        request_rate: Kpi { current: current_requests, previous: previous_requests, delta_pct: delta_pct(current_requests, previous_requests) },
        error_rate: Kpi { current: current_errors, previous: previous_errors, delta_pct: delta_pct(current_errors, previous_errors) },
        p95_latency_ms: Kpi { current: current_p95, previous: previous_p95, delta_pct: delta_pct(current_p95, previous_p95) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_pct_handles_zero_previous() {
        assert_eq!(delta_pct(10.0, 0.0), 0.0);
    }

    #[test]
    fn delta_pct_computes_relative_change() {
        assert_eq!(delta_pct(150.0, 100.0), 50.0);
    }

    #[test]
    fn agent_filter_is_empty_when_unscoped() {
        assert_eq!(agent_filter(None), "");
    }
}
