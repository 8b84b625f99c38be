// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat writer: upserts into the relational `agents` table. Agents
//! deliver at-least-once, so every write is an upsert by primary key
//! (`agent_id`), never a bare insert.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{collect_batch, retry_flush};

async fn flush_batch(pool: &PgPool, batch: &[(String, i64, wire::Heartbeat)]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (agent_id, timestamp, heartbeat) in batch {
        let last_seen: DateTime<Utc> = DateTime::from_timestamp(*timestamp, 0).unwrap_or_else(Utc::now);
        sqlx::query(
            "INSERT INTO agents (agent_id, hostname, agent_version, is_pod, pod_ip, last_seen_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (agent_id) DO UPDATE SET
                hostname = EXCLUDED.hostname,
                agent_version = EXCLUDED.agent_version,
                is_pod = EXCLUDED.is_pod,
                pod_ip = EXCLUDED.pod_ip,
                last_seen_at = EXCLUDED.last_seen_at",
        )
        .bind(agent_id)
        .bind(&heartbeat.hostname)
        .bind(&heartbeat.agent_version)
        .bind(heartbeat.is_pod)
        .bind(&heartbeat.pod_ip)
        .bind(last_seen)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn run(
    mut rx: mpsc::Receiver<(String, i64, wire::Heartbeat)>,
    pool: PgPool,
    batch_rows: usize,
    window: std::time::Duration,
    cancel: CancellationToken,
) {
    while let Some(batch) = collect_batch(&mut rx, batch_rows, window, &cancel).await {
        let result = retry_flush(|| async { flush_batch(&pool, &batch).await }).await;
        if let Err(err) = result {
            tracing::warn!(error = %err, rows = batch.len(), "heartbeat batch dropped after exhausting retries");
        }
    }
}
