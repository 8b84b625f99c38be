// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway writers (G2): one batching consumer per envelope kind, each
//! feeding an external sink. Batches flush at N rows or M milliseconds,
//! whichever comes first; a batch that exhausts its retries is logged and
//! dropped, never blocking ingest.

pub mod access_log;
pub mod columnar;
pub mod heartbeat;
pub mod metrics;

use std::future::Future;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use columnar::ColumnarClient;

const MAX_FLUSH_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: std::time::Duration = std::time::Duration::from_millis(200);

/// Retry an async flush with capped exponential backoff. Returns `Ok` as soon
/// as one attempt succeeds; returns the last error if every attempt fails.
pub(crate) async fn retry_flush<F, Fut, E>(mut attempt: F) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut last_err = match attempt().await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    for _ in 1..MAX_FLUSH_ATTEMPTS {
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(std::time::Duration::from_secs(10));
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

/// Handles to feed envelopes into each writer's batching queue.
#[derive(Clone)]
pub struct WriterHandles {
    access_log: mpsc::Sender<wire::LogEntry>,
    metrics: mpsc::Sender<(String, i64, wire::Metrics)>,
    heartbeat: mpsc::Sender<(String, i64, wire::Heartbeat)>,
}

impl WriterHandles {
    /// Route an ingested envelope to its writer, dropping silently if the
    /// writer's queue is full (back-pressure belongs to the writer, not the
    /// ingest path).
    pub fn route(&self, envelope: &wire::AgentMessage) {
        match &envelope.payload {
            wire::Payload::LogEntry(entry) => {
                let _ = self.access_log.try_send(entry.clone());
            }
            wire::Payload::Metrics(metrics) => {
                let _ = self.metrics.try_send((envelope.agent_id.clone(), envelope.timestamp, *metrics));
            }
            wire::Payload::Heartbeat(heartbeat) => {
                let _ = self.heartbeat.try_send((envelope.agent_id.clone(), envelope.timestamp, heartbeat.clone()));
            }
        }
    }
}

/// Spawn all three writer tasks and return the routing handle plus their
/// join handles for lifecycle tracking.
pub fn spawn(
    pool: PgPool,
    config: Arc<GatewayConfig>,
    cancel: CancellationToken,
) -> (WriterHandles, Vec<JoinHandle<()>>) {
    let columnar = ColumnarClient::new(config.columnar_url.clone(), config.columnar_user.clone(), config.columnar_password.clone());

    let (access_tx, access_rx) = mpsc::channel(4096);
    let (metrics_tx, metrics_rx) = mpsc::channel(4096);
    let (heartbeat_tx, heartbeat_rx) = mpsc::channel(1024);

    let batch_rows = config.writer_batch_rows;
    let batch_window = config.writer_batch_window();
    let access_ttl = config.access_log_ttl_days;
    let metrics_ttl = config.metrics_ttl_days;

    let handles = vec![
        tokio::spawn(access_log::run(access_rx, columnar.clone(), batch_rows, batch_window, access_ttl, cancel.clone())),
        tokio::spawn(metrics::run(metrics_rx, columnar, batch_rows, batch_window, metrics_ttl, cancel.clone())),
        tokio::spawn(heartbeat::run(heartbeat_rx, pool, batch_rows, batch_window, cancel)),
    ];

    (WriterHandles { access_log: access_tx, metrics: metrics_tx, heartbeat: heartbeat_tx }, handles)
}

/// Drain up to `batch_rows` items from `rx` or until `window` elapses since
/// the first item of this batch arrived, whichever comes first.
pub(crate) async fn collect_batch<T>(
    rx: &mut mpsc::Receiver<T>,
    batch_rows: usize,
    window: std::time::Duration,
    cancel: &CancellationToken,
) -> Option<Vec<T>> {
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        item = rx.recv() => item?,
    };

    let mut batch = Vec::with_capacity(batch_rows);
    batch.push(first);

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    while batch.len() < batch_rows {
        tokio::select! {
            _ = &mut deadline => break,
            item = rx.recv() => match item {
                Some(item) => batch.push(item),
                None => break,
            },
        }
    }
    Some(batch)
}
