// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness/readiness HTTP endpoints on `HEALTH_PORT`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

/// Shared readiness flag, flipped once startup finishes and cleared once
/// shutdown begins.
#[derive(Clone, Default)]
pub struct ReadinessState(Arc<AtomicBool>);

impl ReadinessState {
    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub async fn serve(addr: SocketAddr, readiness: ReadinessState, cancel: CancellationToken) -> std::io::Result<()> {
    let app = Router::new().route("/healthz", get(liveness)).route("/ready", get(readiness_handler)).with_state(readiness);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(async move { cancel.cancelled().await }).await
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}

async fn readiness_handler(State(readiness): State<ReadinessState>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readiness_reflects_flag() {
        let readiness = ReadinessState::default();
        assert_eq!(readiness_handler(State(readiness.clone())).await, StatusCode::SERVICE_UNAVAILABLE);
        readiness.set_ready(true);
        assert_eq!(readiness_handler(State(readiness)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness().await, StatusCode::OK);
    }
}
