// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fleet gateway: ingests agent streams, batches them into storage,
//! fans them out live, evaluates alert rules, and serves the operator HTTP
//! API.

pub mod alerting;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod live;
pub mod query;
pub mod tenancy;
pub mod terminal;
pub mod writers;

use std::net::SocketAddr;
use std::sync::Arc;

use config::GatewayConfig;
use health::ReadinessState;
use http::state::{AppState, AuthStore};
use ingest::registry::SessionRegistry;
use ingest::IngestService;
use lifecycle::Lifecycle;
use writers::columnar::ColumnarClient;

/// Run the gateway until an OS shutdown signal arrives. Returns a process
/// exit code; nonzero means a fatal startup error, never a normal shutdown.
pub async fn run(config: GatewayConfig) -> i32 {
    let config = Arc::new(config);

    let pool = match db::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to the relational store");
            return 2;
        }
    };

    let mut lifecycle = Lifecycle::new();
    let cancel = lifecycle.token();
    let readiness = ReadinessState::default();

    let (writer_handles, writer_tasks) = writers::spawn(pool.clone(), config.clone(), cancel.clone());
    lifecycle.track_many(writer_tasks);

    let live = live::Registry::new(config.live_subscriber_queue);
    let sessions = SessionRegistry::new();
    let columnar = ColumnarClient::new(config.columnar_url.clone(), config.columnar_user.clone(), config.columnar_password.clone());

    let scheduler_cancel = cancel.clone();
    let scheduler_pool = pool.clone();
    let scheduler_columnar = columnar.clone();
    let tick_interval = config.alert_tick_interval();
    lifecycle.track(tokio::spawn(async move {
        alerting::scheduler::run(scheduler_pool, scheduler_columnar, tick_interval, scheduler_cancel).await;
    }));

    let ingest_addr: SocketAddr = match config.ingest_addr().parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(error = %err, "invalid ingest bind address");
            return 2;
        }
    };
    let ingest_service = IngestService::new(sessions.clone(), live.clone(), writer_handles);
    let ingest_listener = match tokio::net::TcpListener::bind(ingest_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, addr = %ingest_addr, "failed to bind agent ingest endpoint");
            return 2;
        }
    };
    let ingest_cancel = cancel.clone();
    lifecycle.track(tokio::spawn(async move {
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(ingest_listener);
        let _ = tonic::transport::Server::builder()
            .add_service(wire::proto::fleet_server::FleetServer::new(ingest_service))
            .serve_with_incoming_shutdown(incoming, async move { ingest_cancel.cancelled().await })
            .await;
    }));

    let app_state = Arc::new(AppState {
        pool,
        columnar,
        sessions,
        live,
        config: config.clone(),
        auth: AuthStore::default(),
        readiness: readiness.clone(),
    });

    let http_addr: SocketAddr = match config.http_addr().parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(error = %err, "invalid HTTP bind address");
            return 2;
        }
    };
    let router = http::build_router(app_state);
    let http_listener = match tokio::net::TcpListener::bind(http_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, addr = %http_addr, "failed to bind HTTP API");
            return 2;
        }
    };
    let http_cancel = cancel.clone();
    lifecycle.track(tokio::spawn(async move {
        let _ = axum::serve(http_listener, router).with_graceful_shutdown(async move { http_cancel.cancelled().await }).await;
    }));

    readiness.set_ready(true);
    tracing::info!(%http_addr, %ingest_addr, "fleet-gateway started");

    lifecycle.run_until_shutdown().await;
    readiness.set_ready(false);
    0
}
