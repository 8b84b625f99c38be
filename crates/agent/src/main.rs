// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use agent::buffer::Buffer;
use agent::collectors::{heartbeat::HeartbeatCollector, log_tail::LogTailer, metrics::MetricsScraper, Sink};
use agent::config::{CliArgs, ResolvedConfig};
use agent::error::StartupError;
use agent::health::{self, ReadinessState};
use agent::lifecycle::Lifecycle;
use agent::mgmt::nginx_ctl::SignalNginxControl;
use agent::mgmt::ManagementService;
use agent::session::SessionManager;
use agent::update::Updater;
use agent::{identity, mgmt};

const DEFAULT_NGINX_PID_FILE: &str = "/var/run/nginx.pid";

fn main() {
    let cli = CliArgs::parse();
    if cli.print_version {
        println!("fleet-agent {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    let config = match ResolvedConfig::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to build tokio runtime: {err}");
            std::process::exit(1);
        }
    };
    let exit_code = runtime.block_on(run(config));
    std::process::exit(exit_code);
}

fn init_tracing(config: &ResolvedConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = std::env::var("LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: ResolvedConfig) -> i32 {
    let config = Arc::new(config);

    let agent_id = match identity::load_or_create(&config.buffer_dir, config.agent_id_override.as_deref()) {
        Ok(id) => id,
        Err(err) => {
            tracing::error!(error = %err, "failed to establish agent identity");
            return 2;
        }
    };
    let hostname = identity::hostname();

    let buffer = match Buffer::open(&config.buffer_dir, "agent") {
        Ok(buffer) => Arc::new(buffer),
        Err(source) => {
            let err = StartupError::Buffer { path: config.buffer_dir.display().to_string(), source };
            tracing::error!(error = %err, "fatal startup error");
            return 2;
        }
    };

    let nginx: Arc<dyn mgmt::nginx_ctl::NginxControl> = Arc::new(SignalNginxControl::new(DEFAULT_NGINX_PID_FILE));

    let updater = config.update_server.clone().map(|url| {
        let current_exe = std::env::current_exe().unwrap_or_else(|_| "fleet-agent".into());
        Arc::new(Updater::new(
            Some(url),
            env!("CARGO_PKG_VERSION").to_owned(),
            current_exe,
            agent::collectors::heartbeat::in_container(),
        ))
    });

    let mut lifecycle = Lifecycle::new();
    let cancel = lifecycle.token();
    let readiness = ReadinessState::default();

    lifecycle.track(tokio::spawn(
        HeartbeatCollector::new(agent_id.clone(), hostname.clone(), config.nginx_config_path.clone())
            .run(Sink::new(buffer.clone()), cancel.clone()),
    ));
    lifecycle.track(tokio::spawn(
        MetricsScraper::new(config.nginx_status_url.clone(), agent_id.clone()).run(Sink::new(buffer.clone()), cancel.clone()),
    ));
    lifecycle.track_many(spawn_log_tailer(&config, "access", config.access_log_path.clone(), agent_id.clone(), hostname.clone(), Sink::new(buffer.clone()), cancel.clone()));
    lifecycle.track_many(spawn_log_tailer(&config, "error", config.error_log_path.clone(), agent_id.clone(), hostname.clone(), Sink::new(buffer.clone()), cancel.clone()));

    let session_manager = SessionManager::new(config.clone(), agent_id.clone(), hostname.clone(), buffer.clone(), nginx.clone(), updater.clone());
    lifecycle.track_many(session_manager.spawn_all(cancel.clone()));

    if let Some(updater) = updater.clone() {
        let interval = std::time::Duration::from_secs(config.update_interval_s);
        let updater_cancel = cancel.clone();
        lifecycle.track(tokio::spawn(async move { updater.run(interval, updater_cancel).await }));
    }

    let mgmt_addr: SocketAddr = match format!("0.0.0.0:{}", config.mgmt_port).parse() {
        Ok(addr) => addr,
        Err(_) => return 2,
    };
    let mgmt_service = ManagementService::new(config.clone(), agent_id.clone(), hostname.clone(), nginx.clone());
    let mgmt_cancel = cancel.clone();
    let mgmt_listener = match tokio::net::TcpListener::bind(mgmt_addr).await {
        Ok(listener) => listener,
        Err(source) => {
            let err = StartupError::Bind { what: "management grpc", addr: mgmt_addr.to_string(), source };
            tracing::error!(error = %err, "fatal startup error");
            return 2;
        }
    };
    lifecycle.track(tokio::spawn(async move {
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(mgmt_listener);
        let _ = tonic::transport::Server::builder()
            .add_service(wire::proto::management_server::ManagementServer::new(mgmt_service))
            .serve_with_incoming_shutdown(incoming, async move { mgmt_cancel.cancelled().await })
            .await;
    }));

    let health_addr: SocketAddr = match format!("0.0.0.0:{}", config.health_port).parse() {
        Ok(addr) => addr,
        Err(_) => return 2,
    };
    let health_readiness = readiness.clone();
    let health_cancel = cancel.clone();
    lifecycle.track(tokio::spawn(async move {
        if let Err(err) = health::serve(health_addr, health_readiness, health_cancel).await {
            tracing::error!(error = %err, "health server exited with an error");
        }
    }));

    readiness.set_ready(true);
    tracing::info!(agent_id, %hostname, gateways = config.gateways.len(), "fleet-agent started");

    lifecycle.run_until_shutdown().await;
    readiness.set_ready(false);
    0
}

fn spawn_log_tailer(
    config: &ResolvedConfig,
    log_type: &'static str,
    path: String,
    agent_id: String,
    hostname: String,
    sink: Sink,
    cancel: tokio_util::sync::CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(256);
    let tailer = LogTailer::new(path.into(), log_type, agent_id, hostname, config.log_format);
    let tail_handle = tokio::spawn(tailer.run(tx, cancel));
    let bridge_handle = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            let message = wire::AgentMessage {
                agent_id: entry.agent_id.clone(),
                timestamp: entry.timestamp,
                payload: wire::Payload::LogEntry(entry),
            };
            sink.emit(&message);
        }
    });
    vec![tail_handle, bridge_handle]
}
