// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration for the fleet gateway.

/// Configuration for the fleet gateway process.
#[derive(Debug, Clone, clap::Args)]
pub struct GatewayConfig {
    /// Host to bind the HTTP API on.
    #[arg(long, default_value = "0.0.0.0", env = "GATEWAY_HOST")]
    pub host: String,

    /// Port to bind the HTTP API on.
    #[arg(long, default_value_t = 8080, env = "GATEWAY_PORT")]
    pub port: u16,

    /// Port to bind the agent ingest gRPC service on.
    #[arg(long, default_value_t = 9090, env = "GATEWAY_INGEST_PORT")]
    pub ingest_port: u16,

    /// Relational store connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Columnar store HTTP insert endpoint base URL.
    #[arg(long, env = "COLUMNAR_URL")]
    pub columnar_url: String,

    /// Columnar store HTTP basic auth username, if required.
    #[arg(long, env = "COLUMNAR_USER")]
    pub columnar_user: Option<String>,

    /// Columnar store HTTP basic auth password, if required.
    #[arg(long, env = "COLUMNAR_PASSWORD")]
    pub columnar_password: Option<String>,

    /// Bearer token securing the HTTP API. If unset, auth is disabled.
    #[arg(long, env = "GATEWAY_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Maximum rows per writer batch before a forced flush.
    #[arg(long, default_value_t = 1000, env = "WRITER_BATCH_ROWS")]
    pub writer_batch_rows: usize,

    /// Maximum age in milliseconds of a writer batch before a forced flush.
    #[arg(long, default_value_t = 500, env = "WRITER_BATCH_MS")]
    pub writer_batch_ms: u64,

    /// Alert rule evaluation tick interval in milliseconds.
    #[arg(long, default_value_t = 15_000, env = "ALERT_TICK_MS")]
    pub alert_tick_ms: u64,

    /// Bounded queue depth for each live-fanout subscriber.
    #[arg(long, default_value_t = 256, env = "LIVE_SUBSCRIBER_QUEUE")]
    pub live_subscriber_queue: usize,

    /// Access-log TTL in days in the columnar store.
    #[arg(long, default_value_t = 7, env = "ACCESS_LOG_TTL_DAYS")]
    pub access_log_ttl_days: i64,

    /// Metrics TTL in days in the columnar store.
    #[arg(long, default_value_t = 30, env = "METRICS_TTL_DAYS")]
    pub metrics_ttl_days: i64,

    /// Port the terminal proxy dials on an agent's host to reach its
    /// management gRPC endpoint. Agents do not report this port over the
    /// ingest stream, so every agent in the fleet must run management on
    /// the same port.
    #[arg(long, default_value_t = 7171, env = "AGENT_MGMT_PORT")]
    pub agent_mgmt_port: u16,
}

impl GatewayConfig {
    pub fn writer_batch_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.writer_batch_ms)
    }

    pub fn alert_tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.alert_tick_ms)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ingest_addr(&self) -> String {
        format!("{}:{}", self.host, self.ingest_port)
    }
}
