// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered agent configuration: CLI flags, a `KEY=VALUE` config file, and
//! built-in defaults, applied in that precedence order (highest first).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;

/// Buffer consumption mode (see SPEC_FULL.md Section 4.C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    #[default]
    Shared,
    PerGateway,
}

impl BufferMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "shared" => Some(Self::Shared),
            "per_gateway" => Some(Self::PerGateway),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Combined,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "combined" => Some(Self::Combined),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Raw CLI arguments. Every field is optional so the merge step in
/// [`ResolvedConfig::load`] can tell "not passed" apart from "passed with
/// the default value".
#[derive(Debug, Parser, Default)]
#[command(name = "fleet-agent", version, about)]
pub struct CliArgs {
    /// Path to a `KEY=VALUE` configuration file.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Print version metadata and exit.
    #[arg(long = "version", short = 'V')]
    pub print_version: bool,

    #[arg(long)]
    pub gateways: Option<String>,
    #[arg(long)]
    pub agent_id: Option<String>,
    #[arg(long)]
    pub health_port: Option<u16>,
    #[arg(long)]
    pub mgmt_port: Option<u16>,
    #[arg(long)]
    pub update_server: Option<String>,
    #[arg(long)]
    pub update_interval: Option<u64>,
    #[arg(long)]
    pub nginx_status_url: Option<String>,
    #[arg(long)]
    pub access_log_path: Option<String>,
    #[arg(long)]
    pub error_log_path: Option<String>,
    #[arg(long)]
    pub log_format: Option<String>,
    #[arg(long)]
    pub nginx_config_path: Option<String>,
    #[arg(long)]
    pub buffer_dir: Option<String>,
    #[arg(long)]
    pub buffer_mode: Option<String>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub log_file: Option<String>,
    #[arg(long)]
    pub gateway_tls: Option<bool>,
}

/// Fully resolved configuration used by every subsystem.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub gateways: Vec<String>,
    pub agent_id_override: Option<String>,
    pub health_port: u16,
    pub mgmt_port: u16,
    pub update_server: Option<String>,
    pub update_interval_s: u64,
    pub nginx_status_url: String,
    pub access_log_path: String,
    pub error_log_path: String,
    pub log_format: LogFormat,
    pub nginx_config_path: String,
    pub buffer_dir: PathBuf,
    pub buffer_mode: BufferMode,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub gateway_tls: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: String, #[source] source: std::io::Error },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl ResolvedConfig {
    /// Merge CLI args over an optional config file over built-in defaults.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file_values = match &cli.config {
            Some(path) => parse_config_file(path)?,
            None => HashMap::new(),
        };

        let str_field = |cli_val: &Option<String>, key: &str, default: &str| -> String {
            cli_val.clone().or_else(|| file_values.get(key).cloned()).unwrap_or_else(|| default.to_owned())
        };

        let gateways_raw = str_field(&cli.gateways, "GATEWAYS", "");
        let gateways = gateways_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(strip_scheme)
            .collect();

        let health_port = cli
            .health_port
            .or_else(|| file_values.get("HEALTH_PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(9090);
        let mgmt_port = cli
            .mgmt_port
            .or_else(|| file_values.get("MGMT_PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(7171);
        let update_interval_s = cli
            .update_interval
            .or_else(|| file_values.get("UPDATE_INTERVAL").and_then(|v| v.parse().ok()))
            .unwrap_or(7 * 24 * 3600);

        let log_format_raw = str_field(&cli.log_format, "LOG_FORMAT", "combined");
        let log_format = LogFormat::parse(&log_format_raw)
            .ok_or(ConfigError::InvalidValue { key: "LOG_FORMAT", value: log_format_raw })?;

        let buffer_mode_raw = str_field(&cli.buffer_mode, "BUFFER_MODE", "shared");
        let buffer_mode = BufferMode::parse(&buffer_mode_raw)
            .ok_or(ConfigError::InvalidValue { key: "BUFFER_MODE", value: buffer_mode_raw })?;

        let log_file = cli
            .log_file
            .clone()
            .or_else(|| file_values.get("LOG_FILE").cloned())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(ResolvedConfig {
            gateways,
            agent_id_override: cli.agent_id.clone().or_else(|| file_values.get("AGENT_ID").cloned()),
            health_port,
            mgmt_port,
            update_server: cli
                .update_server
                .clone()
                .or_else(|| file_values.get("UPDATE_SERVER").cloned())
                .filter(|s| !s.is_empty()),
            update_interval_s,
            nginx_status_url: str_field(&cli.nginx_status_url, "NGINX_STATUS_URL", "http://127.0.0.1:8080/status"),
            access_log_path: str_field(&cli.access_log_path, "ACCESS_LOG_PATH", "/var/log/nginx/access.log"),
            error_log_path: str_field(&cli.error_log_path, "ERROR_LOG_PATH", "/var/log/nginx/error.log"),
            log_format,
            nginx_config_path: str_field(&cli.nginx_config_path, "NGINX_CONFIG_PATH", "/etc/nginx/nginx.conf"),
            buffer_dir: PathBuf::from(str_field(&cli.buffer_dir, "BUFFER_DIR", "/var/lib/fleet-agent")),
            buffer_mode,
            log_level: str_field(&cli.log_level, "LOG_LEVEL", "info"),
            log_file,
            gateway_tls: cli
                .gateway_tls
                .or_else(|| file_values.get("GATEWAY_TLS").map(|v| v == "true" || v == "1"))
                .unwrap_or(false),
        })
    }
}

/// Strip a leading `http://`/`https://` scheme, as gateway addresses are
/// dialed as bare `host:port` by the gRPC channel builder.
fn strip_scheme(addr: &str) -> String {
    addr.strip_prefix("https://").or_else(|| addr.strip_prefix("http://")).unwrap_or(addr).to_owned()
}

fn parse_config_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.display().to_string(), source })?;
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
    Ok(map)
}
