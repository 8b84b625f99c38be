// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The local Management gRPC service (C4): config read/validate/write,
//! nginx lifecycle actions, certificate inventory, log tailing, an
//! interactive shell, and augment previews, all served on `MGMT_PORT`.

pub mod augment;
pub mod certs;
pub mod config_ops;
pub mod exec;
pub mod nginx_ctl;

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::config::{LogFormat, ResolvedConfig};
use crate::error::ErrorCode;
use nginx_ctl::NginxControl;
use wire::proto;
use wire::proto::management_server::Management;

pub struct ManagementService {
    config: Arc<ResolvedConfig>,
    agent_id: String,
    hostname: String,
    nginx: Arc<dyn NginxControl>,
}

impl ManagementService {
    pub fn new(config: Arc<ResolvedConfig>, agent_id: String, hostname: String, nginx: Arc<dyn NginxControl>) -> Self {
        Self { config, agent_id, hostname, nginx }
    }
}

type LogStream = Pin<Box<dyn Stream<Item = Result<proto::LogEntry, Status>> + Send + 'static>>;
type ExecStream = Pin<Box<dyn Stream<Item = Result<proto::ExecFrame, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl Management for ManagementService {
    async fn get_config(&self, request: Request<proto::GetConfigRequest>) -> Result<Response<proto::GetConfigResponse>, Status> {
        let path = resolve_path(&self.config, &request.get_ref().path);
        match config_ops::get_config(&path) {
            Ok(content) => Ok(Response::new(proto::GetConfigResponse { content, error: String::new() })),
            Err(err) => Ok(Response::new(proto::GetConfigResponse { content: String::new(), error: err.to_string() })),
        }
    }

    async fn validate_config(
        &self,
        request: Request<proto::ValidateConfigRequest>,
    ) -> Result<Response<proto::ValidateConfigResponse>, Status> {
        let (valid, errors, warnings) = config_ops::validate_config(&request.get_ref().content);
        Ok(Response::new(proto::ValidateConfigResponse { valid, errors, warnings }))
    }

    async fn update_config(
        &self,
        request: Request<proto::UpdateConfigRequest>,
    ) -> Result<Response<proto::UpdateConfigResponse>, Status> {
        let req = request.into_inner();
        let path = resolve_path(&self.config, &req.path);
        match config_ops::update_config(&path, &req.new_content, req.backup, self.nginx.as_ref()) {
            Ok(backup_path) => Ok(Response::new(proto::UpdateConfigResponse {
                ok: true,
                backup_path: backup_path.map(|p| p.display().to_string()).unwrap_or_default(),
                error: String::new(),
            })),
            Err(err) => Ok(Response::new(proto::UpdateConfigResponse {
                ok: false,
                backup_path: String::new(),
                error: err.to_string(),
            })),
        }
    }

    async fn reload_nginx(&self, _request: Request<proto::Empty>) -> Result<Response<proto::OkResponse>, Status> {
        Ok(Response::new(ok_response(self.nginx.reload())))
    }

    async fn restart_nginx(&self, _request: Request<proto::Empty>) -> Result<Response<proto::OkResponse>, Status> {
        Ok(Response::new(ok_response(self.nginx.restart())))
    }

    async fn stop_nginx(&self, _request: Request<proto::Empty>) -> Result<Response<proto::OkResponse>, Status> {
        Ok(Response::new(ok_response(self.nginx.stop())))
    }

    async fn list_certificates(
        &self,
        _request: Request<proto::Empty>,
    ) -> Result<Response<proto::ListCertificatesResponse>, Status> {
        let dirs = vec![std::path::PathBuf::from("/etc/nginx/ssl"), std::path::PathBuf::from("/etc/ssl/certs")];
        let certificates = certs::list_certificates(&dirs)
            .into_iter()
            .map(|c| proto::Certificate {
                path: c.path,
                common_name: c.common_name,
                sans: c.sans,
                issuer: c.issuer,
                not_before: c.not_before,
                not_after: c.not_after,
                days_remaining: c.days_remaining,
                paired_key_path: c.paired_key_path,
            })
            .collect();
        Ok(Response::new(proto::ListCertificatesResponse { certificates }))
    }

    type GetLogsStream = LogStream;

    async fn get_logs(&self, request: Request<proto::GetLogsRequest>) -> Result<Response<Self::GetLogsStream>, Status> {
        let req = request.into_inner();
        let path = match req.log_type.as_str() {
            "error" => self.config.error_log_path.clone(),
            _ => self.config.access_log_path.clone(),
        };

        let (tx, rx) = mpsc::channel(256);
        let tail_lines = req.tail_lines as usize;
        let log_type = req.log_type.clone();
        let agent_id = self.agent_id.clone();
        let hostname = self.hostname.clone();
        let format = self.config.log_format;
        let follow = req.follow;

        tokio::spawn(async move {
            if tail_lines > 0 {
                for entry in tail_file(&path, tail_lines, &log_type, &agent_id, &hostname, format) {
                    if tx.send(Ok(entry)).await.is_err() {
                        return;
                    }
                }
            }
            if follow {
                let log_type_static: &'static str = Box::leak(log_type.into_boxed_str());
                let (inner_tx, mut inner_rx) = mpsc::channel(256);
                let tailer = crate::collectors::log_tail::LogTailer::new(
                    path.into(),
                    log_type_static,
                    agent_id,
                    hostname,
                    format,
                );
                let cancel = tokio_util::sync::CancellationToken::new();
                tokio::spawn(tailer.run(inner_tx, cancel.clone()));
                while let Some(entry) = inner_rx.recv().await {
                    let proto_entry: proto::LogEntry = (&entry).into();
                    if tx.send(Ok(proto_entry)).await.is_err() {
                        break;
                    }
                }
                cancel.cancel();
            }
        });

        let stream: LogStream = Box::pin(ReceiverStream::new(rx));
        Ok(Response::new(stream))
    }

    type ExecuteStream = ExecStream;

    async fn execute(
        &self,
        request: Request<tonic::Streaming<proto::ExecFrame>>,
    ) -> Result<Response<Self::ExecuteStream>, Status> {
        let session = exec::ShellSession::spawn()
            .map_err(|err| ErrorCode::Internal.to_grpc_status(format!("failed to spawn shell: {err}")))?;
        let session = Arc::new(session);

        let (tx, rx) = mpsc::channel(256);
        let mut inbound = request.into_inner();

        let writer_session = session.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound.next().await {
                match frame {
                    Ok(frame) if frame.eof => break,
                    Ok(frame) => {
                        if writer_session.write_all(&frame.data).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            writer_session.stop().await;
        });

        let reader_session = session;
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match reader_session.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        let _ = tx.send(Ok(proto::ExecFrame { data: Vec::new(), eof: true })).await;
                        break;
                    }
                    Ok(n) => {
                        if tx.send(Ok(proto::ExecFrame { data: buf[..n].to_vec(), eof: false })).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let stream: ExecStream = Box::pin(ReceiverStream::new(rx));
        Ok(Response::new(stream))
    }

    async fn apply_augment(
        &self,
        request: Request<proto::ApplyAugmentRequest>,
    ) -> Result<Response<proto::ApplyAugmentResponse>, Status> {
        let req = request.into_inner();
        let path = resolve_path(&self.config, &req.context);
        match augment::apply_augment(&path, &req.augment_name) {
            Ok(preview) => Ok(Response::new(proto::ApplyAugmentResponse { ok: true, preview, error: String::new() })),
            Err(err) => Ok(Response::new(proto::ApplyAugmentResponse { ok: false, preview: String::new(), error: err.to_string() })),
        }
    }
}

fn resolve_path(config: &ResolvedConfig, requested: &str) -> std::path::PathBuf {
    if requested.is_empty() {
        std::path::PathBuf::from(&config.nginx_config_path)
    } else {
        std::path::PathBuf::from(requested)
    }
}

fn ok_response(result: Result<(), nginx_ctl::NginxCtlError>) -> proto::OkResponse {
    match result {
        Ok(()) => proto::OkResponse { ok: true, error: String::new() },
        Err(err) => proto::OkResponse { ok: false, error: err.to_string() },
    }
}

fn tail_file(
    path: &str,
    n: usize,
    log_type: &str,
    agent_id: &str,
    hostname: &str,
    format: LogFormat,
) -> Vec<proto::LogEntry> {
    let Ok(contents) = std::fs::read_to_string(path) else { return Vec::new() };
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..]
        .iter()
        .filter_map(|line| match format {
            LogFormat::Combined => crate::collectors::log_tail::parse_combined(line, log_type, agent_id, hostname),
            LogFormat::Json => crate::collectors::log_tail::parse_json(line, log_type, agent_id, hostname),
        })
        .map(|entry| (&entry).into())
        .collect()
}
