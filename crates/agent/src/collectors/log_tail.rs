// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log tailer: watches an access or error log file, detects rotation by
//! comparing inode and size between polls, and parses each new line into
//! a [`wire::LogEntry`] envelope.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::LogFormat;

/// Identity of an open log file used to detect rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FileIdentity {
    inode: u64,
    size: u64,
}

pub struct LogTailer {
    path: PathBuf,
    log_type: &'static str,
    agent_id: String,
    hostname: String,
    format: LogFormat,
    reader: Option<BufReader<std::fs::File>>,
    identity: FileIdentity,
    dropped: u64,
}

impl LogTailer {
    pub fn new(path: PathBuf, log_type: &'static str, agent_id: String, hostname: String, format: LogFormat) -> Self {
        Self { path, log_type, agent_id, hostname, format, reader: None, identity: FileIdentity::default(), dropped: 0 }
    }

    /// Run until `cancel` fires, pushing parsed entries to `tx`. On a full
    /// channel the oldest-pending send is simply skipped (the collector
    /// never blocks on a slow consumer) and a counter is incremented.
    pub async fn run(mut self, tx: mpsc::Sender<wire::LogEntry>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.poll_once(&tx);
                }
            }
        }
    }

    fn poll_once(&mut self, tx: &mpsc::Sender<wire::LogEntry>) {
        if let Err(err) = self.ensure_open() {
            tracing::debug!(path = %self.path.display(), error = %err, "log tailer could not open file");
            return;
        }

        let lines = match self.drain_new_lines() {
            Ok(lines) => lines,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "log tailer read error");
                return;
            }
        };

        for line in lines {
            let Some(entry) = self.parse_line(&line) else { continue };
            match tx.try_send(entry) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped += 1;
                    if self.dropped % 100 == 1 {
                        tracing::warn!(log_type = self.log_type, dropped = self.dropped, "log tailer backpressure: dropping entries");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    /// (Re)opens the file if it has never been opened, or if rotation is
    /// detected (inode changed, or size regressed below the last known
    /// position — a truncation).
    fn ensure_open(&mut self) -> std::io::Result<()> {
        let metadata = std::fs::metadata(&self.path)?;
        let current = FileIdentity { inode: metadata.ino(), size: metadata.len() };

        let rotated = self.reader.is_none()
            || current.inode != self.identity.inode
            || current.size < self.identity.size;

        if rotated {
            let file = std::fs::File::open(&self.path)?;
            self.reader = Some(BufReader::new(file));
            self.identity = FileIdentity { inode: current.inode, size: 0 };
        }
        Ok(())
    }

    fn drain_new_lines(&mut self) -> std::io::Result<Vec<String>> {
        let Some(reader) = self.reader.as_mut() else { return Ok(Vec::new()) };
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
                lines.push(line);
            } else {
                // Partial line at the current EOF: rewind so the next poll
                // re-reads it once the writer finishes the line.
                let pos = reader.stream_position()?;
                reader.seek(SeekFrom::Start(pos - read as u64))?;
                break;
            }
        }
        self.identity.size += lines.iter().map(|l| l.len() as u64 + 1).sum::<u64>();
        Ok(lines)
    }

    fn parse_line(&self, line: &str) -> Option<wire::LogEntry> {
        match self.format {
            LogFormat::Combined => parse_combined(line, self.log_type, &self.agent_id, &self.hostname),
            LogFormat::Json => parse_json(line, self.log_type, &self.agent_id, &self.hostname),
        }
    }
}

/// Parses the subset of Combined Log Format fields the spec requires:
/// `remote_addr - - [ts] "METHOD uri HTTP/x" status bytes "referrer" "ua"`.
pub(crate) fn parse_combined(line: &str, log_type: &str, agent_id: &str, hostname: &str) -> Option<wire::LogEntry> {
    let remote_addr = line.split(' ').next()?.to_owned();
    let request_start = line.find("\"")?;
    let request_end = line[request_start + 1..].find('"')? + request_start + 1;
    let request = &line[request_start + 1..request_end];
    let mut request_parts = request.splitn(3, ' ');
    let method = request_parts.next().unwrap_or("").to_owned();
    let uri = request_parts.next().unwrap_or("").to_owned();

    let after_request = &line[request_end + 1..];
    let mut fields = after_request.split_whitespace();
    let status = fields.next()?.parse().ok()?;
    let bytes_sent = fields.next().unwrap_or("0").parse().unwrap_or(0);

    let quoted: Vec<&str> = after_request.split('"').collect();
    let referrer = quoted.get(1).unwrap_or(&"").to_string();
    let user_agent = quoted.get(3).unwrap_or(&"").to_string();

    Some(wire::LogEntry {
        agent_id: agent_id.to_owned(),
        hostname: hostname.to_owned(),
        log_type: log_type.to_owned(),
        remote_addr,
        method,
        uri,
        status,
        bytes_sent,
        request_time_ms: 0.0,
        user_agent,
        referrer,
        timestamp: now_epoch_s(),
    })
}

pub(crate) fn parse_json(line: &str, log_type: &str, agent_id: &str, hostname: &str) -> Option<wire::LogEntry> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let get_str = |key: &str| value.get(key).and_then(|v| v.as_str()).unwrap_or("").to_owned();
    let get_u64 = |key: &str| value.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    Some(wire::LogEntry {
        agent_id: agent_id.to_owned(),
        hostname: hostname.to_owned(),
        log_type: log_type.to_owned(),
        remote_addr: get_str("remote_addr"),
        method: get_str("method"),
        uri: get_str("uri"),
        status: get_u64("status") as u32,
        bytes_sent: get_u64("bytes_sent"),
        request_time_ms: value.get("request_time_ms").and_then(|v| v.as_f64()).unwrap_or(0.0),
        user_agent: get_str("user_agent"),
        referrer: get_str("referrer"),
        timestamp: now_epoch_s(),
    })
}

fn now_epoch_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_log_line() {
        let line = r#"127.0.0.1 - - [01/Jan/2026:00:00:00 +0000] "GET /index.html HTTP/1.1" 200 512 "https://ref.example" "curl/8.0""#;
        let entry = parse_combined(line, "access", "agent-1", "host-1").expect("parsed");
        assert_eq!(entry.remote_addr, "127.0.0.1");
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.uri, "/index.html");
        assert_eq!(entry.status, 200);
        assert_eq!(entry.bytes_sent, 512);
        assert_eq!(entry.referrer, "https://ref.example");
        assert_eq!(entry.user_agent, "curl/8.0");
    }

    #[test]
    fn parses_json_log_line() {
        let line = r#"{"remote_addr":"10.0.0.1","method":"POST","uri":"/api","status":201,"bytes_sent":64,"request_time_ms":12.5}"#;
        let entry = parse_json(line, "access", "agent-1", "host-1").expect("parsed");
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.status, 201);
        assert_eq!(entry.request_time_ms, 12.5);
    }

    #[test]
    fn malformed_combined_line_is_dropped() {
        assert!(parse_combined("not a log line", "access", "a", "h").is_none());
    }

    #[test]
    fn rotation_resets_identity_to_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.log");
        std::fs::write(&path, "line-one\n").expect("write");
        let mut tailer = LogTailer::new(path.clone(), "access", "a".into(), "h".into(), LogFormat::Combined);
        tailer.ensure_open().expect("open");
        let first_inode = tailer.identity.inode;
        assert_eq!(tailer.identity.size, 0);

        // Simulate rotation: remove and recreate (new inode).
        std::fs::remove_file(&path).expect("remove");
        std::fs::write(&path, "line-two\n").expect("recreate");
        tailer.ensure_open().expect("reopen");
        assert_ne!(tailer.identity.inode, first_inode);
        assert_eq!(tailer.identity.size, 0);
    }
}
