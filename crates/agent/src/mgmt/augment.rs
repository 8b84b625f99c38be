// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named NGINX configuration snippets ("augments") merged into a target
//! context and returned for review without touching the live config,
//! backing the Management service's `ApplyAugment` RPC.

use std::path::{Path, PathBuf};

use super::config_ops;

#[derive(Debug, thiserror::Error)]
pub enum AugmentError {
    #[error("unknown augment {0}")]
    Unknown(String),
    #[error("context marker {marker:?} not found in {path}")]
    MarkerNotFound { marker: &'static str, path: String },
}

/// Built-in snippet library. Each augment is inserted at the
/// `# fleet-agent:inject` marker inside `http {}`.
const MARKER: &str = "# fleet-agent:inject";

fn snippet_for(augment_name: &str) -> Option<&'static str> {
    match augment_name {
        "gzip" => Some("    gzip on;\n    gzip_types text/plain application/json;\n"),
        "rate_limit" => {
            Some("    limit_req_zone $binary_remote_addr zone=fleet:10m rate=10r/s;\n    limit_req zone=fleet burst=20 nodelay;\n")
        }
        "websocket_upgrade" => Some(
            "    map $http_upgrade $connection_upgrade {\n        default upgrade;\n        '' close;\n    }\n",
        ),
        _ => None,
    }
}

/// Loads `config_path`, inserts the named snippet's content just after the
/// injection marker, and returns the synthesized config without writing it
/// anywhere. The caller is expected to route the preview through
/// `UpdateConfig` if the operator accepts it.
pub fn apply_augment(config_path: &Path, augment_name: &str) -> Result<String, AugmentError> {
    let snippet = snippet_for(augment_name).ok_or_else(|| AugmentError::Unknown(augment_name.to_owned()))?;
    let current = config_ops::get_config(config_path).unwrap_or_default();

    let Some(pos) = current.find(MARKER) else {
        return Err(AugmentError::MarkerNotFound { marker: MARKER, path: config_path.display().to_string() });
    };
    let insert_at = pos + MARKER.len();
    let mut synthesized = String::with_capacity(current.len() + snippet.len());
    synthesized.push_str(&current[..insert_at]);
    synthesized.push('\n');
    synthesized.push_str(snippet);
    synthesized.push_str(&current[insert_at..]);
    Ok(synthesized)
}

pub fn known_augments() -> Vec<&'static str> {
    vec!["gzip", "rate_limit", "websocket_upgrade"]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("nginx.conf");
        std::fs::write(&path, body).expect("write");
        path
    }

    #[test]
    fn unknown_augment_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(&dir, "http {\n  # fleet-agent:inject\n}\n");
        assert!(matches!(apply_augment(&path, "does-not-exist"), Err(AugmentError::Unknown(_))));
    }

    #[test]
    fn missing_marker_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(&dir, "http {\n}\n");
        assert!(matches!(apply_augment(&path, "gzip"), Err(AugmentError::MarkerNotFound { .. })));
    }

    #[test]
    fn gzip_augment_inserts_after_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(&dir, "http {\n  # fleet-agent:inject\n}\n");
        let preview = apply_augment(&path, "gzip").expect("apply");
        assert!(preview.contains("gzip on;"));
        assert!(preview.contains("# fleet-agent:inject"));
    }
}
