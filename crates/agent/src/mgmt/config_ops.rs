// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config read/validate/write operations backing the Management service's
//! `GetConfig`/`ValidateConfig`/`UpdateConfig` RPCs.

use std::path::{Path, PathBuf};

use super::nginx_ctl::NginxControl;

#[derive(Debug, thiserror::Error)]
pub enum ConfigOpsError {
    #[error("read {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("write {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },
}

pub fn get_config(path: &Path) -> Result<String, ConfigOpsError> {
    std::fs::read_to_string(path).map_err(|source| ConfigOpsError::Read { path: path.display().to_string(), source })
}

/// Runs `nginx -t` against a candidate config written to a scratch file, so
/// validation never touches the live config path.
pub fn validate_config(content: &str) -> (bool, Vec<String>, Vec<String>) {
    let scratch = match tempfile::NamedTempFile::new() {
        Ok(f) => f,
        Err(err) => return (false, vec![format!("could not create scratch file: {err}")], Vec::new()),
    };
    if let Err(err) = std::fs::write(scratch.path(), content) {
        return (false, vec![format!("could not write scratch file: {err}")], Vec::new());
    }

    let output = std::process::Command::new("nginx").args(["-t", "-c"]).arg(scratch.path()).output();
    match output {
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let (errors, warnings): (Vec<String>, Vec<String>) =
                stderr.lines().map(str::to_owned).partition(|line| !line.contains("[warn]"));
            (out.status.success(), errors, warnings)
        }
        Err(err) => (false, vec![format!("failed to invoke nginx: {err}")], Vec::new()),
    }
}

/// Writes `new_content` to `path` atomically, optionally keeping a
/// timestamped backup of the previous contents, then reloads nginx. On
/// reload failure the write is left in place and the caller is told where
/// the backup lives so it can roll back.
pub fn update_config(
    path: &Path,
    new_content: &str,
    backup: bool,
    nginx: &dyn NginxControl,
) -> Result<Option<PathBuf>, ConfigOpsError> {
    let backup_path = if backup && path.exists() {
        let existing = get_config(path)?;
        let backup_path = backup_path_for(path);
        std::fs::write(&backup_path, existing)
            .map_err(|source| ConfigOpsError::Write { path: backup_path.display().to_string(), source })?;
        Some(backup_path)
    } else {
        None
    };

    let tmp_path = path.with_extension("update-tmp");
    std::fs::write(&tmp_path, new_content)
        .map_err(|source| ConfigOpsError::Write { path: tmp_path.display().to_string(), source })?;
    std::fs::rename(&tmp_path, path)
        .map_err(|source| ConfigOpsError::Write { path: path.display().to_string(), source })?;

    if let Err(err) = nginx.reload() {
        tracing::warn!(error = %err, backup = ?backup_path, "reload after config update failed");
    }

    Ok(backup_path)
}

fn backup_path_for(path: &Path) -> PathBuf {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("nginx.conf");
    path.with_file_name(format!("{file_name}.{stamp}.bak"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_config_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nginx.conf");
        std::fs::write(&path, "events {}\n").expect("write");
        assert_eq!(get_config(&path).expect("read"), "events {}\n");
    }

    #[test]
    fn get_config_missing_file_errors() {
        let path = PathBuf::from("/nonexistent/nginx.conf");
        assert!(get_config(&path).is_err());
    }

    #[test]
    fn backup_path_carries_original_name() {
        let path = PathBuf::from("/etc/nginx/nginx.conf");
        let backup = backup_path_for(&path);
        assert!(backup.to_string_lossy().contains("nginx.conf."));
        assert!(backup.to_string_lossy().ends_with(".bak"));
    }
}
