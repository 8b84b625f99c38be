// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-updater (C5): polls a manifest URL, verifies checksums, and
//! atomically swaps the running binary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

/// Exit code the process uses to signal "I replaced myself, please restart
/// me" to a container supervisor, per SPEC_FULL.md Section 6.
pub const RESTART_REQUESTED_EXIT_CODE: i32 = 100;

#[derive(Debug, Deserialize)]
struct UpdateManifest {
    current_version: String,
    binaries: HashMap<String, ManifestBinary>,
}

#[derive(Debug, Deserialize)]
struct ManifestBinary {
    url: String,
    sha256: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("fetch manifest: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("no binary advertised for architecture {0}")]
    NoBinaryForArch(String),
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Updater {
    manifest_url: Option<String>,
    current_version: String,
    current_exe: PathBuf,
    client: reqwest::Client,
    in_container: bool,
}

impl Updater {
    pub fn new(manifest_url: Option<String>, current_version: String, current_exe: PathBuf, in_container: bool) -> Self {
        Self { manifest_url, current_version, current_exe, client: reqwest::Client::new(), in_container }
    }

    /// Run the polling loop at `interval`, until cancelled.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.check_and_apply(None).await {
                        tracing::warn!(error = %err, "scheduled update check failed");
                    }
                }
            }
        }
    }

    /// One-shot entry point: fetches the manifest (from `override_url` or
    /// the configured `UPDATE_SERVER`), and if a newer version is
    /// advertised, downloads, verifies, and swaps the binary.
    pub async fn check_and_apply(&self, override_url: Option<&str>) -> Result<(), UpdateError> {
        let Some(base) = override_url.or(self.manifest_url.as_deref()) else {
            tracing::debug!("no update server configured; skipping check");
            return Ok(());
        };
        let manifest_url = format!("{}/version.json", base.trim_end_matches('/'));
        let manifest: UpdateManifest = self.client.get(&manifest_url).send().await?.json().await?;

        if manifest.current_version == self.current_version {
            return Ok(());
        }

        let arch = std::env::consts::ARCH;
        let binary = manifest.binaries.get(arch).ok_or_else(|| UpdateError::NoBinaryForArch(arch.to_owned()))?;

        let bytes = self.client.get(&binary.url).send().await?.bytes().await?;
        let computed = hex_sha256(&bytes);
        if computed != binary.sha256.to_lowercase() {
            return Err(UpdateError::ChecksumMismatch { expected: binary.sha256.clone(), computed });
        }

        let tmp_path = self.current_exe.with_extension("update-tmp");
        std::fs::write(&tmp_path, &bytes)?;
        set_executable(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.current_exe)?;

        tracing::info!(version = manifest.current_version, "applied self-update, requesting restart");
        self.signal_restart();
        Ok(())
    }

    fn signal_restart(&self) {
        if self.in_container {
            std::process::exit(RESTART_REQUESTED_EXIT_CODE);
        } else {
            let _ = std::process::Command::new("systemctl").args(["restart", "fleet-agent"]).status();
        }
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_sha256_matches_known_vector() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        let digest = hex_sha256(b"");
        assert_eq!(digest, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[tokio::test]
    async fn no_manifest_url_is_a_no_op() {
        let updater = Updater::new(None, "1.0.0".into(), PathBuf::from("/tmp/fake"), false);
        assert!(updater.check_and_apply(None).await.is_ok());
    }
}
