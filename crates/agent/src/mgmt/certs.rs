// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certificate discovery for the Management service's `ListCertificates`
//! RPC: walks configured directories, parses PEM certificates, and pairs
//! each with a likely private key file.

use std::path::{Path, PathBuf};

use x509_parser::prelude::*;

#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub path: String,
    pub common_name: String,
    pub sans: Vec<String>,
    pub issuer: String,
    pub not_before: i64,
    pub not_after: i64,
    pub days_remaining: i64,
    pub paired_key_path: String,
}

const CERT_EXTENSIONS: [&str; 3] = ["crt", "pem", "cert"];
const KEY_EXTENSIONS: [&str; 2] = ["key", "pem"];

/// Scans `dirs` non-recursively for certificate files and extracts the
/// fields the control plane cares about for expiry monitoring.
pub fn list_certificates(dirs: &[PathBuf]) -> Vec<CertificateInfo> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let mut out = Vec::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if !has_extension(&path, &CERT_EXTENSIONS) {
                continue;
            }
            if let Some(info) = parse_certificate(&path, now) {
                out.push(info);
            }
        }
    }
    out
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| extensions.contains(&e)).unwrap_or(false)
}

fn parse_certificate(path: &Path, now: i64) -> Option<CertificateInfo> {
    let bytes = std::fs::read(path).ok()?;
    let (_, pem) = x509_parser::pem::parse_x509_pem(&bytes).ok()?;
    let cert = pem.parse_x509().ok()?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_owned();
    let issuer = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_owned();
    let sans = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| ext.value.general_names.iter().filter_map(general_name_to_string).collect())
        .unwrap_or_default();

    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();
    let days_remaining = (not_after - now) / 86_400;

    Some(CertificateInfo {
        path: path.display().to_string(),
        common_name,
        sans,
        issuer,
        not_before,
        not_after,
        days_remaining,
        paired_key_path: find_paired_key(path).unwrap_or_default(),
    })
}

fn general_name_to_string(name: &GeneralName) -> Option<String> {
    match name {
        GeneralName::DNSName(dns) => Some(dns.to_string()),
        GeneralName::IPAddress(ip) => Some(format!("{ip:?}")),
        _ => None,
    }
}

/// A certificate's key is usually the same stem with a `.key` extension, or
/// occasionally bundled as a sibling `.pem` with the same stem.
fn find_paired_key(cert_path: &Path) -> Option<String> {
    let stem = cert_path.file_stem()?;
    let dir = cert_path.parent()?;
    for ext in KEY_EXTENSIONS {
        let candidate = dir.join(stem).with_extension(ext);
        if candidate.exists() && candidate != cert_path {
            return Some(candidate.display().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_no_certificates() {
        let dirs = vec![PathBuf::from("/nonexistent/certs")];
        assert!(list_certificates(&dirs).is_empty());
    }

    #[test]
    fn non_certificate_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("readme.txt"), b"not a cert").expect("write");
        assert!(list_certificates(&[dir.path().to_path_buf()]).is_empty());
    }

    #[test]
    fn find_paired_key_matches_sibling_stem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cert = dir.path().join("example.com.crt");
        let key = dir.path().join("example.com.key");
        std::fs::write(&cert, b"").expect("write cert");
        std::fs::write(&key, b"").expect("write key");
        assert_eq!(find_paired_key(&cert), Some(key.display().to_string()));
    }
}
