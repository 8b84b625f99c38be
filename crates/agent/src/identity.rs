// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent agent identity: a stable ID assigned at first boot from the
//! hostname, persisted to `./.agent_id`, and never mutated thereafter
//! without operator intervention (deleting the file).

use std::path::{Path, PathBuf};

/// Load the persisted agent ID, creating it from `override_id` or the
/// hostname if this is the first boot.
pub fn load_or_create(state_dir: &Path, override_id: Option<&str>) -> std::io::Result<String> {
    let path = agent_id_path(state_dir);
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_owned());
        }
    }

    let id = override_id.map(str::to_owned).unwrap_or_else(default_hostname_id);
    std::fs::create_dir_all(state_dir)?;
    std::fs::write(&path, &id)?;
    Ok(id)
}

fn agent_id_path(state_dir: &Path) -> PathBuf {
    state_dir.join(".agent_id")
}

fn default_hostname_id() -> String {
    hostname()
}

pub fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown-host".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_boot_persists_override_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = load_or_create(dir.path(), Some("agent-explicit")).expect("load");
        assert_eq!(id, "agent-explicit");
        assert_eq!(std::fs::read_to_string(agent_id_path(dir.path())).expect("read"), "agent-explicit");
    }

    #[test]
    fn second_boot_reuses_persisted_id_even_with_different_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        load_or_create(dir.path(), Some("first-id")).expect("first boot");
        let id = load_or_create(dir.path(), Some("second-id")).expect("second boot");
        assert_eq!(id, "first-id", "agent id must not mutate without deleting the file");
    }
}
