// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent session bookkeeping and the duplicate-`agent_id` displacement
//! policy: the newest session always wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub struct Session {
    pub agent_id: String,
    pub remote_addr: String,
    pub connected_at: i64,
    last_seen_at: AtomicI64,
    pub hostname: RwLock<String>,
    pub agent_version: RwLock<String>,
    pub is_pod: std::sync::atomic::AtomicBool,
    pub pod_ip: RwLock<String>,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(agent_id: String, remote_addr: String) -> Self {
        let now = now_unix();
        Self {
            agent_id,
            remote_addr,
            connected_at: now,
            last_seen_at: AtomicI64::new(now),
            hostname: RwLock::new(String::new()),
            agent_version: RwLock::new(String::new()),
            is_pod: std::sync::atomic::AtomicBool::new(false),
            pod_ip: RwLock::new(String::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn touch(&self) {
        self.last_seen_at.store(now_unix(), Ordering::Relaxed);
    }

    pub fn last_seen_at(&self) -> i64 {
        self.last_seen_at.load(Ordering::Relaxed)
    }

    pub fn record_heartbeat(&self, heartbeat: &wire::Heartbeat) {
        if let Ok(mut hostname) = self.hostname.try_write() {
            *hostname = heartbeat.hostname.clone();
        }
        if let Ok(mut version) = self.agent_version.try_write() {
            *version = heartbeat.agent_version.clone();
        }
        self.is_pod.store(heartbeat.is_pod, Ordering::Relaxed);
        if let Ok(mut pod_ip) = self.pod_ip.try_write() {
            *pod_ip = heartbeat.pod_ip.clone();
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Registry of live agent sessions, keyed by `agent_id`.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Register `session`. If a session already exists for the same
    /// `agent_id`, the prior one is displaced: its stream is cancelled
    /// (best-effort) and the registry entry is replaced. This favors
    /// availability — a reconnecting agent is never locked out by its own
    /// orphaned session — over strict single-writer enforcement.
    pub async fn register(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        if let Some(prior) = sessions.insert(session.agent_id.clone(), Arc::clone(&session)) {
            prior.cancel.cancel();
            tracing::info!(agent_id = %session.agent_id, "displaced prior session for reconnecting agent");
        }
    }

    /// Remove `session` from the registry, but only if it is still the
    /// currently registered session for its `agent_id` (a session that was
    /// already displaced must not clobber its successor's entry).
    pub async fn remove_if_current(&self, session: &Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        if let Some(current) = sessions.get(&session.agent_id) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(&session.agent_id);
            }
        }
    }

    pub async fn get(&self, agent_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(agent_id).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registering_duplicate_agent_id_cancels_the_prior_session() {
        let registry = SessionRegistry::new();
        let first = Arc::new(Session::new("a1".into(), "10.0.0.1:1".into()));
        let second = Arc::new(Session::new("a1".into(), "10.0.0.2:1".into()));

        registry.register(Arc::clone(&first)).await;
        registry.register(Arc::clone(&second)).await;

        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());
        assert_eq!(registry.get("a1").await.unwrap().remote_addr, "10.0.0.2:1");
    }

    #[tokio::test]
    async fn a_displaced_session_removal_does_not_clobber_its_successor() {
        let registry = SessionRegistry::new();
        let first = Arc::new(Session::new("a1".into(), "10.0.0.1:1".into()));
        let second = Arc::new(Session::new("a1".into(), "10.0.0.2:1".into()));

        registry.register(Arc::clone(&first)).await;
        registry.register(Arc::clone(&second)).await;
        registry.remove_if_current(&first).await;

        assert!(registry.get("a1").await.is_some(), "successor session must survive the stale removal");
    }
}
