// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live fanout (G3): a subscriber registry indexed by `(agent_id?,
//! payload_kind)`. Each subscriber owns a bounded queue; ingest never blocks
//! on a slow subscriber, it drops the envelope and counts the drop instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Heartbeat,
    Metrics,
    LogEntry,
}

impl PayloadKind {
    fn of(payload: &wire::Payload) -> Self {
        match payload {
            wire::Payload::Heartbeat(_) => Self::Heartbeat,
            wire::Payload::Metrics(_) => Self::Metrics,
            wire::Payload::LogEntry(_) => Self::LogEntry,
        }
    }
}

/// What a subscriber wants to receive.
#[derive(Debug, Clone)]
pub struct Filter {
    pub agent_id: Option<String>,
    pub kinds: Vec<PayloadKind>,
}

impl Filter {
    fn matches(&self, envelope: &wire::AgentMessage) -> bool {
        let agent_matches = self.agent_id.as_deref().is_none_or(|id| id == envelope.agent_id);
        let kind_matches = self.kinds.is_empty() || self.kinds.contains(&PayloadKind::of(&envelope.payload));
        agent_matches && kind_matches
    }
}

struct Subscriber {
    filter: Filter,
    tx: mpsc::Sender<wire::AgentMessage>,
}

/// Shared subscriber registry. Cheap to clone; internal state is an `Arc`.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    queue_depth: usize,
    dropped: AtomicU64,
}

impl Registry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_depth,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber and return its handle id plus the receiving
    /// end of its bounded queue. Drop the receiver (or call [`Self::unsubscribe`])
    /// to stop receiving.
    pub async fn subscribe(&self, filter: Filter) -> (u64, mpsc::Receiver<wire::AgentMessage>) {
        let (tx, rx) = mpsc::channel(self.inner.queue_depth);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().await.insert(id, Subscriber { filter, tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.write().await.remove(&id);
    }

    /// Fan an envelope out to every matching subscriber. Never blocks: a
    /// subscriber whose queue is full has the envelope dropped for it, and
    /// the registry's drop counter is incremented.
    pub async fn publish(&self, envelope: &wire::AgentMessage) {
        let subscribers = self.inner.subscribers.read().await;
        for subscriber in subscribers.values() {
            if !subscriber.filter.matches(envelope) {
                continue;
            }
            if subscriber.tx.try_send(envelope.clone()).is_err() {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(agent_id: &str) -> wire::AgentMessage {
        wire::AgentMessage {
            agent_id: agent_id.to_owned(),
            timestamp: 0,
            payload: wire::Payload::Heartbeat(wire::Heartbeat {
                hostname: "h".into(),
                nginx_version: "1".into(),
                agent_version: "1".into(),
                uptime_s: 0,
                instances: vec![],
                is_pod: false,
                pod_ip: String::new(),
                build_commit: String::new(),
            }),
        }
    }

    #[tokio::test]
    async fn subscriber_only_receives_matching_agent() {
        let registry = Registry::new(4);
        let (_id, mut rx) = registry.subscribe(Filter { agent_id: Some("a1".into()), kinds: vec![] }).await;
        registry.publish(&heartbeat("a2")).await;
        registry.publish(&heartbeat("a1")).await;
        let received = rx.recv().await.expect("one message");
        assert_eq!(received.agent_id, "a1");
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts_without_blocking() {
        let registry = Registry::new(1);
        let (_id, _rx) = registry.subscribe(Filter { agent_id: None, kinds: vec![] }).await;
        registry.publish(&heartbeat("a1")).await;
        registry.publish(&heartbeat("a1")).await;
        assert_eq!(registry.dropped_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let registry = Registry::new(4);
        let (id, mut rx) = registry.subscribe(Filter { agent_id: None, kinds: vec![] }).await;
        registry.unsubscribe(id).await;
        registry.publish(&heartbeat("a1")).await;
        assert!(rx.recv().await.is_none() || rx.try_recv().is_err());
    }
}
