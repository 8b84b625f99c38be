// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide shutdown coordination: a root cancellation token plus a
//! bounded drain ceiling so a stuck task can never wedge the exit.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on how long shutdown waits for spawned tasks to finish
/// draining once cancellation has been signalled.
pub const GRACEFUL_DRAIN: Duration = Duration::from_secs(30);

pub struct Lifecycle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { cancel: CancellationToken::new(), tasks: Vec::new() }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.push(handle);
    }

    pub fn track_many(&mut self, handles: impl IntoIterator<Item = JoinHandle<()>>) {
        self.tasks.extend(handles);
    }

    /// Waits for an OS shutdown signal, cancels every tracked task, and
    /// waits up to [`GRACEFUL_DRAIN`] for them to finish before returning.
    pub async fn run_until_shutdown(mut self) {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, draining");
        self.cancel.cancel();

        let drain = async {
            for task in self.tasks.drain(..) {
                let _ = task.await;
            }
        };

        if tokio::time::timeout(GRACEFUL_DRAIN, drain).await.is_err() {
            tracing::warn!("graceful drain timed out, exiting anyway");
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(err), _) | (_, Err(err)) => {
            tracing::warn!(error = %err, "failed to install signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_the_token_unblocks_tracked_tasks() {
        let mut lifecycle = Lifecycle::new();
        let token = lifecycle.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        lifecycle.track(handle);

        lifecycle.cancel.cancel();
        let drain = async {
            for task in lifecycle.tasks.drain(..) {
                let _ = task.await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(1), drain).await.is_ok());
    }
}
