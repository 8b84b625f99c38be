// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness/readiness HTTP endpoints, served on the same port as the
//! public API but exempt from auth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::http::state::AppState;

/// Shared readiness flag, flipped once startup finishes.
#[derive(Clone, Default)]
pub struct ReadinessState(Arc<AtomicBool>);

impl ReadinessState {
    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub async fn liveness() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}

pub async fn readiness(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> axum::http::StatusCode {
    if state.readiness.is_ready() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_state_reflects_flag() {
        let state = ReadinessState::default();
        assert!(!state.is_ready());
        state.set_ready(true);
        assert!(state.is_ready());
    }
}
