// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state handed to every HTTP handler.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::health::ReadinessState;
use crate::ingest::registry::SessionRegistry;
use crate::live;
use crate::writers::columnar::ColumnarClient;

/// An authenticated caller, attached to the request by the auth middleware.
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
    pub is_superadmin: bool,
}

/// Bearer tokens issued by `/api/auth/login`, held in memory. A gateway
/// restart invalidates every session, same as the bearer-token check the
/// HTTP API falls back to when no login has happened.
#[derive(Default)]
pub struct AuthStore {
    sessions: RwLock<HashMap<String, AuthContext>>,
}

impl AuthStore {
    pub async fn issue(&self, context: AuthContext) -> String {
        let token = crate::tenancy::tokens::opaque_token();
        self.sessions.write().await.insert(token.clone(), context);
        token
    }

    pub async fn lookup(&self, token: &str) -> Option<AuthContext> {
        self.sessions.read().await.get(token).cloned()
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }
}

pub struct AppState {
    pub pool: PgPool,
    pub columnar: ColumnarClient,
    pub sessions: SessionRegistry,
    pub live: live::Registry,
    pub config: Arc<GatewayConfig>,
    pub auth: AuthStore,
    pub readiness: ReadinessState,
}
