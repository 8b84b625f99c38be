// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /api/servers` — the fleet as visible to the caller, combining the
//! relational `agents` table (last known state) with the live ingest
//! registry (whether a session is currently connected).

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use serde::Serialize;

use super::state::{AppState, AuthContext};
use crate::error::ApiError;
use crate::tenancy;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ServerRow {
    pub agent_id: String,
    pub hostname: String,
    pub agent_version: String,
    pub is_pod: bool,
    pub pod_ip: String,
    pub last_seen_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ServerSummary {
    #[serde(flatten)]
    pub row: ServerRow,
    pub connected: bool,
}

pub async fn list_servers(State(state): State<Arc<AppState>>, Extension(auth): Extension<AuthContext>) -> Result<Json<Vec<ServerSummary>>, ApiError> {
    let rows: Vec<ServerRow> =
        sqlx::query_as("SELECT agent_id, hostname, agent_version, is_pod, pod_ip, last_seen_at FROM agents ORDER BY hostname")
            .fetch_all(&state.pool)
            .await?;

    let visible = if auth.is_superadmin { None } else { Some(tenancy::visible_agent_ids(&state.pool, auth.user_id).await?) };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(visible) = &visible {
            if !visible.contains(&row.agent_id) {
                continue;
            }
        }
        let connected = state.sessions.get(&row.agent_id).await.is_some();
        out.push(ServerSummary { row, connected });
    }
    Ok(Json(out))
}
