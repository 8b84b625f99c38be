// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/api/projects` and `/api/projects/{id}/environments`, scoped to the
//! caller's team memberships.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::state::{AppState, AuthContext};
use crate::error::ApiError;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EnvironmentRow {
    pub id: Uuid,
    pub name: String,
    pub is_production: bool,
    pub sort_order: i32,
}

pub async fn list_projects(State(state): State<Arc<AppState>>, Extension(auth): Extension<AuthContext>) -> Result<Json<Vec<ProjectRow>>, ApiError> {
    let rows = if auth.is_superadmin {
        sqlx::query_as("SELECT id, name FROM projects ORDER BY name").fetch_all(&state.pool).await?
    } else {
        sqlx::query_as(
            "SELECT DISTINCT p.id, p.name FROM projects p
             JOIN team_project_access tpa ON tpa.project_id = p.id
             JOIN team_members tm ON tm.team_id = tpa.team_id
             WHERE tm.user_id = $1
             ORDER BY p.name",
        )
        .bind(auth.user_id)
        .fetch_all(&state.pool)
        .await?
    };
    Ok(Json(rows))
}

pub async fn list_environments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<EnvironmentRow>>, ApiError> {
    if !auth.is_superadmin && !crate::tenancy::has_project_access(&state.pool, auth.user_id, project_id, crate::tenancy::Permission::Read).await? {
        return Err(crate::error::GatewayError::NotFound.with_message("project not found"));
    }

    let rows = sqlx::query_as(
        "SELECT id, name, is_production, sort_order FROM environments WHERE project_id = $1 ORDER BY sort_order",
    )
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}
