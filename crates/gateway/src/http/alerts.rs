// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::state::{AppState, AuthContext};
use crate::alerting::{self, AlertRule, NewAlertRule};
use crate::error::{ApiError, GatewayError};

pub async fn list_alerts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AlertRule>>, ApiError> {
    Ok(Json(alerting::list_rules(&state.pool).await?))
}

pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(rule): Json<NewAlertRule>,
) -> Result<Json<AlertRule>, ApiError> {
    let created = alerting::create_rule(&state.pool, rule).await?;
    crate::tenancy::record_audit(
        &state.pool,
        &auth.username,
        "create_alert_rule",
        "alert_rule",
        &created.id.to_string(),
        serde_json::json!({ "name": created.name }),
        "",
        "",
    )
    .await;
    Ok(Json(created))
}

pub async fn delete_alert(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = alerting::delete_rule(&state.pool, id).await?;
    if !deleted {
        return Err(GatewayError::NotFound.with_message("alert rule not found"));
    }
    crate::tenancy::record_audit(&state.pool, &auth.username, "delete_alert_rule", "alert_rule", &id.to_string(), serde_json::json!({}), "", "").await;
    Ok(StatusCode::NO_CONTENT)
}
