// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /api/traces/{id}` — fetch one trace's spans from the columnar store.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use super::state::AppState;
use crate::error::{ApiError, GatewayError};

pub async fn get_trace(State(state): State<Arc<AppState>>, Path(trace_id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    if !trace_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(GatewayError::BadRequest.with_message("trace id contains invalid characters"));
    }

    let response = state
        .columnar
        .query_json(&format!("SELECT * FROM spans WHERE trace_id = '{trace_id}' ORDER BY ts_ms"))
        .await
        .map_err(|err| GatewayError::Upstream.with_message(err.to_string()))?;

    let spans = response.get("data").and_then(|data| data.as_array()).cloned().unwrap_or_default();
    if spans.is_empty() {
        return Err(GatewayError::NotFound.with_message("trace not found"));
    }
    Ok(Json(serde_json::json!({ "trace_id": trace_id, "spans": spans })))
}
