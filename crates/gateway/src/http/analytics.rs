// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::state::AppState;
use crate::query::{self, AnalyticsResponse};

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default = "default_window")]
    pub window: i64,
    pub agent_id: Option<String>,
}

fn default_window() -> i64 {
    3600
}

pub async fn analytics(State(state): State<Arc<AppState>>, Query(params): Query<AnalyticsQuery>) -> Json<AnalyticsResponse> {
    Json(query::analytics(&state.columnar, params.window, params.agent_id.as_deref()).await)
}
