// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API: analytics, alert rules, servers, projects, auth, and the
//! terminal WebSocket proxy.

pub mod alerts;
pub mod analytics;
pub mod auth;
pub mod projects;
pub mod servers;
pub mod state;
pub mod traces;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::health;
use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/analytics", get(analytics::analytics))
        .route("/api/traces/{id}", get(traces::get_trace))
        .route("/api/alerts", get(alerts::list_alerts).post(alerts::create_alert))
        .route("/api/alerts/{id}", delete(alerts::delete_alert))
        .route("/api/servers", get(servers::list_servers))
        .route("/api/projects", get(projects::list_projects))
        .route("/api/projects/{id}/environments", get(projects::list_environments))
        .route("/terminal", get(crate::terminal::terminal_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
