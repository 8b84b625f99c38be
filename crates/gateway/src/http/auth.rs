// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/api/auth/login|logout|me` and the bearer-auth middleware guarding every
//! other route.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{AppState, AuthContext};
use crate::error::{ApiError, GatewayError};
use crate::tenancy::tokens::verify_password;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub is_superadmin: bool,
}

pub async fn login(State(state): State<Arc<AppState>>, Json(request): Json<LoginRequest>) -> Result<Json<LoginResponse>, ApiError> {
    let row: Option<(Uuid, String, bool)> =
        sqlx::query_as("SELECT id, password_hash, is_superadmin FROM users WHERE username = $1")
            .bind(&request.username)
            .fetch_optional(&state.pool)
            .await?;

    let (user_id, password_hash, is_superadmin) = row.ok_or_else(|| GatewayError::Unauthorized.with_message("invalid username or password"))?;
    if !verify_password(&request.password, &password_hash) {
        return Err(GatewayError::Unauthorized.with_message("invalid username or password"));
    }

    let token = state
        .auth
        .issue(AuthContext { user_id, username: request.username.clone(), is_superadmin })
        .await;

    crate::tenancy::record_audit(&state.pool, &request.username, "login", "session", &user_id.to_string(), serde_json::json!({}), "", "").await;

    Ok(Json(LoginResponse { token, username: request.username, is_superadmin }))
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = bearer_token(&headers) {
        state.auth.revoke(token).await;
    }
    StatusCode::NO_CONTENT
}

pub async fn me(auth: axum::Extension<AuthContext>) -> Json<AuthContext> {
    Json(auth.0)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization").and_then(|value| value.to_str().ok()).and_then(|value| value.strip_prefix("Bearer "))
}

/// Require a valid session token issued by [`login`]. `/api/auth/login` and
/// the health endpoints are exempt, matching how a gateway never guards its
/// own liveness/login surface behind its own auth.
pub async fn require_session(State(state): State<Arc<AppState>>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if path == "/api/auth/login" || path == "/healthz" || path == "/ready" {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(request.headers()) else {
        return GatewayError::Unauthorized.with_message("missing bearer token").into_response();
    };

    let Some(context) = state.auth.lookup(token).await else {
        return GatewayError::Unauthorized.with_message("invalid or expired session").into_response();
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}
