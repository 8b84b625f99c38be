// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway's HTTP API, run against a real
//! Postgres instance.
//!
//! These tests require `DATABASE_URL` to point at a scratch database. If
//! it's unset the tests are skipped (not failed).

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use sqlx::PgPool;
use uuid::Uuid;

use gateway::config::GatewayConfig;
use gateway::health::ReadinessState;
use gateway::http::state::{AppState, AuthStore};
use gateway::ingest::registry::SessionRegistry;
use gateway::live;
use gateway::tenancy::tokens::hash_password;
use gateway::writers::columnar::ColumnarClient;

/// Skip test if `DATABASE_URL` is not configured.
macro_rules! require_database {
    () => {
        match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("DATABASE_URL not set — skipping test");
                return Ok(());
            }
        }
    };
}

fn test_config() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ingest_port: 0,
        database_url: String::new(),
        columnar_url: "http://127.0.0.1:0".into(),
        columnar_user: None,
        columnar_password: None,
        auth_token: None,
        writer_batch_rows: 1000,
        writer_batch_ms: 500,
        alert_tick_ms: 15_000,
        live_subscriber_queue: 64,
        access_log_ttl_days: 7,
        metrics_ttl_days: 30,
        agent_mgmt_port: 7171,
    }
}

async fn test_state(pool: PgPool) -> Arc<AppState> {
    let config = Arc::new(test_config());
    Arc::new(AppState {
        columnar: ColumnarClient::new(config.columnar_url.clone(), None, None),
        pool,
        sessions: SessionRegistry::new(),
        live: live::Registry::new(config.live_subscriber_queue),
        config,
        auth: AuthStore::default(),
        readiness: ReadinessState::default(),
    })
}

async fn insert_user(pool: &PgPool, username: &str, password: &str, is_superadmin: bool) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as("INSERT INTO users (username, password_hash, is_superadmin) VALUES ($1, $2, $3) RETURNING id")
        .bind(username)
        .bind(hash_password(password))
        .bind(is_superadmin)
        .fetch_one(pool)
        .await
        .expect("insert test user");
    id
}

#[tokio::test]
async fn liveness_and_readiness_do_not_require_auth() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let state = test_state(pool).await;
    state.readiness.set_ready(true);

    let server = TestServer::new(gateway::http::build_router(state))?;
    server.get("/healthz").await.assert_status_ok();
    server.get("/ready").await.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn routes_without_a_bearer_token_are_rejected() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let state = test_state(pool).await;

    let server = TestServer::new(gateway::http::build_router(state))?;
    let resp = server.get("/api/servers").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn login_issues_a_bearer_token_that_authorizes_later_requests() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    insert_user(&pool, "alice", "hunter2", true).await;
    let state = test_state(pool).await;

    let server = TestServer::new(gateway::http::build_router(state))?;

    let bad = server.post("/api/auth/login").json(&serde_json::json!({"username": "alice", "password": "wrong"})).await;
    bad.assert_status(StatusCode::UNAUTHORIZED);

    let resp = server.post("/api/auth/login").json(&serde_json::json!({"username": "alice", "password": "hunter2"})).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["is_superadmin"], true);
    let token = body["token"].as_str().expect("token string").to_owned();

    let me = server.get("/api/auth/me").authorization_bearer(&token).await;
    me.assert_status_ok();
    let me_body: serde_json::Value = me.json();
    assert_eq!(me_body["username"], "alice");

    let servers = server.get("/api/servers").authorization_bearer(&token).await;
    servers.assert_status_ok();

    server.post("/api/auth/logout").authorization_bearer(&token).await.assert_status(StatusCode::NO_CONTENT);
    server.get("/api/auth/me").authorization_bearer(&token).await.assert_status(StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn non_superadmin_sees_no_projects_without_team_access() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    insert_user(&pool, "bob", "password", false).await;
    sqlx::query("INSERT INTO projects (name) VALUES ('unreachable')").execute(&pool).await?;
    let state = test_state(pool).await;

    let server = TestServer::new(gateway::http::build_router(state))?;
    let login = server.post("/api/auth/login").json(&serde_json::json!({"username": "bob", "password": "password"})).await;
    let token = login.json::<serde_json::Value>()["token"].as_str().expect("token").to_owned();

    let projects = server.get("/api/projects").authorization_bearer(&token).await;
    projects.assert_status_ok();
    let list: Vec<serde_json::Value> = projects.json();
    assert!(list.is_empty());
    Ok(())
}

#[tokio::test]
async fn alert_rule_crud_round_trips_through_the_api() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    insert_user(&pool, "carol", "password", true).await;
    let state = test_state(pool).await;

    let server = TestServer::new(gateway::http::build_router(state))?;
    let login = server.post("/api/auth/login").json(&serde_json::json!({"username": "carol", "password": "password"})).await;
    let token = login.json::<serde_json::Value>()["token"].as_str().expect("token").to_owned();

    let created = server
        .post("/api/alerts")
        .authorization_bearer(&token)
        .json(&serde_json::json!({
            "name": "high-cpu",
            "metric_type": "cpu",
            "threshold": 80.0,
            "comparison": "gt",
            "window_s": 60,
            "recipients": ["https://hooks.example/alert"],
        }))
        .await;
    created.assert_status_ok();
    let rule: serde_json::Value = created.json();
    assert_eq!(rule["name"], "high-cpu");
    assert_eq!(rule["state"], "ok");
    let id = rule["id"].as_str().expect("id").to_owned();

    let list = server.get("/api/alerts").authorization_bearer(&token).await;
    list.assert_status_ok();
    let rules: Vec<serde_json::Value> = list.json();
    assert_eq!(rules.len(), 1);

    server.delete(&format!("/api/alerts/{id}")).authorization_bearer(&token).await.assert_status(StatusCode::NO_CONTENT);
    server.delete(&format!("/api/alerts/{id}")).authorization_bearer(&token).await.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}
