// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway's relational-store-backed domain
//! logic: tenancy visibility, enrollment tokens, the audit log, and alert
//! rule persistence.
//!
//! These tests require `DATABASE_URL` to point at a scratch database. If
//! it's unset the tests are skipped (not failed).

use sqlx::PgPool;
use uuid::Uuid;

use gateway::alerting::{self, Comparison, MetricType, NewAlertRule};
use gateway::tenancy::tokens::{create_enrollment_token, validate_enrollment_token, TokenError};
use gateway::tenancy::{has_project_access, record_audit, visible_agent_ids, Permission};

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

async fn seed_project_with_access(pool: &PgPool, permission: Permission) -> (Uuid, Uuid, Uuid) {
    let permission = match permission {
        Permission::Read => "read",
        Permission::Write => "write",
        Permission::Operate => "operate",
        Permission::Admin => "admin",
    };

    let (user_id,): (Uuid,) = sqlx::query_as("INSERT INTO users (username, password_hash) VALUES ($1, 'x') RETURNING id")
        .bind(format!("user-{}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .expect("insert user");
    let (team_id,): (Uuid,) =
        sqlx::query_as("INSERT INTO teams (name) VALUES ('team') RETURNING id").fetch_one(pool).await.expect("insert team");
    sqlx::query("INSERT INTO team_members (team_id, user_id) VALUES ($1, $2)")
        .bind(team_id)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("insert team member");
    let (project_id,): (Uuid,) =
        sqlx::query_as("INSERT INTO projects (name) VALUES ('proj') RETURNING id").fetch_one(pool).await.expect("insert project");
    sqlx::query("INSERT INTO team_project_access (team_id, project_id, permission) VALUES ($1, $2, $3)")
        .bind(team_id)
        .bind(project_id)
        .bind(permission)
        .execute(pool)
        .await
        .expect("insert team project access");

    (user_id, team_id, project_id)
}

#[tokio::test]
async fn team_membership_grants_access_at_or_below_the_assigned_permission() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let (user_id, _team_id, project_id) = seed_project_with_access(&pool, Permission::Write).await;

    assert!(has_project_access(&pool, user_id, project_id, Permission::Read).await?);
    assert!(has_project_access(&pool, user_id, project_id, Permission::Write).await?);
    assert!(!has_project_access(&pool, user_id, project_id, Permission::Operate).await?);
    Ok(())
}

#[tokio::test]
async fn a_user_with_no_team_has_no_visible_agents() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let (user_id,): (Uuid,) = sqlx::query_as("INSERT INTO users (username, password_hash) VALUES ($1, 'x') RETURNING id")
        .bind(format!("lonely-{}", Uuid::new_v4()))
        .fetch_one(&pool)
        .await?;

    sqlx::query("INSERT INTO agents (agent_id, hostname, agent_version, last_seen_at) VALUES ('a1', 'h1', '1.0', now())")
        .execute(&pool)
        .await?;

    let visible = visible_agent_ids(&pool, user_id).await?;
    assert!(visible.is_empty());
    Ok(())
}

#[tokio::test]
async fn agent_assigned_to_an_accessible_environment_is_visible() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let (user_id, _team_id, project_id) = seed_project_with_access(&pool, Permission::Read).await;

    let (environment_id,): (Uuid,) = sqlx::query_as("INSERT INTO environments (project_id, name) VALUES ($1, 'prod') RETURNING id")
        .bind(project_id)
        .fetch_one(&pool)
        .await?;
    sqlx::query("INSERT INTO agents (agent_id, hostname, agent_version, last_seen_at) VALUES ('a-visible', 'h', '1.0', now())")
        .execute(&pool)
        .await?;
    sqlx::query("INSERT INTO server_assignments (environment_id, agent_id) VALUES ($1, 'a-visible')")
        .bind(environment_id)
        .execute(&pool)
        .await?;

    let visible = visible_agent_ids(&pool, user_id).await?;
    assert!(visible.contains("a-visible"));
    Ok(())
}

#[tokio::test]
async fn enrollment_token_enforces_max_uses() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let (_, _, project_id) = seed_project_with_access(&pool, Permission::Admin).await;
    let (environment_id,): (Uuid,) = sqlx::query_as("INSERT INTO environments (project_id, name) VALUES ($1, 'staging') RETURNING id")
        .bind(project_id)
        .fetch_one(&pool)
        .await?;

    let created = create_enrollment_token(&pool, environment_id, None, Some(1)).await?;
    let resolved = validate_enrollment_token(&pool, &created.plaintext).await?;
    assert_eq!(resolved, environment_id);

    let second_use = validate_enrollment_token(&pool, &created.plaintext).await;
    assert!(matches!(second_use, Err(TokenError::Exhausted)));
    Ok(())
}

#[tokio::test]
async fn unknown_enrollment_token_is_rejected() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let result = validate_enrollment_token(&pool, "not-a-real-token").await;
    assert!(matches!(result, Err(TokenError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn audit_log_records_a_row_per_call() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;
    let resource_id = Uuid::new_v4().to_string();

    record_audit(&pool, "tester", "create_alert_rule", "alert_rule", &resource_id, serde_json::json!({"name": "x"}), "10.0.0.1", "curl/8").await;

    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM audit_logs WHERE resource_id = $1").bind(&resource_id).fetch_one(&pool).await?;
    assert_eq!(count, 1);
    Ok(())
}

#[tokio::test]
async fn alert_rule_create_list_delete_round_trip() -> anyhow::Result<()> {
    let url = require_database!();
    let pool = gateway::db::connect(&url).await?;

    let created = alerting::create_rule(
        &pool,
        NewAlertRule {
            id: None,
            name: format!("rule-{}", Uuid::new_v4()),
            metric_type: MetricType::ErrorRate,
            threshold: 0.05,
            comparison: Comparison::GreaterThan,
            window_s: 300,
            enabled: Some(true),
            recipients: vec!["https://hooks.example/x".into()],
            agent_id: None,
        },
    )
    .await?;

    let rules = alerting::list_rules(&pool).await?;
    assert!(rules.iter().any(|rule| rule.id == created.id));

    assert!(alerting::delete_rule(&pool, created.id).await?);
    assert!(!alerting::delete_rule(&pool, created.id).await?);
    Ok(())
}
