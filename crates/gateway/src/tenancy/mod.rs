// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenancy and visibility (G5): the permission graph `user -> team_members ->
//! team -> team_project_access -> project -> environments ->
//! server_assignments -> agent`, enrollment tokens, and the audit log.

pub mod tokens;

use std::collections::HashSet;

use sqlx::PgPool;
use uuid::Uuid;

/// Permission levels, totally ordered: `read < write < operate < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum Permission {
    #[sqlx(rename = "read")]
    Read,
    #[sqlx(rename = "write")]
    Write,
    #[sqlx(rename = "operate")]
    Operate,
    #[sqlx(rename = "admin")]
    Admin,
}

impl Permission {
    fn from_db(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "operate" => Some(Self::Operate),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Whether `user_id` is flagged as a superadmin, who bypasses the graph.
pub async fn is_superadmin(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let row: Option<(bool,)> =
        sqlx::query_as("SELECT is_superadmin FROM users WHERE id = $1").bind(user_id).fetch_optional(pool).await?;
    Ok(row.map(|(flag,)| flag).unwrap_or(false))
}

/// Whether `user_id` has at least `required` permission on `project_id`,
/// either directly (superadmin) or via the team membership graph, taking the
/// maximum permission across every team the user belongs to.
pub async fn has_project_access(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    required: Permission,
) -> Result<bool, sqlx::Error> {
    if is_superadmin(pool, user_id).await? {
        return Ok(true);
    }

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT tpa.permission
         FROM team_project_access tpa
         JOIN team_members tm ON tm.team_id = tpa.team_id
         WHERE tm.user_id = $1 AND tpa.project_id = $2",
    )
    .bind(user_id)
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let best = rows.iter().filter_map(|(p,)| Permission::from_db(p)).max();
    Ok(best.is_some_and(|p| p >= required))
}

/// The set of `agent_id`s visible to `user_id`: all agents if superadmin,
/// otherwise every agent reachable through a team the user belongs to.
pub async fn visible_agent_ids(pool: &PgPool, user_id: Uuid) -> Result<HashSet<String>, sqlx::Error> {
    if is_superadmin(pool, user_id).await? {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT agent_id FROM agents").fetch_all(pool).await?;
        return Ok(rows.into_iter().map(|(id,)| id).collect());
    }

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT sa.agent_id
         FROM server_assignments sa
         JOIN environments e ON e.id = sa.environment_id
         JOIN team_project_access tpa ON tpa.project_id = e.project_id
         JOIN team_members tm ON tm.team_id = tpa.team_id
         WHERE tm.user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Record a mutation in the audit log. Never fails the caller's request; a
/// write failure here is logged and swallowed, matching §7's policy-error
/// handling (auditing is observability, not a transactional guarantee).
pub async fn record_audit(
    pool: &PgPool,
    username: &str,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    details: serde_json::Value,
    ip: &str,
    user_agent: &str,
) {
    let result = sqlx::query(
        "INSERT INTO audit_logs (username, action, resource_type, resource_id, details, ip, user_agent)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(username)
    .bind(action)
    .bind(resource_type)
    .bind(resource_id)
    .bind(details)
    .bind(ip)
    .bind(user_agent)
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(error = %err, action, resource_type, "failed to record audit log entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_ordering_matches_spec() {
        assert!(Permission::Read < Permission::Write);
        assert!(Permission::Write < Permission::Operate);
        assert!(Permission::Operate < Permission::Admin);
    }

    #[test]
    fn permission_from_db_rejects_unknown_values() {
        assert!(Permission::from_db("superuser").is_none());
    }
}
