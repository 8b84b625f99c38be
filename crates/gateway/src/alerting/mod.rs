// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alert rules (G4): CRUD against the relational store, plus the ticking
//! scheduler and pluggable notifiers in [`scheduler`] and [`notifiers`].

pub mod notifiers;
pub mod scheduler;

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Cpu,
    Memory,
    Rps,
    ErrorRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "text")]
pub enum Comparison {
    #[sqlx(rename = "gt")]
    #[serde(rename = "gt")]
    GreaterThan,
    #[sqlx(rename = "lt")]
    #[serde(rename = "lt")]
    LessThan,
}

impl Comparison {
    pub fn is_breached(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => observed > threshold,
            Self::LessThan => observed < threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AlertState {
    Ok,
    Firing,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub metric_type: MetricType,
    pub threshold: f64,
    pub comparison: Comparison,
    pub window_s: i32,
    pub enabled: bool,
    pub recipients: Vec<String>,
    pub state: AlertState,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewAlertRule {
    pub id: Option<Uuid>,
    pub name: String,
    pub metric_type: MetricType,
    pub threshold: f64,
    pub comparison: Comparison,
    pub window_s: i32,
    pub enabled: Option<bool>,
    pub recipients: Vec<String>,
    pub agent_id: Option<String>,
}

pub async fn list_rules(pool: &PgPool) -> Result<Vec<AlertRule>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, name, metric_type, threshold, comparison, window_s, enabled, recipients, state, agent_id
         FROM alert_rules ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// Create a rule. A caller-supplied `id` is honored only if present; any
/// missing or malformed id is treated as absent and a fresh one is
/// generated by the store.
pub async fn create_rule(pool: &PgPool, rule: NewAlertRule) -> Result<AlertRule, sqlx::Error> {
    let id = rule.id.unwrap_or_else(Uuid::new_v4);
    sqlx::query_as(
        "INSERT INTO alert_rules (id, name, metric_type, threshold, comparison, window_s, enabled, recipients, agent_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING id, name, metric_type, threshold, comparison, window_s, enabled, recipients, state, agent_id",
    )
    .bind(id)
    .bind(&rule.name)
    .bind(rule.metric_type)
    .bind(rule.threshold)
    .bind(rule.comparison)
    .bind(rule.window_s)
    .bind(rule.enabled.unwrap_or(true))
    .bind(&rule.recipients)
    .bind(&rule.agent_id)
    .fetch_one(pool)
    .await
}

pub async fn delete_rule(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM alert_rules WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_breach_directions() {
        assert!(Comparison::GreaterThan.is_breached(90.0, 80.0));
        assert!(!Comparison::GreaterThan.is_breached(70.0, 80.0));
        assert!(Comparison::LessThan.is_breached(5.0, 10.0));
        assert!(!Comparison::LessThan.is_breached(15.0, 10.0));
    }
}
