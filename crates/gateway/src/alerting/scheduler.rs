// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alert scheduler: on each tick, evaluate every enabled rule's window
//! against the columnar store and apply a debounced `{ok, firing}`
//! transition. A rule already firing is never re-notified while it stays
//! firing; only the `ok -> firing` and `firing -> ok` edges notify.

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::notifiers::{notify, AlertNotification, NotifyError};
use super::{AlertRule, AlertState, MetricType};
use crate::writers::columnar::{ColumnarClient, ColumnarError};

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Columnar(#[from] ColumnarError),
    #[error("columnar response row was missing or not numeric")]
    NotNumeric,
}

fn metric_query(rule: &AlertRule) -> String {
    let agent_filter = match &rule.agent_id {
        Some(agent_id) => format!("AND agent_id = '{}'", agent_id.replace('\'', "")),
        None => String::new(),
    };
    let window = rule.window_s;

    match rule.metric_type {
        MetricType::Cpu => format!(
            "SELECT avg(cpu_percent) AS value FROM system_metrics WHERE ts_ms >= (toUnixTimestamp(now()) - {window}) * 1000 {agent_filter}"
        ),
        MetricType::Memory => format!(
            "SELECT avg(memory_percent) AS value FROM system_metrics WHERE ts_ms >= (toUnixTimestamp(now()) - {window}) * 1000 {agent_filter}"
        ),
        MetricType::Rps => format!(
            "SELECT count(*) / {window} AS value FROM access_logs WHERE ts_ms >= (toUnixTimestamp(now()) - {window}) * 1000 {agent_filter}"
        ),
        MetricType::ErrorRate => format!(
            "SELECT countIf(status >= 500) / greatest(count(*), 1) AS value FROM access_logs \
             WHERE ts_ms >= (toUnixTimestamp(now()) - {window}) * 1000 {agent_filter}"
        ),
    }
}

async fn evaluate(columnar: &ColumnarClient, rule: &AlertRule) -> Result<f64, EvalError> {
    let response = columnar.query_json(&metric_query(rule)).await?;
    let value = response
        .get("data")
        .and_then(|data| data.as_array())
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("value"))
        .and_then(|value| value.as_f64())
        .ok_or(EvalError::NotNumeric)?;
    Ok(value)
}

async fn set_state(pool: &PgPool, id: Uuid, state: AlertState) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE alert_rules SET state = $1 WHERE id = $2").bind(state).bind(id).execute(pool).await?;
    Ok(())
}

async fn dispatch(client: &reqwest::Client, rule: &AlertRule, observed: f64, state: AlertState) {
    let notification = AlertNotification {
        rule_name: &rule.name,
        metric_type: match rule.metric_type {
            MetricType::Cpu => "cpu",
            MetricType::Memory => "memory",
            MetricType::Rps => "rps",
            MetricType::ErrorRate => "error_rate",
        },
        observed,
        threshold: rule.threshold,
        agent_id: rule.agent_id.as_deref(),
        state: match state {
            AlertState::Ok => "ok",
            AlertState::Firing => "firing",
        },
    };

    for recipient in &rule.recipients {
        if let Err(err) = notify(client, recipient, &notification).await {
            match err {
                NotifyError::UnsupportedScheme(scheme) => {
                    tracing::warn!(rule = %rule.name, recipient, scheme, "alert recipient scheme is not deliverable");
                }
                other => tracing::warn!(rule = %rule.name, recipient, error = %other, "alert notification delivery failed"),
            }
        }
    }
}

async fn tick(pool: &PgPool, columnar: &ColumnarClient, client: &reqwest::Client) {
    let rules = match super::list_rules(pool).await {
        Ok(rules) => rules,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load alert rules for evaluation");
            return;
        }
    };

    for rule in rules.into_iter().filter(|rule| rule.enabled) {
        let observed = match evaluate(columnar, &rule).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(rule = %rule.name, error = %err, "failed to evaluate alert rule window");
                continue;
            }
        };

        let breached = rule.comparison.is_breached(observed, rule.threshold);
        let next_state = if breached { AlertState::Firing } else { AlertState::Ok };

        if next_state == rule.state {
            continue;
        }

        if let Err(err) = set_state(pool, rule.id, next_state).await {
            tracing::warn!(rule = %rule.name, error = %err, "failed to persist alert state transition");
            continue;
        }

        dispatch(client, &rule, observed, next_state).await;
    }
}

/// Run the alert scheduler until `cancel` fires.
pub async fn run(pool: PgPool, columnar: ColumnarClient, tick_interval: std::time::Duration, cancel: CancellationToken) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => tick(&pool, &columnar, &client).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::Comparison;

    fn rule(agent_id: Option<&str>) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            name: "high-cpu".into(),
            metric_type: MetricType::Cpu,
            threshold: 80.0,
            comparison: Comparison::GreaterThan,
            window_s: 60,
            enabled: true,
            recipients: vec![],
            state: AlertState::Ok,
            agent_id: agent_id.map(str::to_owned),
        }
    }

    #[test]
    fn query_scopes_to_agent_when_present() {
        let query = metric_query(&rule(Some("agent-1")));
        assert!(query.contains("agent_id = 'agent-1'"));
    }

    #[test]
    fn query_has_no_agent_filter_when_absent() {
        let query = metric_query(&rule(None));
        assert!(!query.contains("agent_id"));
    }
}
