// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification delivery, dispatched by the URL scheme of each recipient.
//! Only schemes this gateway actually knows how to deliver are supported;
//! anything else is reported as an error rather than silently dropped or
//! faked as delivered.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("unsupported recipient scheme: {0}")]
    UnsupportedScheme(String),
    #[error("recipient is not a valid URL: {0}")]
    InvalidUrl(String),
    #[error("delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertNotification<'a> {
    pub rule_name: &'a str,
    pub metric_type: &'a str,
    pub observed: f64,
    pub threshold: f64,
    pub agent_id: Option<&'a str>,
    pub state: &'a str,
}

/// Deliver `notification` to `recipient`. Recipients of the form
/// `http://`/`https://` are posted to as a webhook; every other scheme is
/// rejected.
pub async fn notify(client: &reqwest::Client, recipient: &str, notification: &AlertNotification<'_>) -> Result<(), NotifyError> {
    let scheme = recipient.split_once("://").map(|(scheme, _)| scheme).ok_or_else(|| NotifyError::InvalidUrl(recipient.to_owned()))?;

    match scheme {
        "http" | "https" => {
            client.post(recipient).json(notification).send().await?.error_for_status()?;
            Ok(())
        }
        other => Err(NotifyError::UnsupportedScheme(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_scheme_is_rejected_rather_than_silently_dropped() {
        let client = reqwest::Client::new();
        let notification =
            AlertNotification { rule_name: "r", metric_type: "cpu", observed: 1.0, threshold: 0.5, agent_id: None, state: "firing" };
        let result = notify(&client, "mailto:ops@example.com", &notification).await;
        assert!(matches!(result, Err(NotifyError::UnsupportedScheme(scheme)) if scheme == "mailto"));
    }

    #[tokio::test]
    async fn malformed_recipient_is_rejected() {
        let client = reqwest::Client::new();
        let notification =
            AlertNotification { rule_name: "r", metric_type: "cpu", observed: 1.0, threshold: 0.5, agent_id: None, state: "firing" };
        let result = notify(&client, "not-a-url", &notification).await;
        assert!(matches!(result, Err(NotifyError::InvalidUrl(_))));
    }
}
