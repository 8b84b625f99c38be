// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the columnar store's row-insert interface. There is no
//! dedicated client crate for it in this stack; rows are POSTed as
//! newline-delimited JSON (`JSONEachRow`) the same way an HTTP-based metrics
//! sink would push batches, over `reqwest`.

#[derive(Debug, thiserror::Error)]
pub enum ColumnarError {
    #[error("columnar store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("columnar store returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Clone)]
pub struct ColumnarClient {
    client: reqwest::Client,
    base_url: String,
    user: Option<String>,
    password: Option<String>,
}

impl ColumnarClient {
    pub fn new(base_url: String, user: Option<String>, password: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url, user, password }
    }

    /// Insert `rows` into `table` via one bulk `INSERT ... FORMAT
    /// JSONEachRow` request.
    pub async fn insert_rows(&self, table: &str, rows: &[serde_json::Value]) -> Result<(), ColumnarError> {
        if rows.is_empty() {
            return Ok(());
        }

        let body = rows.iter().map(|row| row.to_string()).collect::<Vec<_>>().join("\n");
        let url = format!("{}/?query={}", self.base_url.trim_end_matches('/'), urlencode_insert(table));

        let mut request = self.client.post(&url).body(body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.clone());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ColumnarError::Rejected { status, body });
        }
        Ok(())
    }

    /// Run a read query and parse the store's `FORMAT JSON` response, which
    /// shapes as `{"data": [...], "rows": N}`.
    pub async fn query_json(&self, sql: &str) -> Result<serde_json::Value, ColumnarError> {
        let url = format!("{}/?query={} FORMAT JSON", self.base_url.trim_end_matches('/'), urlencode_query(sql));

        let mut request = self.client.get(&url);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.clone());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ColumnarError::Rejected { status, body });
        }
        Ok(response.json().await?)
    }
}

fn urlencode_insert(table: &str) -> String {
    format!("INSERT%20INTO%20{table}%20FORMAT%20JSONEachRow")
}

fn urlencode_query(sql: &str) -> String {
    sql.replace(' ', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_query_is_well_formed() {
        assert_eq!(urlencode_insert("access_logs"), "INSERT%20INTO%20access_logs%20FORMAT%20JSONEachRow");
    }
}
