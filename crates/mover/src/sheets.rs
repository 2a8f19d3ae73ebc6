// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Google Sheets values API.

use std::time::Duration;

use async_trait::async_trait;
use diagnostics::*;
use serde_json::Value;

use crate::error::Result;

const API_URL: &str = "https://sheets.googleapis.com";
const TIMEOUT_SECONDS: u64 = 60;

/// Reads cell values from a spreadsheet range.
#[async_trait]
pub trait SheetsClient: Send + Sync {
    /// Rows of the range, each a list of cell values; trailing empty
    /// cells may be omitted by the server
    async fn values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<Value>>>;
}

/// [`SheetsClient`] over the REST API with an OAuth access token
pub struct HttpSheetsClient {
    http_client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl HttpSheetsClient {
    pub fn new(access_token: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http_client,
            access_token: access_token.to_string(),
            base_url: API_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{spreadsheet_id}/values/{}",
            self.base_url,
            urlencode(range)
        )
    }
}

/// Percent-encode a range such as `Sheet 1!A1:C10` for a path segment
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~' | b'!' | b':') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl SheetsClient for HttpSheetsClient {
    async fn values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<Value>>> {
        let url = self.values_url(spreadsheet_id, range);
        debug!("Fetching sheet values {url}", url: url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")])
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?;
        let body = response.json::<Value>().await?;
        Ok(rows_from_response(&body))
    }
}

/// The `values` member of a `ValueRange` response
#[must_use]
pub fn rows_from_response(body: &Value) -> Vec<Vec<Value>> {
    body["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| row.as_array().cloned().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

/// Text of one cell; empty strings and nulls are missing values
#[must_use]
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_url_encodes_range() {
        let client = HttpSheetsClient::new("token")
            .unwrap()
            .with_base_url("http://localhost:9/");
        assert_eq!(
            client.values_url("abc", "Sheet 1!A1:C10"),
            "http://localhost:9/v4/spreadsheets/abc/values/Sheet%201!A1:C10"
        );
    }

    #[test]
    fn test_rows_and_cells() {
        let body = json!({
            "range": "Sheet1!A1:C3",
            "values": [["name", "n"], ["a", 1, true], ["b"]]
        });
        let rows = rows_from_response(&body);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].len(), 1);
        let cells: Vec<Option<String>> = rows[1].iter().map(cell_text).collect();
        assert_eq!(
            cells,
            vec![Some("a".into()), Some("1".into()), Some("true".into())]
        );
        assert_eq!(cell_text(&json!("")), None);
        assert!(rows_from_response(&json!({})).is_empty());
    }
}
