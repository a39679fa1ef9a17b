//! Spreadsheet-backed tables (Google Sheets v4 values API).
//!
//! The articles and backlog tables are plain worksheets: row 1 is the
//! header, every other row is a record. Reads return the whole sheet,
//! writes append rows positionally.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const TOKEN_LIFETIME_SECS: i64 = 3600;
// Refresh a little before Google expires the token.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// One record of a table keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow(HashMap<String, String>);

impl SheetRow {
    pub fn from_cells(headers: &[String], cells: &[String]) -> Self {
        let map = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(i, header)| (header.clone(), cells.get(i).cloned().unwrap_or_default()))
            .collect();
        Self(map)
    }

    /// Case-insensitive column lookup. Blank cells read as `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        let value = match self.0.get(column) {
            Some(value) => Some(value),
            None => self
                .0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(column))
                .map(|(_, value)| value),
        };
        value.map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SheetRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A remote append-only table.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Every data row of the table, in sheet order.
    async fn read_records(&self) -> PipelineResult<Vec<SheetRow>>;

    /// Append rows in a single call. Cells must follow the table's
    /// declared column order.
    async fn append_rows(&self, rows: &[Vec<String>]) -> PipelineResult<()>;
}

/// Fields of a Google service-account key file that are needed to mint
/// access tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::Parse {
            what: "service account json",
            reason: e.to_string(),
        })
    }
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

#[derive(Serialize)]
struct AppendBody<'a> {
    values: &'a [Vec<String>],
}

/// Authenticated client for one spreadsheet.
pub struct SheetsClient {
    client: Client,
    spreadsheet_id: String,
    key: ServiceAccountKey,
    token: Mutex<Option<AccessToken>>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, key: ServiceAccountKey) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(PipelineError::remote)?;

        Ok(Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            key,
            token: Mutex::new(None),
        })
    }

    /// Handle to one worksheet of this spreadsheet.
    pub fn table(self: &Arc<Self>, tab: impl Into<String>) -> SheetTable {
        SheetTable {
            client: Arc::clone(self),
            tab: tab.into(),
        }
    }

    async fn access_token(&self) -> PipelineResult<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let token = self.request_token(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request_token(&self, now: i64) -> PipelineResult<AccessToken> {
        let claims = JwtClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| PipelineError::remote(format!("invalid service account key: {e}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| PipelineError::remote(format!("signing token request: {e}")))?;

        let body = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode("urn:ietf:params:oauth:grant-type:jwt-bearer"),
            urlencoding::encode(&assertion)
        );

        let response = self
            .client
            .post(&self.key.token_uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(PipelineError::remote)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(PipelineError::remote(format!(
                "token endpoint returned {status}: {error_text}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(PipelineError::remote)?;

        debug!(account = %self.key.client_email, "sheets: minted access token");

        Ok(AccessToken {
            value: token.access_token,
            expires_at: now + token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS),
        })
    }

    fn range_url(&self, tab: &str) -> String {
        // Quote the tab name so names with spaces resolve as a whole-sheet range.
        let range = format!("'{}'", tab.replace('\'', "''"));
        format!(
            "{}/{}/values/{}",
            SHEETS_API_URL,
            self.spreadsheet_id,
            urlencoding::encode(&range)
        )
    }

    async fn read_values(&self, tab: &str) -> PipelineResult<Vec<Vec<String>>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.range_url(tab))
            .bearer_auth(token)
            .send()
            .await
            .map_err(PipelineError::remote)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(PipelineError::remote(format!(
                "reading '{tab}' returned {status}: {error_text}"
            )));
        }

        let range = response
            .json::<ValueRange>()
            .await
            .map_err(PipelineError::remote)?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_values(&self, tab: &str, rows: &[Vec<String>]) -> PipelineResult<()> {
        let token = self.access_token().await?;
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.range_url(tab)
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&AppendBody { values: rows })
            .send()
            .await
            .map_err(PipelineError::remote)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(PipelineError::remote(format!(
                "appending to '{tab}' returned {status}: {error_text}"
            )));
        }

        Ok(())
    }
}

fn cell_to_string(cell: JsonValue) -> String {
    match cell {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn raw sheet values into records keyed by the header row.
pub fn rows_to_records(values: Vec<Vec<String>>) -> Vec<SheetRow> {
    let mut rows = values.into_iter();
    let Some(headers) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();

    rows.filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|cells| SheetRow::from_cells(&headers, &cells))
        .collect()
}

/// One worksheet of a spreadsheet.
#[derive(Clone)]
pub struct SheetTable {
    client: Arc<SheetsClient>,
    tab: String,
}

impl SheetTable {
    pub fn name(&self) -> &str {
        &self.tab
    }
}

#[async_trait]
impl TabularStore for SheetTable {
    async fn read_records(&self) -> PipelineResult<Vec<SheetRow>> {
        let values = self.client.read_values(&self.tab).await?;
        let records = rows_to_records(values);
        debug!(tab = %self.tab, count = records.len(), "sheets: read records");
        Ok(records)
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> PipelineResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.client.append_values(&self.tab, rows).await?;
        debug!(tab = %self.tab, count = rows.len(), "sheets: appended rows");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn header_row_keys_records_and_pads_short_rows() {
        let values = vec![
            strings(&["date", "title", "url", "Category"]),
            strings(&["2026-01-01", "First", "https://a.example/1", "ai"]),
            strings(&["2026-01-02", "Second"]),
            strings(&["", "", ""]),
        ];

        let records = rows_to_records(values);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("url"), Some("https://a.example/1"));
        assert_eq!(records[0].get("category"), Some("ai"));
        assert_eq!(records[1].get("url"), None);
        assert_eq!(records[1].get("title"), Some("Second"));
    }

    #[test]
    fn empty_sheet_has_no_records() {
        assert!(rows_to_records(Vec::new()).is_empty());
        assert!(rows_to_records(vec![strings(&["date", "url"])]).is_empty());
    }

    #[test]
    fn non_string_cells_are_stringified() {
        assert_eq!(cell_to_string(JsonValue::from(42)), "42");
        assert_eq!(cell_to_string(JsonValue::Null), "");
        assert_eq!(cell_to_string(JsonValue::from("x")), "x");
    }

    #[test]
    fn service_account_key_defaults_token_uri() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email":"bot@example.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .expect("key parses");
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
        assert!(ServiceAccountKey::from_json("not json").is_err());
    }
}
