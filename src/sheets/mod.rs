use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config;
use crate::model::{RegistryRow, SHEET_HEADERS};
use crate::sheets::auth::{ServiceAccountKey, TokenSource};
use crate::sheets::model::ValueRange;

pub mod auth;
pub mod model;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/";

/// The registry sheet could not be reached, or credentials are missing or invalid.
#[derive(Debug, Error)]
#[error("registry sheet unavailable: {0}")]
pub struct ConnectivityError(String);

impl ConnectivityError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<anyhow::Error> for ConnectivityError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

/// Row-of-record access. Rows are addressed by 1-based sheet position only.
#[async_trait]
pub trait RegistrySheet: Send + Sync {
    /// All data rows below the header, in sheet order.
    async fn fetch_all_rows(&self) -> Result<Vec<RegistryRow>, ConnectivityError>;

    async fn update_cell(
        &self,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), ConnectivityError>;
}

#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    base_url: Url,
    spreadsheet_id: String,
    worksheet: Option<String>,
    tokens: Option<Arc<TokenSource>>,
}

impl fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsClient")
            .field("base_url", &self.base_url)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet", &self.worksheet)
            .field("authenticated", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}

impl SheetsClient {
    /// Build a client from config. Missing or unreadable credentials do not
    /// fail construction; every call then reports a `ConnectivityError`.
    pub fn from_config(cfg: &config::Sheets) -> Result<Self> {
        let base_url = Url::parse(SHEETS_API_BASE).context("invalid default Sheets URL")?;
        let http = Client::builder()
            .user_agent(concat!("wedding-site/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.timeout())
            .build()
            .context("failed to build Sheets HTTP client")?;

        let key = match ServiceAccountKey::from_config(cfg) {
            Ok(Some(key)) => Some(key),
            Ok(None) => {
                warn!("no Google Sheets credentials configured; registry will be unavailable");
                None
            }
            Err(err) => {
                warn!(?err, "failed to load Google Sheets credentials");
                None
            }
        };
        let tokens = key.map(|k| Arc::new(TokenSource::new(http.clone(), k)));

        Ok(Self::with_base_url(
            http,
            base_url,
            cfg.spreadsheet_id.clone(),
            cfg.worksheet.clone(),
            tokens,
        ))
    }

    pub fn with_base_url(
        http: Client,
        base_url: Url,
        spreadsheet_id: String,
        worksheet: Option<String>,
        tokens: Option<Arc<TokenSource>>,
    ) -> Self {
        Self {
            http,
            base_url,
            spreadsheet_id,
            worksheet,
            tokens,
        }
    }

    fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("invalid Sheets base URL"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    /// Unqualified ranges address the first sheet.
    fn sheet_range(&self, cells: &str) -> String {
        match &self.worksheet {
            Some(name) => format!("{}!{}", quote_sheet_name(name), cells),
            None => cells.to_string(),
        }
    }

    fn data_range(&self) -> String {
        match &self.worksheet {
            Some(name) => quote_sheet_name(name),
            None => {
                let last = column_letters(SHEET_HEADERS.len());
                format!("A:{last}")
            }
        }
    }

    pub fn build_read_request(&self, token: &str, range: &str) -> Result<reqwest::Request> {
        let url = self.values_url(range)?;
        self.http
            .get(url)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")])
            .bearer_auth(token)
            .build()
            .context("failed to build Sheets read request")
    }

    pub fn build_update_request(
        &self,
        token: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<reqwest::Request> {
        let range = self.sheet_range(&a1_cell(row, column));
        let url = self.values_url(&range)?;
        let body = build_update_body(&range, value);
        self.http
            .put(url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(token)
            .json(&body)
            .build()
            .context("failed to build Sheets update request")
    }

    async fn token(&self) -> Result<String> {
        let tokens = self
            .tokens
            .as_ref()
            .ok_or_else(|| anyhow!("Google Sheets credentials are not configured"))?;
        tokens.access_token().await
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(method = %request.method(), url = %request.url(), "sending sheets request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Google Sheets")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("sheets error {}: {}", status, body));
        }
        Ok(res)
    }

    async fn read_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let token = self.token().await?;
        let request = self.build_read_request(&token, range)?;
        let res = self.execute(request).await?;
        let values: ValueRange = res.json().await.context("invalid Sheets values response")?;
        Ok(values.into_text_rows())
    }

    /// Compare the live header row against the fixed column schema.
    pub async fn check_headers(&self) -> Result<Vec<HeaderMismatch>, ConnectivityError> {
        let rows = self.read_values(&self.sheet_range("1:1")).await?;
        let header = rows.into_iter().next().unwrap_or_default();
        Ok(header_mismatches(&header))
    }
}

#[async_trait]
impl RegistrySheet for SheetsClient {
    async fn fetch_all_rows(&self) -> Result<Vec<RegistryRow>, ConnectivityError> {
        let values = self.read_values(&self.data_range()).await?;
        let rows = rows_from_values(&values);
        info!(rows = rows.len(), "fetched registry rows");
        Ok(rows)
    }

    async fn update_cell(
        &self,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), ConnectivityError> {
        let token = self.token().await?;
        let request = self.build_update_request(&token, row, column, value)?;
        self.execute(request).await?;
        debug!(row, column, "sheet cell updated");
        Ok(())
    }
}

pub fn build_update_body(range: &str, value: &str) -> Value {
    json!({
        "range": range,
        "majorDimension": "ROWS",
        "values": [[value]],
    })
}

/// Map a header row plus data rows into records keyed by header name.
/// Short rows are padded with empty cells; blank rows are kept so that
/// record positions keep matching sheet rows.
pub fn rows_from_values(values: &[Vec<String>]) -> Vec<RegistryRow> {
    let Some((header, data)) = values.split_first() else {
        return Vec::new();
    };
    data.iter()
        .map(|cells| {
            let record: HashMap<&str, &str> = header
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), cells.get(i).map(String::as_str).unwrap_or("")))
                .collect();
            RegistryRow::from_record(&record)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMismatch {
    /// 1-based column.
    pub column: usize,
    pub expected: &'static str,
    pub actual: Option<String>,
}

pub fn header_mismatches(header: &[String]) -> Vec<HeaderMismatch> {
    SHEET_HEADERS
        .iter()
        .enumerate()
        .filter_map(|(i, &expected)| {
            let actual = header.get(i).map(|h| h.trim().to_string());
            match actual.as_deref() {
                Some(a) if a == expected => None,
                _ => Some(HeaderMismatch {
                    column: i + 1,
                    expected,
                    actual,
                }),
            }
        })
        .collect()
}

/// Spreadsheet column letters for a 1-based column index (1 → A, 27 → AA).
pub fn column_letters(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

pub fn a1_cell(row: usize, column: usize) -> String {
    format!("{}{}", column_letters(column), row)
}

fn quote_sheet_name(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
