//! Azure Communication Services email channel (REST, HMAC-signed).
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config;
use crate::model::NotificationMessage;
use crate::notify::Channel;

const API_VERSION: &str = "2023-03-31";
pub const DEFAULT_SENDER: &str = "donotreply@donotreply.azurecomm.net";

/// Parsed `endpoint=...;accesskey=...` connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct AcsConnection {
    pub endpoint: Url,
    access_key: Vec<u8>,
}

impl fmt::Debug for AcsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcsConnection")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

pub fn parse_connection_string(raw: &str) -> Result<AcsConnection> {
    let mut endpoint = None;
    let mut access_key = None;
    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed connection string segment"))?;
        match key.trim().to_ascii_lowercase().as_str() {
            "endpoint" => endpoint = Some(value.trim()),
            "accesskey" => access_key = Some(value.trim()),
            _ => {}
        }
    }
    let endpoint = endpoint.ok_or_else(|| anyhow!("connection string has no endpoint"))?;
    let access_key = access_key.ok_or_else(|| anyhow!("connection string has no accesskey"))?;
    Ok(AcsConnection {
        endpoint: Url::parse(endpoint).context("invalid ACS endpoint URL")?,
        access_key: STANDARD
            .decode(access_key)
            .context("ACS access key is not valid base64")?,
    })
}

/// Headers carrying the HMAC-SHA256 request signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub date: String,
    pub content_hash: String,
    pub authorization: String,
}

pub fn sign_request(
    method: &str,
    url: &Url,
    now: DateTime<Utc>,
    body: &[u8],
    access_key: &[u8],
) -> Result<SignedHeaders> {
    let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let content_hash = STANDARD.encode(<Sha256 as sha2::Digest>::digest(body));

    let mut path_and_query = url.path().to_string();
    if let Some(query) = url.query() {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(anyhow!("ACS endpoint has no host")),
    };

    let string_to_sign = format!("{method}\n{path_and_query}\n{date};{host};{content_hash}");
    let mut mac = Hmac::<Sha256>::new_from_slice(access_key)
        .map_err(|_| anyhow!("invalid ACS access key"))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(SignedHeaders {
        date,
        content_hash,
        authorization: format!(
            "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}"
        ),
    })
}

pub fn build_email_body(sender: &str, message: &NotificationMessage) -> Value {
    json!({
        "senderAddress": sender,
        "recipients": {
            "to": [ { "address": message.to } ]
        },
        "content": {
            "subject": message.subject,
            "plainText": message.body,
        }
    })
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Clone)]
pub struct AcsEmailChannel {
    http: Client,
    connection: AcsConnection,
    sender: String,
}

impl fmt::Debug for AcsEmailChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcsEmailChannel")
            .field("connection", &self.connection)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl AcsEmailChannel {
    pub fn from_config(cfg: &config::PrimaryChannel, timeout: Duration) -> Result<Self> {
        let connection = parse_connection_string(&cfg.connection_string)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build ACS HTTP client")?;
        let sender = cfg
            .sender
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SENDER.to_string());
        Ok(Self::new(http, connection, sender))
    }

    pub fn new(http: Client, connection: AcsConnection, sender: String) -> Self {
        Self {
            http,
            connection,
            sender,
        }
    }

    fn send_url(&self) -> Result<Url> {
        let mut url = self.connection.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("invalid ACS endpoint URL"))?
            .pop_if_empty()
            .push("emails:send");
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    pub fn build_request(
        &self,
        message: &NotificationMessage,
        now: DateTime<Utc>,
    ) -> Result<reqwest::Request> {
        let url = self.send_url()?;
        let body = serde_json::to_vec(&build_email_body(&self.sender, message))
            .context("failed to encode ACS email body")?;
        let signed = sign_request("POST", &url, now, &body, &self.connection.access_key)?;
        self.http
            .post(url)
            .header("x-ms-date", signed.date)
            .header("x-ms-content-sha256", signed.content_hash)
            .header("Authorization", signed.authorization)
            .header("Content-Type", "application/json")
            .header("Operation-Id", Uuid::new_v4().to_string())
            .body(body)
            .build()
            .context("failed to build ACS request")
    }
}

#[async_trait]
impl Channel for AcsEmailChannel {
    fn name(&self) -> &'static str {
        "acs"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        let request = self.build_request(message, Utc::now())?;
        debug!(url = %request.url(), from = %self.sender, to = %message.to, "sending ACS email");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Azure Communication Services")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("ACS email error {}: {}", status, body));
        }
        match res.json::<SendResponse>().await {
            Ok(payload) => info!(operation_id = %payload.id, "email accepted by ACS"),
            Err(_) => info!("email accepted by ACS"),
        }
        Ok(())
    }
}
