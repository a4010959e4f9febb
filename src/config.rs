//! Configuration loader and validator for the wedding site.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub sheets: Sheets,
    #[serde(default)]
    pub title: Title,
    pub mail: Mail,
}

/// Server-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind: String,
    /// Public URL printed at the bottom of notification emails.
    pub site_url: String,
    /// Name signed at the bottom of notification emails.
    #[serde(default = "default_registry_name")]
    pub registry_name: String,
    /// Route SMTP to a local capture relay instead of the configured server.
    #[serde(default)]
    pub dev_mail_capture: bool,
}

/// Spreadsheet location and service-account credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sheets {
    pub spreadsheet_id: String,
    /// Tab name. Unset means the first sheet, whatever it is called.
    #[serde(default)]
    pub worksheet: Option<String>,
    /// Path to a service-account JSON key file.
    #[serde(default)]
    pub credentials_file: Option<String>,
    /// Inline service-account JSON; takes precedence over `credentials_file`.
    #[serde(default)]
    pub credentials_json: Option<String>,
    #[serde(default = "default_sheets_timeout")]
    pub timeout_secs: u64,
}

/// Product title scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Title {
    #[serde(default = "default_title_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Title {
    fn default() -> Self {
        Self {
            timeout_secs: default_title_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Notification recipients and delivery channels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mail {
    pub to_address: String,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub primary: Option<PrimaryChannel>,
    #[serde(default)]
    pub smtp: Option<Smtp>,
}

/// Azure Communication Services email settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrimaryChannel {
    pub connection_string: String,
    #[serde(default)]
    pub sender: Option<String>,
}

/// SMTP relay settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Smtp {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    /// When unset, sends are suppressed exactly when no username is configured.
    #[serde(default)]
    pub suppress_send: Option<bool>,
}

impl Smtp {
    /// Local capture relay used by `app.dev_mail_capture`.
    pub fn dev_capture() -> Self {
        Self {
            host: "localhost".into(),
            port: 1025,
            use_tls: false,
            username: None,
            password: None,
            sender: Some("dev@localhost".into()),
            suppress_send: Some(false),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress_send.unwrap_or(self.username.is_none())
    }

    pub fn default_sender(&self) -> Option<&str> {
        self.sender.as_deref().or(self.username.as_deref())
    }
}

fn default_registry_name() -> String {
    "Wedding Registry".into()
}

fn default_sheets_timeout() -> u64 {
    15
}

fn default_title_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".into()
}

fn default_mail_timeout() -> u64 {
    20
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

impl Sheets {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Title {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Mail {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// SMTP settings in effect, taking the development capture relay into account.
    pub fn effective_smtp(&self) -> Option<Smtp> {
        if self.app.dev_mail_capture {
            return Some(Smtp::dev_capture());
        }
        self.mail.smtp.clone()
    }

    /// Overlay secrets from the environment; set variables win over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(json) = lookup("GOOGLE_SHEETS_CREDS_JSON") {
            self.sheets.credentials_json = Some(json);
        }
        if let Some(to) = lookup("EMAIL_TO_ADDRESS") {
            self.mail.to_address = to;
        }
        if let Some(conn) = lookup("AZURE_COMMUNICATION_CONNECTION_STRING") {
            match self.mail.primary.as_mut() {
                Some(primary) => primary.connection_string = conn,
                None => {
                    self.mail.primary = Some(PrimaryChannel {
                        connection_string: conn,
                        sender: None,
                    })
                }
            }
        }
        if let (Some(from), Some(primary)) = (lookup("EMAIL_FROM_ADDRESS"), self.mail.primary.as_mut()) {
            primary.sender = Some(from);
        }
        let server = lookup("MAIL_SERVER");
        let username = lookup("MAIL_USERNAME");
        if server.is_some() || username.is_some() {
            let smtp = self.mail.smtp.get_or_insert_with(|| Smtp {
                host: "smtp.gmail.com".into(),
                port: default_smtp_port(),
                use_tls: true,
                username: None,
                password: None,
                sender: None,
                suppress_send: None,
            });
            if let Some(host) = server {
                smtp.host = host;
            }
            if let Some(username) = username {
                smtp.username = Some(username);
            }
        }
        if let Some(smtp) = self.mail.smtp.as_mut() {
            if let Some(port) = lookup("MAIL_PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
                smtp.port = port;
            }
            if let Some(use_tls) = lookup("MAIL_USE_TLS").and_then(|v| parse_flag(&v)) {
                smtp.use_tls = use_tls;
            }
            if let Some(password) = lookup("MAIL_PASSWORD") {
                smtp.password = Some(password);
            }
            if let Some(sender) = lookup("MAIL_DEFAULT_SENDER") {
                smtp.sender = Some(sender);
            }
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Load configuration from a YAML file, overlay the process environment and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }

    if cfg.sheets.spreadsheet_id.trim().is_empty() {
        return Err(ConfigError::Invalid("sheets.spreadsheet_id must be non-empty"));
    }
    if cfg.sheets.worksheet.as_deref().is_some_and(|w| w.trim().is_empty()) {
        return Err(ConfigError::Invalid("sheets.worksheet must be non-empty when set"));
    }
    if cfg.sheets.timeout_secs == 0 {
        return Err(ConfigError::Invalid("sheets.timeout_secs must be > 0"));
    }

    if cfg.title.timeout_secs == 0 {
        return Err(ConfigError::Invalid("title.timeout_secs must be > 0"));
    }

    if cfg.mail.to_address.trim().is_empty() {
        return Err(ConfigError::Invalid("mail.to_address must be non-empty"));
    }
    if cfg.mail.timeout_secs == 0 {
        return Err(ConfigError::Invalid("mail.timeout_secs must be > 0"));
    }
    if let Some(primary) = &cfg.mail.primary {
        if primary.connection_string.trim().is_empty() {
            return Err(ConfigError::Invalid("mail.primary.connection_string must be non-empty"));
        }
    }
    if let Some(smtp) = &cfg.mail.smtp {
        if smtp.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mail.smtp.host must be non-empty"));
        }
        if smtp.port == 0 {
            return Err(ConfigError::Invalid("mail.smtp.port must be > 0"));
        }
    }

    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  bind: "0.0.0.0:5000"
  site_url: "https://menkevaccawedding.azurewebsites.net"
  registry_name: "Menke & Vacca Wedding Registry"
  dev_mail_capture: false

sheets:
  spreadsheet_id: "YOUR_SPREADSHEET_ID"
  # worksheet: "Form Responses 1"   # defaults to the first sheet
  credentials_file: "./service-account.json"
  timeout_secs: 15

title:
  timeout_secs: 10

mail:
  to_address: "couple@example.com"
  timeout_secs: 20
  primary:
    connection_string: "endpoint=https://example.communication.azure.com/;accesskey=c2VjcmV0"
    sender: "DoNotReply@example.azurecomm.net"
  smtp:
    host: "smtp.gmail.com"
    port: 587
    use_tls: true
    username: "couple@gmail.com"
    password: "APP_PASSWORD"
"#
}
