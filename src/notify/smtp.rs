//! SMTP fallback channel.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config;
use crate::model::NotificationMessage;
use crate::notify::Channel;

/// Port on which the relay expects TLS from the first byte instead of STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    host: String,
}

impl fmt::Debug for SmtpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpChannel")
            .field("host", &self.host)
            .field("sender", &self.sender.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpChannel {
    pub fn from_config(cfg: &config::Smtp, timeout: Duration) -> Result<Self> {
        let sender: Mailbox = cfg
            .default_sender()
            .ok_or_else(|| anyhow!("mail.smtp needs a sender or username"))?
            .parse()
            .context("invalid SMTP sender address")?;

        let builder = match (cfg.use_tls, cfg.port) {
            (true, IMPLICIT_TLS_PORT) => AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
                .context("failed to configure SMTP TLS relay")?,
            (true, _) => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .context("failed to configure SMTP STARTTLS relay")?,
            (false, _) => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host),
        };
        let mut builder = builder.port(cfg.port).timeout(Some(timeout));
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
            host: cfg.host.clone(),
        })
    }
}

pub fn build_message(sender: &Mailbox, message: &NotificationMessage) -> Result<Message> {
    let to: Mailbox = message
        .to
        .parse()
        .with_context(|| format!("invalid recipient address: {}", message.to))?;
    Message::builder()
        .from(sender.clone())
        .to(to)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .context("failed to build email")
}

#[async_trait]
impl Channel for SmtpChannel {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        let email = build_message(&self.sender, message)?;
        debug!(host = %self.host, to = %message.to, "sending email via SMTP");
        self.transport
            .send(email)
            .await
            .with_context(|| format!("SMTP send via {} failed", self.host))?;
        Ok(())
    }
}
