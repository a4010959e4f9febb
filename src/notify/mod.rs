//! Purchase notifications with ordered channel fallback.
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::{NotificationMessage, Purchase};

pub mod acs;
pub mod smtp;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &NotificationMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { channel: &'static str },
    /// Every configured channel was tried and failed.
    Failed,
    /// No channel is configured; nothing was attempted.
    NotConfigured,
}

impl DispatchOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Tries each channel in order and stops at the first success. No retries.
pub struct Dispatcher {
    channels: Vec<Box<dyn Channel>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Channel>>) -> Self {
        Self { channels }
    }

    /// Primary channel first when configured, then SMTP unless suppressed.
    /// A channel whose settings cannot be used is logged and left out.
    pub fn from_config(cfg: &Config) -> Self {
        let mut channels: Vec<Box<dyn Channel>> = Vec::new();

        if let Some(primary) = &cfg.mail.primary {
            match acs::AcsEmailChannel::from_config(primary, cfg.mail.timeout()) {
                Ok(channel) => channels.push(Box::new(channel)),
                Err(err) => warn!(?err, "primary mail channel unusable; skipping"),
            }
        }

        match cfg.effective_smtp() {
            Some(smtp) if smtp.is_suppressed() => {
                warn!(host = %smtp.host, "SMTP sending suppressed; notifications will skip SMTP")
            }
            Some(smtp) => match smtp::SmtpChannel::from_config(&smtp, cfg.mail.timeout()) {
                Ok(channel) => channels.push(Box::new(channel)),
                Err(err) => warn!(?err, "SMTP channel unusable; skipping"),
            },
            None => {}
        }

        if channels.is_empty() {
            warn!("no notification channel configured - emails will not be sent");
        } else {
            let names: Vec<_> = channels.iter().map(|c| c.name()).collect();
            info!(channels = ?names, "notification channels ready");
        }
        Self::new(channels)
    }

    pub fn is_configured(&self) -> bool {
        !self.channels.is_empty()
    }

    pub async fn dispatch(&self, message: &NotificationMessage) -> DispatchOutcome {
        if self.channels.is_empty() {
            warn!(subject = %message.subject, "email notification skipped: no channel configured");
            return DispatchOutcome::NotConfigured;
        }
        for channel in &self.channels {
            match channel.send(message).await {
                Ok(()) => {
                    info!(channel = channel.name(), to = %message.to, "notification sent");
                    return DispatchOutcome::Delivered {
                        channel: channel.name(),
                    };
                }
                Err(err) => {
                    warn!(channel = channel.name(), ?err, "notification channel failed");
                }
            }
        }
        DispatchOutcome::Failed
    }
}

/// Recipient and sign-off shared by every purchase notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letterhead {
    pub to: String,
    pub registry_name: String,
    pub site_url: String,
}

impl Letterhead {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            to: cfg.mail.to_address.clone(),
            registry_name: cfg.app.registry_name.clone(),
            site_url: cfg.app.site_url.clone(),
        }
    }
}

/// Compose the email telling the couple an item was bought.
pub fn purchase_notification(purchase: &Purchase, letterhead: &Letterhead) -> NotificationMessage {
    let mut body = format!(
        "Someone has purchased an item from your wedding registry!\n\n\
         Details:\n\
         - Item: {}\n\
         - Purchased by: {}\n\
         - Purchase date: {}\n\
         - Item URL: {}\n",
        purchase.item_title, purchase.name, purchase.purchase_date, purchase.item_url
    );
    if let Some(delivery) = &purchase.delivery_date {
        body.push_str(&format!("- Estimated delivery: {delivery}\n"));
    }
    if let Some(note) = &purchase.note {
        body.push_str(&format!("\nPersonal message from {}:\n\"{note}\"\n", purchase.name));
    }
    body.push_str(&format!(
        "\nCongratulations!\n\n---\n{}\n{}\n",
        letterhead.registry_name, letterhead.site_url
    ));

    NotificationMessage {
        to: letterhead.to.clone(),
        subject: format!("Registry Item Purchased: {}", purchase.item_title),
        body,
    }
}
