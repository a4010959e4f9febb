use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

use wedding_site::model::{NotificationMessage, PurchaseRequest, RegistryRow};
use wedding_site::notify::{Channel, DispatchOutcome, Dispatcher, Letterhead};
use wedding_site::purchase::{PurchaseError, PurchaseWorkflow, THANK_YOU};
use wedding_site::sheets::{ConnectivityError, RegistrySheet};

#[derive(Clone, Default)]
struct RecordingSheet {
    rows: Vec<RegistryRow>,
    fail_fetch: bool,
    /// Fail every update once this many have succeeded.
    fail_after_updates: Option<usize>,
    fetches: Arc<Mutex<usize>>,
    updates: Arc<Mutex<Vec<(usize, usize, String)>>>,
}

impl RecordingSheet {
    fn with_rows(urls: &[&str]) -> Self {
        Self {
            rows: urls
                .iter()
                .map(|url| RegistryRow {
                    url: url.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    async fn fetches(&self) -> usize {
        *self.fetches.lock().await
    }

    async fn updates(&self) -> Vec<(usize, usize, String)> {
        self.updates.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl RegistrySheet for RecordingSheet {
    async fn fetch_all_rows(&self) -> Result<Vec<RegistryRow>, ConnectivityError> {
        *self.fetches.lock().await += 1;
        if self.fail_fetch {
            return Err(ConnectivityError::new("Unable to reach Google Sheets"));
        }
        Ok(self.rows.clone())
    }

    async fn update_cell(&self, row: usize, column: usize, value: &str) -> Result<(), ConnectivityError> {
        let mut updates = self.updates.lock().await;
        if self.fail_after_updates.is_some_and(|n| updates.len() >= n) {
            return Err(ConnectivityError::new("write rejected"));
        }
        updates.push((row, column, value.to_string()));
        Ok(())
    }
}

#[derive(Clone)]
struct RecordingChannel {
    name: &'static str,
    succeed: bool,
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
}

impl RecordingChannel {
    fn new(name: &'static str, succeed: bool) -> Self {
        Self {
            name,
            succeed,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        self.sent.lock().await.push(message.clone());
        if self.succeed {
            Ok(())
        } else {
            Err(anyhow!("{} unavailable", self.name))
        }
    }
}

fn dispatcher(channels: &[&RecordingChannel]) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        channels
            .iter()
            .map(|c| Box::new((*c).clone()) as Box<dyn Channel>)
            .collect(),
    ))
}

fn workflow(sheet: &RecordingSheet, dispatcher: Arc<Dispatcher>) -> PurchaseWorkflow {
    PurchaseWorkflow::new(
        Arc::new(sheet.clone()),
        dispatcher,
        Letterhead {
            to: "couple@example.com".into(),
            registry_name: "Wedding Registry".into(),
            site_url: "https://wedding.example".into(),
        },
    )
}

fn request(url: &str) -> PurchaseRequest {
    PurchaseRequest {
        name: Some("Jane Smith".into()),
        purchase_date: Some("2025-08-30".into()),
        item_title: Some("Beautiful Vase".into()),
        item_url: Some(url.into()),
        delivery_date: Some("2025-09-05".into()),
        note: None,
    }
}

fn message() -> NotificationMessage {
    NotificationMessage {
        to: "couple@example.com".into(),
        subject: "Registry Item Purchased: Vase".into(),
        body: "details".into(),
    }
}

#[tokio::test]
async fn matched_purchase_writes_flag_and_buyer() {
    let sheet = RecordingSheet::with_rows(&["https://example.com/item1", "https://example.com/item2"]);
    let channel = RecordingChannel::new("smtp", true);
    let receipt = workflow(&sheet, dispatcher(&[&channel]))
        .record(request("https://example.com/item2"))
        .await
        .unwrap();

    assert_eq!(receipt.message, THANK_YOU);
    assert_eq!(receipt.row, Some(3));
    assert_eq!(
        sheet.updates().await,
        vec![(3, 6, "Yes".to_string()), (3, 8, "Jane Smith".to_string())]
    );
    assert_eq!(receipt.notification, DispatchOutcome::Delivered { channel: "smtp" });

    let sent = channel.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "couple@example.com");
    assert_eq!(sent[0].subject, "Registry Item Purchased: Beautiful Vase");
    assert!(sent[0].body.contains("- Estimated delivery: 2025-09-05"));
    assert!(sent[0].body.ends_with("Wedding Registry\nhttps://wedding.example\n"));
}

#[tokio::test]
async fn purchase_succeeds_when_every_channel_fails() {
    let sheet = RecordingSheet::with_rows(&["https://example.com/item1"]);
    let primary = RecordingChannel::new("acs", false);
    let secondary = RecordingChannel::new("smtp", false);
    let receipt = workflow(&sheet, dispatcher(&[&primary, &secondary]))
        .record(request("https://example.com/item1"))
        .await
        .unwrap();

    assert_eq!(receipt.row, Some(2));
    assert_eq!(sheet.updates().await.len(), 2);
    assert_eq!(receipt.notification, DispatchOutcome::Failed);
    assert_eq!(primary.sent().await.len(), 1);
    assert_eq!(secondary.sent().await.len(), 1);
}

#[tokio::test]
async fn purchase_succeeds_without_any_channel() {
    let sheet = RecordingSheet::with_rows(&["https://example.com/item1"]);
    let receipt = workflow(&sheet, dispatcher(&[]))
        .record(request("https://example.com/item1"))
        .await
        .unwrap();
    assert_eq!(receipt.notification, DispatchOutcome::NotConfigured);
    assert_eq!(receipt.message, THANK_YOU);
}

#[tokio::test]
async fn missing_field_is_rejected_before_touching_the_sheet() {
    let sheet = RecordingSheet::with_rows(&["https://example.com/item1"]);
    let channel = RecordingChannel::new("smtp", true);
    let flow = workflow(&sheet, dispatcher(&[&channel]));

    for field in ["name", "purchase_date", "item_title", "item_url"] {
        let mut req = request("https://example.com/item1");
        match field {
            "name" => req.name = None,
            "purchase_date" => req.purchase_date = Some(String::new()),
            "item_title" => req.item_title = None,
            _ => req.item_url = Some("   ".into()),
        }
        let err = flow.record(req).await.unwrap_err();
        assert!(matches!(err, PurchaseError::Validation { field: f } if f == field));
        assert_eq!(err.to_string(), format!("Missing required field: {field}"));
    }

    assert_eq!(sheet.fetches().await, 0);
    assert!(sheet.updates().await.is_empty());
    assert!(channel.sent().await.is_empty());
}

// An unknown item URL leaves the sheet untouched yet the buyer is thanked and
// the couple notified.
#[tokio::test]
async fn unmatched_url_still_reports_success() {
    let sheet = RecordingSheet::with_rows(&["https://example.com/item1"]);
    let channel = RecordingChannel::new("smtp", true);
    let receipt = workflow(&sheet, dispatcher(&[&channel]))
        .record(request("https://example.com/unknown"))
        .await
        .unwrap();

    assert_eq!(receipt.message, THANK_YOU);
    assert_eq!(receipt.row, None);
    assert!(sheet.updates().await.is_empty());
    assert_eq!(channel.sent().await.len(), 1);
}

#[tokio::test]
async fn sheet_outage_fails_the_purchase_without_notifying() {
    let sheet = RecordingSheet {
        fail_fetch: true,
        ..RecordingSheet::with_rows(&["https://example.com/item1"])
    };
    let channel = RecordingChannel::new("smtp", true);
    let err = workflow(&sheet, dispatcher(&[&channel]))
        .record(request("https://example.com/item1"))
        .await
        .unwrap_err();

    assert!(matches!(err, PurchaseError::Connectivity(_)));
    assert!(sheet.updates().await.is_empty());
    assert!(channel.sent().await.is_empty());
}

#[tokio::test]
async fn failed_second_write_leaves_flag_without_buyer() {
    let sheet = RecordingSheet {
        fail_after_updates: Some(1),
        ..RecordingSheet::with_rows(&["https://example.com/item1"])
    };
    let channel = RecordingChannel::new("smtp", true);
    let err = workflow(&sheet, dispatcher(&[&channel]))
        .record(request("https://example.com/item1"))
        .await
        .unwrap_err();

    assert!(matches!(err, PurchaseError::Connectivity(_)));
    assert_eq!(sheet.updates().await, vec![(2, 6, "Yes".to_string())]);
    assert!(channel.sent().await.is_empty());
}

#[tokio::test]
async fn dispatcher_stops_at_first_success() {
    let primary = RecordingChannel::new("acs", true);
    let secondary = RecordingChannel::new("smtp", true);
    let outcome = dispatcher(&[&primary, &secondary]).dispatch(&message()).await;
    assert_eq!(outcome, DispatchOutcome::Delivered { channel: "acs" });
    assert_eq!(primary.sent().await.len(), 1);
    assert!(secondary.sent().await.is_empty());
}

#[tokio::test]
async fn dispatcher_falls_back_to_secondary() {
    let primary = RecordingChannel::new("acs", false);
    let secondary = RecordingChannel::new("smtp", true);
    let outcome = dispatcher(&[&primary, &secondary]).dispatch(&message()).await;
    assert_eq!(outcome, DispatchOutcome::Delivered { channel: "smtp" });
    assert!(outcome.delivered());
    assert_eq!(secondary.sent().await, vec![message()]);
}

#[tokio::test]
async fn dispatcher_with_failing_secondary_only_returns_false() {
    let secondary = RecordingChannel::new("smtp", false);
    let outcome = dispatcher(&[&secondary]).dispatch(&message()).await;
    assert_eq!(secondary.sent().await.len(), 1);
    assert!(!outcome.delivered());
    assert_eq!(outcome, DispatchOutcome::Failed);
}

#[tokio::test]
async fn dispatcher_without_channels_attempts_nothing() {
    let d = dispatcher(&[]);
    assert!(!d.is_configured());
    let outcome = d.dispatch(&message()).await;
    assert_eq!(outcome, DispatchOutcome::NotConfigured);
    assert!(!outcome.delivered());
}
