//! Purchase workflow: validate, mark the row bought, notify the couple.
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::model::{
    BoughtFlag, PurchaseRequest, BOUGHT_BY_COLUMN, BOUGHT_COLUMN, FIRST_DATA_ROW,
};
use crate::notify::{purchase_notification, DispatchOutcome, Dispatcher, Letterhead};
use crate::sheets::{ConnectivityError, RegistrySheet};

pub const THANK_YOU: &str = "Thank you for your purchase!";

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("Missing required field: {field}")]
    Validation { field: &'static str },
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub message: &'static str,
    /// Sheet row that was marked bought; `None` when no row had the item URL.
    pub row: Option<usize>,
    pub notification: DispatchOutcome,
}

pub struct PurchaseWorkflow {
    sheet: Arc<dyn RegistrySheet>,
    dispatcher: Arc<Dispatcher>,
    letterhead: Letterhead,
}

impl PurchaseWorkflow {
    pub fn new(
        sheet: Arc<dyn RegistrySheet>,
        dispatcher: Arc<Dispatcher>,
        letterhead: Letterhead,
    ) -> Self {
        Self {
            sheet,
            dispatcher,
            letterhead,
        }
    }

    /// Only validation and sheet failures fail the purchase. An unknown item
    /// URL or an undelivered notification is logged and still succeeds.
    #[instrument(skip_all)]
    pub async fn record(&self, request: PurchaseRequest) -> Result<PurchaseReceipt, PurchaseError> {
        let purchase = request.validate().map_err(|field| {
            warn!(field, "missing required field");
            PurchaseError::Validation { field }
        })?;
        info!(item = %purchase.item_title, "purchase request received");

        let rows = self.sheet.fetch_all_rows().await?;
        let row = rows
            .iter()
            .position(|r| r.url == purchase.item_url)
            .map(|i| i + FIRST_DATA_ROW);

        match row {
            Some(row) => {
                // Two independent writes; a failure between them leaves the flag without a buyer.
                self.sheet
                    .update_cell(row, BOUGHT_COLUMN, BoughtFlag::Yes.as_str())
                    .await?;
                self.sheet
                    .update_cell(row, BOUGHT_BY_COLUMN, &purchase.name)
                    .await?;
                info!(row, "registry row marked bought");
            }
            None => warn!(url = %purchase.item_url, "could not find row for item URL"),
        }

        let message = purchase_notification(&purchase, &self.letterhead);
        let notification = self.dispatcher.dispatch(&message).await;
        if !notification.delivered() {
            warn!(
                item = %purchase.item_title,
                buyer = %purchase.name,
                ?notification,
                "email not sent - purchase recorded"
            );
        }

        Ok(PurchaseReceipt {
            message: THANK_YOU,
            row,
            notification,
        })
    }
}
