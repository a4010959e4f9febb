//! Registry listing: raw sheet rows into sorted display items.
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{error, info, instrument};

use crate::model::{DisplayItem, RegistryRow};
use crate::sheets::RegistrySheet;
use crate::title::TitleResolver;

pub const LISTING_UNAVAILABLE: &str =
    "Unable to load registry at this time. Please try again later.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub items: Vec<DisplayItem>,
    /// User-facing message when the sheet could not be read.
    pub error: Option<&'static str>,
}

impl Listing {
    pub fn unavailable() -> Self {
        Self {
            items: Vec::new(),
            error: Some(LISTING_UNAVAILABLE),
        }
    }
}

/// Fetch and normalize every row. A sheet failure yields an empty listing
/// with the error flag set rather than an error.
#[instrument(skip_all)]
pub async fn load_listing(sheet: &dyn RegistrySheet, resolver: &dyn TitleResolver) -> Listing {
    match sheet.fetch_all_rows().await {
        Ok(rows) => Listing {
            items: normalize(rows, resolver).await,
            error: None,
        },
        Err(err) => {
            error!(%err, "error loading registry");
            Listing::unavailable()
        }
    }
}

/// Resolve missing titles, coerce numbers, then order by priority descending
/// and price ascending. Ties keep sheet order.
pub async fn normalize(rows: Vec<RegistryRow>, resolver: &dyn TitleResolver) -> Vec<DisplayItem> {
    let mut items = Vec::with_capacity(rows.len());
    let mut fallbacks = 0usize;
    for row in rows {
        let title = if row.title.trim().is_empty() && !row.url.trim().is_empty() {
            let resolution = resolver.resolve_title(&row.url).await;
            if resolution.is_fallback() {
                fallbacks += 1;
            }
            resolution.into_title()
        } else {
            row.title.clone()
        };
        items.push(display_item(row, title));
    }
    sort_items(&mut items);
    info!(items = items.len(), title_fallbacks = fallbacks, "registry normalized");
    items
}

pub fn sort_items(items: &mut [DisplayItem]) {
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal))
    });
}

fn display_item(row: RegistryRow, title: String) -> DisplayItem {
    let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };
    DisplayItem {
        priority: parse_priority(&row.priority),
        price: parse_price(&row.price),
        bought: row.bought_flag(),
        url: row.url,
        title,
        image_url: non_empty(row.image_url),
        bought_by: non_empty(row.bought_by),
    }
}

/// Integer priority; fractional values truncate, anything else is 0.
pub fn parse_priority(raw: &str) -> i64 {
    let raw = raw.trim();
    raw.parse::<i64>().unwrap_or_else(|_| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
            .unwrap_or(0)
    })
}

pub fn parse_price(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
