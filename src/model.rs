use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Header row of the registry sheet, in column order.
pub const SHEET_HEADERS: [&str; 8] = [
    "Timestamp",
    "URL",
    "Priority",
    "Image URL",
    "Price",
    "Bought?",
    TITLE_HEADER,
    "Bought by",
];

pub const TITLE_HEADER: &str = "Item Title (if not entered, website will try to make one)";

/// 1-based column of the "Bought?" flag.
pub const BOUGHT_COLUMN: usize = 6;
/// 1-based column of the "Bought by" name.
pub const BOUGHT_BY_COLUMN: usize = 8;
/// Data record `i` (0-based) lives on sheet row `i + FIRST_DATA_ROW`.
pub const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BoughtFlag {
    Yes,
    #[default]
    No,
}

impl BoughtFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoughtFlag::Yes => "Yes",
            BoughtFlag::No => "No",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("yes") {
            BoughtFlag::Yes
        } else {
            BoughtFlag::No
        }
    }
}

/// One registry record as stored in the sheet, cells kept as raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRow {
    pub timestamp: String,
    pub url: String,
    pub priority: String,
    pub image_url: String,
    pub price: String,
    pub bought: String,
    pub title: String,
    pub bought_by: String,
}

impl RegistryRow {
    /// Build a row from a header-keyed record; absent headers become empty cells.
    pub fn from_record(record: &HashMap<&str, &str>) -> Self {
        let cell = |name: &str| record.get(name).map(|v| v.to_string()).unwrap_or_default();
        Self {
            timestamp: cell("Timestamp"),
            url: cell("URL"),
            priority: cell("Priority"),
            image_url: cell("Image URL"),
            price: cell("Price"),
            bought: cell("Bought?"),
            title: cell(TITLE_HEADER),
            bought_by: cell("Bought by"),
        }
    }

    pub fn bought_flag(&self) -> BoughtFlag {
        BoughtFlag::parse(&self.bought)
    }
}

/// Display-ready projection of a registry row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayItem {
    pub url: String,
    pub title: String,
    pub priority: i64,
    pub price: f64,
    pub image_url: Option<String>,
    pub bought: BoughtFlag,
    pub bought_by: Option<String>,
}

/// Inbound purchase payload. Every field is optional on the wire so that
/// validation can name the missing one. Fields take strings, numbers or
/// booleans; falsy values (`null`, `false`, `0`) count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PurchaseRequest {
    #[serde(default, deserialize_with = "loose_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub purchase_date: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub item_title: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub item_url: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub delivery_date: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub note: Option<String>,
}

fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".into()),
        _ => None,
    })
}

/// A purchase request whose required fields are present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub name: String,
    pub purchase_date: String,
    pub item_title: String,
    pub item_url: String,
    pub delivery_date: Option<String>,
    pub note: Option<String>,
}

impl PurchaseRequest {
    /// Checks `name`, `purchase_date`, `item_title`, `item_url` in that order.
    /// Returns the first missing or empty required field, or the validated purchase.
    pub fn validate(self) -> Result<Purchase, &'static str> {
        fn required(value: Option<String>, field: &'static str) -> Result<String, &'static str> {
            value.filter(|v| !v.trim().is_empty()).ok_or(field)
        }
        let optional = |v: Option<String>| v.filter(|v| !v.trim().is_empty());

        Ok(Purchase {
            name: required(self.name, "name")?,
            purchase_date: required(self.purchase_date, "purchase_date")?,
            item_title: required(self.item_title, "item_title")?,
            item_url: required(self.item_url, "item_url")?,
            delivery_date: optional(self.delivery_date),
            note: optional(self.note),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}
