//! Product title lookup for registry rows entered without a title.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::config;

pub const FALLBACK_TITLE: &str = "Product";

/// Most specific product markup first, page `<title>` last.
const TITLE_SELECTORS: [&str; 5] = [
    r#"[data-testid="product-title"]"#,
    ".product-title",
    ".pdp-product-name",
    "h1",
    "title",
];

static SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    TITLE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    /// Fetch failed or no selector matched.
    Fallback,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback)
    }

    pub fn into_title(self) -> String {
        match self {
            Resolution::Resolved(title) => title,
            Resolution::Fallback => FALLBACK_TITLE.to_string(),
        }
    }
}

#[async_trait]
pub trait TitleResolver: Send + Sync {
    /// Never fails; problems degrade to `Resolution::Fallback`.
    async fn resolve_title(&self, url: &str) -> Resolution;
}

#[derive(Debug, Clone)]
pub struct HttpTitleResolver {
    http: Client,
}

impl HttpTitleResolver {
    pub fn from_config(cfg: &config::Title) -> Result<Self> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .timeout(cfg.timeout())
            .build()
            .context("failed to build title HTTP client")?;
        Ok(Self { http })
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?;
        if !res.status().is_success() {
            return Err(anyhow!("product page returned {}", res.status()));
        }
        res.text().await.context("failed to read product page")
    }
}

#[async_trait]
impl TitleResolver for HttpTitleResolver {
    async fn resolve_title(&self, url: &str) -> Resolution {
        let page = match self.fetch_page(url).await {
            Ok(page) => page,
            Err(err) => {
                warn!(url, ?err, "could not scrape title");
                return Resolution::Fallback;
            }
        };
        match extract_title(&page) {
            Some(title) => {
                debug!(url, title = %title, "scraped product title");
                Resolution::Resolved(title)
            }
            None => {
                warn!(url, "no title markup found");
                Resolution::Fallback
            }
        }
    }
}

/// First non-empty text among the title selectors, whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    SELECTORS.iter().find_map(|selector| {
        doc.select(selector)
            .next()
            .map(|el| collapse_whitespace(el.text()))
            .filter(|text| !text.is_empty())
    })
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
