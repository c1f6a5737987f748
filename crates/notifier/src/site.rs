//! HTTP shop adapter.
//!
//! Product pages are fetched with plain GET requests. An item is looked up
//! under the object-path URL first and the object-id URL second; a page that
//! reports "not available" or a non-200 status means the id is unknown.
//!
//! Basket and checkout need an interactive browser session and are not
//! available over plain HTTP; those calls return [`SiteError::Unsupported`]
//! and the reconciler degrades to notify-only.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;

use plantwatch_core::{ItemId, SiteClient, SiteClientFactory, SiteCredentials, SiteError};

use crate::config::SiteConfig;

const PAGE_NOT_AVAILABLE: &str = "The page requested is not available.";
const OUT_OF_STOCK: &str = "Out of stock";

static ITEM_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"itemprop\s*=\s*["']name["'][^>]*>\s*([^<]*?)\s*<"#).expect("Invalid regex")
});

/// Opens [`HttpSiteClient`] sessions sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpSiteFactory {
    client: reqwest::Client,
    config: SiteConfig,
}

impl HttpSiteFactory {
    /// Create a factory.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(config: SiteConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SiteClientFactory for HttpSiteFactory {
    async fn open(&self, credentials: &SiteCredentials) -> Result<Box<dyn SiteClient>, SiteError> {
        tracing::debug!(user = %credentials.email, "Opening site session");
        Ok(Box::new(HttpSiteClient {
            client: self.client.clone(),
            product_path_url: self.config.product_path_url.clone(),
            object_id_url: self.config.object_id_url.clone(),
            pages: HashMap::new(),
            closed: false,
        }))
    }
}

/// One session against the shop website.
///
/// Product pages are cached for the lifetime of the session.
#[derive(Debug)]
pub struct HttpSiteClient {
    client: reqwest::Client,
    product_path_url: String,
    object_id_url: String,
    pages: HashMap<ItemId, Option<String>>,
    closed: bool,
}

impl HttpSiteClient {
    async fn page(&mut self, item_id: &ItemId) -> Result<&str, SiteError> {
        if self.closed {
            return Err(SiteError::Session("session already closed".to_owned()));
        }
        if !self.pages.contains_key(item_id) {
            let page = self.fetch(item_id).await?;
            if page.is_none() {
                tracing::warn!(item = %item_id, "Item page not found - is the ID correct?");
            }
            self.pages.insert(item_id.clone(), page);
        }

        self.pages
            .get(item_id)
            .and_then(Option::as_deref)
            .ok_or_else(|| SiteError::ItemNotFound {
                item_id: item_id.to_string(),
            })
    }

    async fn fetch(&self, item_id: &ItemId) -> Result<Option<String>, SiteError> {
        for base in [&self.product_path_url, &self.object_id_url] {
            let url = format!("{base}{item_id}");
            let response = self.client.get(&url).send().await.map_err(classify)?;
            if response.status() != StatusCode::OK {
                tracing::debug!(%url, status = %response.status(), "Product page lookup missed");
                continue;
            }
            let body = response.text().await.map_err(classify)?;
            if !body.contains(PAGE_NOT_AVAILABLE) {
                return Ok(Some(body));
            }
        }
        Ok(None)
    }
}

fn classify(err: reqwest::Error) -> SiteError {
    if err.is_timeout() {
        SiteError::Timeout
    } else {
        SiteError::Request(err.to_string())
    }
}

/// Whether a product page shows the item as orderable.
#[must_use]
pub fn page_shows_available(page: &str) -> bool {
    !page.contains(OUT_OF_STOCK)
}

/// Text of the first element carrying `itemprop="name"`.
#[must_use]
pub fn extract_item_name(page: &str) -> Option<String> {
    let raw = ITEM_NAME_RE.captures(page)?.get(1)?.as_str();
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.replace("&amp;", "&")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">"),
    )
}

#[async_trait]
impl SiteClient for HttpSiteClient {
    async fn is_item_available(&mut self, item_id: &ItemId) -> Result<bool, SiteError> {
        let page = self.page(item_id).await?;
        Ok(page_shows_available(page))
    }

    async fn item_name(&mut self, item_id: &ItemId) -> Result<String, SiteError> {
        let page = self.page(item_id).await?;
        extract_item_name(page)
            .ok_or_else(|| SiteError::Request(format!("no name element on page of {item_id}")))
    }

    async fn login(&mut self) -> Result<(), SiteError> {
        Err(SiteError::Unsupported("login"))
    }

    async fn clear_basket(&mut self) -> Result<(), SiteError> {
        Err(SiteError::Unsupported("clear_basket"))
    }

    async fn add_to_basket(&mut self, _item_id: &ItemId, _quantity: u8) -> Result<(), SiteError> {
        Err(SiteError::Unsupported("add_to_basket"))
    }

    async fn checkout(&mut self) -> Result<bool, SiteError> {
        Err(SiteError::Unsupported("checkout"))
    }

    async fn close(&mut self) -> Result<(), SiteError> {
        self.closed = true;
        self.pages.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="ProductDetails">
          <h1 itemprop="name">Anthurium regale</h1>
          <span class="Price">CHF 45.00</span>
          <button>Add to basket</button>
        </div>"#;

    #[test]
    fn test_extract_item_name() {
        assert_eq!(extract_item_name(PAGE).unwrap(), "Anthurium regale");
        assert_eq!(
            extract_item_name(r#"<span itemprop='name' class="x"> Philodendron &amp; Co </span>"#)
                .unwrap(),
            "Philodendron & Co"
        );
        assert_eq!(extract_item_name("<h1>No microdata</h1>"), None);
    }

    #[test]
    fn test_extract_first_name_only() {
        let page = r#"<h1 itemprop="name">First</h1><h2 itemprop="name">Second</h2>"#;
        assert_eq!(extract_item_name(page).unwrap(), "First");
    }

    #[test]
    fn test_availability_marker() {
        assert!(page_shows_available(PAGE));
        assert!(!page_shows_available("<p>Out of stock</p>"));
    }

    #[tokio::test]
    async fn test_basket_operations_are_unsupported() {
        let factory = HttpSiteFactory::new(SiteConfig::default()).unwrap();
        let mut client = HttpSiteClient {
            client: factory.client.clone(),
            product_path_url: String::new(),
            object_id_url: String::new(),
            pages: HashMap::new(),
            closed: false,
        };
        let id = ItemId::parse("PIE2081").unwrap();
        assert_eq!(client.login().await, Err(SiteError::Unsupported("login")));
        assert_eq!(
            client.add_to_basket(&id, 1).await,
            Err(SiteError::Unsupported("add_to_basket"))
        );
        assert_eq!(client.checkout().await, Err(SiteError::Unsupported("checkout")));

        client.close().await.unwrap();
        assert!(matches!(
            client.is_item_available(&id).await,
            Err(SiteError::Session(_))
        ));
    }
}
