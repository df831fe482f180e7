use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use encoding_rs::{Encoding, UTF_8};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::models::{Config, WeeklyClose};

pub mod gemini_client;
pub mod yahoo_client;
pub use gemini_client::GeminiClient;
pub use yahoo_client::YahooClient;

/// Request pacing shared by every download of a run
pub struct ApiRateLimiter {
    inner: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// Source of weekly closing prices
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn weekly_closes(
        &self,
        ticker: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<Vec<WeeklyClose>>;
}

/// Something that can read the foreign-investor balance out of a PDF report
#[async_trait]
pub trait BalanceExtractor: Send + Sync {
    async fn extract_balance(&self, pdf: &[u8]) -> Result<i64>;
}

/// Plain GET client for pages and documents
pub struct HttpFetcher {
    client: Client,
    rate_limiter: ApiRateLimiter,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        self.rate_limiter.wait().await;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        Ok(response)
    }

    async fn send_ok(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.send(url).await?;
        if !response.status().is_success() {
            return Err(anyhow!("GET {} failed with status {}", url, response.status()));
        }
        Ok(response)
    }

    /// Fetch a page and decode it using the declared or sniffed charset
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send_ok(url).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok(decode_page(&bytes, content_type.as_deref()))
    }

    /// Download a binary document
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send_ok(url).await?;
        let bytes = response.bytes().await?;
        info!("📥 Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    /// Fetch JSON, treating 404 as "not published yet"
    pub async fn get_json_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let response = self.send(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            info!("JSON not found (404): {}", url);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("GET {} failed with status {}", url, response.status()));
        }
        let value = response
            .json::<T>()
            .await
            .with_context(|| format!("invalid JSON from {}", url))?;
        Ok(Some(value))
    }
}

fn meta_charset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#)
            .expect("valid charset regex")
    })
}

fn encoding_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches('"').as_bytes())
    })
}

/// Decode page bytes: `Content-Type` charset first, then `<meta charset>`,
/// then UTF-8. A BOM overrides all of them.
pub fn decode_page(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(encoding_from_content_type)
        .or_else(|| {
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);
            meta_charset_regex()
                .captures(&head)
                .and_then(|caps| Encoding::for_label(caps[1].as_bytes()))
        })
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!("Page decoded as {} with replacement characters", used.name());
    }
    text.into_owned()
}

/// First `a[href]` in document order whose href satisfies `accept`,
/// resolved against the page URL
pub fn find_document_link<F>(html: &str, page_url: &str, accept: F) -> Result<Option<Url>>
where
    F: Fn(&str) -> bool,
{
    let base = Url::parse(page_url).with_context(|| format!("invalid page URL {}", page_url))?;
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").map_err(|e| anyhow!("invalid selector: {:?}", e))?;

    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if accept(href) {
            let url = base
                .join(href)
                .with_context(|| format!("cannot resolve link {}", href))?;
            return Ok(Some(url));
        }
    }
    Ok(None)
}

fn link_path(href: &str) -> String {
    href.split(['?', '#']).next().unwrap_or("").to_ascii_lowercase()
}

/// Spreadsheet download links (`.xls` / `.xlsx`)
pub fn is_excel_link(href: &str) -> bool {
    let path = link_path(href);
    path.ends_with(".xls") || path.ends_with(".xlsx")
}

pub fn is_pdf_link(href: &str) -> bool {
    href.to_ascii_lowercase().contains(".pdf")
}
