use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{ApiRateLimiter, BalanceExtractor};
use crate::models::Config;

const BALANCE_PROMPT: &str = "\
This PDF is the JPX weekly report \"Trading by Type of Investors\" (投資部門別売買状況).
Find the row for 海外投資家 (Foreigners), take its 買い (Purchases) line and return the
差引き (Balance) amount on that line.
Reply with the number only: digits with an optional leading minus sign, no commas,
no units and no explanation. Example: 750493712 or -123456789.
Do not return a ratio (比率) or a figure from any other column.";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    InlineData { inline_data: InlineData },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

/// Gemini `generateContent` client used to read figures out of PDF reports
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    rate_limiter: ApiRateLimiter,
}

impl GeminiClient {
    /// Create a new client; fails when no API key is configured
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY environment variable required"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs.max(120)))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    /// Send a PDF with a prompt and return the concatenated reply text
    pub async fn ask_about_pdf(&self, pdf: &[u8], prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "application/pdf",
                            data: general_purpose::STANDARD.encode(pdf),
                        },
                    },
                    Part::Text { text: prompt },
                ],
            }],
        };

        self.rate_limiter.wait().await;
        debug!("POST {} ({} byte PDF)", url, pdf.len());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Gemini request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini request failed with status {}: {}", status, error_text));
        }

        let body: GenerateResponse = response.json().await.context("invalid Gemini response")?;
        let text: String = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(anyhow!("Gemini returned no text"));
        }
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl BalanceExtractor for GeminiClient {
    async fn extract_balance(&self, pdf: &[u8]) -> Result<i64> {
        info!("🤖 Asking {} for the foreign-investor balance...", self.model);
        let reply = self.ask_about_pdf(pdf, BALANCE_PROMPT).await?;
        info!("Gemini reply: {}", reply);
        parse_balance_reply(&reply)
    }
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+").expect("valid integer regex"))
}

/// First integer in a model reply, ignoring thousands separators and spaces
pub fn parse_balance_reply(reply: &str) -> Result<i64> {
    let cleaned: String = reply.chars().filter(|c| *c != ',' && *c != ' ').collect();
    let found = integer_regex()
        .find(&cleaned)
        .ok_or_else(|| anyhow!("no number in Gemini reply: {:?}", reply))?;
    found
        .as_str()
        .parse::<i64>()
        .with_context(|| format!("number out of range in Gemini reply: {:?}", reply))
}
