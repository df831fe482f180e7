use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ApiRateLimiter, MarketDataProvider};
use crate::models::{Config, WeeklyClose};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "gmtoffset")]
    gmt_offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance chart API client (weekly bars)
pub struct YahooClient {
    client: Client,
    base_url: String,
    rate_limiter: ApiRateLimiter,
}

impl YahooClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.yahoo_chart_url.trim_end_matches('/').to_string(),
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    fn chart_url(&self, ticker: &str, from_date: NaiveDate, to_date: NaiveDate) -> Result<Url> {
        let start = from_date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()).unwrap_or(0);
        let end = to_date.and_hms_opt(23, 59, 59).map(|dt| dt.and_utc().timestamp()).unwrap_or(0);

        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("chart URL cannot take a path: {}", self.base_url))?
            .push(ticker);
        url.query_pairs_mut()
            .append_pair("period1", &start.to_string())
            .append_pair("period2", &end.to_string())
            .append_pair("interval", "1wk")
            .append_pair("events", "history")
            .append_pair("includeAdjustedClose", "true");
        Ok(url)
    }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    async fn weekly_closes(
        &self,
        ticker: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<Vec<WeeklyClose>> {
        let url = self.chart_url(ticker, from_date, to_date)?;
        self.rate_limiter.wait().await;
        debug!("Fetching weekly chart: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("chart request for {} failed", ticker))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chart request for {} failed with status {}",
                ticker,
                response.status()
            ));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .with_context(|| format!("invalid chart JSON for {}", ticker))?;
        let closes =
            closes_from_chart(chart).with_context(|| format!("no chart data for {}", ticker))?;

        debug!(
            "Retrieved {} weekly bars for {} from {} to {}",
            closes.len(),
            ticker,
            from_date,
            to_date
        );
        Ok(closes)
    }
}

/// Adjusted close per bar (plain close when the adjusted series is absent),
/// dated in the exchange's local time
fn closes_from_chart(response: ChartResponse) -> Result<Vec<WeeklyClose>> {
    if let Some(error) = response.chart.error.filter(|e| !e.is_null()) {
        return Err(anyhow!("chart API error: {}", error));
    }
    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("empty chart result"))?;

    let offset = result.meta.and_then(|m| m.gmt_offset).unwrap_or(0);
    let timestamps = result.timestamp.unwrap_or_default();

    let adjusted = result
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
        .map(|a| a.adjclose)
        .filter(|a| a.len() == timestamps.len());
    let closes = match adjusted {
        Some(closes) => closes,
        None => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    Ok(timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
            Some(WeeklyClose {
                date,
                close: closes.get(i).copied().flatten(),
            })
        })
        .collect())
}
