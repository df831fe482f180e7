//! Weekly foreign-investor balance from the JPX investor-type statistics

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{info, warn};

use crate::api::{find_document_link, is_excel_link, is_pdf_link, BalanceExtractor, HttpFetcher};
use crate::chart::render_trend;
use crate::extract::{load_grid, CellLocator, Grid, LabelMatch, SearchScope};
use crate::history::{HistoryStore, MergeOutcome, MergePolicy};
use crate::models::{Config, HistoryRow};
use crate::utils::parse_label_date;

pub const EXCEL_CHART_TITLE: &str = "Foreign Investors Net Trading Volume (Weekly)";
pub const PDF_CHART_TITLE: &str = "Foreign Investors Balance Trend";

/// The "買い" line under the foreigners block holds the balance in column K
pub fn default_balance_locator() -> CellLocator {
    let english = LabelMatch::contains(&["Foreigners"]);
    let fuzzy = LabelMatch::fuzzy(&["海外投資家"], 1);
    CellLocator::label(LabelMatch::contains(&["海外投資家"]), SearchScope::Column(0))
        .offset(1, 10)
        .or_else(CellLocator::label(english, SearchScope::Column(0)).offset(1, 10))
        .or_else(CellLocator::label(fuzzy, SearchScope::Anywhere).offset(1, 10))
}

pub fn date_label_locator() -> CellLocator {
    CellLocator::at(3, 0)
}

/// Read a balance locator from a JSON file
pub fn load_locator(path: &Path) -> Result<CellLocator> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid locator JSON in {}", path.display()))
}

/// Balance and period pulled out of one workbook
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceObservation {
    pub date: NaiveDate,
    pub balance: i64,
    pub label: Option<String>,
}

impl BalanceObservation {
    pub fn into_row(self) -> HistoryRow {
        HistoryRow {
            date: self.date,
            balance: self.balance,
            label: self.label,
        }
    }
}

/// Resolve the balance and the period label in `grid`. A label without a
/// readable date falls back to `today`.
pub fn extract_observation(
    grid: &Grid,
    balance_locator: &CellLocator,
    date_locator: &CellLocator,
    today: NaiveDate,
) -> Result<BalanceObservation> {
    let balance = balance_locator
        .extract_number(grid)
        .context("foreign-investor balance not found in workbook")?;

    let label = match date_locator.extract_text(grid) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("⚠️ No period label in workbook: {}", e);
            None
        }
    };

    let date = match label.as_deref().and_then(parse_label_date) {
        Some(date) => date,
        None => {
            warn!("⚠️ No date in period label {:?}, using {}", label, today);
            today
        }
    };

    Ok(BalanceObservation {
        date,
        balance: balance.round() as i64,
        label,
    })
}

/// Excel path: latest workbook on the archive page, merged without
/// overwriting an existing date
pub async fn run_excel(
    config: &Config,
    fetcher: &HttpFetcher,
    balance_locator: &CellLocator,
    today: NaiveDate,
) -> Result<MergeOutcome> {
    info!("🔎 Looking for the latest investor-type workbook...");
    let page_url = config.investor_archive_url.as_str();
    let html = fetcher.get_text(page_url).await?;
    let excel_url = find_document_link(&html, page_url, is_excel_link)?
        .ok_or_else(|| anyhow!("no Excel link found on {}", page_url))?;
    info!("Latest workbook: {}", excel_url);

    let bytes = fetcher.get_bytes(excel_url.as_str()).await?;
    let grid = load_grid(&bytes)?;
    let observation = extract_observation(&grid, balance_locator, &date_label_locator(), today)?;
    info!("🌏 Foreign balance for {}: {}", observation.date, observation.balance);

    let mut store = HistoryStore::load(&config.history_csv)?;
    let date = observation.date;
    let outcome = store.merge(observation.into_row(), MergePolicy::KeepExisting);
    if !outcome.changed() {
        info!("No new data found ({} already recorded)", date);
        return Ok(outcome);
    }

    info!("✅ Added: {}", date);
    store.save()?;
    render_trend(store.rows(), &config.trend_chart, EXCEL_CHART_TITLE)?;
    Ok(outcome)
}

/// PDF path: latest report read by a language model, recorded under `today`
/// and replacing any earlier figure for that date
pub async fn run_pdf(
    config: &Config,
    fetcher: &HttpFetcher,
    extractor: &dyn BalanceExtractor,
    today: NaiveDate,
) -> Result<MergeOutcome> {
    info!("🔎 Looking for the latest investor-type PDF...");
    let page_url = config.investor_archive_url.as_str();
    let html = fetcher.get_text(page_url).await?;
    let pdf_url = find_document_link(&html, page_url, is_pdf_link)?
        .ok_or_else(|| anyhow!("no PDF link found on {}", page_url))?;
    info!("Latest report: {}", pdf_url);

    let pdf = fetcher.get_bytes(pdf_url.as_str()).await?;
    let balance = extractor.extract_balance(&pdf).await?;
    info!("🌏 Foreign balance: {}", balance);

    let mut store = HistoryStore::load(&config.history_csv)?;
    let outcome = store.merge(HistoryRow::new(today, balance), MergePolicy::Replace);
    store.save()?;
    render_trend(store.rows(), &config.trend_chart, PDF_CHART_TITLE)?;
    Ok(outcome)
}
