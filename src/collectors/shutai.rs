//! Weekly trading by investor type as tabulated on nikkei225jp.com

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::api::HttpFetcher;
use crate::extract::parse_flow_value;
use crate::history::{merge_dated_records, read_json_or_default, write_json_pretty};
use crate::models::{Config, ShutaiRecord};

const MIN_CELLS: usize = 14;

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {}: {:?}", css, e))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>()
}

/// Weekly rows of `table#datatbl`. Header rows, short rows, yearly rows
/// (`tr.yy`) and monthly/yearly totals are skipped, as are rows whose date
/// does not parse.
pub fn parse_shutai_table(html: &str) -> Result<Vec<ShutaiRecord>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table#datatbl")?;
    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;
    let time_sel = selector("time")?;

    let Some(table) = document.select(&table_sel).next() else {
        warn!("⚠️ Table #datatbl not found");
        return Ok(Vec::new());
    };

    let rows: Vec<ElementRef> = table.select(&row_sel).collect();
    debug!("Found {} rows", rows.len());

    let mut records = Vec::new();
    for row in rows {
        if row.select(&th_sel).next().is_some() {
            continue;
        }
        let cells: Vec<ElementRef> = row.select(&td_sel).collect();
        if cells.len() < MIN_CELLS {
            continue;
        }
        if row.value().classes().any(|c| c == "yy") {
            continue;
        }

        let first = &cells[0];
        let date_text = match first.select(&time_sel).next() {
            Some(time) => cell_text(&time),
            None => cell_text(first),
        };
        let Some(token) = date_text.split_whitespace().next() else {
            continue;
        };
        if token.contains("月計") || token.contains("年計") {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(token, "%Y/%m/%d") else {
            debug!("Skipping row with date {:?}", token);
            continue;
        };

        let value = |i: usize| parse_flow_value(&cell_text(&cells[i]));
        records.push(ShutaiRecord {
            date: date.format("%Y-%m-%d").to_string(),
            nikkei_avg: value(1),
            foreign: value(3),
            securities_self: value(4),
            individual_total: value(5),
            individual_cash: value(6),
            individual_credit: value(7),
            investment_trust: value(8),
            business_corp: value(9),
            other_corp: value(10),
            trust_banks: value(11),
            insurance: value(12),
            city_banks: value(13),
        });
    }

    Ok(records)
}

/// Scrape the page and update the JSON store. Debug mode replaces the store
/// with the freshly scraped rows. Returns the number of records written.
pub async fn run(config: &Config, fetcher: &HttpFetcher, debug_mode: bool) -> Result<usize> {
    info!("🕷️ Scraping {} (debug mode: {})", config.shutai_url, debug_mode);
    let html = fetcher.get_text(&config.shutai_url).await?;
    let mut records = parse_shutai_table(&html)?;
    info!("Extracted {} valid weekly records", records.len());

    if records.is_empty() {
        warn!("⚠️ No valid records, nothing saved (the table may be rendered by JavaScript)");
        return Ok(0);
    }

    info!("Latest records:");
    for record in &records[records.len().saturating_sub(5)..] {
        info!(
            "  {}: 海外={}, 個人計={}",
            record.date, record.foreign, record.individual_total
        );
    }

    let path = config.shutai_json.as_path();
    let final_list = if debug_mode {
        info!("DEBUG MODE: overwriting all data");
        records.sort_by(|a, b| a.date.cmp(&b.date));
        records
    } else {
        let existing: Vec<ShutaiRecord> = read_json_or_default(path);
        info!("Merging with {} existing records", existing.len());
        merge_dated_records(existing, records)
    };

    write_json_pretty(path, &final_list)?;
    info!("✅ Saved {} records to {}", final_list.len(), path.display());
    Ok(final_list.len())
}
