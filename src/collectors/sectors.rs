//! Weekly sector returns lined up against the foreign-investor flow

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::api::MarketDataProvider;
use crate::history::{write_json_pretty, HistoryStore};
use crate::models::{
    Config, HistoryRow, SectorConfig, SectorEntry, SectorMetadata, SectorReport, WeeklyClose,
};

/// Market dates further than this from a history date are not matched
pub const MAX_DATE_GAP_DAYS: i64 = 7;
const CONCURRENT_REQUESTS: usize = 4;

/// Weekly percent returns keyed by bar date; `None` where no return exists
pub type ReturnSeries = BTreeMap<NaiveDate, Option<f64>>;

/// Sector list from a JSON file, or the built-in benchmarks
pub fn load_sector_config(path: Option<&Path>) -> Result<Vec<SectorConfig>> {
    let Some(path) = path else {
        return Ok(SectorConfig::defaults());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let sectors: Vec<SectorConfig> = serde_json::from_str(&content)
        .with_context(|| format!("invalid sector list in {}", path.display()))?;
    if sectors.is_empty() {
        bail!("sector list {} is empty", path.display());
    }
    Ok(sectors)
}

/// Week-over-week change in percent. A missing close carries the last known
/// close forward, so its return is zero; the first bar has no return.
pub fn weekly_returns(closes: &[WeeklyClose]) -> ReturnSeries {
    let mut sorted = closes.to_vec();
    sorted.sort_by_key(|c| c.date);

    let mut returns = ReturnSeries::new();
    let mut last_close: Option<f64> = None;
    for bar in sorted {
        let current = bar.close.or(last_close);
        let change = match (last_close, current) {
            (Some(prev), Some(cur)) if prev != 0.0 => Some((cur / prev - 1.0) * 100.0),
            _ => None,
        };
        returns.insert(bar.date, change);
        if current.is_some() {
            last_close = current;
        }
    }
    returns
}

/// Closest date in `dates`; the later one wins a tie
pub fn nearest_date(dates: &BTreeSet<NaiveDate>, target: NaiveDate) -> Option<NaiveDate> {
    let before = dates.range(..=target).next_back().copied();
    let after = dates.range(target..).next().copied();
    match (before, after) {
        (Some(b), Some(a)) => Some(if (a - target) <= (target - b) { a } else { b }),
        (b, a) => b.or(a),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Join each history row with the returns of the nearest market week
pub fn build_sector_report(
    history: &[HistoryRow],
    sectors: &[SectorConfig],
    returns: &HashMap<String, ReturnSeries>,
    generated_at: NaiveDateTime,
) -> SectorReport {
    let market_dates: BTreeSet<NaiveDate> =
        returns.values().flat_map(|s| s.keys().copied()).collect();

    let mut data = Vec::new();
    for row in history {
        let Some(market_date) = nearest_date(&market_dates, row.date) else {
            continue;
        };
        if (market_date - row.date).num_days().abs() > MAX_DATE_GAP_DAYS {
            debug!("No market week near {} (closest {})", row.date, market_date);
            continue;
        }

        let week_returns = sectors
            .iter()
            .map(|sector| {
                let value = returns
                    .get(&sector.ticker)
                    .and_then(|series| series.get(&market_date).copied().flatten())
                    .filter(|v| v.is_finite())
                    .map(round2)
                    .unwrap_or(0.0);
                (sector.ticker.clone(), value)
            })
            .collect();

        data.push(SectorEntry {
            date: row.date.format("%Y-%m-%d").to_string(),
            flow: row.balance,
            returns: week_returns,
        });
    }

    SectorReport {
        metadata: SectorMetadata {
            generated_at: generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            sectors: sectors.to_vec(),
        },
        data,
    }
}

/// Weekly returns for every sector, fetched concurrently. A ticker that
/// fails is logged and left out.
pub async fn fetch_all_returns(
    provider: &dyn MarketDataProvider,
    sectors: &[SectorConfig],
    from_date: NaiveDate,
    to_date: NaiveDate,
) -> HashMap<String, ReturnSeries> {
    info!("📡 Fetching weekly closes for {} tickers...", sectors.len());
    let results: Vec<(String, Result<Vec<WeeklyClose>>)> = stream::iter(sectors)
        .map(|sector| async move {
            let closes = provider.weekly_closes(&sector.ticker, from_date, to_date).await;
            (sector.ticker.clone(), closes)
        })
        .buffer_unordered(CONCURRENT_REQUESTS)
        .collect()
        .await;

    let mut returns = HashMap::new();
    for (ticker, closes) in results {
        match closes {
            Ok(closes) => {
                debug!("{}: {} weekly bars", ticker, closes.len());
                returns.insert(ticker, weekly_returns(&closes));
            }
            Err(e) => warn!("⚠️ No data for {}: {:#}", ticker, e),
        }
    }
    returns
}

/// Build and write the sector report from the balance history
pub async fn run(
    config: &Config,
    provider: &dyn MarketDataProvider,
    sectors: &[SectorConfig],
    now: NaiveDateTime,
) -> Result<SectorReport> {
    if !config.history_csv.exists() {
        bail!("{} not found; run the foreign-balance job first", config.history_csv.display());
    }
    let store = HistoryStore::load(&config.history_csv)?;
    let Some(first) = store.rows().first() else {
        bail!("{} is empty", config.history_csv.display());
    };

    let from_date = first.date - Duration::days(MAX_DATE_GAP_DAYS);
    let to_date = now.date();
    let returns = fetch_all_returns(provider, sectors, from_date, to_date).await;
    if returns.values().all(|series| series.is_empty()) {
        bail!("no market data returned for any sector");
    }

    let report = build_sector_report(store.rows(), sectors, &returns, now);
    write_json_pretty(&config.sector_json, &report)?;
    info!("✅ Generated {} with {} records", config.sector_json.display(), report.data.len());
    Ok(report)
}
