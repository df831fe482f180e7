//! Daily derivatives trading volume by participant (JPX)

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};
use url::Url;

use crate::api::HttpFetcher;
use crate::extract::{load_grid, normalize, Grid, HeaderTable};
use crate::history::write_json_pretty;
use crate::models::{BrokerCategory, Config, ParticipantReport, ParticipantVolume};
use crate::utils::{format_trade_date, previous_month, year_month};

const HEADER_KEYWORDS: &[&str] = &["参加者", "Participant", "証券会社"];
const NAME_COLUMN_KEYWORDS: &[&str] = &["参加者", "Participant"];
const TOTAL_MARKERS: &[&str] = &["合計", "Total"];

/// Keyword table checked in order; the first category with a hit wins
#[rustfmt::skip]
const BROKER_KEYWORDS: &[(BrokerCategory, &[&str])] = &[
    (
        BrokerCategory::Us,
        &[
            "Goldman", "Morgan", "Merrill", "BofA", "Citi", "JP Morgan", "JPMorgan", "Sachs",
            "モルガン", "ゴールドマン", "シティ", "アメリカ", "バンカメ",
        ],
    ),
    (
        BrokerCategory::Eu,
        &[
            "ABN", "Societe", "Barclays", "BNP", "UBS", "Deutsche", "HSBC", "Credit Suisse",
            "ソシエテ", "バークレイズ", "ドイツ", "クレディ", "パリバ",
        ],
    ),
    (
        BrokerCategory::Jp,
        &[
            "Nomura", "Daiwa", "Mizuho", "SMBC", "Mitsubishi", "Nikko", "Okasan", "Tokai",
            "野村", "大和", "みずほ", "三菱", "日興", "岡三", "東海", "日産", "岩井", "ちばぎん",
            "フィリップ",
        ],
    ),
    (
        BrokerCategory::Net,
        &[
            "SBI", "Rakuten", "Monex", "Matsui", "au", "kabu.com", "GMO",
            "楽天", "マネックス", "松井", "カブコム",
        ],
    ),
];

/// Monthly index of published participant workbooks
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParticipantIndex {
    #[serde(rename = "TableDatas")]
    pub table_datas: Option<Vec<TradeDay>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeDay {
    #[serde(rename = "TradeDate")]
    pub trade_date: Option<String>,
    #[serde(rename = "NightSession")]
    pub night_session: Option<String>,
    #[serde(rename = "DaySession")]
    pub day_session: Option<String>,
}

pub fn categorize_broker(name: &str) -> BrokerCategory {
    let name = normalize(name);
    BROKER_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| name.contains(&normalize(k))))
        .map(|(category, _)| *category)
        .unwrap_or(BrokerCategory::Others)
}

pub fn participant_json_url(base: &str, year_month: &str) -> String {
    let separator = if base.ends_with('/') { "" } else { "/" };
    format!("{}{}participant_volume_{}.json", base, separator, year_month)
}

/// Participants and their non-zero volumes from a session workbook.
/// Volumes are truncated to whole contracts.
pub fn parse_participant_grid(grid: &Grid) -> Vec<ParticipantVolume> {
    let table = match HeaderTable::locate(grid, HEADER_KEYWORDS) {
        Ok(table) => table,
        Err(e) => {
            warn!("⚠️ Header row not found in workbook: {}", e);
            return Vec::new();
        }
    };
    let Some(name_col) = table.column_containing(NAME_COLUMN_KEYWORDS) else {
        warn!("⚠️ No participant column in header {:?}", table.columns());
        return Vec::new();
    };

    let mut participants = Vec::new();
    for record in table.records() {
        let Some(name) = record.get(name_col).as_text().map(|s| s.trim().to_string()) else {
            continue;
        };
        if name.is_empty() || TOTAL_MARKERS.iter().any(|m| name.contains(m)) {
            continue;
        }

        let mut data = BTreeMap::new();
        for (col, column) in table.columns().iter().enumerate() {
            if col == name_col || column.is_empty() {
                continue;
            }
            let Some(value) = record.get(col).as_number().filter(|v| v.is_finite()) else {
                continue;
            };
            if value != 0.0 {
                data.insert(column.clone(), value.trunc() as i64);
            }
        }

        if !data.is_empty() {
            participants.push(ParticipantVolume {
                category: categorize_broker(&name),
                name,
                data,
            });
        }
    }
    participants
}

async fn fetch_index(fetcher: &HttpFetcher, url: &str) -> Option<ParticipantIndex> {
    info!("Fetching JSON: {}", url);
    match fetcher.get_json_optional::<ParticipantIndex>(url).await {
        Ok(index) => index,
        Err(e) => {
            warn!("⚠️ Failed to fetch {}: {:#}", url, e);
            None
        }
    }
}

async fn fetch_session(
    config: &Config,
    fetcher: &HttpFetcher,
    link: Option<&str>,
    session: &str,
) -> Vec<ParticipantVolume> {
    let Some(link) = link.map(str::trim).filter(|l| !l.is_empty() && *l != "-") else {
        info!("No {} session workbook published", session);
        return Vec::new();
    };

    info!("📊 Processing {} session...", session);
    let result = async {
        let url = Url::parse(&config.jpx_base_url)?.join(link)?;
        let bytes = fetcher.get_bytes(url.as_str()).await?;
        let grid = load_grid(&bytes)?;
        anyhow::Ok(parse_participant_grid(&grid))
    }
    .await;

    match result {
        Ok(participants) => participants,
        Err(e) => {
            warn!("⚠️ {} session workbook failed: {:#}", session, e);
            Vec::new()
        }
    }
}

/// Build the report for the latest trade day and write it to the configured
/// JSON file. The previous month's index is used while the current month's
/// is not published yet.
pub async fn run(
    config: &Config,
    fetcher: &HttpFetcher,
    now: NaiveDateTime,
) -> Result<ParticipantReport> {
    let today = now.date();
    let url = participant_json_url(&config.participant_json_url, &year_month(today));
    // An index without TableDatas (`{}`) means the month is not published yet
    let index = match fetch_index(fetcher, &url).await {
        Some(index) if index.table_datas.is_some() => index,
        _ => {
            info!("Trying previous month...");
            let previous = year_month(previous_month(today));
            let url = participant_json_url(&config.participant_json_url, &previous);
            fetch_index(fetcher, &url)
                .await
                .ok_or_else(|| anyhow!("could not retrieve any participant index from JPX"))?
        }
    };

    let latest = index
        .table_datas
        .ok_or_else(|| anyhow!("participant index has no TableDatas"))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("participant index TableDatas is empty"))?;

    let date = format_trade_date(latest.trade_date.as_deref().unwrap_or("Unknown"));
    info!("Latest trade date: {}", date);

    let night_session =
        fetch_session(config, fetcher, latest.night_session.as_deref(), "night").await;
    let day_session = fetch_session(config, fetcher, latest.day_session.as_deref(), "day").await;

    let report = ParticipantReport {
        date,
        updated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        night_session,
        day_session,
    };

    write_json_pretty(&config.participant_json, &report)?;
    info!(
        "✅ Saved {} (night: {}, day: {} participants)",
        config.participant_json.display(),
        report.night_session.len(),
        report.day_session.len()
    );
    Ok(report)
}
