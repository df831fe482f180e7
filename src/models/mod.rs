use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One observation in the foreign-investor balance history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub date: NaiveDate,
    pub balance: i64,
    /// Period label as printed in the source document, when there was one
    #[serde(default)]
    pub label: Option<String>,
}

impl HistoryRow {
    pub fn new(date: NaiveDate, balance: i64) -> Self {
        Self { date, balance, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Integer or decimal figure as it appeared on the page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowValue {
    Int(i64),
    Float(f64),
}

impl FlowValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            FlowValue::Int(v) => v as f64,
            FlowValue::Float(v) => v,
        }
    }
}

impl Default for FlowValue {
    fn default() -> Self {
        FlowValue::Int(0)
    }
}

impl std::fmt::Display for FlowValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowValue::Int(v) => write!(f, "{}", v),
            FlowValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Weekly participation record scraped from nikkei225jp.com
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutaiRecord {
    pub date: String,
    pub nikkei_avg: FlowValue,
    pub foreign: FlowValue,
    pub securities_self: FlowValue,
    pub individual_total: FlowValue,
    pub individual_cash: FlowValue,
    pub individual_credit: FlowValue,
    pub investment_trust: FlowValue,
    pub business_corp: FlowValue,
    pub other_corp: FlowValue,
    pub trust_banks: FlowValue,
    pub insurance: FlowValue,
    pub city_banks: FlowValue,
}

/// Broker grouping used for the participant volume report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrokerCategory {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "JP")]
    Jp,
    #[serde(rename = "NET")]
    Net,
    #[serde(rename = "OTHERS")]
    Others,
}

/// One trading participant and its non-zero volumes per product column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantVolume {
    pub name: String,
    pub category: BrokerCategory,
    pub data: BTreeMap<String, i64>,
}

/// Output document of the daily participant job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantReport {
    pub date: String,
    pub updated_at: String,
    pub night_session: Vec<ParticipantVolume>,
    pub day_session: Vec<ParticipantVolume>,
}

/// A sector benchmark compared against the foreign flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorConfig {
    pub ticker: String,
    pub name: String,
    pub category: String,
}

impl SectorConfig {
    pub fn new(ticker: &str, name: &str, category: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: name.to_string(),
            category: category.to_string(),
        }
    }

    /// Benchmarks tracked when no sector file is supplied
    pub fn defaults() -> Vec<SectorConfig> {
        vec![
            SectorConfig::new("1306.T", "TOPIX (1306)", "Benchmark"),
            SectorConfig::new("^N225", "Nikkei 225", "Benchmark"),
            SectorConfig::new("2644.T", "Semicon (2644)", "Growth"),
            SectorConfig::new("1615.T", "Banks (1615)", "Value"),
            SectorConfig::new("1618.T", "Auto & Energy (1618)", "Cyclical"),
            SectorConfig::new("1489.T", "High Div Yield (1489)", "Value"),
            SectorConfig::new("2516.T", "Mothers/Growth (2516)", "Small Cap"),
        ]
    }
}

/// Weekly close observed for a ticker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeeklyClose {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorMetadata {
    pub generated_at: String,
    pub sectors: Vec<SectorConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorEntry {
    pub date: String,
    pub flow: i64,
    pub returns: BTreeMap<String, f64>,
}

/// Output document of the sector job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorReport {
    pub metadata: SectorMetadata,
    pub data: Vec<SectorEntry>,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub jpx_base_url: String,
    pub investor_archive_url: String,
    pub participant_json_url: String,
    pub shutai_url: String,
    pub yahoo_chart_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub history_csv: PathBuf,
    pub trend_chart: PathBuf,
    pub shutai_json: PathBuf,
    pub participant_json: PathBuf,
    pub sector_json: PathBuf,
    pub debug_mode: bool,
    pub http_timeout_secs: u64,
    pub rate_limit_per_minute: u32,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            jpx_base_url: "https://www.jpx.co.jp".to_string(),
            investor_archive_url:
                "https://www.jpx.co.jp/markets/statistics-equities/investor-type/00-00-archives-00.html"
                    .to_string(),
            participant_json_url:
                "https://www.jpx.co.jp/automation/markets/derivatives/participant-volume/json/"
                    .to_string(),
            shutai_url: "https://nikkei225jp.com/data/shutai.php".to_string(),
            yahoo_chart_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash-exp".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            history_csv: PathBuf::from("history.csv"),
            trend_chart: PathBuf::from("trend.svg"),
            shutai_json: PathBuf::from("data/shutai_data.json"),
            participant_json: PathBuf::from("data/daily_participant.json"),
            sector_json: PathBuf::from("sector_data.json"),
            debug_mode: false,
            http_timeout_secs: 30,
            rate_limit_per_minute: 60,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Build a configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        Config {
            jpx_base_url: string("JPX_BASE_URL", defaults.jpx_base_url),
            investor_archive_url: string("JPX_INVESTOR_ARCHIVE_URL", defaults.investor_archive_url),
            participant_json_url: string("JPX_PARTICIPANT_JSON_URL", defaults.participant_json_url),
            shutai_url: string("SHUTAI_URL", defaults.shutai_url),
            yahoo_chart_url: string("YAHOO_CHART_URL", defaults.yahoo_chart_url),
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|key| !key.trim().is_empty()),
            gemini_model: string("GEMINI_MODEL", defaults.gemini_model),
            gemini_base_url: string("GEMINI_BASE_URL", defaults.gemini_base_url),
            history_csv: path("HISTORY_CSV", defaults.history_csv),
            trend_chart: path("TREND_CHART", defaults.trend_chart),
            shutai_json: path("SHUTAI_JSON", defaults.shutai_json),
            participant_json: path("PARTICIPANT_JSON", defaults.participant_json),
            sector_json: path("SECTOR_JSON", defaults.sector_json),
            debug_mode: lookup("DEBUG_MODE")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.debug_mode),
            http_timeout_secs: lookup("HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            rate_limit_per_minute: lookup("RATE_LIMIT_PER_MINUTE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_per_minute),
            user_agent: string("USER_AGENT", defaults.user_agent),
        }
    }
}
