//! Flat-file history stores: the balance CSV and dated JSON record lists

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::{HistoryRow, ShutaiRecord};
use crate::utils::parse_label_date;

/// What to do when the incoming row's date is already in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    KeepExisting,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Replaced,
    Unchanged,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        self != MergeOutcome::Unchanged
    }
}

/// CSV row as stored on disk. Older files used `Date,ForeignBalance` headers,
/// kept the report's period label in the date column, and pandas sometimes
/// wrote balances as floats.
#[derive(Debug, Deserialize)]
struct StoredRow {
    #[serde(alias = "Date")]
    date: String,
    #[serde(alias = "ForeignBalance", deserialize_with = "balance_from_str")]
    balance: i64,
    #[serde(default)]
    label: Option<String>,
}

fn balance_from_str<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid balance {:?}", raw)))
}

impl StoredRow {
    /// ISO dates are taken as-is; a period label is parsed and kept as the label
    fn into_row(self) -> Result<HistoryRow> {
        let raw = self.date.trim();
        let label = self.label.filter(|l| !l.trim().is_empty());
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(HistoryRow { date, balance: self.balance, label });
        }

        let date = parse_label_date(raw).ok_or_else(|| anyhow!("unrecognised date {:?}", raw))?;
        Ok(HistoryRow {
            date,
            balance: self.balance,
            label: label.or_else(|| Some(raw.to_string())),
        })
    }
}

/// Date-keyed balance history backed by a CSV file, one row per date
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    rows: Vec<HistoryRow>,
}

impl HistoryStore {
    /// Load the history; a missing file is an empty history
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!("No history at {}, starting empty", path.display());
            return Ok(Self { path, rows: Vec::new() });
        }

        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("cannot open history {}", path.display()))?;
        let mut by_date = BTreeMap::new();
        for (i, record) in reader.deserialize::<StoredRow>().enumerate() {
            let row = record
                .map_err(anyhow::Error::from)
                .and_then(StoredRow::into_row)
                .with_context(|| format!("bad history row {} in {}", i + 1, path.display()))?;
            by_date.insert(row.date, row);
        }

        let rows: Vec<HistoryRow> = by_date.into_values().collect();
        debug!("Loaded {} history rows from {}", rows.len(), path.display());
        Ok(Self { path, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows sorted by date, ascending
    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.rows.binary_search_by_key(&date, |r| r.date).is_ok()
    }

    pub fn merge(&mut self, row: HistoryRow, policy: MergePolicy) -> MergeOutcome {
        match self.rows.binary_search_by_key(&row.date, |r| r.date) {
            Ok(idx) => match policy {
                MergePolicy::KeepExisting => MergeOutcome::Unchanged,
                MergePolicy::Replace if self.rows[idx] == row => MergeOutcome::Unchanged,
                MergePolicy::Replace => {
                    self.rows[idx] = row;
                    MergeOutcome::Replaced
                }
            },
            Err(idx) => {
                self.rows.insert(idx, row);
                MergeOutcome::Added
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("cannot write history {}", self.path.display()))?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("💾 Saved {} rows to {}", self.rows.len(), self.path.display());
        Ok(())
    }
}

/// Merge two record lists keyed by `key`: incoming records win, output is
/// sorted ascending by key
pub fn merge_by_key<T, F>(existing: Vec<T>, incoming: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut map: BTreeMap<String, T> = BTreeMap::new();
    for record in existing.into_iter().chain(incoming) {
        map.insert(key(&record), record);
    }
    map.into_values().collect()
}

/// Merge participation records by date; the freshly scraped record wins
pub fn merge_dated_records(
    existing: Vec<ShutaiRecord>,
    incoming: Vec<ShutaiRecord>,
) -> Vec<ShutaiRecord> {
    merge_by_key(existing, incoming, |r| r.date.clone())
}

/// Read a JSON document; missing or unreadable files yield `T::default()`
pub fn read_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return T::default();
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from));
    match parsed {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            T::default()
        }
    }
}

/// Pretty-print JSON (UTF-8, non-ASCII kept as is), creating parent directories
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
    }
    Ok(())
}
