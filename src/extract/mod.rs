//! Declarative table extraction
//!
//! Spreadsheets published by JPX move their figures around from release to
//! release. Instead of hand-written search loops, every job describes the cell
//! it wants with a [`CellLocator`]: a label to look for, where to look for it,
//! an offset from the label to the value, and fallback locators to try when
//! the primary one fails.
//!
//! Resolution is deterministic. Label matches are ordered row-major (row
//! ascending, then column ascending) and the `occurrence`-th match wins; fuzzy
//! matches are ordered by score first and scan order second. Fallbacks run in
//! declaration order and only after the primary locator failed.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod header_table;
pub mod numeric;
pub mod workbook;

pub use header_table::{HeaderRecord, HeaderTable};
pub use numeric::{parse_flow_value, parse_number};
pub use workbook::load_grid;

/// Failure modes of the extraction engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("grid is empty")]
    EmptyGrid,

    #[error("label {label:?} not found")]
    LabelNotFound { label: String },

    #[error("occurrence #{occurrence} of {label:?} requested but only {found} match(es) found")]
    OccurrenceOutOfRange {
        label: String,
        occurrence: usize,
        found: usize,
    },

    #[error("offset leads outside the grid to ({row}, {col})")]
    OffsetOutOfBounds { row: isize, col: isize },

    #[error("cell ({row}, {col}) is not numeric: {text:?}")]
    NotNumeric { row: usize, col: usize, text: String },

    #[error("cell ({row}, {col}) is empty")]
    EmptyCell { row: usize, col: usize },

    #[error("failed to read workbook: {0}")]
    Workbook(String),

    #[error("all {} strategies failed: {}", .attempts.len(), join_attempts(.attempts))]
    Exhausted { attempts: Vec<ExtractError> },
}

fn join_attempts(attempts: &[ExtractError]) -> String {
    attempts
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single spreadsheet/table cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Text form of the cell, used for labels and header names
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(format!("{}", *v as i64)),
            Cell::Number(v) => Some(v.to_string()),
        }
    }

    /// Numeric value of the cell; text cells go through the strict parser
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => parse_number(s),
        }
    }
}

/// Cells addressed by absolute (row, column) from the sheet origin.
/// Rows may be ragged; missing trailing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
    width: usize,
}

static EMPTY: Cell = Cell::Empty;

impl Grid {
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self { rows, width }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(Cell::is_empty))
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        if row >= self.height() || col >= self.width {
            return None;
        }
        Some(self.rows[row].get(col).unwrap_or(&EMPTY))
    }

    pub fn row(&self, row: usize) -> Option<&[Cell]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// All text cells matching `label` inside `scope`, best match first
    pub fn find(&self, label: &LabelMatch, scope: &SearchScope) -> Vec<(usize, usize)> {
        let mut hits: Vec<(i64, usize, usize)> = Vec::new();

        for (r, row) in self.rows.iter().enumerate() {
            if let SearchScope::Row(only) = scope {
                if r != *only {
                    continue;
                }
            }
            for (c, cell) in row.iter().enumerate() {
                if let SearchScope::Column(only) = scope {
                    if c != *only {
                        continue;
                    }
                }
                let Cell::Text(text) = cell else {
                    continue;
                };
                if let Some(score) = label.score(text) {
                    hits.push((score, r, c));
                }
            }
        }

        // Stable sort keeps scan order among equal scores
        if matches!(label.mode, MatchMode::Fuzzy { .. }) {
            hits.sort_by(|a, b| b.0.cmp(&a.0));
        }
        hits.into_iter().map(|(_, r, c)| (r, c)).collect()
    }
}

/// How label text is compared
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Contains,
    Exact,
    Fuzzy { min_score: i64 },
}

/// Keywords identifying a label cell. Any keyword may match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMatch {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mode: MatchMode,
}

impl LabelMatch {
    pub fn contains(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            mode: MatchMode::Contains,
        }
    }

    pub fn exact(keywords: &[&str]) -> Self {
        Self { mode: MatchMode::Exact, ..Self::contains(keywords) }
    }

    pub fn fuzzy(keywords: &[&str], min_score: i64) -> Self {
        Self { mode: MatchMode::Fuzzy { min_score }, ..Self::contains(keywords) }
    }

    /// Match score of `text`, `None` when it does not match
    pub fn score(&self, text: &str) -> Option<i64> {
        let text = normalize(text);
        if text.is_empty() {
            return None;
        }

        match &self.mode {
            MatchMode::Contains => self
                .keywords
                .iter()
                .map(|k| normalize(k))
                .any(|k| !k.is_empty() && text.contains(&k))
                .then_some(0),
            MatchMode::Exact => self
                .keywords
                .iter()
                .any(|k| normalize(k) == text)
                .then_some(0),
            MatchMode::Fuzzy { min_score } => {
                let matcher = SkimMatcherV2::default();
                self.keywords
                    .iter()
                    .filter_map(|k| matcher.fuzzy_match(&text, &normalize(k)))
                    .max()
                    .filter(|score| score >= min_score)
            }
        }
    }

    fn describe(&self) -> String {
        self.keywords.join("|")
    }
}

/// Lowercase and drop all whitespace, including the ideographic space
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Where a label search is restricted to
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    Anywhere,
    Column(usize),
    Row(usize),
}

/// Starting point of a locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anchor {
    Label {
        label: LabelMatch,
        #[serde(default)]
        scope: SearchScope,
    },
    Cell {
        row: usize,
        col: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default)]
    pub rows: isize,
    #[serde(default)]
    pub cols: isize,
}

/// Declarative description of one cell in a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellLocator {
    pub anchor: Anchor,
    #[serde(default)]
    pub offset: Offset,
    #[serde(default)]
    pub occurrence: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<CellLocator>,
}

/// A resolved cell
#[derive(Debug, Clone, PartialEq)]
pub struct Located<'g> {
    pub row: usize,
    pub col: usize,
    pub cell: &'g Cell,
}

impl CellLocator {
    /// Fixed cell position
    pub fn at(row: usize, col: usize) -> Self {
        Self {
            anchor: Anchor::Cell { row, col },
            offset: Offset::default(),
            occurrence: 0,
            fallbacks: Vec::new(),
        }
    }

    pub fn label(label: LabelMatch, scope: SearchScope) -> Self {
        Self {
            anchor: Anchor::Label { label, scope },
            offset: Offset::default(),
            occurrence: 0,
            fallbacks: Vec::new(),
        }
    }

    pub fn offset(mut self, rows: isize, cols: isize) -> Self {
        self.offset = Offset { rows, cols };
        self
    }

    pub fn nth(mut self, occurrence: usize) -> Self {
        self.occurrence = occurrence;
        self
    }

    pub fn or_else(mut self, fallback: CellLocator) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    /// Resolve the locator to a cell position
    pub fn locate<'g>(&self, grid: &'g Grid) -> Result<Located<'g>, ExtractError> {
        self.resolve(grid, &|located| Ok(located))
    }

    /// Resolve to a number; a non-numeric target counts as a failed strategy
    pub fn extract_number(&self, grid: &Grid) -> Result<f64, ExtractError> {
        self.resolve(grid, &|located| {
            located.cell.as_number().ok_or_else(|| match located.cell {
                Cell::Empty => ExtractError::EmptyCell { row: located.row, col: located.col },
                other => ExtractError::NotNumeric {
                    row: located.row,
                    col: located.col,
                    text: other.as_text().unwrap_or_default(),
                },
            })
        })
    }

    /// Resolve to non-empty text
    pub fn extract_text(&self, grid: &Grid) -> Result<String, ExtractError> {
        self.resolve(grid, &|located| {
            located
                .cell
                .as_text()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or(ExtractError::EmptyCell { row: located.row, col: located.col })
        })
    }

    fn resolve<'g, T>(
        &self,
        grid: &'g Grid,
        accept: &dyn Fn(Located<'g>) -> Result<T, ExtractError>,
    ) -> Result<T, ExtractError> {
        let first = match self.locate_primary(grid).and_then(accept) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if self.fallbacks.is_empty() {
            return Err(first);
        }

        let mut attempts = vec![first];
        for fallback in &self.fallbacks {
            match fallback.resolve(grid, accept) {
                Ok(value) => return Ok(value),
                Err(e) => attempts.push(e),
            }
        }
        Err(ExtractError::Exhausted { attempts })
    }

    fn locate_primary<'g>(&self, grid: &'g Grid) -> Result<Located<'g>, ExtractError> {
        if grid.height() == 0 || grid.width() == 0 {
            return Err(ExtractError::EmptyGrid);
        }

        let (row, col) = match &self.anchor {
            Anchor::Cell { row, col } => (*row, *col),
            Anchor::Label { label, scope } => {
                let hits = grid.find(label, scope);
                if hits.is_empty() {
                    return Err(ExtractError::LabelNotFound { label: label.describe() });
                }
                *hits.get(self.occurrence).ok_or_else(|| ExtractError::OccurrenceOutOfRange {
                    label: label.describe(),
                    occurrence: self.occurrence,
                    found: hits.len(),
                })?
            }
        };

        let target_row = row as isize + self.offset.rows;
        let target_col = col as isize + self.offset.cols;
        let out_of_bounds = ExtractError::OffsetOutOfBounds { row: target_row, col: target_col };
        if target_row < 0 || target_col < 0 {
            return Err(out_of_bounds);
        }

        let (row, col) = (target_row as usize, target_col as usize);
        let cell = grid.get(row, col).ok_or(out_of_bounds)?;
        Ok(Located { row, col, cell })
    }
}
