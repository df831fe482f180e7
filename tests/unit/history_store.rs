//! History store behaviour across separate runs

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use test_log::test;

use crate::common::logging::{init_test_logging, log_test_step};
use jpx_flows::history::{HistoryStore, MergeOutcome, MergePolicy};
use jpx_flows::models::HistoryRow;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

#[test]
fn test_keep_existing_survives_reload() {
    init_test_logging();
    log_test_step("Merging the same week on two consecutive runs");

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.csv");

    let mut first_run = HistoryStore::load(&path).unwrap();
    let outcome = first_run.merge(HistoryRow::new(d(10), 100), MergePolicy::KeepExisting);
    assert_eq!(outcome, MergeOutcome::Added);
    first_run.save().unwrap();

    let mut second_run = HistoryStore::load(&path).unwrap();
    let outcome = second_run.merge(HistoryRow::new(d(10), 999), MergePolicy::KeepExisting);
    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(second_run.rows(), &[HistoryRow::new(d(10), 100)]);
}

#[test]
fn test_replace_keeps_one_row_per_date() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.csv");

    for balance in [1, 2, 3] {
        let mut store = HistoryStore::load(&path).unwrap();
        store.merge(HistoryRow::new(d(17), balance), MergePolicy::Replace);
        store.merge(HistoryRow::new(d(3), -balance), MergePolicy::KeepExisting);
        store.save().unwrap();
    }

    let store = HistoryStore::load(&path).unwrap();
    assert_eq!(store.rows(), &[HistoryRow::new(d(3), -1), HistoryRow::new(d(17), 3)]);
}

#[test]
fn test_corrupt_history_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.csv");
    std::fs::write(&path, "date,balance\nnot-a-date,12\n").unwrap();

    let err = HistoryStore::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("bad history row 1"));
}
