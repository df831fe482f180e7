//! Participant volume job against a mocked JPX JSON index

use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use crate::common::fixtures::PARTICIPANT_JSON_DIR;
use crate::common::{test_config, workbooks};
use jpx_flows::api::HttpFetcher;
use jpx_flows::collectors::participants;
use jpx_flows::models::{BrokerCategory, ParticipantVolume};
use std::collections::BTreeMap;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 5)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

async fn mount_index(server: &MockServer, year_month: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("{}/participant_volume_{}.json", PARTICIPANT_JSON_DIR, year_month)))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_falls_back_to_previous_month() {
    init_test_logging();
    log_test_step("Current month index missing, previous month published");

    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri());

    mount_index(&server, "202601", 404, json!({})).await;
    mount_index(
        &server,
        "202512",
        200,
        json!({"TableDatas": [
            {
                "TradeDate": "20251226",
                "NightSession": "/files/night_20251226.xlsx",
                "DaySession": "-"
            },
            {"TradeDate": "20251225", "NightSession": "-", "DaySession": "-"}
        ]}),
    )
    .await;
    // A broken workbook leaves its session empty instead of failing the job
    Mock::given(method("GET"))
        .and(path("/files/night_20251226.xlsx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a workbook".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&config).unwrap();
    let report = participants::run(&config, &fetcher, now()).await.unwrap();
    log_test_data("Report", &report);

    assert_eq!(report.date, "2025/12/26");
    assert_eq!(report.updated_at, "2026-01-05 10:00:00");
    assert!(report.night_session.is_empty());
    assert!(report.day_session.is_empty());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.participant_json).unwrap()).unwrap();
    assert_eq!(written["date"], "2025/12/26");
    assert_eq!(written["night_session"], json!([]));
    assert_eq!(written["day_session"], json!([]));
}

async fn mount_workbook(server: &MockServer, file: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(file))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .expect(1)
        .mount(server)
        .await;
}

fn volumes(entries: &[(&str, i64)]) -> BTreeMap<String, i64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[tokio::test]
async fn test_session_workbooks_become_participant_volumes() {
    init_test_logging();
    log_test_step("Reading both session workbooks of the latest trade date");

    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri());

    mount_index(
        &server,
        "202601",
        200,
        json!({"TableDatas": [{
            "TradeDate": "20260105",
            "NightSession": "/files/night_20260105.xlsx",
            "DaySession": "/files/day_20260105.xlsx"
        }]}),
    )
    .await;
    mount_workbook(
        &server,
        "/files/night_20260105.xlsx",
        workbooks::participant_volume(&[
            ("野村證券", 1_234.9, 0.0),
            ("ゴールドマン・サックス証券", 500.0, 20.0),
            ("合計", 1_734.9, 20.0),
        ]),
    )
    .await;
    mount_workbook(
        &server,
        "/files/day_20260105.xlsx",
        workbooks::participant_volume(&[("楽天証券", 7.0, 0.0), ("Unknown Bank", 0.0, 0.0)]),
    )
    .await;

    let fetcher = HttpFetcher::new(&config).unwrap();
    let report = participants::run(&config, &fetcher, now()).await.unwrap();
    log_test_data("Report", &report);

    assert_eq!(report.date, "2026/01/05");
    assert_eq!(
        report.night_session,
        vec![
            ParticipantVolume {
                name: "野村證券".to_string(),
                category: BrokerCategory::Jp,
                data: volumes(&[("日経225先物", 1_234)]),
            },
            ParticipantVolume {
                name: "ゴールドマン・サックス証券".to_string(),
                category: BrokerCategory::Us,
                data: volumes(&[("TOPIX先物", 20), ("日経225先物", 500)]),
            },
        ]
    );
    assert_eq!(
        report.day_session,
        vec![ParticipantVolume {
            name: "楽天証券".to_string(),
            category: BrokerCategory::Net,
            data: volumes(&[("日経225先物", 7)]),
        }]
    );

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.participant_json).unwrap()).unwrap();
    assert_eq!(written["night_session"][0]["category"], "JP");
    assert_eq!(written["night_session"][1]["data"]["TOPIX先物"], 20);
    assert_eq!(written["day_session"][0]["name"], "楽天証券");
}

#[tokio::test]
async fn test_unpublished_month_object_falls_back() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri());

    mount_index(&server, "202601", 200, json!({})).await;
    mount_index(
        &server,
        "202512",
        200,
        json!({"TableDatas": [{"TradeDate": "20251230", "NightSession": "-", "DaySession": "-"}]}),
    )
    .await;

    let fetcher = HttpFetcher::new(&config).unwrap();
    let report = participants::run(&config, &fetcher, now()).await.unwrap();

    assert_eq!(report.date, "2025/12/30");
    assert!(report.night_session.is_empty());
}

#[tokio::test]
async fn test_no_index_in_either_month() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri());

    let fetcher = HttpFetcher::new(&config).unwrap();
    let err = participants::run(&config, &fetcher, now()).await.unwrap_err();

    assert!(err.to_string().contains("could not retrieve"));
    assert!(!config.participant_json.exists());
}

#[tokio::test]
async fn test_empty_table_datas_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri());
    mount_index(&server, "202601", 200, json!({"TableDatas": []})).await;

    let fetcher = HttpFetcher::new(&config).unwrap();
    let err = participants::run(&config, &fetcher, now()).await.unwrap_err();

    assert!(err.to_string().contains("empty"));
}
