//! Participation scrape against a mocked nikkei225jp.com page

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::logging::{init_test_logging, log_test_step};
use crate::common::{fixtures, test_config};
use jpx_flows::api::HttpFetcher;
use jpx_flows::collectors::shutai;
use jpx_flows::history::{read_json_or_default, write_json_pretty};
use jpx_flows::models::{Config, FlowValue, ShutaiRecord};

fn record(date: &str, foreign: i64) -> ShutaiRecord {
    let zero = FlowValue::default();
    ShutaiRecord {
        date: date.to_string(),
        nikkei_avg: zero,
        foreign: FlowValue::Int(foreign),
        securities_self: zero,
        individual_total: zero,
        individual_cash: zero,
        individual_credit: zero,
        investment_trust: zero,
        business_corp: zero,
        other_corp: zero,
        trust_banks: zero,
        insurance: zero,
        city_banks: zero,
    }
}

async fn setup(page: String) -> (MockServer, TempDir, Config) {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &server.uri());
    Mock::given(method("GET"))
        .and(path("/data/shutai.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;
    (server, dir, config)
}

fn stored(config: &Config) -> Vec<ShutaiRecord> {
    read_json_or_default(&config.shutai_json)
}

fn two_weeks() -> String {
    fixtures::shutai_page(&[("2025/01/17", "6,789", "▼100"), ("2025/01/10", "▼12,345", "200")])
}

#[tokio::test]
async fn test_normal_mode_merges_by_date() {
    init_test_logging();
    log_test_step("Merging scraped weeks into existing data");

    let (_server, _dir, config) = setup(two_weeks()).await;
    let existing = vec![record("2025-01-10", 1), record("2025-01-03", 5)];
    write_json_pretty(&config.shutai_json, &existing).unwrap();

    let fetcher = HttpFetcher::new(&config).unwrap();
    let saved = shutai::run(&config, &fetcher, false).await.unwrap();

    assert_eq!(saved, 3);
    let records = stored(&config);
    let dates: Vec<_> = records.iter().map(|r| r.date.as_str()).collect();
    assert_eq!(dates, vec!["2025-01-03", "2025-01-10", "2025-01-17"]);
    assert_eq!(records[0].foreign, FlowValue::Int(5));
    assert_eq!(records[1].foreign, FlowValue::Int(-12_345));
    assert_eq!(records[2].individual_total, FlowValue::Int(-100));
    assert_eq!(records[2].nikkei_avg, FlowValue::Float(38_000.5));
}

#[tokio::test]
async fn test_debug_mode_overwrites() {
    let (_server, _dir, config) = setup(two_weeks()).await;
    write_json_pretty(&config.shutai_json, &vec![record("2024-12-27", 9)]).unwrap();

    let fetcher = HttpFetcher::new(&config).unwrap();
    let saved = shutai::run(&config, &fetcher, true).await.unwrap();

    assert_eq!(saved, 2);
    let dates: Vec<_> = stored(&config).into_iter().map(|r| r.date).collect();
    assert_eq!(dates, vec!["2025-01-10", "2025-01-17"]);
}

#[tokio::test]
async fn test_empty_table_saves_nothing() {
    let (_server, _dir, config) = setup(fixtures::shutai_page(&[])).await;
    write_json_pretty(&config.shutai_json, &vec![record("2025-01-03", 5)]).unwrap();

    let fetcher = HttpFetcher::new(&config).unwrap();
    let saved = shutai::run(&config, &fetcher, true).await.unwrap();

    assert_eq!(saved, 0);
    assert_eq!(stored(&config), vec![record("2025-01-03", 5)]);
}
