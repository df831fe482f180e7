//! Locator resolution against sheets shaped like the JPX downloads

use assert_matches::assert_matches;
use calamine::{Data, Range};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use jpx_flows::collectors::investor_type::{
    date_label_locator, default_balance_locator, extract_observation,
};
use jpx_flows::collectors::participants::parse_participant_grid;
use jpx_flows::extract::workbook::grid_from_range;
use jpx_flows::extract::{CellLocator, ExtractError, HeaderTable};
use jpx_flows::models::BrokerCategory;

/// Weekly investor-type sheet. calamine starts the used range at row 1, so
/// the grid has to pad it back for (3, 0) to hold the period label.
fn investor_sheet() -> Range<Data> {
    let mut range: Range<Data> = Range::new((1, 0), (40, 12));
    range.set_value((1, 0), Data::String("投資部門別売買状況".to_string()));
    range.set_value((3, 0), Data::String("2025年1月第2週 (2025/01/06～2025/01/10)".to_string()));
    range.set_value((10, 0), Data::String("自己計 Proprietary".to_string()));
    range.set_value((11, 10), Data::Float(-99.0));
    range.set_value((30, 0), Data::String("海外投資家\nForeigners".to_string()));
    range.set_value((30, 1), Data::String("売り".to_string()));
    range.set_value((30, 10), Data::Float(12_345_678.0));
    range.set_value((31, 1), Data::String("買い".to_string()));
    range.set_value((31, 10), Data::Float(750_493_712.0));
    range.set_value((32, 1), Data::String("差引き".to_string()));
    range
}

#[test]
fn test_default_locator_on_padded_sheet() {
    init_test_logging();
    log_test_step("Resolving the default balance locator on a JPX-shaped sheet");

    let grid = grid_from_range(&investor_sheet());
    let today = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    let observation =
        extract_observation(&grid, &default_balance_locator(), &date_label_locator(), today)
            .unwrap();
    log_test_data("Observation", &observation);

    assert_eq!(observation.balance, 750_493_712);
    assert_eq!(observation.date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
}

#[test]
fn test_resolution_is_deterministic() {
    let grid = grid_from_range(&investor_sheet());
    let locator = default_balance_locator();

    let first = locator.locate(&grid).map(|l| (l.row, l.col));
    for _ in 0..5 {
        assert_eq!(locator.locate(&grid).map(|l| (l.row, l.col)), first);
    }
    assert_eq!(first, Ok((31, 10)));
}

#[test]
fn test_json_locator_with_fallback_chain() {
    let grid = grid_from_range(&investor_sheet());
    let locator: CellLocator = serde_json::from_str(
        r#"{
            "anchor": {
                "kind": "label",
                "label": {"keywords": ["Overseas"]},
                "scope": {"column": 0}
            },
            "offset": {"rows": 1, "cols": 10},
            "fallbacks": [
                {
                    "anchor": {
                        "kind": "label",
                        "label": {"keywords": ["売り"], "mode": {"type": "exact"}},
                        "scope": {"column": 1}
                    },
                    "offset": {"rows": 1, "cols": 0}
                },
                {
                    "anchor": {
                        "kind": "label",
                        "label": {"keywords": ["買い"], "mode": {"type": "exact"}},
                        "scope": {"column": 1}
                    },
                    "offset": {"rows": 0, "cols": 9}
                }
            ]
        }"#,
    )
    .unwrap();

    // The second strategy lands on the "買い" text and is rejected
    assert_eq!(locator.extract_number(&grid), Ok(750_493_712.0));
}

#[test]
fn test_exhausted_chain_reports_in_order() {
    let grid = grid_from_range(&investor_sheet());
    let balance_row = jpx_flows::extract::LabelMatch::contains(&["差引き"]);
    let locator = CellLocator::label(balance_row, Default::default())
        .offset(0, 9)
        .or_else(CellLocator::at(3, 0));

    let err = locator.extract_number(&grid).unwrap_err();
    assert_matches!(err, ExtractError::Exhausted { ref attempts } => {
        assert_matches!(attempts[0], ExtractError::EmptyCell { row: 32, col: 10 });
        assert_matches!(attempts[1], ExtractError::NotNumeric { row: 3, col: 0, .. });
    });
}

#[test]
fn test_participant_sheet() {
    let mut range: Range<Data> = Range::new((0, 0), (6, 3));
    range.set_value((0, 0), Data::String("取引高 Trading Volume (Futures)".to_string()));
    range.set_value((2, 0), Data::String("取引参加者名\nParticipant".to_string()));
    range.set_value((2, 1), Data::String("日経225先物\nNikkei 225 Futures".to_string()));
    range.set_value((2, 2), Data::String("TOPIX先物".to_string()));
    range.set_value((2, 3), Data::String("日経225mini".to_string()));
    range.set_value((3, 0), Data::String("ABNアムロクリアリング証券".to_string()));
    range.set_value((3, 1), Data::Float(20_512.0));
    range.set_value((3, 2), Data::String("1,500".to_string()));
    range.set_value((3, 3), Data::String("-".to_string()));
    range.set_value((4, 0), Data::String("モルガン・スタンレーMUFG証券".to_string()));
    range.set_value((4, 2), Data::Int(7));
    range.set_value((5, 0), Data::String("auカブコム証券".to_string()));
    range.set_value((5, 3), Data::Float(812.6));
    range.set_value((6, 0), Data::String("合計".to_string()));
    range.set_value((6, 1), Data::Float(20_512.0));

    let grid = grid_from_range(&range);
    let table = HeaderTable::locate(&grid, &["参加者", "Participant"]).unwrap();
    assert_eq!(table.header_row(), 2);
    assert_eq!(table.columns()[1], "日経225先物Nikkei 225 Futures");

    let participants = parse_participant_grid(&grid);
    let summary: Vec<_> = participants
        .iter()
        .map(|p| (p.name.as_str(), p.category, p.data.values().copied().collect::<Vec<_>>()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("ABNアムロクリアリング証券", BrokerCategory::Eu, vec![1_500, 20_512]),
            ("モルガン・スタンレーMUFG証券", BrokerCategory::Us, vec![7]),
            ("auカブコム証券", BrokerCategory::Net, vec![812]),
        ]
    );
}
