use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

fn full_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4})\s*[/\-.年]\s*(\d{1,2})\s*[/\-.月]\s*(\d{1,2})\s*日?")
            .expect("valid date regex")
    })
}

fn trailing_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*[～〜~]\s*(\d{1,2})\s*[/月]\s*(\d{1,2})").expect("valid range regex")
    })
}

/// Observation date printed in a period label.
///
/// The last complete date wins, so `2025/01/06～2025/01/10` yields the 10th.
/// A short range end (`2024/12/30～01/03`) takes the year of the date before
/// it, rolling over into the next year when the month goes backwards.
pub fn parse_label_date(label: &str) -> Option<NaiveDate> {
    let re = full_date_regex();
    let (date, end) = re
        .captures_iter(label)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let date = NaiveDate::from_ymd_opt(
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            )?;
            Some((date, whole.end()))
        })
        .last()?;

    let Some(caps) = trailing_range_regex().captures(&label[end..]) else {
        return Some(date);
    };
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year = if month < date.month() { date.year() + 1 } else { date.year() };
    NaiveDate::from_ymd_opt(year, month, day).or(Some(date))
}

/// `YYYYMM` key used by monthly JPX files
pub fn year_month(date: NaiveDate) -> String {
    date.format("%Y%m").to_string()
}

/// Any day of the month before `date`'s month
pub fn previous_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_sub_months(Months::new(1)))
        .unwrap_or(date)
}

/// `20260128` → `2026/01/28`; anything else is returned trimmed as is
pub fn format_trade_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
        .map(|d| d.format("%Y/%m/%d").to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}
