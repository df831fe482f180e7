//! Number parsing for figures printed on Japanese market pages

use crate::models::FlowValue;

fn strip_noise(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, ',' | '%' | '円') && !c.is_whitespace())
        .collect()
}

/// Lenient parse used for page tables: blanks, dashes and garbage read as zero.
///
/// `▼` marks a negative figure and `▲` a positive one.
pub fn parse_flow_value(text: &str) -> FlowValue {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return FlowValue::Int(0);
    }

    let mut s = strip_noise(trimmed);
    if s.contains('▼') {
        s = format!("-{}", s.replace('▼', ""));
    } else if s.contains('▲') {
        s = s.replace('▲', "");
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }

    if s.contains('.') {
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() => FlowValue::Float(v),
            _ => FlowValue::Int(0),
        }
    } else {
        s.parse::<i64>().map(FlowValue::Int).unwrap_or(FlowValue::Int(0))
    }
}

/// Strict parse used for spreadsheet cells. Returns `None` when the text
/// carries no number at all.
///
/// Accepts `▼`/`△` and accounting parentheses as negative markers.
pub fn parse_number(text: &str) -> Option<f64> {
    let mut s = strip_noise(text);
    if s.is_empty() || matches!(s.as_str(), "-" | "－" | "―" | "—") {
        return None;
    }

    let mut negative = false;
    if let Some(rest) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = rest.to_string();
    }
    for marker in ['▼', '△'] {
        if let Some(rest) = s.strip_prefix(marker) {
            negative = !negative;
            s = rest.to_string();
        }
    }
    if let Some(rest) = s.strip_prefix('▲').or_else(|| s.strip_prefix('+')) {
        s = rest.to_string();
    }

    // Reject words such as "inf" or "nan" that f64::from_str accepts
    if !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | 'e' | 'E')) {
        return None;
    }
    let value = s.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if negative { -value } else { value })
}
