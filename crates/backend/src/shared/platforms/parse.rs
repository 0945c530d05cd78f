//! Field parsers shared by the platform adapters
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::str::FromStr;

/// Parse a money amount the way vendor exports print it:
/// `$1,234.50`, `-3.99`, `(3.99)` (accounting negative), `12`, and the
/// European `1.234,50 €` / `3,99`.
pub fn parse_amount(s: &str) -> Option<BigDecimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, body) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };

    let kept: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let cleaned = normalize_separators(&kept);

    let value = BigDecimal::from_str(&cleaned).ok()?;
    Some(if negative { -value.abs() } else { value })
}

/// Rewrites digit grouping to a plain `1234.50`. When both marks occur the
/// last one is the decimal separator; a lone comma followed by one or two
/// trailing digits is a decimal comma; repeated dots are grouping.
fn normalize_separators(s: &str) -> String {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (None, Some(c)) => {
            let fraction = s.len() - c - 1;
            (s.matches(',').count() == 1 && (1..=2).contains(&fraction)).then_some(c)
        }
        (Some(d), None) => (s.matches('.').count() == 1).then_some(d),
        (None, None) => None,
    };

    s.char_indices()
        .filter_map(|(i, c)| match c {
            '.' | ',' if Some(i) == decimal => Some('.'),
            '.' | ',' => None,
            other => Some(other),
        })
        .collect()
}

/// Whole units; tolerates thousands separators and a zero fraction (`2.0`)
pub fn parse_units(s: &str) -> Option<i64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != ' ').collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    let as_float = cleaned.parse::<f64>().ok()?;
    if as_float.fract() == 0.0 && as_float.is_finite() {
        Some(as_float as i64)
    } else {
        None
    }
}

/// Timestamp formats seen in vendor APIs and exports. Date-only values
/// land at midnight UTC, month-only values on the first of the month.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }
    // "2024-03" (monthly royalty reports)
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    // Unix seconds
    if s.len() >= 9 && s.chars().all(|c| c.is_ascii_digit()) {
        let secs = s.parse::<i64>().ok()?;
        return Utc.timestamp_opt(secs, 0).single();
    }
    None
}

/// Minor units (cents) to a two-decimal amount
pub fn cents_to_amount(cents: i64) -> BigDecimal {
    BigDecimal::new(cents.into(), 2)
}

/// First non-empty value among `keys`, numbers rendered as text
pub fn json_str(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub fn json_i64(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) => parse_units(s),
        _ => None,
    })
}

pub fn json_amount(obj: &Value, keys: &[&str]) -> Option<BigDecimal> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => BigDecimal::from_str(&n.to_string()).ok(),
        Some(Value::String(s)) => parse_amount(s),
        _ => None,
    })
}

pub fn json_bool(obj: &Value, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

pub fn json_timestamp(obj: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) => parse_timestamp(s),
        Some(Value::Number(n)) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    })
}
