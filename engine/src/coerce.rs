//! The coercion table: raw values to typed field values.
//!
//! One function, [`coerce`], serves both the import normalizer (raw
//! spreadsheet cells) and record writes from the application (loosely typed
//! JSON). Coercion is total: every input yields either a typed value or
//! "absent", never an error.

use crate::schema::FieldType;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Spreadsheet date-serial epoch convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSystem {
    /// Windows/Lotus convention: serial 1 is 1900-01-01, including the
    /// fictitious 1900-02-29 at serial 60.
    #[default]
    Excel1900,
    /// Classic Mac convention: serial 0 is 1904-01-01.
    Excel1904,
}

impl FromStr for DateSystem {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim() {
            "1900" | "excel1900" => Ok(DateSystem::Excel1900),
            "1904" | "excel1904" => Ok(DateSystem::Excel1904),
            other => Err(crate::Error::Config(format!("unknown date system: {other}"))),
        }
    }
}

/// Largest serial spreadsheets accept (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

/// Values accepted as boolean true, compared case-insensitively.
const TRUTHY: [&str; 4] = ["1", "true", "yes", "y"];

/// Coerce a raw value to `field_type`. `None` means the field is absent.
pub fn coerce(field_type: FieldType, raw: &Value, dates: DateSystem) -> Option<Value> {
    if raw.is_null() {
        return None;
    }
    match field_type {
        FieldType::Number => Some(number_value(to_number(raw))),
        FieldType::Bool => Some(Value::Bool(to_bool(raw))),
        FieldType::List => Some(to_list(raw)),
        FieldType::Text | FieldType::Enum => {
            let text = to_text(raw);
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| Value::String(trimmed.to_string()))
        }
        FieldType::Date => to_date(raw, dates),
    }
}

/// Parse a raw value as a number, `0` when it is not one.
pub fn to_number(raw: &Value) -> f64 {
    let parsed = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(0.0)
            }
        }
        _ => 0.0,
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0))
    }
}

fn to_bool(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        other => {
            let text = to_text(other).trim().to_lowercase();
            TRUTHY.contains(&text.as_str())
        }
    }
}

fn to_list(raw: &Value) -> Value {
    if let Value::Array(items) = raw {
        return Value::Array(items.clone());
    }
    let tokens = to_text(raw)
        .split([',', ';', '|'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| Value::String(token.to_string()))
        .collect();
    Value::Array(tokens)
}

/// Render a scalar as text the way a spreadsheet user would read it.
pub fn to_text(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
            Some(f) => f.to_string(),
            None => n.to_string(),
        },
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => raw.to_string(),
    }
}

fn to_date(raw: &Value, dates: DateSystem) -> Option<Value> {
    match raw {
        Value::Number(n) => {
            let decoded = n.as_f64().and_then(|serial| serial_to_iso(serial, dates));
            Some(decoded.map(Value::String).unwrap_or_else(|| raw.clone()))
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            Some(Value::String(
                normalize_date(s, dates).unwrap_or_else(|| s.to_string()),
            ))
        }
        other => Some(other.clone()),
    }
}

/// Normalize a date string to `YYYY-MM-DD`, `None` when it is not a date.
///
/// Tried in order: a bare date serial, `D/M/Y` or `D-M-Y`, then a set of
/// common unambiguous layouts.
pub fn normalize_date(s: &str, dates: DateSystem) -> Option<String> {
    let s = s.trim();
    if is_serial_text(s) {
        if let Some(iso) = s.parse::<f64>().ok().and_then(|n| serial_to_iso(n, dates)) {
            return Some(iso);
        }
    }
    if let Some(date) = parse_day_month_year(s) {
        return Some(iso(date));
    }
    parse_generic(s).map(iso)
}

/// Decode a spreadsheet date serial. The time-of-day fraction is dropped.
pub fn serial_to_iso(serial: f64, dates: DateSystem) -> Option<String> {
    if !serial.is_finite() || serial > MAX_SERIAL {
        return None;
    }
    let days = serial.floor() as i64;
    let date = match dates {
        DateSystem::Excel1900 => match days {
            d if d < 1 => return None,
            60 => return Some("1900-02-29".to_string()),
            d if d < 60 => NaiveDate::from_ymd_opt(1899, 12, 31)? + Duration::days(d),
            d => NaiveDate::from_ymd_opt(1899, 12, 30)? + Duration::days(d),
        },
        DateSystem::Excel1904 => {
            if days < 0 {
                return None;
            }
            NaiveDate::from_ymd_opt(1904, 1, 1)? + Duration::days(days)
        }
    };
    Some(iso(date))
}

fn is_serial_text(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

/// `D/M/Y` or `D-M-Y`, one or two digit day and month, two or four digit
/// year. Two-digit years are read as 20YY.
fn parse_day_month_year(s: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(['/', '-']).collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };
    let digits =
        |p: &str, lens: &[usize]| lens.contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit());
    if !digits(*day, &[1, 2]) || !digits(*month, &[1, 2]) || !digits(*year, &[2, 4]) {
        return None;
    }
    let mut y: i32 = year.parse().ok()?;
    if year.len() == 2 {
        y += 2000;
    }
    NaiveDate::from_ymd_opt(y, month.parse().ok()?, day.parse().ok()?)
}

const DATE_LAYOUTS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const DATETIME_LAYOUTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

fn parse_generic(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
        })
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
