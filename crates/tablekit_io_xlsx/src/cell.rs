//! Cell value classification and serial date encoding.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike};

use crate::conf::N_SECONDS_PER_DAY;
use crate::spec::EnumCellValue;

const L_FMT_DATETIME_OFFSET: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];
const L_FMT_DATETIME_NAIVE: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const C_FMT_DATE: &str = "%Y-%m-%d";

////////////////////////////////////////////////////////////////////////////////
// #region RawClassification

/// Classify one raw text value into exactly one cell variant.
///
/// Precedence: DateTime > Date > Boolean > Integer > Float > Text.
/// Blank input (after trimming) is [`EnumCellValue::Empty`].
pub fn classify_raw_text(raw: &str) -> EnumCellValue {
    let c_trimmed = raw.trim();
    if c_trimmed.is_empty() {
        return EnumCellValue::Empty;
    }

    if let Some(value) = parse_datetime(c_trimmed) {
        return value;
    }
    if let Ok(date) = NaiveDate::parse_from_str(c_trimmed, C_FMT_DATE) {
        return EnumCellValue::Date(date);
    }
    if c_trimmed.eq_ignore_ascii_case("true") {
        return EnumCellValue::Boolean(true);
    }
    if c_trimmed.eq_ignore_ascii_case("false") {
        return EnumCellValue::Boolean(false);
    }
    if let Ok(n) = c_trimmed.parse::<i64>() {
        return EnumCellValue::Integer(n);
    }
    if let Ok(x) = c_trimmed.parse::<f64>()
        && x.is_finite()
    {
        return EnumCellValue::Float(x);
    }

    EnumCellValue::Text(raw.to_string())
}

fn parse_datetime(s: &str) -> Option<EnumCellValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(EnumCellValue::datetime_with_offset(dt));
    }
    for c_fmt in L_FMT_DATETIME_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(s, c_fmt) {
            return Some(EnumCellValue::datetime_with_offset(dt));
        }
    }
    for c_fmt in L_FMT_DATETIME_NAIVE {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, c_fmt) {
            return Some(EnumCellValue::datetime_naive(dt));
        }
    }
    None
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SerialDates

fn derive_serial_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

fn derive_serial_day_min() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1900, 1, 1)
}

fn derive_serial_day_max() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
}

/// Day count of `date` in the 1900 date system, or `None` when out of range.
///
/// Serial 60 is the fictitious 1900-02-29, so dates before 1900-03-01 sit one
/// day lower than a plain count from 1899-12-30.
pub fn derive_date_serial(date: NaiveDate) -> Option<i64> {
    if date < derive_serial_day_min()? || date > derive_serial_day_max()? {
        return None;
    }
    let n_days = (date - derive_serial_epoch()?).num_days();
    if date < NaiveDate::from_ymd_opt(1900, 3, 1)? {
        return Some(n_days - 1);
    }
    Some(n_days)
}

/// Serial number (days + fraction of day) of a wall-clock date-time.
pub fn derive_datetime_serial(value: NaiveDateTime) -> Option<f64> {
    let n_days = derive_date_serial(value.date())?;
    let time = value.time();
    let n_seconds =
        time.num_seconds_from_midnight() as f64 + f64::from(time.nanosecond()) / 1_000_000_000.0;
    Some(n_days as f64 + n_seconds / N_SECONDS_PER_DAY)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region OffsetDisplay

/// Render an offset as `+HH:MM` (`+HH:MM:SS` when seconds are present).
pub fn format_utc_offset(offset: &FixedOffset) -> String {
    let n_secs = offset.local_minus_utc();
    let c_sign = if n_secs < 0 { '-' } else { '+' };
    let n_abs = n_secs.unsigned_abs();
    let (n_hours, n_minutes, n_seconds) = (n_abs / 3600, (n_abs % 3600) / 60, n_abs % 60);
    if n_seconds == 0 {
        format!("{c_sign}{n_hours:02}:{n_minutes:02}")
    } else {
        format!("{c_sign}{n_hours:02}:{n_minutes:02}:{n_seconds:02}")
    }
}

/// Date-time pattern that also displays `offset` as a quoted literal.
pub fn derive_datetime_pattern(pattern_base: &str, offset: Option<&FixedOffset>) -> String {
    match offset {
        Some(offset) => format!("{pattern_base} \"{}\"", format_utc_offset(offset)),
        None => pattern_base.to_string(),
    }
}

/// Parse `UTC`, `Z` or a fixed `+HH:MM` / `+HHMM` / `+HH` zone name.
pub fn parse_fixed_offset(name: &str) -> Option<FixedOffset> {
    let c_name = name.trim();
    if c_name.eq_ignore_ascii_case("utc") || c_name == "Z" || c_name.eq_ignore_ascii_case("etc/utc")
    {
        return FixedOffset::east_opt(0);
    }

    let (n_sign, c_rest) = match c_name.as_bytes().first()? {
        b'+' => (1, &c_name[1..]),
        b'-' => (-1, &c_name[1..]),
        _ => return None,
    };
    let c_digits: String = c_rest.chars().filter(|chr| *chr != ':').collect();
    if !c_digits.chars().all(|chr| chr.is_ascii_digit()) {
        return None;
    }
    let (n_hours, n_minutes) = match c_digits.len() {
        2 => (c_digits.parse::<i32>().ok()?, 0),
        4 => (
            c_digits[..2].parse::<i32>().ok()?,
            c_digits[2..].parse::<i32>().ok()?,
        ),
        _ => return None,
    };
    if n_minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(n_sign * (n_hours * 3600 + n_minutes * 60))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
