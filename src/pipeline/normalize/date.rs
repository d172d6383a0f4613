//! Date parsing for spreadsheet cells and extracted document text.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::CellValue;

/// Excel serial day numbers accepted as dates (roughly 1954..2064).
pub const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=60_000.0;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

static ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:[T\s].*)?$").unwrap()
});

static NUMERIC_DMY_MDY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{2}|\d{4})(?:\s.*)?$").unwrap()
});

// "March 15, 2024", "Mar. 15 2024", "Mar-15-2024"
static MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{3,9})\.?[\s\-/]+(\d{1,2})(?:st|nd|rd|th)?,?[\s\-/]+(\d{2}|\d{4})$")
        .unwrap()
});

// "15 March 2024", "15-Mar-2024", "15-Mar-24", "15th of March, 2024"
static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,2})(?:st|nd|rd|th)?(?:\s+of)?[\s\-/]+([A-Za-z]{3,9})\.?,?[\s\-/]+(\d{2}|\d{4})$",
    )
    .unwrap()
});

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// Parse a date cell. Returns `None` for unparseable or out-of-range input.
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Date(d) => in_range(*d),
        CellValue::Number(n) => from_excel_serial(*n),
        CellValue::Text(s) => parse_date_str(s),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

/// Parse a date string against the accepted pattern list, in order.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = ISO.captures(s) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }

    if let Some(caps) = NUMERIC_DMY_MDY.captures(s) {
        let first: u32 = caps[1].parse().ok()?;
        let second: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        // First number above 12 can only be a day.
        let (month, day) = if first > 12 {
            (second, first)
        } else {
            (first, second)
        };
        return NaiveDate::from_ymd_opt(year, month, day).and_then(in_range);
    }

    if let Some(caps) = MONTH_FIRST.captures(s) {
        let month = month_from_name(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day).and_then(in_range);
    }

    if let Some(caps) = DAY_FIRST.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day).and_then(in_range);
    }

    if let Ok(n) = s.parse::<f64>() {
        if let Some(d) = from_excel_serial(n) {
            return Some(d);
        }
    }

    generic_parse(s)
}

/// Days since 1899-12-30 (the Excel epoch, leap-year bug included).
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !EXCEL_SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(Duration::days(serial.floor() as i64))?;
    in_range(date)
}

/// Render as `YYYY-MM-DD`.
pub fn to_iso(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?).and_then(in_range)
}

fn expand_year(raw: &str) -> Option<i32> {
    let y: i32 = raw.parse().ok()?;
    match raw.len() {
        2 => Some(2000 + y),
        4 => Some(y),
        _ => None,
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| {
            m.starts_with(&lower[..3])
                && (lower.len() == 3 || lower == "sept" || m.starts_with(lower.as_str()))
        })
        .map(|i| i as u32 + 1)
}

fn generic_parse(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return in_range(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return in_range(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return in_range(dt.date());
        }
    }
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return in_range(d);
        }
    }
    None
}

fn in_range(date: NaiveDate) -> Option<NaiveDate> {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year()).then_some(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    #[test]
    fn iso_variants() {
        assert_eq!(parse_date_str("2024-03-15"), d(2024, 3, 15));
        assert_eq!(parse_date_str("2024/03/15"), d(2024, 3, 15));
        assert_eq!(parse_date_str("2024.3.5"), d(2024, 3, 5));
        assert_eq!(parse_date_str("2024-03-15T10:22:00Z"), d(2024, 3, 15));
        assert_eq!(parse_date_str("2024-03-15 10:22"), d(2024, 3, 15));
    }

    #[test]
    fn month_day_default_and_day_month_when_forced() {
        assert_eq!(parse_date_str("03/04/2024"), d(2024, 3, 4));
        assert_eq!(parse_date_str("15/03/2024"), d(2024, 3, 15));
        assert_eq!(parse_date_str("3/15/24"), d(2024, 3, 15));
        assert_eq!(parse_date_str("15.03.2024"), d(2024, 3, 15));
    }

    #[test]
    fn month_names() {
        assert_eq!(parse_date_str("March 15, 2024"), d(2024, 3, 15));
        assert_eq!(parse_date_str("Mar 15 2024"), d(2024, 3, 15));
        assert_eq!(parse_date_str("15 March 2024"), d(2024, 3, 15));
        assert_eq!(parse_date_str("15-Mar-2024"), d(2024, 3, 15));
        assert_eq!(parse_date_str("15-MAR-24"), d(2024, 3, 15));
        assert_eq!(parse_date_str("Sept 1, 2023"), d(2023, 9, 1));
        assert_eq!(parse_date_str("1st of June, 2022"), d(2022, 6, 1));
    }

    #[test]
    fn excel_serials() {
        assert_eq!(parse_date(&CellValue::Number(45366.0)), d(2024, 3, 15));
        assert_eq!(parse_date(&CellValue::Number(45366.75)), d(2024, 3, 15));
        assert_eq!(parse_date(&CellValue::Number(19_999.0)), None);
        assert_eq!(parse_date(&CellValue::Number(60_001.0)), None);
        assert_eq!(parse_date_str("45366"), d(2024, 3, 15));
    }

    #[test]
    fn fallbacks() {
        assert_eq!(parse_date_str("20240315"), d(2024, 3, 15));
        assert_eq!(parse_date_str("Fri, 15 Mar 2024 10:00:00 +0000"), d(2024, 3, 15));
    }

    #[test]
    fn rejects_invalid_and_out_of_range() {
        assert_eq!(parse_date_str(""), None);
        assert_eq!(parse_date_str("not a date"), None);
        assert_eq!(parse_date_str("2024-02-30"), None);
        assert_eq!(parse_date_str("13/13/2024"), None);
        assert_eq!(parse_date_str("1899-12-31"), None);
        assert_eq!(parse_date_str("2101-01-01"), None);
        assert_eq!(parse_date_str("Smarch 3, 2024"), None);
    }

    #[test]
    fn date_cells_pass_through() {
        let date = NaiveDate::from_ymd_opt(2023, 7, 4).unwrap();
        assert_eq!(parse_date(&CellValue::Date(date)), Some(date));
        assert_eq!(to_iso(&date), "2023-07-04");
    }

    #[test]
    fn boundary_years_round_trip_in_every_pattern() {
        for date in [d(1900, 1, 1), d(1999, 12, 31), d(2024, 2, 29), d(2100, 12, 31)] {
            let date = date.unwrap();
            let renderings = [
                date.format("%Y-%m-%d").to_string(),
                date.format("%Y/%m/%d").to_string(),
                date.format("%Y.%m.%d").to_string(),
                date.format("%B %d, %Y").to_string(),
                date.format("%d %B %Y").to_string(),
                date.format("%d-%b-%Y").to_string(),
            ];
            for r in renderings {
                assert_eq!(parse_date_str(&r), Some(date), "rendering {r}");
            }
            if date.day() > 12 {
                assert_eq!(parse_date_str(&date.format("%d/%m/%Y").to_string()), Some(date));
            }
            assert_eq!(parse_date_str(&date.format("%m/%d/%Y").to_string()), Some(date));
        }
    }
}
