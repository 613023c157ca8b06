use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

const MONTHS: &str = r"(?:january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\.?";

/// Textual US date: "August 11, 2020", "Aug. 11 2020".
static TEXTUAL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({MONTHS})\s+(\d{{1,2}}),?\s+(\d{{4}})\b"))
        .expect("static date regex")
});

/// Numeric dates: ISO or US slash form.
static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})\b").expect("static date regex")
});

/// "On <date>" anchor marking a single dated event.
static ON_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bon\s+((?:{MONTHS})\s+\d{{1,2}},?\s+\d{{4}}|\d{{1,2}}/\d{{1,2}}/\d{{4}}|\d{{4}}-\d{{2}}-\d{{2}})"
    ))
    .expect("static date regex")
});

/// "as of <date>" anchor for holdings and share counts.
static AS_OF_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bas\s+of\s+((?:{MONTHS})\s+\d{{1,2}},?\s+\d{{4}}|\d{{1,2}}/\d{{1,2}}/\d{{4}}|\d{{4}}-\d{{2}}-\d{{2}})"
    ))
    .expect("static date regex")
});

/// Date of an "On <date>" anchor, if the text has one.
pub fn find_on_date(text: &str) -> Option<NaiveDate> {
    ON_DATE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_date_str(m.as_str()))
}

/// Number of distinct "On <date>" anchors.
pub fn count_on_dates(text: &str) -> usize {
    let mut dates: Vec<NaiveDate> = ON_DATE
        .captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| parse_date_str(m.as_str())))
        .collect();
    dates.sort();
    dates.dedup();
    dates.len()
}

pub fn find_as_of_date(text: &str) -> Option<NaiveDate> {
    AS_OF_DATE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_date_str(m.as_str()))
}

/// First parseable date anywhere in the text.
pub fn find_any_date(text: &str) -> Option<NaiveDate> {
    let textual = TEXTUAL_DATE.find(text);
    let numeric = NUMERIC_DATE.find(text);
    let first = match (textual, numeric) {
        (Some(t), Some(n)) => Some(if t.start() <= n.start() { t } else { n }),
        (t, n) => t.or(n),
    };
    first.and_then(|m| parse_date_str(m.as_str()))
}

/// Parse a single date string in any of the forms filings and model
/// replies use. Returns `None` for blanks and placeholders.
pub fn parse_date_str(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("unknown")
    {
        return None;
    }

    // ISO 8601: YYYY-MM-DD
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(d);
    }
    // US: MM/DD/YYYY
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(d);
    }
    parse_textual(trimmed)
}

fn parse_textual(text: &str) -> Option<NaiveDate> {
    let caps = TEXTUAL_DATE.captures(text)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
