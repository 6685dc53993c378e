//! Field normalization: dates, locale-formatted amounts and spreadsheet cells.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Date encodings observed in the exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `31-12-2020`
    DayMonthYear,
    /// `31.12.2020`
    DottedDayMonthYear,
    /// `2020-12-31`
    YearMonthDay,
    /// `2020-12-31 10:15:00`
    Timestamp,
    /// `2020-12-31T10:15:00`, fraction and offset tolerated.
    Iso8601,
    /// `20201231`
    Compact,
}

impl DateFormat {
    /// The chrono format string for this encoding.
    pub fn pattern(&self) -> &'static str {
        match self {
            DateFormat::DayMonthYear => "%d-%m-%Y",
            DateFormat::DottedDayMonthYear => "%d.%m.%Y",
            DateFormat::YearMonthDay => "%Y-%m-%d",
            DateFormat::Timestamp => "%Y-%m-%d %H:%M:%S",
            DateFormat::Iso8601 => "%Y-%m-%dT%H:%M:%S%.f",
            DateFormat::Compact => "%Y%m%d",
        }
    }

    fn has_time(&self) -> bool {
        matches!(self, DateFormat::Timestamp | DateFormat::Iso8601)
    }

    /// Parse `text` strictly with this encoding.
    pub fn parse(&self, text: &str) -> Result<NaiveDateTime> {
        let text = text.trim();
        if self.has_time() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, self.pattern()) {
                return Ok(dt);
            }
            if *self == DateFormat::Iso8601 {
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    return Ok(dt.naive_local());
                }
            }
            return Err(Error::InvalidDate(text.to_string()));
        }

        NaiveDate::parse_from_str(text, self.pattern())
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| Error::InvalidDate(text.to_string()))
    }
}

/// Parse `text` with the first of `formats` that accepts it.
pub fn parse_date(text: &str, formats: &[DateFormat]) -> Result<NaiveDateTime> {
    formats
        .iter()
        .find_map(|format| format.parse(text).ok())
        .ok_or_else(|| Error::InvalidDate(text.trim().to_string()))
}

/// Parse a locale-formatted amount such as `-1 234,56` or `1234.56`.
///
/// Blank text is an absent amount, not zero.
pub fn parse_amount(text: &str) -> Result<Option<Decimal>> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\''))
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }

    // The last of `,` and `.` is the decimal separator, the other groups thousands.
    let canonical = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if dot > comma => cleaned.replace(',', ""),
        (Some(_), _) => cleaned.replace('.', "").replace(',', "."),
        (None, _) => cleaned,
    };

    Decimal::from_str(&canonical)
        .map(Some)
        .map_err(|_| Error::InvalidAmount(text.to_string()))
}

/// Value of one spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Bool(bool),
}

impl Cell {
    /// Empty cells and whitespace-only text count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Cell content as text; numbers without a fraction print as integers.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) if s.trim().is_empty() => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::DateTime(dt) => Some(dt.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Cell content as an amount; empty cells are absent.
    pub fn amount(&self) -> Result<Option<Decimal>> {
        match self {
            Cell::Empty => Ok(None),
            Cell::Text(s) => parse_amount(s),
            Cell::Number(n) => Decimal::from_f64(*n)
                .map(|d| Some(d.normalize()))
                .ok_or_else(|| Error::InvalidAmount(n.to_string())),
            other => Err(Error::InvalidAmount(format!("{:?}", other))),
        }
    }

    /// Cell content as a timestamp; text cells are parsed with `formats`,
    /// bare numbers are read as Excel serial dates.
    pub fn datetime(&self, formats: &[DateFormat]) -> Result<Option<NaiveDateTime>> {
        match self {
            Cell::Empty => Ok(None),
            Cell::Text(s) if s.trim().is_empty() => Ok(None),
            Cell::Text(s) => parse_date(s, formats).map(Some),
            Cell::DateTime(dt) => Ok(Some(*dt)),
            Cell::Number(n) => excel_serial_to_datetime(*n).map(Some),
            Cell::Bool(b) => Err(Error::InvalidDate(b.to_string())),
        }
    }
}

fn excel_serial_to_datetime(serial: f64) -> Result<NaiveDateTime> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::InvalidDate(serial.to_string()))?;
    if !(0.0..2_958_466.0).contains(&serial) {
        return Err(Error::InvalidDate(serial.to_string()));
    }
    let seconds = (serial * 86_400.0).round() as i64;
    Ok(base + Duration::seconds(seconds))
}
