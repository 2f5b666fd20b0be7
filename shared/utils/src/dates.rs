use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

pub struct DateNormalizer;

impl DateNormalizer {
    /// Parses a source date in any accepted input format.
    /// Accepted: `YYYY-MM-DD`, `DD.MM.YYYY`, `DD/MM/YYYY`, ISO datetime
    /// (with or without offset). Datetimes are reduced to the UTC date.
    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let trimmed = raw.trim();

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d.%m.%Y") {
            return Some(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
            return Some(date);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(dt.with_timezone(&Utc).date_naive());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
            return Some(dt.date());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
            return Some(dt.date());
        }

        None
    }

    /// Storage format (`YYYY-MM-DD`).
    pub fn to_iso(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Form 270.00 output format (`DD.MM.YYYY`).
    pub fn to_form(date: NaiveDate) -> String {
        date.format("%d.%m.%Y").to_string()
    }

    /// Tax year is the calendar year of the event date.
    pub fn tax_year(date: NaiveDate) -> i32 {
        date.year()
    }

    /// First day of a tax year.
    pub fn tax_year_start(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of a tax year.
    pub fn tax_year_end(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX)
    }
}
