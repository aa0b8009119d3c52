// src/date.rs

use crate::error::{Error, Result};
use crate::model::Timestamp;
use chrono::{DateTime, FixedOffset, TimeZone};
use std::collections::HashMap;

/// Locales known to the parser and the chart labels.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    #[value(name = "en_US")]
    EnUs,
    #[value(name = "sv_SE")]
    SvSe,
}

const EN_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];
const EN_MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const EN_DAY_ABBR: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const SV_MONTHS: [&str; 12] = [
    "januari", "februari", "mars", "april", "maj", "juni",
    "juli", "augusti", "september", "oktober", "november", "december",
];
const SV_MONTH_ABBR: [&str; 12] = [
    "jan", "feb", "mar", "apr", "maj", "jun", "jul", "aug", "sep", "okt", "nov", "dec",
];
const SV_DAY_ABBR: [&str; 7] = ["mån", "tis", "ons", "tor", "fre", "lör", "sön"];

impl Locale {
    pub fn month_names(self) -> &'static [&'static str; 12] {
        match self {
            Locale::EnUs => &EN_MONTHS,
            Locale::SvSe => &SV_MONTHS,
        }
    }

    pub fn month_abbr(self) -> &'static [&'static str; 12] {
        match self {
            Locale::EnUs => &EN_MONTH_ABBR,
            Locale::SvSe => &SV_MONTH_ABBR,
        }
    }

    /// Monday first, matching the weekday numbering of the aggregates.
    pub fn day_abbr(self) -> &'static [&'static str; 7] {
        match self {
            Locale::EnUs => &EN_DAY_ABBR,
            Locale::SvSe => &SV_DAY_ABBR,
        }
    }

    /// Month number (1-12) for a full or abbreviated name, ignoring case.
    pub fn month_number(self, name: &str) -> Option<u32> {
        let name = name.to_lowercase();
        self.month_names()
            .iter()
            .position(|m| m.to_lowercase() == name)
            .or_else(|| self.month_abbr().iter().position(|m| m.to_lowercase() == name))
            .map(|idx| idx as u32 + 1)
    }
}

/// Maps the timezone labels found in exports to their offsets.
#[derive(Debug, Clone)]
pub struct TimezoneTable {
    zones: HashMap<String, FixedOffset>,
}

impl Default for TimezoneTable {
    /// `UTC` and `UTC+01`, the two labels exports are known to carry.
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("UTC", FixedOffset::east_opt(0).expect("zero offset is valid"));
        table.insert("UTC+01", FixedOffset::east_opt(3600).expect("one hour offset is valid"));
        table
    }
}

impl TimezoneTable {
    pub fn empty() -> Self {
        Self { zones: HashMap::new() }
    }

    pub fn insert(&mut self, label: impl Into<String>, offset: FixedOffset) -> Option<FixedOffset> {
        self.zones.insert(label.into(), offset)
    }

    pub fn get(&self, label: &str) -> Option<FixedOffset> {
        self.zones.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Parses `+HH:MM` / `-HH:MM` (the colon is optional).
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(Error::parse(s, "offset must start with '+' or '-'")),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::parse(s, "offset must look like +HH:MM"));
    }
    let hours: i32 = digits[..2].parse().map_err(|_| Error::parse(s, "bad offset hours"))?;
    let minutes: i32 = digits[2..].parse().map_err(|_| Error::parse(s, "bad offset minutes"))?;
    if hours > 23 || minutes > 59 {
        return Err(Error::parse(s, "offset out of range"));
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| Error::parse(s, "offset out of range"))
}

/// Parses a `LABEL=+HH:MM` timezone table entry given on the command line.
pub fn parse_timezone_entry(s: &str) -> std::result::Result<(String, FixedOffset), String> {
    let (label, offset) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=+HH:MM, got '{s}'"))?;
    if label.is_empty() {
        return Err(format!("empty timezone label in '{s}'"));
    }
    let offset = parse_offset(offset).map_err(|e| e.to_string())?;
    Ok((label.to_string(), offset))
}

/// Parses the timestamps written into the metadata element of an export.
///
/// Two layouts are accepted, both split on single spaces:
///
/// ```text
/// Mon 3 Jan 2022 09:15 UTC
/// Monday, 3 January 2022 at 09:15 UTC+01
/// ```
///
/// The weekday and the `at` separator are ignored. The month name is looked
/// up in the source locale, the last token in the timezone table.
#[derive(Debug, Clone, Default)]
pub struct DateParser {
    locale: Locale,
    timezones: TimezoneTable,
}

impl DateParser {
    pub fn new(locale: Locale, timezones: TimezoneTable) -> Self {
        Self { locale, timezones }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn parse(&self, input: &str) -> Result<Timestamp> {
        let parts: Vec<&str> = input.split(' ').collect();
        if parts.len() != 6 && parts.len() != 7 {
            return Err(Error::parse(
                input,
                format!("expected 6 or 7 space separated tokens, found {}", parts.len()),
            ));
        }

        let day: u32 = parts[1].parse().map_err(|_| Error::parse(input, "day is not a number"))?;
        if !(1..=31).contains(&day) {
            return Err(Error::parse(input, format!("day {day} out of range")));
        }
        let month = self
            .locale
            .month_number(parts[2])
            .ok_or_else(|| Error::parse(input, format!("unknown month '{}'", parts[2])))?;
        let year: i32 = parts[3].parse().map_err(|_| Error::parse(input, "year is not a number"))?;

        let time = parts[parts.len() - 2];
        let (h, m) = time
            .split_once(':')
            .ok_or_else(|| Error::parse(input, format!("expected HH:MM, got '{time}'")))?;
        let hour: u32 = h.parse().map_err(|_| Error::parse(input, "hour is not a number"))?;
        let minute: u32 = m.parse().map_err(|_| Error::parse(input, "minute is not a number"))?;
        if hour > 23 {
            return Err(Error::parse(input, format!("hour {hour} out of range")));
        }
        if minute > 59 {
            return Err(Error::parse(input, format!("minute {minute} out of range")));
        }

        let label = parts[parts.len() - 1];
        let offset = self
            .timezones
            .get(label)
            .ok_or_else(|| Error::parse(input, format!("unknown timezone '{label}'")))?;

        offset
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .ok_or_else(|| Error::parse(input, "not a valid calendar date"))
    }
}

/// Parses the ISO-8601 timestamps stored in the cache.
pub fn parse_iso(input: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(input)
        .or_else(|_| DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M%:z"))
        .map_err(|e| Error::parse(input, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_short_layout() {
        let parser = DateParser::default();
        let ts = parser.parse("Mon 3 Jan 2022 09:15 UTC").unwrap();
        assert_eq!(ts.to_rfc3339(), "2022-01-03T09:15:00+00:00");
    }

    #[test]
    fn parses_export_layout_with_offset() {
        let parser = DateParser::default();
        let ts = parser.parse("Thursday, 4 February 2016 at 21:04 UTC+01").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 3600);
        assert_eq!((ts.year(), ts.month(), ts.day()), (2016, 2, 4));
        assert_eq!((ts.hour(), ts.minute()), (21, 4));
    }

    #[test]
    fn parsing_is_deterministic() {
        let parser = DateParser::default();
        let a = parser.parse("Sunday, 31 December 2017 at 23:59 UTC+01").unwrap();
        let b = parser.parse("Sunday, 31 December 2017 at 23:59 UTC+01").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.offset(), b.offset());
    }

    #[test]
    fn month_is_case_insensitive() {
        let parser = DateParser::default();
        assert!(parser.parse("Mon 3 JANUARY 2022 09:15 UTC").is_ok());
        assert!(parser.parse("Mon 3 jan 2022 09:15 UTC").is_ok());
    }

    #[test]
    fn uses_source_locale_month_names() {
        let parser = DateParser::new(Locale::SvSe, TimezoneTable::default());
        let ts = parser.parse("måndag 3 oktober 2022 kl 10:00 UTC").unwrap();
        assert_eq!(ts.month(), 10);
        assert!(parser.parse("Mon 3 October 2022 10:00 UTC").is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let parser = DateParser::default();
        for input in [
            "Mon 3 Jan 2022 24:00 UTC",
            "Mon 3 Jan 2022 09:60 UTC",
            "Mon 0 Jan 2022 09:15 UTC",
            "Mon 32 Jan 2022 09:15 UTC",
            "Mon 30 Feb 2022 09:15 UTC",
        ] {
            assert!(matches!(parser.parse(input), Err(Error::Parse { .. })), "{input}");
        }
    }

    #[test]
    fn rejects_unknown_labels_and_token_counts() {
        let parser = DateParser::default();
        assert!(parser.parse("Mon 3 Jan 2022 09:15 CET").is_err());
        assert!(parser.parse("Mon 3 Smarch 2022 09:15 UTC").is_err());
        assert!(parser.parse("3 Jan 2022 09:15").is_err());
        assert!(parser.parse("Mon  3 Jan 2022 09:15 UTC").is_err());
    }

    #[test]
    fn timezone_table_is_extensible() {
        let mut table = TimezoneTable::default();
        assert_eq!(table.len(), 2);
        let (label, offset) = parse_timezone_entry("UTC+02=+02:00").unwrap();
        table.insert(label, offset);
        let parser = DateParser::new(Locale::EnUs, table);
        let ts = parser.parse("Mon 3 Jan 2022 09:15 UTC+02").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_offset("+0100").unwrap().local_minus_utc(), 3600);
        assert!(parse_offset("01:00").is_err());
        assert!(parse_offset("+25:00").is_err());
        assert!(parse_timezone_entry("=+01:00").is_err());
        assert!(parse_timezone_entry("UTC+01").is_err());
    }

    #[test]
    fn parses_cached_timestamps() {
        let ts = parse_iso("2022-01-03T09:15:00+00:00").unwrap();
        assert_eq!(ts.hour(), 9);
        let short = parse_iso("2016-02-04T21:04+01:00").unwrap();
        assert_eq!(short.offset().local_minus_utc(), 3600);
        assert!(parse_iso("yesterday").is_err());
    }
}
