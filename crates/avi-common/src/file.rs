//! Input file identity, per-product file configuration and filename
//! timestamp extraction.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AviError, AviResult};
use crate::time::{PartialDateTime, PartialOrCompleteTimeInstant};

/// Identity of a file within a product's input directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileReference {
    product_id: String,
    filename: String,
}

impl FileReference {
    pub fn new(product_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            filename: filename.into(),
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.product_id, self.filename)
    }
}

/// Encoding of the messages in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageFormat {
    Tac,
    Iwxxm,
}

impl MessageFormat {
    pub fn name(&self) -> &'static str {
        match self {
            MessageFormat::Tac => "TAC",
            MessageFormat::Iwxxm => "IWXXM",
        }
    }
}

impl FromStr for MessageFormat {
    type Err = AviError;

    fn from_str(s: &str) -> AviResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TAC" => Ok(MessageFormat::Tac),
            "IWXXM" => Ok(MessageFormat::Iwxxm),
            _ => Err(AviError::UnknownName {
                kind: "message format",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How files matching `pattern` in a product's input directory are read.
#[derive(Debug, Clone)]
pub struct FileConfig {
    pattern: Regex,
    format: MessageFormat,
    timezone: FixedOffset,
}

impl FileConfig {
    pub fn new(pattern: Regex, format: MessageFormat, timezone: FixedOffset) -> Self {
        Self { pattern, format, timezone }
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.pattern.is_match(filename)
    }

    /// Parse a zone given as `Z`, `UTC`, `GMT`, `+HH`, `+HHMM` or `+HH:MM`.
    pub fn parse_timezone(s: &str) -> AviResult<FixedOffset> {
        let invalid = || AviError::InvalidZone(s.to_string());
        let trimmed = s.trim();
        if matches!(trimmed.to_ascii_uppercase().as_str(), "Z" | "UTC" | "GMT") {
            return FixedOffset::east_opt(0).ok_or_else(invalid);
        }
        let (sign, rest) = match trimmed.chars().next() {
            Some('+') => (1, &trimmed[1..]),
            Some('-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        let (hours, minutes) = match digits.len() {
            2 => (&digits[0..2], "0"),
            4 => (&digits[0..2], &digits[2..4]),
            _ => return Err(invalid()),
        };
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
    }
}

/// Metadata of a claimed input file. Immutable once created.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    file_reference: FileReference,
    file_config: FileConfig,
    file_modified: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn new(file_reference: FileReference, file_config: FileConfig, file_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            file_reference,
            file_config,
            file_modified,
        }
    }

    pub fn file_reference(&self) -> &FileReference {
        &self.file_reference
    }

    pub fn file_config(&self) -> &FileConfig {
        &self.file_config
    }

    pub fn file_modified(&self) -> Option<DateTime<Utc>> {
        self.file_modified
    }

    pub fn filename_matcher(&self) -> FilenameMatcher {
        FilenameMatcher::new(
            self.file_reference.filename(),
            self.file_config.pattern(),
            self.file_config.timezone(),
        )
    }
}

/// Named groups captured from a filename by a file config pattern.
///
/// Recognised time groups are `yyyy`, `yy`, `MM`, `dd`, `hh`, `mm` and `ss`.
#[derive(Debug, Clone)]
pub struct FilenameMatcher {
    matched: bool,
    groups: HashMap<String, String>,
    zone: FixedOffset,
}

impl FilenameMatcher {
    pub fn new(filename: &str, pattern: &Regex, zone: FixedOffset) -> Self {
        let mut groups = HashMap::new();
        let captures = pattern.captures(filename);
        if let Some(captures) = &captures {
            for name in pattern.capture_names().flatten() {
                if let Some(value) = captures.name(name) {
                    groups.insert(name.to_string(), value.as_str().to_string());
                }
            }
        }
        Self {
            matched: captures.is_some(),
            groups,
            zone,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched
    }

    pub fn group(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    fn number(&self, name: &str) -> Option<u32> {
        self.group(name).and_then(|v| v.parse().ok())
    }

    /// Timestamp encoded in the filename.
    ///
    /// Complete when year, month and day were captured; otherwise partial
    /// (day/hour/minute) in the file config's zone; absent when no time
    /// group matched.
    pub fn timestamp(&self) -> Option<PartialOrCompleteTimeInstant> {
        let year = self
            .number("yyyy")
            .map(|y| y as i32)
            .or_else(|| self.number("yy").map(|y| 2000 + y as i32));
        let month = self.number("MM");
        let day = self.number("dd");
        let hour = self.number("hh");
        let minute = self.number("mm");

        if let (Some(year), Some(month), Some(day)) = (year, month, day) {
            let local = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(
                hour.unwrap_or(0),
                minute.unwrap_or(0),
                self.number("ss").unwrap_or(0),
            )?;
            let complete = self.zone.from_local_datetime(&local).single()?.with_timezone(&Utc);
            return Some(PartialOrCompleteTimeInstant::of_complete(complete));
        }

        if day.is_none() && hour.is_none() && minute.is_none() {
            return None;
        }
        PartialDateTime::new(day, hour, minute)
            .ok()
            .map(|partial| PartialOrCompleteTimeInstant::of_partial(partial.with_zone(self.zone)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> Regex {
        Regex::new(s).unwrap()
    }

    #[test]
    fn test_complete_timestamp_from_filename() {
        let matcher = FilenameMatcher::new(
            "TAF_20190505_102013_12332319",
            &pattern(r"^TAF_(?P<yyyy>\d{4})(?P<MM>\d{2})(?P<dd>\d{2})_(?P<hh>\d{2})(?P<mm>\d{2})(?P<ss>\d{2})_\d{8}$"),
            FixedOffset::east_opt(0).unwrap(),
        );
        assert!(matcher.is_match());
        let ts = matcher.timestamp().unwrap();
        assert_eq!(
            ts.complete_time(),
            Some(Utc.with_ymd_and_hms(2019, 5, 5, 10, 20, 13).unwrap())
        );
    }

    #[test]
    fn test_partial_timestamp_keeps_zone() {
        let zone = FixedOffset::east_opt(2 * 3600).unwrap();
        let matcher = FilenameMatcher::new("metar_0512.txt", &pattern(r"^metar_(?P<dd>\d{2})(?P<hh>\d{2})\.txt$"), zone);
        let ts = matcher.timestamp().unwrap();
        assert!(!ts.is_complete());
        let partial = ts.partial_time().unwrap();
        assert_eq!((partial.day(), partial.hour()), (Some(5), Some(12)));
        assert_eq!(partial.zone(), Some(zone));
    }

    #[test]
    fn test_no_timestamp_without_time_groups() {
        let matcher = FilenameMatcher::new("taf.txt", &pattern(r"^taf\.txt$"), FixedOffset::east_opt(0).unwrap());
        assert!(matcher.is_match());
        assert!(matcher.timestamp().is_none());

        let matcher = FilenameMatcher::new("other.txt", &pattern(r"^taf\.txt$"), FixedOffset::east_opt(0).unwrap());
        assert!(!matcher.is_match());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(FileConfig::parse_timezone("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(FileConfig::parse_timezone("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(FileConfig::parse_timezone("-0130").unwrap().local_minus_utc(), -5400);
        assert!(FileConfig::parse_timezone("Europe/Helsinki").is_err());
    }
}
