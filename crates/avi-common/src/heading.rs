//! WMO GTS abbreviated bulletin headings (`TTAAii CCCC YYGGgg [BBB]`).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{AviError, AviResult};
use crate::time::PartialDateTime;

fn heading_regex() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| {
        Regex::new(
            r"^(?P<t1t2>[A-Z]{2})(?P<a1a2>[A-Z]{2})(?P<ii>\d{2})\s+(?P<cccc>[A-Z]{4})\s+(?P<time>\d{6})(?:\s+(?P<bbb>(?:RR|AA|CC)[A-Z]))?\s*$",
        )
        .expect("bulletin heading regex is valid")
    })
}

/// Kind of bulletin indicated by the optional BBB group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulletinHeadingType {
    Normal,
    Delayed,
    Amended,
    Corrected,
}

impl BulletinHeadingType {
    /// Two-letter BBB prefix, absent for normal bulletins.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            BulletinHeadingType::Normal => None,
            BulletinHeadingType::Delayed => Some("RR"),
            BulletinHeadingType::Amended => Some("AA"),
            BulletinHeadingType::Corrected => Some("CC"),
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "RR" => Some(BulletinHeadingType::Delayed),
            "AA" => Some(BulletinHeadingType::Amended),
            "CC" => Some(BulletinHeadingType::Corrected),
            _ => None,
        }
    }
}

/// A decoded bulletin heading.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BulletinHeading {
    /// T1T2, e.g. `FT` for long TAFs
    pub data_type_designator: String,
    /// A1A2, e.g. `FI` for Finland
    pub geographical_designator: String,
    pub bulletin_number: u8,
    /// CCCC
    pub location_indicator: String,
    pub issue_time: PartialDateTime,
    pub heading_type: BulletinHeadingType,
    pub augmentation_number: Option<u8>,
}

impl BulletinHeading {
    /// Parse a heading such as `FTFI33 EFPP 020500` or `FTFI33 EFPP 020500 RRB`.
    pub fn parse(s: &str) -> AviResult<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        let caps = heading_regex()
            .captures(&normalized)
            .ok_or_else(|| AviError::InvalidHeading(s.to_string()))?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();

        let bulletin_number = group("ii")
            .parse()
            .map_err(|_| AviError::InvalidHeading(s.to_string()))?;
        let issue_time = PartialDateTime::parse(group("time"))?;

        let (heading_type, augmentation_number) = match caps.name("bbb") {
            Some(bbb) => {
                let bbb = bbb.as_str();
                let heading_type = BulletinHeadingType::from_prefix(&bbb[0..2])
                    .ok_or_else(|| AviError::InvalidHeading(s.to_string()))?;
                let letter = bbb.as_bytes()[2];
                (heading_type, Some(letter - b'A' + 1))
            }
            None => (BulletinHeadingType::Normal, None),
        };

        Ok(Self {
            data_type_designator: group("t1t2").to_string(),
            geographical_designator: group("a1a2").to_string(),
            bulletin_number,
            location_indicator: group("cccc").to_string(),
            issue_time,
            heading_type,
            augmentation_number,
        })
    }

    /// T1T2A1A2, e.g. `FTFI`.
    pub fn data_designators(&self) -> String {
        format!("{}{}", self.data_type_designator, self.geographical_designator)
    }

    /// Version code derived from the BBB group: `RRB` for the second delayed
    /// bulletin, `CCA` for the first correction, none for normal bulletins.
    ///
    /// Augmentation numbers outside 1..=26 have no letter and are rejected
    /// rather than wrapped.
    pub fn version(&self) -> AviResult<Option<String>> {
        let Some(prefix) = self.heading_type.prefix() else {
            return Ok(None);
        };
        let number = self.augmentation_number.unwrap_or(1);
        if !(1..=26).contains(&number) {
            return Err(AviError::InvalidAugmentationNumber(number));
        }
        let letter = char::from(b'A' + number - 1);
        Ok(Some(format!("{}{}", prefix, letter)))
    }
}

impl fmt::Display for BulletinHeading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.issue_time;
        write!(
            f,
            "{}{}{:02} {} {:02}{:02}{:02}",
            self.data_type_designator,
            self.geographical_designator,
            self.bulletin_number,
            self.location_indicator,
            time.day().unwrap_or(0),
            time.hour().unwrap_or(0),
            time.minute().unwrap_or(0),
        )?;
        if let Ok(Some(version)) = self.version() {
            write!(f, " {}", version)?;
        }
        Ok(())
    }
}

/// Where a message's heading information came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulletinHeadingSource {
    /// Transport-level GTS bulletin heading
    GtsBulletinHeading,
    /// IWXXM collect identifier embedded in the payload
    CollectIdentifier,
}

impl BulletinHeadingSource {
    pub const DEFAULT_ORDER: [BulletinHeadingSource; 2] = [
        BulletinHeadingSource::GtsBulletinHeading,
        BulletinHeadingSource::CollectIdentifier,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BulletinHeadingSource::GtsBulletinHeading => "GTS_BULLETIN_HEADING",
            BulletinHeadingSource::CollectIdentifier => "COLLECT_IDENTIFIER",
        }
    }
}

impl FromStr for BulletinHeadingSource {
    type Err = AviError;

    fn from_str(s: &str) -> AviResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GTS_BULLETIN_HEADING" => Ok(BulletinHeadingSource::GtsBulletinHeading),
            "COLLECT_IDENTIFIER" => Ok(BulletinHeadingSource::CollectIdentifier),
            _ => Err(AviError::UnknownName {
                kind: "bulletin heading source",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BulletinHeadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Heading as found in the input, raw and (when decodable) decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBulletinHeading {
    pub raw: Option<String>,
    pub decoded: Option<BulletinHeading>,
}

impl InputBulletinHeading {
    /// Keep the raw string and decode it if possible.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let decoded = BulletinHeading::parse(&raw).ok();
        Self { raw: Some(raw), decoded }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.decoded.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normal_heading() {
        let heading = BulletinHeading::parse("FTFI33 EFPP 020500").unwrap();
        assert_eq!(heading.data_designators(), "FTFI");
        assert_eq!(heading.bulletin_number, 33);
        assert_eq!(heading.location_indicator, "EFPP");
        assert_eq!(heading.heading_type, BulletinHeadingType::Normal);
        assert_eq!(heading.version().unwrap(), None);
        assert_eq!(heading.to_string(), "FTFI33 EFPP 020500");
    }

    #[test]
    fn test_parse_delayed_heading() {
        let heading = BulletinHeading::parse("FTFI33  EFPP 020500 RRB").unwrap();
        assert_eq!(heading.heading_type, BulletinHeadingType::Delayed);
        assert_eq!(heading.augmentation_number, Some(2));
        assert_eq!(heading.version().unwrap().as_deref(), Some("RRB"));
    }

    #[test]
    fn test_version_rejects_out_of_range_augmentation() {
        let mut heading = BulletinHeading::parse("FTFI33 EFPP 020500 CCA").unwrap();
        heading.augmentation_number = Some(26);
        assert_eq!(heading.version().unwrap().as_deref(), Some("CCZ"));
        heading.augmentation_number = Some(27);
        assert!(matches!(heading.version(), Err(AviError::InvalidAugmentationNumber(27))));
        heading.augmentation_number = Some(0);
        assert!(heading.version().is_err());
    }

    #[test]
    fn test_invalid_heading() {
        assert!(BulletinHeading::parse("TAF EFKE").is_err());
        let input = InputBulletinHeading::from_raw("garbage");
        assert_eq!(input.raw.as_deref(), Some("garbage"));
        assert!(input.decoded.is_none());
    }
}
