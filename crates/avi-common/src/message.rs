//! Decoded input messages and the archive records built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AviError, AviResult};
use crate::file::{FileMetadata, MessageFormat};
use crate::heading::{BulletinHeadingSource, InputBulletinHeading};
use crate::time::{PartialOrCompleteTimeInstant, PartialOrCompleteTimePeriod};

/// Aviation message type such as `TAF`, `METAR` or `SIGMET`.
///
/// Kept open-ended: the set of known types comes from the id configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_ascii_uppercase())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a location indicator within a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationIndicatorType {
    Aerodrome,
    IssuingAirTrafficServicesUnit,
    IssuingAirTrafficServicesRegion,
    IssuingCentre,
    OriginatingMeteorologicalWatchOffice,
}

impl LocationIndicatorType {
    pub fn name(&self) -> &'static str {
        match self {
            LocationIndicatorType::Aerodrome => "AERODROME",
            LocationIndicatorType::IssuingAirTrafficServicesUnit => "ISSUING_AIR_TRAFFIC_SERVICES_UNIT",
            LocationIndicatorType::IssuingAirTrafficServicesRegion => "ISSUING_AIR_TRAFFIC_SERVICES_REGION",
            LocationIndicatorType::IssuingCentre => "ISSUING_CENTRE",
            LocationIndicatorType::OriginatingMeteorologicalWatchOffice => "ORIGINATING_METEOROLOGICAL_WATCH_OFFICE",
        }
    }

    pub const ALL: [LocationIndicatorType; 5] = [
        LocationIndicatorType::Aerodrome,
        LocationIndicatorType::IssuingAirTrafficServicesUnit,
        LocationIndicatorType::IssuingAirTrafficServicesRegion,
        LocationIndicatorType::IssuingCentre,
        LocationIndicatorType::OriginatingMeteorologicalWatchOffice,
    ];
}

impl FromStr for LocationIndicatorType {
    type Err = AviError;

    fn from_str(s: &str) -> AviResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == upper)
            .ok_or_else(|| AviError::UnknownName {
                kind: "location indicator type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for LocationIndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format-independent view of a decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericAviationMessage {
    pub message_type: Option<MessageType>,
    pub format: MessageFormat,
    pub original_message: String,
    pub issue_time: Option<PartialOrCompleteTimeInstant>,
    pub validity_time: Option<PartialOrCompleteTimePeriod>,
    pub location_indicators: BTreeMap<LocationIndicatorType, String>,
    pub translated: bool,
}

impl GenericAviationMessage {
    pub fn new(format: MessageFormat, original_message: impl Into<String>) -> Self {
        Self {
            message_type: None,
            format,
            original_message: original_message.into(),
            issue_time: None,
            validity_time: None,
            location_indicators: BTreeMap::new(),
            translated: false,
        }
    }

    pub fn location_indicator(&self, kind: LocationIndicatorType) -> Option<&str> {
        self.location_indicators.get(&kind).map(String::as_str)
    }
}

/// Position of a message within its file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageReference {
    pub bulletin_index: usize,
    pub message_index: usize,
}

impl MessageReference {
    pub fn new(bulletin_index: usize, message_index: usize) -> Self {
        Self {
            bulletin_index,
            message_index,
        }
    }
}

/// One message of one bulletin as produced by a decoder.
#[derive(Debug, Clone)]
pub struct InputAviationMessage {
    pub file_metadata: Arc<FileMetadata>,
    pub gts_bulletin_heading: InputBulletinHeading,
    pub collect_identifier: InputBulletinHeading,
    pub message: GenericAviationMessage,
    pub message_reference: MessageReference,
    /// Character offset of the message within the file content, when known.
    pub char_offset: Option<usize>,
}

impl InputAviationMessage {
    pub fn heading(&self, source: BulletinHeadingSource) -> &InputBulletinHeading {
        match source {
            BulletinHeadingSource::GtsBulletinHeading => &self.gts_bulletin_heading,
            BulletinHeadingSource::CollectIdentifier => &self.collect_identifier,
        }
    }
}

/// Outcome attached to an archive record. Ordered from best to worst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingResult {
    #[default]
    Ok,
    UnknownStationIcaoCode,
    ForbiddenMessageStationIcaoCode,
    MessageTimeInFuture,
    MessageTooOld,
    InvalidValidityPeriod,
    Failed,
}

impl ProcessingResult {
    pub const ALL: [ProcessingResult; 7] = [
        ProcessingResult::Ok,
        ProcessingResult::UnknownStationIcaoCode,
        ProcessingResult::ForbiddenMessageStationIcaoCode,
        ProcessingResult::MessageTimeInFuture,
        ProcessingResult::MessageTooOld,
        ProcessingResult::InvalidValidityPeriod,
        ProcessingResult::Failed,
    ];

    /// Stable numeric code stored alongside rejected records.
    pub fn code(&self) -> i32 {
        match self {
            ProcessingResult::Ok => 0,
            ProcessingResult::UnknownStationIcaoCode => 1,
            ProcessingResult::ForbiddenMessageStationIcaoCode => 2,
            ProcessingResult::MessageTimeInFuture => 3,
            ProcessingResult::MessageTooOld => 4,
            ProcessingResult::InvalidValidityPeriod => 5,
            ProcessingResult::Failed => 99,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProcessingResult::Ok => "OK",
            ProcessingResult::UnknownStationIcaoCode => "UNKNOWN_STATION_ICAO_CODE",
            ProcessingResult::ForbiddenMessageStationIcaoCode => "FORBIDDEN_MESSAGE_STATION_ICAO_CODE",
            ProcessingResult::MessageTimeInFuture => "MESSAGE_TIME_IN_FUTURE",
            ProcessingResult::MessageTooOld => "MESSAGE_TOO_OLD",
            ProcessingResult::InvalidValidityPeriod => "INVALID_VALIDITY_PERIOD",
            ProcessingResult::Failed => "FAILED",
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == ProcessingResult::Ok
    }
}

impl FromStr for ProcessingResult {
    type Err = AviError;

    fn from_str(s: &str) -> AviResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|result| result.name() == upper)
            .ok_or_else(|| AviError::UnknownName {
                kind: "processing result",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message record ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveAviationMessage {
    pub route: i32,
    pub format: i32,
    #[serde(rename = "type")]
    pub type_id: i32,
    pub message_time: DateTime<Utc>,
    pub icao_airport_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_id: Option<i32>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_modified: Option<DateTime<Utc>>,
    pub processing_result: ProcessingResult,
}

impl ArchiveAviationMessage {
    pub fn builder() -> ArchiveAviationMessageBuilder {
        ArchiveAviationMessageBuilder::default()
    }
}

/// Mutable accumulator threaded through the populator chain.
///
/// Getters return `None` until a value has been set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveAviationMessageBuilder {
    route: Option<i32>,
    format: Option<i32>,
    type_id: Option<i32>,
    message_time: Option<DateTime<Utc>>,
    icao_airport_code: Option<String>,
    station_id: Option<i32>,
    message: Option<String>,
    heading: Option<String>,
    version: Option<String>,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    file_modified: Option<DateTime<Utc>>,
    processing_result: ProcessingResult,
}

macro_rules! builder_field {
    ($get:ident, $set:ident, $clear:ident, Copy $ty:ty) => {
        pub fn $get(&self) -> Option<$ty> {
            self.$get
        }

        pub fn $set(&mut self, value: $ty) -> &mut Self {
            self.$get = Some(value);
            self
        }

        pub fn $clear(&mut self) -> &mut Self {
            self.$get = None;
            self
        }
    };
    ($get:ident, $set:ident, $clear:ident, String) => {
        pub fn $get(&self) -> Option<&str> {
            self.$get.as_deref()
        }

        pub fn $set(&mut self, value: impl Into<String>) -> &mut Self {
            self.$get = Some(value.into());
            self
        }

        pub fn $clear(&mut self) -> &mut Self {
            self.$get = None;
            self
        }
    };
}

impl ArchiveAviationMessageBuilder {
    builder_field!(route, set_route, clear_route, Copy i32);
    builder_field!(format, set_format, clear_format, Copy i32);
    builder_field!(type_id, set_type_id, clear_type_id, Copy i32);
    builder_field!(message_time, set_message_time, clear_message_time, Copy DateTime<Utc>);
    builder_field!(icao_airport_code, set_icao_airport_code, clear_icao_airport_code, String);
    builder_field!(station_id, set_station_id, clear_station_id, Copy i32);
    builder_field!(message, set_message, clear_message, String);
    builder_field!(heading, set_heading, clear_heading, String);
    builder_field!(version, set_version, clear_version, String);
    builder_field!(valid_from, set_valid_from, clear_valid_from, Copy DateTime<Utc>);
    builder_field!(valid_to, set_valid_to, clear_valid_to, Copy DateTime<Utc>);
    builder_field!(file_modified, set_file_modified, clear_file_modified, Copy DateTime<Utc>);

    pub fn processing_result(&self) -> ProcessingResult {
        self.processing_result
    }

    pub fn set_processing_result(&mut self, result: ProcessingResult) -> &mut Self {
        self.processing_result = result;
        self
    }

    /// Freeze into a record. Route, format, type, message time, station
    /// ICAO code and message text are required.
    pub fn build(&self) -> AviResult<ArchiveAviationMessage> {
        Ok(ArchiveAviationMessage {
            route: self.route.ok_or(AviError::MissingField("route"))?,
            format: self.format.ok_or(AviError::MissingField("format"))?,
            type_id: self.type_id.ok_or(AviError::MissingField("type"))?,
            message_time: self.message_time.ok_or(AviError::MissingField("message_time"))?,
            icao_airport_code: self
                .icao_airport_code
                .clone()
                .ok_or(AviError::MissingField("icao_airport_code"))?,
            station_id: self.station_id,
            message: self.message.clone().ok_or(AviError::MissingField("message"))?,
            heading: self.heading.clone(),
            version: self.version.clone(),
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            file_modified: self.file_modified,
            processing_result: self.processing_result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_processing_result_order() {
        assert!(ProcessingResult::Ok < ProcessingResult::UnknownStationIcaoCode);
        assert!(ProcessingResult::InvalidValidityPeriod < ProcessingResult::Failed);
        assert_eq!(
            "message_too_old".parse::<ProcessingResult>().unwrap(),
            ProcessingResult::MessageTooOld
        );
    }

    #[test]
    fn test_builder_requires_fields() {
        let mut builder = ArchiveAviationMessage::builder();
        builder.set_route(1).set_format(1).set_type_id(2);
        assert!(matches!(builder.build(), Err(AviError::MissingField("message_time"))));

        builder
            .set_message_time(Utc.with_ymd_and_hms(2019, 5, 2, 5, 32, 0).unwrap())
            .set_icao_airport_code("EFKE")
            .set_message("TAF EFKE 020532Z 0206/0312 05005KT 9999 FEW020=");
        let record = builder.build().unwrap();
        assert_eq!(record.icao_airport_code, "EFKE");
        assert_eq!(record.version, None);
        assert_eq!(record.processing_result, ProcessingResult::Ok);
    }

    #[test]
    fn test_record_json_skips_absent_fields() {
        let mut builder = ArchiveAviationMessage::builder();
        builder
            .set_route(1)
            .set_format(1)
            .set_type_id(2)
            .set_message_time(Utc.with_ymd_and_hms(2019, 5, 2, 5, 32, 0).unwrap())
            .set_icao_airport_code("EFKE")
            .set_message("TAF EFKE=")
            .set_processing_result(ProcessingResult::MessageTooOld);
        let json = serde_json::to_value(builder.build().unwrap()).unwrap();
        assert_eq!(json["type"], 2);
        assert_eq!(json["processing_result"], "MESSAGE_TOO_OLD");
        assert!(json.get("version").is_none());
    }

    #[test]
    fn test_unset_getters_are_none() {
        let mut builder = ArchiveAviationMessageBuilder::default();
        assert_eq!(builder.version(), None);
        builder.set_version("RRA");
        assert_eq!(builder.version(), Some("RRA"));
        builder.clear_version();
        assert_eq!(builder.version(), None);
    }
}
