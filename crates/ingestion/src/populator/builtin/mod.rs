//! Built-in populators.

use std::sync::Arc;

use super::config::{ConfigSlot, SlotKind};
use super::registry::PopulatorFactory;

mod bulletin_heading;
mod file_metadata;
mod fixed;
mod message_data;
mod station;
mod validators;

pub use bulletin_heading::{message_type_for_designator, BulletinHeadingDataPopulator};
pub use file_metadata::FileMetadataPopulator;
pub use fixed::{
    FixedDurationValidityPeriodPopulator, FixedProcessingResultPopulator, FixedRoutePopulator, FixedTypePopulator,
    MessageDiscarder,
};
pub use message_data::MessageDataPopulator;
pub use station::{StationIcaoCodeAuthorizer, StationIcaoCodeReplacer, StationIdPopulator};
pub use validators::{MessageFutureTimeValidator, MessageMaximumAgeValidator, MessageValidityPeriodValidator};

const LOCATION_INDICATOR_TYPES: &[&str] = &[
    "AERODROME",
    "ISSUING_AIR_TRAFFIC_SERVICES_UNIT",
    "ISSUING_AIR_TRAFFIC_SERVICES_REGION",
    "ISSUING_CENTRE",
    "ORIGINATING_METEOROLOGICAL_WATCH_OFFICE",
];

/// Factories for every built-in populator.
pub fn factories() -> Vec<PopulatorFactory> {
    vec![
        PopulatorFactory::new("FileMetadataPopulator", &[], |_, deps| {
            Ok(Arc::new(FileMetadataPopulator::new(deps)?))
        }),
        PopulatorFactory::new(
            "BulletinHeadingDataPopulator",
            &[ConfigSlot::optional("bulletinHeadingSources", SlotKind::StringList)],
            |config, deps| Ok(Arc::new(BulletinHeadingDataPopulator::from_config(config, deps)?)),
        ),
        PopulatorFactory::new(
            "MessageDataPopulator",
            &[ConfigSlot::optional(
                "messageTypeLocationIndicatorTypes",
                SlotKind::StringMap,
            )],
            |config, deps| Ok(Arc::new(MessageDataPopulator::from_config(config, deps)?)),
        ),
        PopulatorFactory::new("StationIdPopulator", &[], |_, deps| {
            Ok(Arc::new(StationIdPopulator::new(
                deps.persistence.clone(),
                deps.database_retry,
            )))
        }),
        PopulatorFactory::new(
            "StationIcaoCodeReplacer",
            &[
                ConfigSlot::required("pattern", SlotKind::Regex),
                ConfigSlot::required("replacement", SlotKind::String),
            ],
            |config, _| {
                Ok(Arc::new(StationIcaoCodeReplacer::new(
                    config.require_regex("pattern")?.clone(),
                    config.require_string("replacement")?,
                )))
            },
        ),
        PopulatorFactory::new(
            "StationIcaoCodeAuthorizer",
            &[
                ConfigSlot::required("pattern", SlotKind::Regex),
                ConfigSlot::optional("messageType", SlotKind::String),
            ],
            |config, deps| {
                let message_type = config
                    .string("messageType")
                    .map(|name| deps.ids.type_id(name))
                    .transpose()?;
                Ok(Arc::new(StationIcaoCodeAuthorizer::new(
                    config.require_regex("pattern")?.clone(),
                    message_type,
                )))
            },
        ),
        PopulatorFactory::new("MessageDiscarder", &[], |_, _| Ok(Arc::new(MessageDiscarder))),
        PopulatorFactory::new(
            "FixedProcessingResultPopulator",
            &[ConfigSlot::required("result", SlotKind::ProcessingResult)],
            |config, _| {
                Ok(Arc::new(FixedProcessingResultPopulator::new(
                    config.require_processing_result("result")?,
                )))
            },
        ),
        PopulatorFactory::new(
            "FixedTypePopulator",
            &[ConfigSlot::required("type", SlotKind::String)],
            |config, deps| {
                let type_id = deps.ids.type_id(config.require_string("type")?)?;
                Ok(Arc::new(FixedTypePopulator::new(type_id)))
            },
        ),
        PopulatorFactory::new(
            "FixedRoutePopulator",
            &[ConfigSlot::required("route", SlotKind::String)],
            |config, deps| {
                let route_id = deps.ids.route_id(config.require_string("route")?)?;
                Ok(Arc::new(FixedRoutePopulator::new(route_id)))
            },
        ),
        PopulatorFactory::new(
            "FixedDurationValidityPeriodPopulator",
            &[ConfigSlot::required("validityEndOffset", SlotKind::Duration)],
            |config, _| {
                Ok(Arc::new(FixedDurationValidityPeriodPopulator::new(
                    config.require_duration("validityEndOffset")?,
                )))
            },
        ),
        PopulatorFactory::new(
            "MessageFutureTimeValidator",
            &[ConfigSlot::required("acceptInFuture", SlotKind::Duration)],
            |config, deps| {
                Ok(Arc::new(MessageFutureTimeValidator::new(
                    deps.clock.clone(),
                    config.require_duration("acceptInFuture")?,
                )))
            },
        ),
        PopulatorFactory::new(
            "MessageMaximumAgeValidator",
            &[ConfigSlot::required("maximumAge", SlotKind::Duration)],
            |config, deps| {
                Ok(Arc::new(MessageMaximumAgeValidator::new(
                    deps.clock.clone(),
                    config.require_duration("maximumAge")?,
                )))
            },
        ),
        PopulatorFactory::new("MessageValidityPeriodValidator", &[], |_, _| {
            Ok(Arc::new(MessageValidityPeriodValidator))
        }),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use avi_common::{
        FileConfig, FileMetadata, FileReference, GenericAviationMessage, InputAviationMessage, InputBulletinHeading,
        MessageFormat, MessageReference,
    };
    use chrono::{DateTime, FixedOffset, Utc};
    use regex::Regex;
    use std::sync::Arc;

    use crate::context::{LoggingContext, SharedLoggingContext};

    pub fn metadata(filename: &str, modified: Option<DateTime<Utc>>) -> Arc<FileMetadata> {
        let pattern = Regex::new(r"^TAF_(?P<yyyy>\d{4})(?P<MM>\d{2})(?P<dd>\d{2})_(?P<hh>\d{2})(?P<mm>\d{2})(?P<ss>\d{2})")
            .unwrap();
        let config = FileConfig::new(pattern, MessageFormat::Tac, FixedOffset::east_opt(0).unwrap());
        Arc::new(FileMetadata::new(FileReference::new("taf", filename), config, modified))
    }

    pub fn input(text: &str, gts: Option<&str>) -> InputAviationMessage {
        InputAviationMessage {
            file_metadata: metadata("taf.txt", None),
            gts_bulletin_heading: gts.map(InputBulletinHeading::from_raw).unwrap_or_default(),
            collect_identifier: InputBulletinHeading::default(),
            message: GenericAviationMessage::new(MessageFormat::Tac, text),
            message_reference: MessageReference::new(0, 0),
            char_offset: None,
        }
    }

    pub fn context() -> SharedLoggingContext {
        SharedLoggingContext::new(LoggingContext::new("test"))
    }
}
