use async_trait::async_trait;
use avi_common::{
    ArchiveAviationMessageBuilder, Clock, InputAviationMessage, LocationIndicatorType, PartialOrCompleteTimeInstant,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::context::SharedLoggingContext;
use crate::error::{ConfigError, PopulateError};
use crate::ids::IdMappings;
use crate::populator::{BoundConfig, MessagePopulator, PopulatorDependencies};
use crate::resolver::{resolve_complete_period, resolve_complete_time};

fn default_location_indicator_types() -> HashMap<String, LocationIndicatorType> {
    [
        ("SIGMET", LocationIndicatorType::IssuingAirTrafficServicesUnit),
        ("AIRMET", LocationIndicatorType::IssuingAirTrafficServicesUnit),
        ("TROPICAL_CYCLONE_ADVISORY", LocationIndicatorType::IssuingCentre),
        ("VOLCANIC_ASH_ADVISORY", LocationIndicatorType::IssuingCentre),
        ("SPACE_WEATHER_ADVISORY", LocationIndicatorType::IssuingCentre),
    ]
    .into_iter()
    .map(|(name, kind)| (name.to_string(), kind))
    .collect()
}

/// Copies the decoded message's text, format, type, times and station into
/// the record.
///
/// Partial times are completed against the filename timestamp, file
/// modification time or clock. The station comes from the location
/// indicator kind configured for the message type, aerodrome by default.
#[derive(Debug)]
pub struct MessageDataPopulator {
    clock: Arc<dyn Clock>,
    ids: Arc<IdMappings>,
    location_indicator_types: HashMap<String, LocationIndicatorType>,
}

impl MessageDataPopulator {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<IdMappings>) -> Self {
        Self {
            clock,
            ids,
            location_indicator_types: default_location_indicator_types(),
        }
    }

    pub fn from_config(config: &BoundConfig, dependencies: &PopulatorDependencies) -> Result<Self, ConfigError> {
        const PROPERTY: &str = "messageTypeLocationIndicatorTypes";
        let mut populator = Self::new(dependencies.clock.clone(), dependencies.ids.clone());
        if let Some(overrides) = config.string_map(PROPERTY) {
            for (message_type, kind) in overrides {
                let kind = kind
                    .parse::<LocationIndicatorType>()
                    .map_err(|e| config.invalid(PROPERTY, kind.as_str(), e.to_string()))?;
                populator
                    .location_indicator_types
                    .insert(message_type.to_ascii_uppercase(), kind);
            }
        }
        Ok(populator)
    }

    fn station_kind(&self, message_type: Option<&str>) -> LocationIndicatorType {
        message_type
            .and_then(|name| self.location_indicator_types.get(name))
            .copied()
            .unwrap_or(LocationIndicatorType::Aerodrome)
    }
}

#[async_trait]
impl MessagePopulator for MessageDataPopulator {
    async fn populate(
        &self,
        input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        let message = &input.message;
        let metadata = &input.file_metadata;

        target.set_message(message.original_message.as_str());
        target.set_format(self.ids.format_id(message.format.name())?);
        if let Some(message_type) = &message.message_type {
            target.set_type_id(self.ids.type_id(message_type.name())?);
        }

        let message_time = message
            .issue_time
            .as_ref()
            .and_then(|issue_time| resolve_complete_time(issue_time, metadata, self.clock.as_ref()));
        match message_time {
            Some(time) => {
                target.set_message_time(time);
            }
            None => debug!(ctx = %context, "Message issue time could not be completed"),
        }

        if let Some(validity) = &message.validity_time {
            let primary = message_time
                .map(PartialOrCompleteTimeInstant::of_complete)
                .or(message.issue_time);
            let completed = resolve_complete_period(validity, primary.as_ref(), metadata, self.clock.as_ref());
            if let Some(start) = completed.start().and_then(|s| s.complete_time()) {
                target.set_valid_from(start);
            }
            if let Some(end) = completed.end().and_then(|e| e.complete_time()) {
                target.set_valid_to(end);
            }
        }

        let type_name = message
            .message_type
            .as_ref()
            .map(|t| t.name().to_string())
            .or_else(|| target.type_id().and_then(|id| self.ids.type_name(id)).map(str::to_string));
        let kind = self.station_kind(type_name.as_deref());
        match message.location_indicator(kind) {
            Some(station) => {
                target.set_icao_airport_code(station);
            }
            None => debug!(ctx = %context, kind = %kind, "Message has no station location indicator"),
        }
        Ok(())
    }
}
