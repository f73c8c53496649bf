use async_trait::async_trait;
use avi_common::{ArchiveAviationMessageBuilder, BulletinHeadingSource, InputAviationMessage, InputBulletinHeading};
use std::sync::Arc;
use tracing::debug;

use crate::context::SharedLoggingContext;
use crate::error::{ConfigError, PopulateError};
use crate::ids::IdMappings;
use crate::populator::{BoundConfig, MessagePopulator, PopulatorDependencies};

/// Message type implied by a heading's T1T2 data type designator.
pub fn message_type_for_designator(t1t2: &str) -> Option<&'static str> {
    Some(match t1t2 {
        "FT" | "FC" => "TAF",
        "SA" => "METAR",
        "SP" => "SPECI",
        "WS" | "WC" | "WV" => "SIGMET",
        "WA" => "AIRMET",
        "FK" => "TROPICAL_CYCLONE_ADVISORY",
        "FV" => "VOLCANIC_ASH_ADVISORY",
        "FN" => "SPACE_WEATHER_ADVISORY",
        _ => return None,
    })
}

/// Copies heading text, version and (when still unset) message type from
/// the first heading source that provides each.
#[derive(Debug)]
pub struct BulletinHeadingDataPopulator {
    sources: Vec<BulletinHeadingSource>,
    ids: Arc<IdMappings>,
}

impl BulletinHeadingDataPopulator {
    pub fn new(sources: Vec<BulletinHeadingSource>, ids: Arc<IdMappings>) -> Self {
        Self { sources, ids }
    }

    pub fn from_config(config: &BoundConfig, dependencies: &PopulatorDependencies) -> Result<Self, ConfigError> {
        const PROPERTY: &str = "bulletinHeadingSources";
        let sources = match config.string_list(PROPERTY) {
            None => dependencies.bulletin_heading_sources.clone(),
            Some(names) => {
                let sources = names
                    .iter()
                    .map(|name| {
                        name.parse::<BulletinHeadingSource>()
                            .map_err(|e| config.invalid(PROPERTY, name.as_str(), e.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if sources.is_empty() {
                    return Err(config.invalid(PROPERTY, "[]", "at least one source is required"));
                }
                sources
            }
        };
        Ok(Self::new(sources, dependencies.ids.clone()))
    }

    fn headings<'a>(&'a self, input: &'a InputAviationMessage) -> impl Iterator<Item = &'a InputBulletinHeading> + 'a {
        self.sources.iter().map(move |source| input.heading(*source))
    }
}

#[async_trait]
impl MessagePopulator for BulletinHeadingDataPopulator {
    async fn populate(
        &self,
        input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        if let Some(raw) = self.headings(input).find_map(|h| h.raw.as_deref()) {
            target.set_heading(raw.split_whitespace().collect::<Vec<_>>().join(" "));
        }

        if let Some(decoded) = self.headings(input).find_map(|h| h.decoded.as_ref()) {
            match decoded.version()? {
                Some(version) => target.set_version(version),
                None => target.clear_version(),
            };

            if target.type_id().is_none() {
                let type_id = message_type_for_designator(&decoded.data_type_designator)
                    .and_then(|name| self.ids.type_id(name).ok());
                if let Some(type_id) = type_id {
                    target.set_type_id(type_id);
                } else {
                    debug!(ctx = %context, designator = %decoded.data_type_designator, "No message type for designator");
                }
            }
        }
        Ok(())
    }
}
