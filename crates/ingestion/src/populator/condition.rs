//! Activation conditions for populators.
//!
//! A condition maps property names to operator sets, e.g.
//!
//! ```yaml
//! activate_on:
//!   type:
//!     isAnyOf: [TAF]
//!   heading@COLLECT_IDENTIFIER,GTS_BULLETIN_HEADING:
//!     matchesNoneOf: ["^FT..3"]
//! ```
//!
//! All listed properties must satisfy their operators for the wrapped
//! populator to run. Heading-derived properties read the first configured
//! heading source that has a value; `@` overrides the source order for a
//! single property.

use async_trait::async_trait;
use avi_common::{
    ArchiveAviationMessageBuilder, BulletinHeadingSource, InputAviationMessage, InputBulletinHeading,
    LocationIndicatorType,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{MessagePopulator, PopulatorDependencies};
use crate::context::SharedLoggingContext;
use crate::error::{ConfigError, PopulateError};
use crate::ids::IdMappings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionProperty {
    ProductId,
    Route,
    Format,
    Type,
    Station,
    Heading,
    DataDesignator,
    Originator,
}

impl ConditionProperty {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "productId" => ConditionProperty::ProductId,
            "route" => ConditionProperty::Route,
            "format" => ConditionProperty::Format,
            "type" => ConditionProperty::Type,
            "station" => ConditionProperty::Station,
            "heading" => ConditionProperty::Heading,
            "dataDesignator" => ConditionProperty::DataDesignator,
            "originator" => ConditionProperty::Originator,
            _ => return None,
        })
    }

    fn uses_heading(&self) -> bool {
        matches!(
            self,
            ConditionProperty::Heading | ConditionProperty::DataDesignator | ConditionProperty::Originator
        )
    }
}

/// What is known about a message while the chain runs.
struct PropertySource<'a> {
    input: &'a InputAviationMessage,
    target: &'a ArchiveAviationMessageBuilder,
    ids: &'a IdMappings,
    product_routes: &'a HashMap<String, String>,
}

impl PropertySource<'_> {
    fn first_heading<T>(
        &self,
        sources: &[BulletinHeadingSource],
        read: impl Fn(&InputBulletinHeading) -> Option<T>,
    ) -> Option<T> {
        sources.iter().find_map(|source| read(self.input.heading(*source)))
    }

    fn read(&self, property: ConditionProperty, sources: &[BulletinHeadingSource]) -> Option<String> {
        let file_reference = self.input.file_metadata.file_reference();
        match property {
            ConditionProperty::ProductId => Some(file_reference.product_id().to_string()),
            ConditionProperty::Route => self
                .target
                .route()
                .and_then(|id| self.ids.route_name(id))
                .map(str::to_string)
                .or_else(|| self.product_routes.get(file_reference.product_id()).cloned()),
            ConditionProperty::Format => self
                .target
                .format()
                .and_then(|id| self.ids.format_name(id))
                .map(str::to_string)
                .or_else(|| Some(self.input.message.format.name().to_string())),
            ConditionProperty::Type => self
                .target
                .type_id()
                .and_then(|id| self.ids.type_name(id))
                .map(str::to_string)
                .or_else(|| self.input.message.message_type.as_ref().map(|t| t.name().to_string())),
            ConditionProperty::Station => self
                .target
                .icao_airport_code()
                .map(str::to_string)
                .or_else(|| {
                    LocationIndicatorType::ALL
                        .iter()
                        .find_map(|kind| self.input.message.location_indicator(*kind))
                        .map(str::to_string)
                }),
            ConditionProperty::Heading => self.first_heading(sources, |h| h.raw.clone()),
            ConditionProperty::DataDesignator => {
                self.first_heading(sources, |h| h.decoded.as_ref().map(|d| d.data_designators()))
            }
            ConditionProperty::Originator => {
                self.first_heading(sources, |h| h.decoded.as_ref().map(|d| d.location_indicator.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Present,
    Empty,
    Optional,
}

#[derive(Debug, Clone)]
struct PropertyCondition {
    key: String,
    property: ConditionProperty,
    sources: Vec<BulletinHeadingSource>,
    presence: Presence,
    is_any_of: Option<Vec<String>>,
    is_none_of: Option<Vec<String>>,
    matches_any_of: Option<Vec<Regex>>,
    matches_none_of: Option<Vec<Regex>>,
}

impl PropertyCondition {
    fn test(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return self.presence != Presence::Present;
        };
        self.presence != Presence::Empty
            && self.is_any_of.as_ref().map_or(true, |l| l.iter().any(|v| v == value))
            && self.is_none_of.as_ref().map_or(true, |l| l.iter().all(|v| v != value))
            && self.matches_any_of.as_ref().map_or(true, |l| l.iter().any(|r| r.is_match(value)))
            && self.matches_none_of.as_ref().map_or(true, |l| !l.iter().any(|r| r.is_match(value)))
    }
}

fn invalid(property: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidCondition {
        property: property.to_string(),
        reason: reason.into(),
    }
}

fn string_list(property: &str, operator: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar(item).ok_or_else(|| invalid(property, format!("{} expects a list of strings", operator))))
            .collect(),
        other => scalar(other)
            .map(|s| vec![s])
            .ok_or_else(|| invalid(property, format!("{} expects a list of strings", operator))),
    }
}

fn regex_list(property: &str, operator: &str, value: &Value) -> Result<Vec<Regex>, ConfigError> {
    string_list(property, operator, value)?
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| invalid(property, format!("{} pattern '{}': {}", operator, pattern, e)))
        })
        .collect()
}

fn parse_property_key(
    key: &str,
    default_sources: &[BulletinHeadingSource],
) -> Result<(ConditionProperty, Vec<BulletinHeadingSource>), ConfigError> {
    let (name, sources) = match key.split_once('@') {
        Some((name, sources)) => (name, Some(sources)),
        None => (key, None),
    };
    let property = ConditionProperty::parse(name.trim()).ok_or_else(|| invalid(key, "unknown property"))?;
    let sources = match sources {
        None => default_sources.to_vec(),
        Some(_) if !property.uses_heading() => {
            return Err(invalid(key, "heading sources apply only to heading properties"))
        }
        Some(list) => {
            let parsed = list
                .split(',')
                .map(|s| s.parse::<BulletinHeadingSource>().map_err(|e| invalid(key, e.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            if parsed.is_empty() {
                return Err(invalid(key, "empty heading source list"));
            }
            if parsed.iter().enumerate().any(|(i, source)| parsed[..i].contains(source)) {
                return Err(invalid(key, "heading source listed twice"));
            }
            parsed
        }
    };
    Ok((property, sources))
}

fn parse_property_condition(
    key: &str,
    operators: &Value,
    default_sources: &[BulletinHeadingSource],
) -> Result<PropertyCondition, ConfigError> {
    let (property, sources) = parse_property_key(key, default_sources)?;
    let operators = operators
        .as_object()
        .ok_or_else(|| invalid(key, "expected a map of operators"))?;
    if operators.is_empty() {
        return Err(invalid(key, "no operators given"));
    }

    let mut condition = PropertyCondition {
        key: key.to_string(),
        property,
        sources,
        presence: Presence::Present,
        is_any_of: None,
        is_none_of: None,
        matches_any_of: None,
        matches_none_of: None,
    };
    for (operator, value) in operators {
        match operator.as_str() {
            "presence" => {
                condition.presence = match value.as_str().map(str::to_ascii_uppercase).as_deref() {
                    Some("PRESENT") => Presence::Present,
                    Some("EMPTY") => Presence::Empty,
                    Some("OPTIONAL") => Presence::Optional,
                    _ => return Err(invalid(key, format!("invalid presence {}", value))),
                }
            }
            "isAnyOf" => condition.is_any_of = Some(string_list(key, operator, value)?),
            "isNoneOf" => condition.is_none_of = Some(string_list(key, operator, value)?),
            "matchesAnyOf" => condition.matches_any_of = Some(regex_list(key, operator, value)?),
            "matchesNoneOf" => condition.matches_none_of = Some(regex_list(key, operator, value)?),
            other => return Err(invalid(key, format!("unknown operator '{}'", other))),
        }
    }
    Ok(condition)
}

/// Conjunction of property conditions.
#[derive(Debug, Clone, Default)]
pub struct ActivationCondition {
    conditions: Vec<PropertyCondition>,
}

impl ActivationCondition {
    pub fn parse(
        spec: &Map<String, Value>,
        default_sources: &[BulletinHeadingSource],
    ) -> Result<Self, ConfigError> {
        let conditions = spec
            .iter()
            .map(|(key, operators)| parse_property_condition(key, operators, default_sources))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn test(
        &self,
        input: &InputAviationMessage,
        target: &ArchiveAviationMessageBuilder,
        ids: &IdMappings,
        product_routes: &HashMap<String, String>,
    ) -> bool {
        let source = PropertySource {
            input,
            target,
            ids,
            product_routes,
        };
        self.conditions.iter().all(|condition| {
            let value = source.read(condition.property, &condition.sources);
            let satisfied = condition.test(value.as_deref());
            if !satisfied {
                debug!(property = %condition.key, value = ?value, "Activation condition not met");
            }
            satisfied
        })
    }
}

/// Runs the wrapped populator only when its condition holds.
#[derive(Debug)]
pub struct ConditionalPopulator {
    condition: ActivationCondition,
    delegate: Arc<dyn MessagePopulator>,
    ids: Arc<IdMappings>,
    product_routes: Arc<HashMap<String, String>>,
}

impl ConditionalPopulator {
    pub fn new(
        condition: ActivationCondition,
        delegate: Arc<dyn MessagePopulator>,
        dependencies: &PopulatorDependencies,
    ) -> Self {
        Self {
            condition,
            delegate,
            ids: dependencies.ids.clone(),
            product_routes: dependencies.product_routes.clone(),
        }
    }
}

#[async_trait]
impl MessagePopulator for ConditionalPopulator {
    async fn populate(
        &self,
        input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        if self.condition.test(input, target, &self.ids, &self.product_routes) {
            self.delegate.populate(input, target, context).await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avi_common::{
        FileConfig, FileMetadata, FileReference, GenericAviationMessage, MessageFormat, MessageReference,
        MessageType,
    };
    use chrono::FixedOffset;
    use serde_json::json;

    fn input(gts: Option<&str>, collect: Option<&str>) -> InputAviationMessage {
        let config = FileConfig::new(
            Regex::new(".*").unwrap(),
            MessageFormat::Tac,
            FixedOffset::east_opt(0).unwrap(),
        );
        let metadata = FileMetadata::new(FileReference::new("taf", "taf.txt"), config, None);
        let mut message = GenericAviationMessage::new(MessageFormat::Tac, "TAF EFKE 020532Z 0206/0312 CAVOK=");
        message.message_type = Some(MessageType::new("TAF"));
        message
            .location_indicators
            .insert(LocationIndicatorType::Aerodrome, "EFKE".to_string());
        InputAviationMessage {
            file_metadata: Arc::new(metadata),
            gts_bulletin_heading: gts.map(InputBulletinHeading::from_raw).unwrap_or_default(),
            collect_identifier: collect.map(InputBulletinHeading::from_raw).unwrap_or_default(),
            message,
            message_reference: MessageReference::new(0, 0),
            char_offset: None,
        }
    }

    fn condition(spec: Value) -> ActivationCondition {
        ActivationCondition::parse(spec.as_object().unwrap(), &BulletinHeadingSource::DEFAULT_ORDER).unwrap()
    }

    fn holds(condition: &ActivationCondition, input: &InputAviationMessage) -> bool {
        condition.test(input, &ArchiveAviationMessageBuilder::default(), &IdMappings::default(), &HashMap::new())
    }

    #[test]
    fn test_value_operators() {
        let msg = input(Some("FTFI33 EFPP 020500"), None);
        assert!(holds(&condition(json!({"type": {"isAnyOf": ["TAF", "METAR"]}})), &msg));
        assert!(!holds(&condition(json!({"type": {"isNoneOf": ["TAF"]}})), &msg));
        assert!(holds(&condition(json!({"station": {"matchesAnyOf": "^EF"}})), &msg));
        assert!(!holds(&condition(json!({"originator": {"matchesNoneOf": ["PP$"]}})), &msg));
        assert!(holds(&condition(json!({"dataDesignator": {"isAnyOf": ["FTFI"]}, "productId": {"isAnyOf": ["taf"]}})), &msg));
    }

    #[test]
    fn test_presence() {
        let msg = input(None, None);
        assert!(!holds(&condition(json!({"heading": {"presence": "PRESENT"}})), &msg));
        assert!(holds(&condition(json!({"heading": {"presence": "EMPTY"}})), &msg));
        assert!(holds(&condition(json!({"heading": {"presence": "OPTIONAL", "isAnyOf": ["X"]}})), &msg));
        // Absent values fail value operators unless presence says otherwise.
        assert!(!holds(&condition(json!({"heading": {"isNoneOf": ["X"]}})), &msg));
    }

    #[test]
    fn test_heading_source_order() {
        let msg = input(Some("FTFI33 EFPP 020500"), Some("LTFI31 EFKL 020500"));
        let gts_first = condition(json!({"originator": {"isAnyOf": ["EFPP"]}}));
        let collect_first = condition(json!({"originator@COLLECT_IDENTIFIER,GTS_BULLETIN_HEADING": {"isAnyOf": ["EFKL"]}}));
        assert!(holds(&gts_first, &msg));
        assert!(holds(&collect_first, &msg));

        let only_collect = input(None, Some("LTFI31 EFKL 020500"));
        assert!(holds(&condition(json!({"originator": {"isAnyOf": ["EFKL"]}})), &only_collect));
    }

    #[test]
    fn test_invalid_conditions() {
        let sources = BulletinHeadingSource::DEFAULT_ORDER;
        for spec in [
            json!({"unknown": {"isAnyOf": ["X"]}}),
            json!({"type@GTS_BULLETIN_HEADING": {"isAnyOf": ["X"]}}),
            json!({"heading@NOWHERE": {"isAnyOf": ["X"]}}),
            json!({"heading@GTS_BULLETIN_HEADING,GTS_BULLETIN_HEADING": {"isAnyOf": ["X"]}}),
            json!({"heading": {}}),
            json!({"heading": {"presence": "SOMETIMES"}}),
            json!({"heading": {"matchesAnyOf": ["("]}}),
        ] {
            assert!(
                ActivationCondition::parse(spec.as_object().unwrap(), &sources).is_err(),
                "accepted {}",
                spec
            );
        }
    }
}
