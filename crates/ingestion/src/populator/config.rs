//! Typed configuration slots for populator factories.
//!
//! A factory declares the properties it accepts; [`bind`] checks a
//! declarative config map against them and converts every value up front,
//! so a bad chain definition fails at startup rather than per message.

use avi_common::{parse_iso8601_duration, ProcessingResult};
use chrono::Duration;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    String,
    Bool,
    Integer,
    /// ISO-8601 duration such as `PT12H`.
    Duration,
    Regex,
    /// One of a closed set of names, matched case-insensitively.
    Enum(&'static [&'static str]),
    StringList,
    StringMap,
    ProcessingResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSlot {
    pub name: &'static str,
    pub kind: SlotKind,
    pub required: bool,
}

impl ConfigSlot {
    pub const fn required(name: &'static str, kind: SlotKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: SlotKind) -> Self {
        Self { name, kind, required: false }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigValue {
    String(String),
    Bool(bool),
    Integer(i64),
    Duration(Duration),
    Regex(Regex),
    StringList(Vec<String>),
    StringMap(BTreeMap<String, String>),
    ProcessingResult(ProcessingResult),
}

/// Converted configuration of one populator instance.
#[derive(Debug, Clone, Default)]
pub struct BoundConfig {
    populator: String,
    values: HashMap<&'static str, ConfigValue>,
}

macro_rules! accessor {
    ($get:ident, $require:ident, $variant:ident, $ty:ty, |$v:ident| $conv:expr) => {
        pub fn $get(&self, name: &str) -> Option<$ty> {
            match self.values.get(name) {
                Some(ConfigValue::$variant($v)) => Some($conv),
                _ => None,
            }
        }

        pub fn $require(&self, name: &str) -> Result<$ty, ConfigError> {
            self.$get(name).ok_or_else(|| self.missing(name))
        }
    };
}

impl BoundConfig {
    pub fn populator(&self) -> &str {
        &self.populator
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn missing(&self, name: &str) -> ConfigError {
        ConfigError::MissingProperty {
            populator: self.populator.clone(),
            property: name.to_string(),
        }
    }

    /// Error for a value that passed type conversion but is still unusable.
    pub fn invalid(&self, name: &str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            populator: self.populator.clone(),
            property: name.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    accessor!(string, require_string, String, &str, |v| v.as_str());
    accessor!(bool, require_bool, Bool, bool, |v| *v);
    accessor!(integer, require_integer, Integer, i64, |v| *v);
    accessor!(duration, require_duration, Duration, Duration, |v| *v);
    accessor!(regex, require_regex, Regex, &Regex, |v| v);
    accessor!(string_list, require_string_list, StringList, &[String], |v| v.as_slice());
    accessor!(string_map, require_string_map, StringMap, &BTreeMap<String, String>, |v| v);
    accessor!(processing_result, require_processing_result, ProcessingResult, ProcessingResult, |v| *v);
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn convert(kind: SlotKind, value: &Value) -> Result<ConfigValue, String> {
    let as_string = || scalar_to_string(value).ok_or_else(|| "expected a scalar value".to_string());
    match kind {
        SlotKind::String => Ok(ConfigValue::String(as_string()?)),
        SlotKind::Bool => match value {
            Value::Bool(b) => Ok(ConfigValue::Bool(*b)),
            Value::String(s) => s
                .parse()
                .map(ConfigValue::Bool)
                .map_err(|_| "expected true or false".to_string()),
            _ => Err("expected true or false".to_string()),
        },
        SlotKind::Integer => match value {
            Value::Number(n) => n.as_i64().map(ConfigValue::Integer).ok_or_else(|| "expected an integer".to_string()),
            Value::String(s) => s
                .trim()
                .parse()
                .map(ConfigValue::Integer)
                .map_err(|_| "expected an integer".to_string()),
            _ => Err("expected an integer".to_string()),
        },
        SlotKind::Duration => parse_iso8601_duration(&as_string()?)
            .map(ConfigValue::Duration)
            .map_err(|e| e.to_string()),
        SlotKind::Regex => Regex::new(&as_string()?)
            .map(ConfigValue::Regex)
            .map_err(|e| e.to_string()),
        SlotKind::Enum(names) => {
            let given = as_string()?;
            names
                .iter()
                .find(|name| name.eq_ignore_ascii_case(given.trim()))
                .map(|name| ConfigValue::String(name.to_string()))
                .ok_or_else(|| format!("expected one of {:?}", names))
        }
        SlotKind::StringList => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_to_string(item).ok_or_else(|| "list items must be scalars".to_string()))
                .collect::<Result<Vec<_>, _>>()
                .map(ConfigValue::StringList),
            Value::String(s) => Ok(ConfigValue::StringList(
                s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
            )),
            _ => Err("expected a list".to_string()),
        },
        SlotKind::StringMap => match value {
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| {
                    scalar_to_string(v)
                        .map(|v| (k.clone(), v))
                        .ok_or_else(|| format!("value of '{}' must be a scalar", k))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(ConfigValue::StringMap),
            _ => Err("expected a map".to_string()),
        },
        SlotKind::ProcessingResult => as_string()?
            .parse::<ProcessingResult>()
            .map(ConfigValue::ProcessingResult)
            .map_err(|e| e.to_string()),
    }
}

/// Check `config` against `slots` and convert each value.
pub fn bind(populator: &str, slots: &[ConfigSlot], config: &Map<String, Value>) -> Result<BoundConfig, ConfigError> {
    let mut values = HashMap::new();
    for (property, value) in config {
        let slot = slots
            .iter()
            .find(|slot| slot.name == property)
            .ok_or_else(|| ConfigError::UnknownProperty {
                populator: populator.to_string(),
                property: property.clone(),
            })?;
        let converted = convert(slot.kind, value).map_err(|reason| ConfigError::InvalidValue {
            populator: populator.to_string(),
            property: property.clone(),
            value: value.to_string(),
            reason,
        })?;
        values.insert(slot.name, converted);
    }

    if let Some(slot) = slots.iter().find(|slot| slot.required && !values.contains_key(slot.name)) {
        return Err(ConfigError::MissingProperty {
            populator: populator.to_string(),
            property: slot.name.to_string(),
        });
    }

    Ok(BoundConfig {
        populator: populator.to_string(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SLOTS: &[ConfigSlot] = &[
        ConfigSlot::required("maximumAge", SlotKind::Duration),
        ConfigSlot::optional("pattern", SlotKind::Regex),
        ConfigSlot::optional("sources", SlotKind::StringList),
        ConfigSlot::optional("mode", SlotKind::Enum(&["STRICT", "LENIENT"])),
        ConfigSlot::optional("result", SlotKind::ProcessingResult),
        ConfigSlot::optional("types", SlotKind::StringMap),
    ];

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_binds_and_converts() {
        let bound = bind(
            "Example",
            SLOTS,
            &config(json!({
                "maximumAge": "PT36H",
                "pattern": "^EF",
                "sources": "GTS_BULLETIN_HEADING, COLLECT_IDENTIFIER",
                "mode": "lenient",
                "result": "MESSAGE_TOO_OLD",
                "types": {"TAF": "AERODROME"}
            })),
        )
        .unwrap();
        assert_eq!(bound.duration("maximumAge"), Some(Duration::hours(36)));
        assert!(bound.regex("pattern").unwrap().is_match("EFKE"));
        assert_eq!(bound.string_list("sources").map(<[String]>::len), Some(2));
        assert_eq!(bound.string("mode"), Some("LENIENT"));
        assert_eq!(bound.processing_result("result"), Some(ProcessingResult::MessageTooOld));
        assert_eq!(bound.string_map("types").and_then(|m| m.get("TAF")).map(String::as_str), Some("AERODROME"));
    }

    #[test]
    fn test_unknown_property() {
        let err = bind("Example", SLOTS, &config(json!({"maximumAge": "PT1H", "maxAge": "PT1H"}))).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownProperty {
                populator: "Example".into(),
                property: "maxAge".into()
            }
        );
    }

    #[test]
    fn test_missing_required_property() {
        let err = bind("Example", SLOTS, &Map::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperty { ref property, .. } if property == "maximumAge"));
    }

    #[test]
    fn test_invalid_value_names_populator_property_and_value() {
        let err = bind("Example", SLOTS, &config(json!({"maximumAge": "P1Y"}))).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Example"), "{}", message);
        assert!(message.contains("maximumAge"), "{}", message);
        assert!(message.contains("P1Y"), "{}", message);

        let err = bind("Example", SLOTS, &config(json!({"maximumAge": "PT1H", "mode": "OTHER"}))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref property, .. } if property == "mode"));
    }
}
