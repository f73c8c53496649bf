//! Name → database id mappings for routes, formats and message types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMappings {
    #[serde(default)]
    pub routes: HashMap<String, i32>,
    #[serde(default)]
    pub formats: HashMap<String, i32>,
    #[serde(default)]
    pub types: HashMap<String, i32>,
}

fn lookup(map: &HashMap<String, i32>, kind: &'static str, name: &str) -> Result<i32, ConfigError> {
    map.get(name)
        .or_else(|| map.get(&name.to_ascii_uppercase()))
        .copied()
        .ok_or_else(|| ConfigError::UnknownId {
            kind,
            name: name.to_string(),
        })
}

fn reverse(map: &HashMap<String, i32>, id: i32) -> Option<&str> {
    map.iter().find(|(_, v)| **v == id).map(|(k, _)| k.as_str())
}

impl IdMappings {
    pub fn route_id(&self, name: &str) -> Result<i32, ConfigError> {
        lookup(&self.routes, "route", name)
    }

    pub fn format_id(&self, name: &str) -> Result<i32, ConfigError> {
        lookup(&self.formats, "format", name)
    }

    pub fn type_id(&self, name: &str) -> Result<i32, ConfigError> {
        lookup(&self.types, "message type", name)
    }

    pub fn route_name(&self, id: i32) -> Option<&str> {
        reverse(&self.routes, id)
    }

    pub fn format_name(&self, id: i32) -> Option<&str> {
        reverse(&self.formats, id)
    }

    pub fn type_name(&self, id: i32) -> Option<&str> {
        reverse(&self.types, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_reverse() {
        let ids = IdMappings {
            routes: HashMap::from([("DEFAULT".to_string(), 1)]),
            formats: HashMap::from([("TAC".to_string(), 1), ("IWXXM".to_string(), 2)]),
            types: HashMap::from([("TAF".to_string(), 2)]),
        };
        assert_eq!(ids.type_id("taf"), Ok(2));
        assert_eq!(ids.format_name(2), Some("IWXXM"));
        assert_eq!(
            ids.route_id("OTHER"),
            Err(ConfigError::UnknownId {
                kind: "route",
                name: "OTHER".to_string()
            })
        );
    }
}
