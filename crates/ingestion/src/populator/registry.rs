//! Populator factories and chain assembly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::builtin;
use super::condition::{ActivationCondition, ConditionalPopulator};
use super::config::{bind, BoundConfig, ConfigSlot};
use super::{MessagePopulator, PopulatorDependencies};
use crate::error::ConfigError;

/// Declarative description of one chain element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulatorInstanceSpec {
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Property conditions that must all hold for the populator to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate_on: Option<Map<String, Value>>,
}

impl PopulatorInstanceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(property.into(), value.into());
        self
    }

    pub fn with_activate_on(mut self, property: impl Into<String>, operators: impl Into<Value>) -> Self {
        self.activate_on
            .get_or_insert_with(Map::new)
            .insert(property.into(), operators.into());
        self
    }
}

type BuildFn =
    dyn Fn(&BoundConfig, &PopulatorDependencies) -> Result<Arc<dyn MessagePopulator>, ConfigError> + Send + Sync;

/// Creates configured instances of one populator kind.
pub struct PopulatorFactory {
    name: String,
    slots: Vec<ConfigSlot>,
    build: Box<BuildFn>,
}

impl PopulatorFactory {
    pub fn new<F>(name: impl Into<String>, slots: &[ConfigSlot], build: F) -> Self
    where
        F: Fn(&BoundConfig, &PopulatorDependencies) -> Result<Arc<dyn MessagePopulator>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            slots: slots.to_vec(),
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[ConfigSlot] {
        &self.slots
    }

    pub fn create(
        &self,
        config: &Map<String, Value>,
        dependencies: &PopulatorDependencies,
    ) -> Result<Arc<dyn MessagePopulator>, ConfigError> {
        let bound = bind(&self.name, &self.slots, config)?;
        (self.build)(&bound, dependencies)
    }
}

impl fmt::Debug for PopulatorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulatorFactory")
            .field("name", &self.name)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// Named populator factories sharing one set of runtime dependencies.
#[derive(Debug)]
pub struct PopulatorRegistry {
    dependencies: PopulatorDependencies,
    factories: BTreeMap<String, PopulatorFactory>,
}

impl PopulatorRegistry {
    pub fn new(dependencies: PopulatorDependencies) -> Self {
        Self {
            dependencies,
            factories: BTreeMap::new(),
        }
    }

    /// Registry preloaded with every built-in populator.
    pub fn with_builtins(dependencies: PopulatorDependencies) -> Result<Self, ConfigError> {
        let mut registry = Self::new(dependencies);
        for factory in builtin::factories() {
            registry.register(factory)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, factory: PopulatorFactory) -> Result<(), ConfigError> {
        if factory.name().trim().is_empty() {
            return Err(ConfigError::EmptyPopulatorName);
        }
        if self.factories.contains_key(factory.name()) {
            return Err(ConfigError::DuplicatePopulator(factory.name().to_string()));
        }
        self.factories.insert(factory.name().to_string(), factory);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn dependencies(&self) -> &PopulatorDependencies {
        &self.dependencies
    }

    /// Instantiate one chain element, wrapped in its activation condition
    /// when it has one.
    pub fn create(&self, spec: &PopulatorInstanceSpec) -> Result<Arc<dyn MessagePopulator>, ConfigError> {
        let name = spec.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyPopulatorName);
        }
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPopulator(name.to_string()))?;
        let populator = factory.create(&spec.config, &self.dependencies)?;

        match &spec.activate_on {
            Some(operators) if !operators.is_empty() => {
                let condition =
                    ActivationCondition::parse(operators, &self.dependencies.bulletin_heading_sources)?;
                Ok(Arc::new(ConditionalPopulator::new(
                    condition,
                    populator,
                    &self.dependencies,
                )))
            }
            _ => Ok(populator),
        }
    }

    /// Build a whole chain. Errors name the failing element's position.
    pub fn build_chain(&self, specs: &[PopulatorInstanceSpec]) -> Result<Vec<Arc<dyn MessagePopulator>>, ConfigError> {
        let chain = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                self.create(spec).map_err(|source| ConfigError::ChainElement {
                    index,
                    name: spec.name.clone(),
                    source: Box::new(source),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(populators = chain.len(), "Built populator chain");
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdMappings;
    use crate::persistence::JsonLinesPersistence;
    use avi_common::SystemClock;
    use serde_json::json;
    use std::collections::HashMap;

    fn registry() -> PopulatorRegistry {
        let ids = IdMappings {
            types: HashMap::from([("TAF".to_string(), 2)]),
            ..Default::default()
        };
        let dependencies = PopulatorDependencies::new(
            Arc::new(SystemClock),
            Arc::new(ids),
            Arc::new(JsonLinesPersistence::new("unused.jsonl", HashMap::new())),
        );
        PopulatorRegistry::with_builtins(dependencies).unwrap()
    }

    #[test]
    fn test_builtins_registered() {
        let registry = registry();
        let names: Vec<_> = registry.names().collect();
        assert!(names.contains(&"MessageDiscarder"));
        assert!(names.contains(&"StationIdPopulator"));
        assert!(names.contains(&"MessageMaximumAgeValidator"));
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let mut registry = registry();
        let dup = PopulatorFactory::new("MessageDiscarder", &[], |_, _| Err(ConfigError::EmptyPopulatorName));
        assert_eq!(
            registry.register(dup).unwrap_err(),
            ConfigError::DuplicatePopulator("MessageDiscarder".into())
        );
        let empty = PopulatorFactory::new(" ", &[], |_, _| Err(ConfigError::EmptyPopulatorName));
        assert_eq!(registry.register(empty).unwrap_err(), ConfigError::EmptyPopulatorName);
    }

    #[test]
    fn test_chain_error_names_position() {
        let registry = registry();
        let specs = vec![
            PopulatorInstanceSpec::new("MessageDiscarder"),
            PopulatorInstanceSpec::new("FixedTypePopulator").with_config("type", "SPACE_WEATHER"),
        ];
        match registry.build_chain(&specs).unwrap_err() {
            ConfigError::ChainElement { index, name, source } => {
                assert_eq!(index, 1);
                assert_eq!(name, "FixedTypePopulator");
                assert!(matches!(*source, ConfigError::UnknownId { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_populator_and_bad_condition() {
        let registry = registry();
        let err = registry.create(&PopulatorInstanceSpec::new("NoSuchPopulator")).unwrap_err();
        assert_eq!(err, ConfigError::UnknownPopulator("NoSuchPopulator".into()));

        let spec = PopulatorInstanceSpec::new("MessageDiscarder").with_activate_on("heading", json!({"isLike": ["X"]}));
        assert!(matches!(
            registry.create(&spec).unwrap_err(),
            ConfigError::InvalidCondition { .. }
        ));
    }

    #[test]
    fn test_deserializes_from_yaml() {
        let yaml = r#"
- name: FixedTypePopulator
  config:
    type: TAF
- name: MessageDiscarder
  activate_on:
    heading:
      matchesAnyOf: ["^..XX42"]
"#;
        let specs: Vec<PopulatorInstanceSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].config["type"], "TAF");
        assert!(specs[1].activate_on.is_some());
        assert_eq!(registry().build_chain(&specs).unwrap().len(), 2);
    }
}
