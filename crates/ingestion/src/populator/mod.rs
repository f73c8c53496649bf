//! Configurable chain of message populators.
//!
//! Each populator reads the decoded input message and writes into the shared
//! [`ArchiveAviationMessageBuilder`]. Chains are assembled at startup from
//! declarative [`PopulatorInstanceSpec`]s through a [`PopulatorRegistry`].

use async_trait::async_trait;
use avi_common::{
    ArchiveAviationMessageBuilder, BulletinHeadingSource, Clock, InputAviationMessage,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::SharedLoggingContext;
use crate::error::PopulateError;
use crate::ids::IdMappings;
use crate::persistence::Persistence;
use crate::retry::RetryPolicy;

pub mod builtin;
pub mod condition;
pub mod config;
pub mod registry;

pub use condition::{ActivationCondition, ConditionalPopulator};
pub use config::{bind, BoundConfig, ConfigSlot, ConfigValue, SlotKind};
pub use registry::{PopulatorFactory, PopulatorInstanceSpec, PopulatorRegistry};

/// One step of the population chain.
///
/// Returning [`PopulateError::Discard`] drops the message silently;
/// [`PopulateError::Failed`] marks it failed. Either stops the chain.
#[async_trait]
pub trait MessagePopulator: Send + Sync + fmt::Debug {
    async fn populate(
        &self,
        input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError>;
}

/// Runtime collaborators handed to populator factories.
#[derive(Clone)]
pub struct PopulatorDependencies {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<IdMappings>,
    /// Product id to route name.
    pub product_routes: Arc<HashMap<String, String>>,
    pub persistence: Arc<dyn Persistence>,
    pub database_retry: RetryPolicy,
    /// Default heading source preference.
    pub bulletin_heading_sources: Vec<BulletinHeadingSource>,
}

impl PopulatorDependencies {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<IdMappings>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            clock,
            ids,
            product_routes: Arc::new(HashMap::new()),
            persistence,
            database_retry: RetryPolicy::default(),
            bulletin_heading_sources: BulletinHeadingSource::DEFAULT_ORDER.to_vec(),
        }
    }

    pub fn with_product_routes(mut self, routes: HashMap<String, String>) -> Self {
        self.product_routes = Arc::new(routes);
        self
    }

    pub fn with_database_retry(mut self, policy: RetryPolicy) -> Self {
        self.database_retry = policy;
        self
    }

    pub fn with_bulletin_heading_sources(mut self, sources: Vec<BulletinHeadingSource>) -> Self {
        self.bulletin_heading_sources = sources;
        self
    }
}

impl fmt::Debug for PopulatorDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulatorDependencies")
            .field("ids", &self.ids)
            .field("product_routes", &self.product_routes)
            .field("database_retry", &self.database_retry)
            .field("bulletin_heading_sources", &self.bulletin_heading_sources)
            .finish_non_exhaustive()
    }
}
