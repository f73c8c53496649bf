use async_trait::async_trait;
use avi_common::{ArchiveAviationMessageBuilder, InputAviationMessage};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::SharedLoggingContext;
use crate::error::{ConfigError, PopulateError};
use crate::ids::IdMappings;
use crate::populator::{MessagePopulator, PopulatorDependencies};

/// Sets route, format and file modification time from the file the message
/// was read from.
#[derive(Debug)]
pub struct FileMetadataPopulator {
    ids: Arc<IdMappings>,
    route_ids: HashMap<String, i32>,
}

impl FileMetadataPopulator {
    pub fn new(dependencies: &PopulatorDependencies) -> Result<Self, ConfigError> {
        let route_ids = dependencies
            .product_routes
            .iter()
            .map(|(product, route)| Ok((product.clone(), dependencies.ids.route_id(route)?)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
        Ok(Self {
            ids: dependencies.ids.clone(),
            route_ids,
        })
    }
}

#[async_trait]
impl MessagePopulator for FileMetadataPopulator {
    async fn populate(
        &self,
        input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        _context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        let metadata = &input.file_metadata;
        let product_id = metadata.file_reference().product_id();
        let route = self
            .route_ids
            .get(product_id)
            .ok_or_else(|| PopulateError::failed(format!("no route configured for product '{}'", product_id)))?;
        target.set_route(*route);
        target.set_format(self.ids.format_id(metadata.file_config().format().name())?);
        if let Some(modified) = metadata.file_modified() {
            target.set_file_modified(modified);
        }
        Ok(())
    }
}
