//! Wiring of configuration into pollers, processors and shutdown handling.

use anyhow::{Context, Result};
use avi_common::{Clock, SystemClock};
use futures::future::join_all;
use ingestion::{
    validate_products, ClaimRegistry, DirectoryPoller, EventPublisher, FileFilterChain, FileProcessor, FileRouter,
    JsonLinesPersistence, MessagePopulationService, Persistence, PopulatorDependencies, PopulatorRegistry,
    ProcessingReport, ShutdownCoordinator, TacBulletinDecoder, TracingEventPublisher,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config_loader::ServiceConfig;
use crate::server::{start_server, ServerState};

/// The assembled ingestion service.
pub struct IngesterService {
    registry: Arc<ClaimRegistry>,
    pollers: Vec<DirectoryPoller>,
    shutdown: ShutdownCoordinator,
    status_port: Option<u16>,
}

impl IngesterService {
    /// Build the service with JSON-lines persistence and the system clock.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let persistence = Arc::new(JsonLinesPersistence::new(
            &config.persistence.output_path,
            config.persistence.stations.clone(),
        ));
        Self::build(config, persistence, Arc::new(SystemClock), Arc::new(TracingEventPublisher))
    }

    pub fn build(
        config: &ServiceConfig,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self> {
        let products = config.products()?;
        validate_products(&products)?;

        let database_retry = config.retry.database.to_policy();
        let dependencies = PopulatorDependencies::new(clock, Arc::new(config.ids.clone()), persistence.clone())
            .with_product_routes(config.product_routes())
            .with_database_retry(database_retry)
            .with_bulletin_heading_sources(config.bulletin_heading_sources()?);
        let populators = PopulatorRegistry::with_builtins(dependencies)?;
        let chain = populators
            .build_chain(&config.populators)
            .context("Failed to build populator chain")?;
        info!(populators = chain.len(), "Built populator chain");

        let processor = Arc::new(FileProcessor::new(
            Arc::new(TacBulletinDecoder),
            MessagePopulationService::new(chain),
            persistence,
            database_retry,
            FileRouter::new(config.retry.file_move.to_policy()),
            events,
        ));

        let registry = Arc::new(ClaimRegistry::new());
        let workers = Arc::new(Semaphore::new(config.ingester.workers));
        let mut pollers = Vec::with_capacity(products.len());
        for product in products {
            std::fs::create_dir_all(&product.input_dir)
                .with_context(|| format!("Failed to create input directory {:?}", product.input_dir))?;
            info!(
                product = %product.id,
                input_dir = %product.input_dir.display(),
                archive_dir = %product.archive_dir.display(),
                fail_dir = %product.fail_dir.display(),
                "Configured product"
            );
            pollers.push(DirectoryPoller::new(
                Arc::new(product),
                FileFilterChain::standard(registry.clone(), config.settle_time(), config.ingester.once_filter_capacity),
                registry.clone(),
                processor.clone(),
                workers.clone(),
                config.poll_interval(),
            ));
        }

        let shutdown = ShutdownCoordinator::new(
            registry.clone(),
            config.shutdown_timeout(),
            config.shutdown_poll_interval(),
        );

        Ok(Self {
            registry,
            pollers,
            shutdown,
            status_port: config.ingester.status_port,
        })
    }

    pub fn registry(&self) -> Arc<ClaimRegistry> {
        self.registry.clone()
    }

    /// Process the files currently present in every input directory and wait
    /// for them to finish.
    pub async fn run_once(&self) -> Result<Vec<ProcessingReport>> {
        let shutdown = self.shutdown.subscribe();
        let mut handles = Vec::new();
        for poller in &self.pollers {
            let dispatched = poller
                .poll_once(&shutdown)
                .await
                .with_context(|| format!("Failed to list input directory of product '{}'", poller.product().id))?;
            handles.extend(dispatched);
        }

        let mut reports = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            reports.push(joined.context("File worker panicked")?);
        }
        Ok(reports)
    }

    /// Poll until `signal` resolves, then stop pickup and drain in-flight
    /// files. Returns whether everything drained before the timeout.
    pub async fn run<F>(self, signal: F) -> Result<bool>
    where
        F: Future<Output = ()>,
    {
        let Self {
            registry,
            pollers,
            shutdown,
            status_port,
        } = self;

        let server = status_port.map(|port| {
            let products = pollers.iter().map(|poller| poller.product().id.clone()).collect();
            let state = Arc::new(ServerState::new(registry.clone(), products));
            tokio::spawn(async move {
                if let Err(e) = start_server(state, port).await {
                    error!(error = %e, port, "Status server failed");
                }
            })
        });

        let tasks: Vec<_> = pollers
            .into_iter()
            .map(|poller| tokio::spawn(poller.run(shutdown.subscribe())))
            .collect();

        signal.await;
        info!("Received shutdown signal");
        let drained = shutdown.shutdown().await;

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                warn!(error = %e, "Poller task ended abnormally");
            }
        }
        if let Some(server) = server {
            server.abort();
        }

        let status = registry.status();
        info!(
            drained,
            in_flight = status.in_flight,
            total_completed = status.total_completed,
            "Ingester stopped"
        );
        Ok(drained)
    }
}
