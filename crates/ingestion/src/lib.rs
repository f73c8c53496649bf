//! Aviation message file ingestion pipeline.
//!
//! Files dropped into a product's input directory are picked up by a
//! [`DirectoryPoller`], claimed exclusively, decoded into bulletins and
//! messages, run through a configurable populator chain, persisted in a
//! single batch and finally moved to the product's archive or fail
//! directory.
//!
//! # Architecture
//!
//! - [`claim`]: exclusive file claims and pickup filters
//! - [`decoder`]: bulletin and message extraction
//! - [`populator`]: the populator trait, registry, conditions and built-ins
//! - [`population`]: runs the chain and records per-message outcomes
//! - [`persistence`]: record storage and station lookups
//! - [`router`]: archive/fail routing with retry
//! - [`context`]: logging context and processing statistics
//! - [`shutdown`]: graceful stop with in-flight drain

pub mod claim;
pub mod context;
pub mod decoder;
pub mod error;
pub mod events;
pub mod ids;
pub mod persistence;
pub mod poller;
pub mod population;
pub mod populator;
pub mod processor;
pub mod product;
pub mod resolver;
pub mod retry;
pub mod router;
pub mod shutdown;

// Re-exports
pub use claim::{
    new_processing_id, ClaimRegistry, ExclusivityFilter, FileCandidate, FileClaim, FileFilter, FileFilterChain,
    OnceFilter, RegistryStatus, StabilityFilter,
};
pub use context::{
    FileProcessingStatistics, LogReference, LoggingContext, SharedLoggingContext, StatisticsResult,
    StatisticsSummary,
};
pub use decoder::{DecodeError, DecodedFile, MessageDecoder, TacBulletinDecoder};
pub use error::{ConfigError, IngestionError, PersistenceError, PopulateError, Result, RouteError};
pub use events::{EventPublisher, FileOutcome, FileProcessedEvent, TracingEventPublisher};
pub use ids::IdMappings;
pub use persistence::{JsonLinesPersistence, Persistence};
pub use poller::DirectoryPoller;
pub use population::{MessagePopulationService, PopulatedMessage, PopulationOutcome};
pub use populator::{
    MessagePopulator, PopulatorDependencies, PopulatorFactory, PopulatorInstanceSpec, PopulatorRegistry,
};
pub use processor::{FileProcessor, ProcessingReport};
pub use product::{validate_products, AviationProduct, RouteDestination};
pub use retry::{retry, RetryPolicy, Transient};
pub use router::FileRouter;
pub use shutdown::ShutdownCoordinator;
