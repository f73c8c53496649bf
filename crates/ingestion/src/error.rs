//! Error types for the ingestion crate.

use avi_common::AviError;
use thiserror::Error;

/// Errors that abort processing of a whole file.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("No file configuration matches {0}")]
    UnmatchedFile(String),

    #[error("Failed to persist messages: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Failed to route file: {0}")]
    Route(#[from] RouteError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;

/// Signal raised by a populator for the message it is working on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PopulateError {
    /// The message is deliberately dropped. Not an error.
    #[error("message discarded: {0}")]
    Discard(String),

    #[error("{0}")]
    Failed(String),
}

impl PopulateError {
    pub fn discard(reason: impl Into<String>) -> Self {
        PopulateError::Discard(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        PopulateError::Failed(reason.into())
    }
}

impl From<AviError> for PopulateError {
    fn from(e: AviError) -> Self {
        PopulateError::Failed(e.to_string())
    }
}

impl From<ConfigError> for PopulateError {
    fn from(e: ConfigError) -> Self {
        PopulateError::Failed(e.to_string())
    }
}

impl From<PersistenceError> for PopulateError {
    fn from(e: PersistenceError) -> Self {
        PopulateError::Failed(e.to_string())
    }
}

/// Errors from the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Worth retrying: connection loss, timeouts, locked resources.
    #[error("transient persistence failure: {0}")]
    Transient(String),

    /// Never retried: constraint violations, malformed records.
    #[error("persistence failure: {0}")]
    NonTransient(String),
}

/// Errors while moving a file to its archive or fail directory.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("failed to move {from} to {to}: {source}")]
    Move {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("source file {0} disappeared before it could be moved")]
    SourceMissing(String),
}

/// Startup configuration errors. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown populator '{0}'")]
    UnknownPopulator(String),

    #[error("populator '{0}' is registered twice")]
    DuplicatePopulator(String),

    #[error("populator name must not be empty")]
    EmptyPopulatorName,

    #[error("{populator}: unknown property '{property}'")]
    UnknownProperty { populator: String, property: String },

    #[error("{populator}: missing required property '{property}'")]
    MissingProperty { populator: String, property: String },

    #[error("{populator}: invalid value {value} for property '{property}': {reason}")]
    InvalidValue {
        populator: String,
        property: String,
        value: String,
        reason: String,
    },

    #[error("populator chain element #{index} ({name}): {source}")]
    ChainElement {
        index: usize,
        name: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("invalid condition on property '{property}': {reason}")]
    InvalidCondition { property: String, reason: String },

    #[error("unknown {kind} '{name}'")]
    UnknownId { kind: &'static str, name: String },

    #[error("invalid product configuration: {0}")]
    Product(String),
}
