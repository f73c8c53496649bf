//! Error types for the shared data model.

use thiserror::Error;

/// Result type alias using AviError.
pub type AviResult<T> = Result<T, AviError>;

/// Errors raised while building or interpreting shared model values.
#[derive(Debug, Error)]
pub enum AviError {
    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid bulletin heading: {0}")]
    InvalidHeading(String),

    #[error("Augmentation number {0} cannot be expressed as a version letter (expected 1..=26)")]
    InvalidAugmentationNumber(u8),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown {kind}: {value}")]
    UnknownName { kind: &'static str, value: String },

    #[error("Invalid time zone: {0}")]
    InvalidZone(String),
}
