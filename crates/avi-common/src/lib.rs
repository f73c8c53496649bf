//! Common types and utilities shared across the aviation message archiver.
//!
//! Everything here is plain data: file references and metadata, bulletin
//! headings, partial and complete times, decoded input messages and the
//! archive record builder. The processing machinery lives in the
//! `ingestion` crate.

pub mod error;
pub mod file;
pub mod heading;
pub mod message;
pub mod time;

pub use error::{AviError, AviResult};
pub use file::{FileConfig, FileMetadata, FileReference, FilenameMatcher, MessageFormat};
pub use heading::{BulletinHeading, BulletinHeadingSource, BulletinHeadingType, InputBulletinHeading};
pub use message::{
    ArchiveAviationMessage, ArchiveAviationMessageBuilder, GenericAviationMessage,
    InputAviationMessage, LocationIndicatorType, MessageReference, MessageType, ProcessingResult,
};
pub use time::{
    parse_iso8601_duration, Clock, FixedClock, PartialDateTime, PartialOrCompleteTimeInstant,
    PartialOrCompleteTimePeriod, SystemClock,
};
