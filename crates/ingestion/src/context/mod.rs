//! Logging and statistics context for one file-processing attempt.

mod logging;
mod shared;
mod statistics;

pub use logging::{BulletinLogReference, LogReference, LoggingContext, MessageLogReference};
pub use shared::SharedLoggingContext;
pub use statistics::{FileProcessingStatistics, StatisticsResult, StatisticsSummary};
