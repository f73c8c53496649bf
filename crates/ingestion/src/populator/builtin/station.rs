use async_trait::async_trait;
use avi_common::{ArchiveAviationMessageBuilder, InputAviationMessage, ProcessingResult};
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::SharedLoggingContext;
use crate::error::PopulateError;
use crate::persistence::Persistence;
use crate::populator::MessagePopulator;
use crate::retry::{retry, RetryPolicy};

/// Looks up the station id for the record's ICAO code.
///
/// Unknown stations are kept but marked `UNKNOWN_STATION_ICAO_CODE`.
pub struct StationIdPopulator {
    persistence: Arc<dyn Persistence>,
    retry_policy: RetryPolicy,
}

impl StationIdPopulator {
    pub fn new(persistence: Arc<dyn Persistence>, retry_policy: RetryPolicy) -> Self {
        Self {
            persistence,
            retry_policy,
        }
    }
}

impl fmt::Debug for StationIdPopulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationIdPopulator")
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessagePopulator for StationIdPopulator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        let icao_code = target
            .icao_airport_code()
            .map(str::to_string)
            .ok_or_else(|| PopulateError::failed("station ICAO code is not populated"))?;

        let station_id = retry(&self.retry_policy, "query_station_id", || {
            self.persistence.query_station_id(&icao_code, context)
        })
        .await?;

        match station_id {
            Some(id) => {
                target.set_station_id(id);
            }
            None => {
                info!(ctx = %context, icao = %icao_code, "Unknown station");
                target.clear_station_id();
                target.set_processing_result(ProcessingResult::UnknownStationIcaoCode);
            }
        }
        Ok(())
    }
}

/// Rewrites matching station ICAO codes, e.g. `^XX(..)$` to `EF$1`.
#[derive(Debug)]
pub struct StationIcaoCodeReplacer {
    pattern: Regex,
    replacement: String,
}

impl StationIcaoCodeReplacer {
    pub fn new(pattern: Regex, replacement: impl Into<String>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
        }
    }
}

#[async_trait]
impl MessagePopulator for StationIcaoCodeReplacer {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        let Some(icao_code) = target.icao_airport_code() else {
            return Ok(());
        };
        if self.pattern.is_match(icao_code) {
            let replaced = self.pattern.replace_all(icao_code, self.replacement.as_str()).into_owned();
            debug!(ctx = %context, from = %icao_code, to = %replaced, "Replaced station ICAO code");
            target.set_icao_airport_code(replaced);
        }
        Ok(())
    }
}

/// Marks records `FORBIDDEN_MESSAGE_STATION_ICAO_CODE` when the station does
/// not match `pattern`. Limited to one message type when configured.
#[derive(Debug)]
pub struct StationIcaoCodeAuthorizer {
    pattern: Regex,
    message_type: Option<i32>,
}

impl StationIcaoCodeAuthorizer {
    pub fn new(pattern: Regex, message_type: Option<i32>) -> Self {
        Self { pattern, message_type }
    }
}

#[async_trait]
impl MessagePopulator for StationIcaoCodeAuthorizer {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        _context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        if !target.processing_result().is_ok() {
            return Ok(());
        }
        if self.message_type.is_some() && target.type_id() != self.message_type {
            return Ok(());
        }
        let authorized = target
            .icao_airport_code()
            .map_or(false, |icao_code| self.pattern.is_match(icao_code));
        if !authorized {
            target.set_processing_result(ProcessingResult::ForbiddenMessageStationIcaoCode);
        }
        Ok(())
    }
}
