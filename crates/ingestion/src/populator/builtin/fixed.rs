use async_trait::async_trait;
use avi_common::{ArchiveAviationMessageBuilder, InputAviationMessage, ProcessingResult};
use chrono::Duration;

use crate::context::SharedLoggingContext;
use crate::error::PopulateError;
use crate::populator::MessagePopulator;

/// Drops every message it sees. Usually wrapped in an activation condition.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageDiscarder;

#[async_trait]
impl MessagePopulator for MessageDiscarder {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        _target: &mut ArchiveAviationMessageBuilder,
        _context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        Err(PopulateError::discard("discarded by configuration"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedProcessingResultPopulator {
    result: ProcessingResult,
}

impl FixedProcessingResultPopulator {
    pub fn new(result: ProcessingResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl MessagePopulator for FixedProcessingResultPopulator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        _context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        target.set_processing_result(self.result);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedTypePopulator {
    type_id: i32,
}

impl FixedTypePopulator {
    pub fn new(type_id: i32) -> Self {
        Self { type_id }
    }
}

#[async_trait]
impl MessagePopulator for FixedTypePopulator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        _context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        target.set_type_id(self.type_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedRoutePopulator {
    route_id: i32,
}

impl FixedRoutePopulator {
    pub fn new(route_id: i32) -> Self {
        Self { route_id }
    }
}

#[async_trait]
impl MessagePopulator for FixedRoutePopulator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        _context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        target.set_route(self.route_id);
        Ok(())
    }
}

/// Validity of `validityEndOffset` from the message time, for message types
/// that carry no validity of their own.
#[derive(Debug, Clone, Copy)]
pub struct FixedDurationValidityPeriodPopulator {
    validity_end_offset: Duration,
}

impl FixedDurationValidityPeriodPopulator {
    pub fn new(validity_end_offset: Duration) -> Self {
        Self { validity_end_offset }
    }
}

#[async_trait]
impl MessagePopulator for FixedDurationValidityPeriodPopulator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        _context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        let Some(message_time) = target.message_time() else {
            return Ok(());
        };
        if target.valid_from().is_none() {
            target.set_valid_from(message_time);
        }
        target.set_valid_to(message_time + self.validity_end_offset);
        Ok(())
    }
}
