//! Record-level validators.
//!
//! Validators only downgrade a record's processing result, and only while it
//! is still `OK`; an earlier rejection is never overwritten.

use async_trait::async_trait;
use avi_common::{ArchiveAviationMessageBuilder, Clock, InputAviationMessage, ProcessingResult};
use chrono::Duration;
use std::sync::Arc;
use tracing::debug;

use crate::context::SharedLoggingContext;
use crate::error::PopulateError;
use crate::populator::MessagePopulator;

fn reject(target: &mut ArchiveAviationMessageBuilder, context: &SharedLoggingContext, result: ProcessingResult) {
    debug!(ctx = %context, result = %result, "Message rejected by validator");
    target.set_processing_result(result);
}

/// Rejects messages issued more than `acceptInFuture` ahead of the clock.
#[derive(Debug)]
pub struct MessageFutureTimeValidator {
    clock: Arc<dyn Clock>,
    accept_in_future: Duration,
}

impl MessageFutureTimeValidator {
    pub fn new(clock: Arc<dyn Clock>, accept_in_future: Duration) -> Self {
        Self { clock, accept_in_future }
    }
}

#[async_trait]
impl MessagePopulator for MessageFutureTimeValidator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        if !target.processing_result().is_ok() {
            return Ok(());
        }
        // A limit beyond the representable range never rejects.
        let limit = self.clock.now().checked_add_signed(self.accept_in_future);
        if let (Some(message_time), Some(limit)) = (target.message_time(), limit) {
            if message_time > limit {
                reject(target, context, ProcessingResult::MessageTimeInFuture);
            }
        }
        Ok(())
    }
}

/// Rejects messages issued longer than `maximumAge` ago.
#[derive(Debug)]
pub struct MessageMaximumAgeValidator {
    clock: Arc<dyn Clock>,
    maximum_age: Duration,
}

impl MessageMaximumAgeValidator {
    pub fn new(clock: Arc<dyn Clock>, maximum_age: Duration) -> Self {
        Self { clock, maximum_age }
    }
}

#[async_trait]
impl MessagePopulator for MessageMaximumAgeValidator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        if !target.processing_result().is_ok() {
            return Ok(());
        }
        let oldest = self.clock.now().checked_sub_signed(self.maximum_age);
        if let (Some(message_time), Some(oldest)) = (target.message_time(), oldest) {
            if message_time < oldest {
                reject(target, context, ProcessingResult::MessageTooOld);
            }
        }
        Ok(())
    }
}

/// Rejects records whose validity ends before it starts.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageValidityPeriodValidator;

#[async_trait]
impl MessagePopulator for MessageValidityPeriodValidator {
    async fn populate(
        &self,
        _input: &InputAviationMessage,
        target: &mut ArchiveAviationMessageBuilder,
        context: &SharedLoggingContext,
    ) -> Result<(), PopulateError> {
        if !target.processing_result().is_ok() {
            return Ok(());
        }
        if let (Some(from), Some(to)) = (target.valid_from(), target.valid_to()) {
            if from > to {
                reject(target, context, ProcessingResult::InvalidValidityPeriod);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populator::builtin::test_support::{context, input};
    use avi_common::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 5, 5, 10, 21, 20).unwrap()
    }

    fn target_at(message_time: DateTime<Utc>) -> ArchiveAviationMessageBuilder {
        let mut target = ArchiveAviationMessageBuilder::default();
        target.set_message_time(message_time);
        target
    }

    #[tokio::test]
    async fn test_future_time() {
        let validator = MessageFutureTimeValidator::new(Arc::new(FixedClock::new(now())), Duration::hours(12));
        let msg = input("TAF=", None);

        let mut near = target_at(now() + Duration::hours(11));
        validator.populate(&msg, &mut near, &context()).await.unwrap();
        assert_eq!(near.processing_result(), ProcessingResult::Ok);

        let mut far = target_at(now() + Duration::hours(13));
        validator.populate(&msg, &mut far, &context()).await.unwrap();
        assert_eq!(far.processing_result(), ProcessingResult::MessageTimeInFuture);
    }

    #[tokio::test]
    async fn test_maximum_age_keeps_earlier_result() {
        let validator = MessageMaximumAgeValidator::new(Arc::new(FixedClock::new(now())), Duration::hours(36));
        let msg = input("TAF=", None);

        let mut old = target_at(now() - Duration::days(3));
        validator.populate(&msg, &mut old, &context()).await.unwrap();
        assert_eq!(old.processing_result(), ProcessingResult::MessageTooOld);

        let mut already_rejected = target_at(now() - Duration::days(3));
        already_rejected.set_processing_result(ProcessingResult::UnknownStationIcaoCode);
        validator.populate(&msg, &mut already_rejected, &context()).await.unwrap();
        assert_eq!(already_rejected.processing_result(), ProcessingResult::UnknownStationIcaoCode);
    }

    #[tokio::test]
    async fn test_out_of_range_limits_accept_everything() {
        let huge = avi_common::parse_iso8601_duration("P100000000D").unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now()));
        let msg = input("TAF=", None);

        let mut future = target_at(now() + Duration::days(400));
        MessageFutureTimeValidator::new(clock.clone(), huge)
            .populate(&msg, &mut future, &context())
            .await
            .unwrap();
        assert_eq!(future.processing_result(), ProcessingResult::Ok);

        let mut old = target_at(now() - Duration::days(400));
        MessageMaximumAgeValidator::new(clock, huge)
            .populate(&msg, &mut old, &context())
            .await
            .unwrap();
        assert_eq!(old.processing_result(), ProcessingResult::Ok);
    }

    #[tokio::test]
    async fn test_validity_period_order() {
        let mut target = ArchiveAviationMessageBuilder::default();
        target.set_valid_from(now()).set_valid_to(now() - Duration::hours(1));
        MessageValidityPeriodValidator
            .populate(&input("TAF=", None), &mut target, &context())
            .await
            .unwrap();
        assert_eq!(target.processing_result(), ProcessingResult::InvalidValidityPeriod);
    }
}
