//! Runs the populator chain over decoded messages.

use avi_common::{ArchiveAviationMessage, ArchiveAviationMessageBuilder, InputAviationMessage, MessageReference};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::context::{LogReference, SharedLoggingContext, StatisticsResult};
use crate::error::PopulateError;
use crate::populator::MessagePopulator;

/// Result of populating a single message.
#[derive(Debug, Clone, PartialEq)]
pub enum PopulationOutcome {
    Store(ArchiveAviationMessage),
    Discard,
    Fail,
}

/// A record ready for persistence along with its position in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatedMessage {
    pub reference: MessageReference,
    pub record: ArchiveAviationMessage,
}

#[derive(Debug, Clone)]
pub struct MessagePopulationService {
    populators: Vec<Arc<dyn MessagePopulator>>,
}

impl MessagePopulationService {
    pub fn new(populators: Vec<Arc<dyn MessagePopulator>>) -> Self {
        Self { populators }
    }

    pub fn len(&self) -> usize {
        self.populators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populators.is_empty()
    }

    /// Run the chain for one message. The context must already point at the
    /// message.
    pub async fn populate_message(
        &self,
        input: &InputAviationMessage,
        context: &SharedLoggingContext,
    ) -> PopulationOutcome {
        let mut builder = ArchiveAviationMessageBuilder::default();
        for populator in &self.populators {
            match populator.populate(input, &mut builder, context).await {
                Ok(()) => {}
                Err(PopulateError::Discard(reason)) => {
                    info!(ctx = %context, reason = %reason, "Message discarded");
                    return PopulationOutcome::Discard;
                }
                Err(PopulateError::Failed(reason)) => {
                    error!(ctx = %context, populator = ?populator, error = %reason, "Message population failed");
                    return PopulationOutcome::Fail;
                }
            }
        }

        match builder.build() {
            Ok(record) => PopulationOutcome::Store(record),
            Err(e) => {
                error!(ctx = %context, error = %e, "Populated message is incomplete");
                PopulationOutcome::Fail
            }
        }
    }

    /// Populate every message, recording each outcome in the context's
    /// statistics. Returns the records to persist.
    pub async fn populate(
        &self,
        messages: &[InputAviationMessage],
        context: &SharedLoggingContext,
    ) -> Vec<PopulatedMessage> {
        let mut populated = Vec::with_capacity(messages.len());
        for input in messages {
            let reference = input.message_reference;
            context.enter_bulletin(Some(reference.bulletin_index));
            if let Some(heading) = input.gts_bulletin_heading.raw.as_deref().or(input.collect_identifier.raw.as_deref()) {
                context.modify_bulletin(|bulletin| {
                    if bulletin.excerpt().is_none() {
                        bulletin.set_excerpt(heading);
                    }
                });
            }
            let mut message_reference =
                LogReference::of_index(reference.message_index).with_excerpt(&input.message.original_message);
            if let Some(offset) = input.char_offset {
                message_reference = message_reference.with_char_offset(offset);
            }
            context.enter_message_reference(message_reference);

            match self.populate_message(input, context).await {
                PopulationOutcome::Store(record) => {
                    let result = StatisticsResult::of_stored(record.processing_result);
                    debug!(ctx = %context, result = %record.processing_result, "Message populated");
                    context.record_processing_result(result);
                    populated.push(PopulatedMessage { reference, record });
                }
                PopulationOutcome::Discard => context.record_processing_result(StatisticsResult::Discarded),
                PopulationOutcome::Fail => context.record_processing_result(StatisticsResult::Failed),
            }
            context.leave_message();
        }
        context.leave_bulletin();
        populated
    }
}
