//! Hierarchical file → bulletin → message position tracking.
//!
//! The context's string form is the prefix of every per-file log line:
//!
//! ```text
//! <processing-id>:<product>/<filename>:<bulletin>:<message>
//! ```
//!
//! where bulletin and message segments read `<index+1>(<excerpt>)@<offset+1>`
//! with excerpt and offset only when known. Log correlation tooling parses
//! this format; keep it stable.

use avi_common::FileReference;
use std::collections::BTreeMap;
use std::fmt;

use super::statistics::{FileProcessingStatistics, StatisticsResult};

const EXCERPT_MAX_CHARS: usize = 40;
const EXCERPT_ELLIPSIS: &str = "...";

/// Position and human-readable excerpt of a bulletin or message within the
/// current file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LogReference {
    index: usize,
    excerpt: Option<String>,
    char_offset: Option<usize>,
}

pub type BulletinLogReference = LogReference;
pub type MessageLogReference = LogReference;

impl LogReference {
    pub fn of_index(index: usize) -> Self {
        Self {
            index,
            excerpt: None,
            char_offset: None,
        }
    }

    /// Set the excerpt from arbitrary text; whitespace runs collapse to a
    /// single space and long text is abbreviated.
    pub fn with_excerpt(mut self, text: &str) -> Self {
        self.set_excerpt(text);
        self
    }

    pub fn with_char_offset(mut self, char_offset: usize) -> Self {
        self.char_offset = Some(char_offset);
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn set_excerpt(&mut self, text: &str) {
        self.excerpt = abbreviate(text);
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn set_char_offset(&mut self, char_offset: Option<usize>) {
        self.char_offset = char_offset;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn excerpt(&self) -> Option<&str> {
        self.excerpt.as_deref()
    }

    pub fn char_offset(&self) -> Option<usize> {
        self.char_offset
    }
}

fn abbreviate(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= EXCERPT_MAX_CHARS {
        return Some(collapsed);
    }
    let mut abbreviated: String = collapsed.chars().take(EXCERPT_MAX_CHARS).collect();
    abbreviated.push_str(EXCERPT_ELLIPSIS);
    Some(abbreviated)
}

impl fmt::Display for LogReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index + 1)?;
        if let Some(excerpt) = &self.excerpt {
            write!(f, "({})", excerpt)?;
        }
        if let Some(offset) = self.char_offset {
            write!(f, "@{}", offset + 1)?;
        }
        Ok(())
    }
}

/// Processing position and statistics of one file-processing attempt.
///
/// Owned by a single worker. Wrap in
/// [`SharedLoggingContext`](super::SharedLoggingContext) when other tasks
/// need to read it.
#[derive(Debug, Clone, Default)]
pub struct LoggingContext {
    processing_id: String,
    file: Option<FileReference>,
    bulletins: BTreeMap<usize, BulletinLogReference>,
    messages: BTreeMap<usize, BTreeMap<usize, MessageLogReference>>,
    current_bulletin: Option<usize>,
    current_message: Option<usize>,
    statistics: FileProcessingStatistics,
}

impl LoggingContext {
    pub fn new(processing_id: impl Into<String>) -> Self {
        Self {
            processing_id: processing_id.into(),
            ..Self::default()
        }
    }

    pub fn processing_id(&self) -> &str {
        &self.processing_id
    }

    pub fn file(&self) -> Option<&FileReference> {
        self.file.as_ref()
    }

    /// Enter a file. Entering the file already entered keeps the recorded
    /// bulletins, messages and statistics; any other file (or none) clears
    /// them.
    pub fn enter_file(&mut self, file: Option<FileReference>) {
        if self.file != file {
            self.bulletins.clear();
            self.messages.clear();
            self.statistics.clear();
        }
        self.file = file;
        self.current_bulletin = None;
        self.current_message = None;
    }

    pub fn leave_file(&mut self) {
        self.enter_file(None);
    }

    /// Enter the bulletin at `index`, keeping a previously stored reference
    /// for that index if one exists. Always leaves the current message.
    pub fn enter_bulletin(&mut self, index: Option<usize>) {
        self.current_message = None;
        self.current_bulletin = index;
        if let Some(index) = index {
            self.bulletins.entry(index).or_insert_with(|| LogReference::of_index(index));
        }
    }

    /// Enter a bulletin, replacing any stored reference at its index.
    pub fn enter_bulletin_reference(&mut self, reference: BulletinLogReference) {
        let index = reference.index();
        self.bulletins.insert(index, reference);
        self.current_bulletin = Some(index);
        self.current_message = None;
    }

    pub fn leave_bulletin(&mut self) {
        self.enter_bulletin(None);
    }

    /// Enter the message at `index` in the current bulletin (bulletin 0 if
    /// none is entered).
    pub fn enter_message(&mut self, index: Option<usize>) {
        let Some(index) = index else {
            self.current_message = None;
            return;
        };
        let bulletin = self.ensure_bulletin();
        self.messages
            .entry(bulletin)
            .or_default()
            .entry(index)
            .or_insert_with(|| LogReference::of_index(index));
        self.current_message = Some(index);
    }

    /// Enter a message, replacing any stored reference at its index.
    pub fn enter_message_reference(&mut self, reference: MessageLogReference) {
        let bulletin = self.ensure_bulletin();
        let index = reference.index();
        self.messages.entry(bulletin).or_default().insert(index, reference);
        self.current_message = Some(index);
    }

    pub fn leave_message(&mut self) {
        self.enter_message(None);
    }

    fn ensure_bulletin(&mut self) -> usize {
        match self.current_bulletin {
            Some(bulletin) => bulletin,
            None => {
                self.enter_bulletin(Some(0));
                0
            }
        }
    }

    pub fn bulletin(&self) -> Option<&BulletinLogReference> {
        self.current_bulletin.and_then(|index| self.bulletins.get(&index))
    }

    pub fn message(&self) -> Option<&MessageLogReference> {
        let bulletin = self.current_bulletin?;
        let message = self.current_message?;
        self.messages.get(&bulletin).and_then(|messages| messages.get(&message))
    }

    /// Stored reference for a bulletin, or a bare default for unseen indices.
    pub fn bulletin_at(&self, index: usize) -> BulletinLogReference {
        self.bulletins
            .get(&index)
            .cloned()
            .unwrap_or_else(|| LogReference::of_index(index))
    }

    /// Apply `f` to the current bulletin reference; no-op without one.
    /// A changed index moves the reference (and its messages) to the new slot.
    /// A reference already at the new slot swaps into the old one.
    pub fn modify_bulletin(&mut self, f: impl FnOnce(&mut BulletinLogReference)) {
        let Some(old_index) = self.current_bulletin else {
            return;
        };
        let Some(mut reference) = self.bulletins.remove(&old_index) else {
            return;
        };
        f(&mut reference);
        let new_index = reference.index();
        if new_index != old_index {
            swap_slot(&mut self.bulletins, old_index, new_index);
            let moved = self.messages.remove(&old_index);
            if let Some(displaced) = self.messages.remove(&new_index) {
                self.messages.insert(old_index, displaced);
            }
            if let Some(messages) = moved {
                self.messages.insert(new_index, messages);
            }
            self.current_bulletin = Some(new_index);
        }
        self.bulletins.insert(new_index, reference);
    }

    /// Apply `f` to the current message reference; no-op without one.
    pub fn modify_message(&mut self, f: impl FnOnce(&mut MessageLogReference)) {
        let (Some(bulletin), Some(old_index)) = (self.current_bulletin, self.current_message) else {
            return;
        };
        let Some(messages) = self.messages.get_mut(&bulletin) else {
            return;
        };
        let Some(mut reference) = messages.remove(&old_index) else {
            return;
        };
        f(&mut reference);
        let new_index = reference.index();
        if new_index != old_index {
            swap_slot(messages, old_index, new_index);
        }
        messages.insert(new_index, reference);
        self.current_message = Some(new_index);
    }

    /// Record `result` at the deepest entered level.
    pub fn record_processing_result(&mut self, result: StatisticsResult) {
        match (self.current_bulletin, self.current_message) {
            (Some(bulletin), Some(message)) => self.statistics.record_message(bulletin, message, result),
            (Some(bulletin), None) => self.statistics.record_bulletin(bulletin, result),
            _ => self.statistics.record_file(result),
        }
    }

    /// Initialize every statistics slot from index 0 up to the highest index
    /// entered, at both bulletin and message level.
    pub fn init_statistics(&mut self) {
        self.statistics.init_file();
        let highest_bulletin = self.bulletins.keys().chain(self.messages.keys()).max().copied();
        let Some(highest_bulletin) = highest_bulletin else {
            return;
        };
        for bulletin in 0..=highest_bulletin {
            self.statistics.init_bulletin(bulletin);
            let highest_message = self
                .messages
                .get(&bulletin)
                .and_then(|messages| messages.keys().max().copied());
            if let Some(highest_message) = highest_message {
                for message in 0..=highest_message {
                    self.statistics.init_message(bulletin, message);
                }
            }
        }
    }

    pub fn statistics(&self) -> &FileProcessingStatistics {
        &self.statistics
    }
}

/// Move whatever occupies `to` into the vacated `from` slot.
fn swap_slot(slots: &mut BTreeMap<usize, LogReference>, from: usize, to: usize) {
    if let Some(mut displaced) = slots.remove(&to) {
        displaced.set_index(from);
        slots.insert(from, displaced);
    }
}

impl fmt::Display for LoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.processing_id)?;
        if let Some(file) = &self.file {
            write!(f, ":{}", file)?;
        }
        if let Some(bulletin) = self.bulletin() {
            write!(f, ":{}", bulletin)?;
        }
        if let Some(message) = self.message() {
            write!(f, ":{}", message)?;
        }
        Ok(())
    }
}
