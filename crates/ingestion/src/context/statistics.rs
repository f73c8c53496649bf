//! Per-file processing statistics with worst-result roll-up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use avi_common::ProcessingResult;

/// Outcome of processing a message, bulletin or file. Ordered from best to
/// worst; a parent's effective result is the worst among itself and its
/// children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatisticsResult {
    /// Considered, nothing happened yet.
    #[default]
    Nothing,
    Archived,
    Discarded,
    Rejected,
    Failed,
}

impl StatisticsResult {
    pub const ALL: [StatisticsResult; 5] = [
        StatisticsResult::Nothing,
        StatisticsResult::Archived,
        StatisticsResult::Discarded,
        StatisticsResult::Rejected,
        StatisticsResult::Failed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StatisticsResult::Nothing => "NOTHING",
            StatisticsResult::Archived => "ARCHIVED",
            StatisticsResult::Discarded => "DISCARDED",
            StatisticsResult::Rejected => "REJECTED",
            StatisticsResult::Failed => "FAILED",
        }
    }

    /// Result of a stored record: archived when OK, rejected otherwise.
    pub fn of_stored(result: ProcessingResult) -> Self {
        if result.is_ok() {
            StatisticsResult::Archived
        } else {
            StatisticsResult::Rejected
        }
    }
}

impl fmt::Display for StatisticsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counters by result for the messages, bulletins and the file itself.
///
/// Slots never recorded read as [`StatisticsResult::Nothing`]. Recording
/// into a slot keeps the worse of the old and new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileProcessingStatistics {
    file: Option<StatisticsResult>,
    bulletins: BTreeMap<usize, StatisticsResult>,
    messages: BTreeMap<(usize, usize), StatisticsResult>,
}

fn merge(slot: &mut StatisticsResult, result: StatisticsResult) {
    if result > *slot {
        *slot = result;
    }
}

impl FileProcessingStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn record_file(&mut self, result: StatisticsResult) {
        merge(self.file.get_or_insert(StatisticsResult::Nothing), result);
    }

    pub fn record_bulletin(&mut self, bulletin: usize, result: StatisticsResult) {
        merge(self.bulletins.entry(bulletin).or_default(), result);
    }

    pub fn record_message(&mut self, bulletin: usize, message: usize, result: StatisticsResult) {
        merge(self.messages.entry((bulletin, message)).or_default(), result);
    }

    pub fn init_file(&mut self) {
        self.file.get_or_insert(StatisticsResult::Nothing);
    }

    pub fn init_bulletin(&mut self, bulletin: usize) {
        self.bulletins.entry(bulletin).or_default();
    }

    pub fn init_message(&mut self, bulletin: usize, message: usize) {
        self.messages.entry((bulletin, message)).or_default();
    }

    pub fn message_result(&self, bulletin: usize, message: usize) -> StatisticsResult {
        self.messages.get(&(bulletin, message)).copied().unwrap_or_default()
    }

    /// Worst of the bulletin's own result and its messages' results.
    pub fn bulletin_result(&self, bulletin: usize) -> StatisticsResult {
        let own = self.bulletins.get(&bulletin).copied().unwrap_or_default();
        self.messages
            .range((bulletin, 0)..=(bulletin, usize::MAX))
            .map(|(_, result)| *result)
            .fold(own, StatisticsResult::max)
    }

    /// Worst of the file's own result and every bulletin's effective result.
    pub fn file_result(&self) -> StatisticsResult {
        let own = self.file.unwrap_or_default();
        self.bulletin_indices()
            .into_iter()
            .map(|bulletin| self.bulletin_result(bulletin))
            .fold(own, StatisticsResult::max)
    }

    /// Bulletin indices with a slot of their own or for any message.
    fn bulletin_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .bulletins
            .keys()
            .copied()
            .chain(self.messages.keys().map(|(bulletin, _)| *bulletin))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn message_counts(&self) -> BTreeMap<StatisticsResult, usize> {
        count(self.messages.values().copied())
    }

    pub fn bulletin_counts(&self) -> BTreeMap<StatisticsResult, usize> {
        count(self.bulletin_indices().into_iter().map(|b| self.bulletin_result(b)))
    }

    pub fn summary(&self) -> StatisticsSummary {
        let named = |counts: BTreeMap<StatisticsResult, usize>| {
            counts.into_iter().map(|(result, n)| (result.name().to_string(), n)).collect()
        };
        StatisticsSummary {
            messages: named(self.message_counts()),
            message_total: self.messages.len(),
            bulletins: named(self.bulletin_counts()),
            bulletin_total: self.bulletin_indices().len(),
            file: self.file_result(),
        }
    }
}

fn count(results: impl Iterator<Item = StatisticsResult>) -> BTreeMap<StatisticsResult, usize> {
    let mut counts = BTreeMap::new();
    for result in results {
        *counts.entry(result).or_insert(0) += 1;
    }
    counts
}

fn write_counts(f: &mut fmt::Formatter<'_>, counts: &BTreeMap<StatisticsResult, usize>) -> fmt::Result {
    let total: usize = counts.values().sum();
    f.write_str("{")?;
    for (result, n) in counts.iter().filter(|(_, n)| **n > 0) {
        write!(f, "{}:{},", result, n)?;
    }
    write!(f, "total:{}}}", total)
}

/// `M{ARCHIVED:2,FAILED:1,total:3} B{FAILED:1,total:1} F{FAILED}`
impl fmt::Display for FileProcessingStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("M")?;
        write_counts(f, &self.message_counts())?;
        f.write_str(" B")?;
        write_counts(f, &self.bulletin_counts())?;
        write!(f, " F{{{}}}", self.file_result())
    }
}

/// Serializable snapshot for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub messages: BTreeMap<String, usize>,
    pub message_total: usize,
    pub bulletins: BTreeMap<String, usize>,
    pub bulletin_total: usize,
    pub file: StatisticsResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use StatisticsResult::*;

    #[test]
    fn test_unset_reads_as_nothing() {
        let stats = FileProcessingStatistics::new();
        assert_eq!(stats.file_result(), Nothing);
        assert_eq!(stats.bulletin_result(3), Nothing);
        assert_eq!(stats.message_result(3, 1), Nothing);
    }

    #[test]
    fn test_bulletin_rolls_up_worst_message() {
        let sequences: [&[StatisticsResult]; 4] = [
            &[Archived, Archived],
            &[Archived, Discarded, Archived],
            &[Rejected, Archived, Failed, Discarded],
            &[Nothing],
        ];
        for own in StatisticsResult::ALL {
            for sequence in sequences {
                let mut stats = FileProcessingStatistics::new();
                stats.record_bulletin(0, own);
                for (i, result) in sequence.iter().enumerate() {
                    stats.record_message(0, i, *result);
                }
                let expected = sequence.iter().copied().fold(own, StatisticsResult::max);
                assert_eq!(stats.bulletin_result(0), expected, "own {:?}, messages {:?}", own, sequence);
            }
        }
    }

    #[test]
    fn test_file_rolls_up_worst_bulletin() {
        let mut stats = FileProcessingStatistics::new();
        stats.record_message(0, 0, Archived);
        stats.record_message(1, 0, Discarded);
        stats.record_bulletin(2, Rejected);
        assert_eq!(stats.file_result(), Rejected);
        stats.record_file(Archived);
        assert_eq!(stats.file_result(), Rejected);
        stats.record_message(1, 4, Failed);
        assert_eq!(stats.file_result(), Failed);
    }

    #[test]
    fn test_recording_keeps_worse_value() {
        let mut stats = FileProcessingStatistics::new();
        stats.record_message(0, 0, Failed);
        stats.record_message(0, 0, Archived);
        assert_eq!(stats.message_result(0, 0), Failed);
    }

    #[test]
    fn test_display() {
        let mut stats = FileProcessingStatistics::new();
        stats.record_message(0, 0, Archived);
        stats.record_message(0, 1, Archived);
        stats.record_message(0, 2, Failed);
        assert_eq!(stats.to_string(), "M{ARCHIVED:2,FAILED:1,total:3} B{FAILED:1,total:1} F{FAILED}");
    }

    #[test]
    fn test_summary() {
        let mut stats = FileProcessingStatistics::new();
        stats.record_message(0, 0, Archived);
        stats.init_message(0, 1);
        let summary = stats.summary();
        assert_eq!(summary.message_total, 2);
        assert_eq!(summary.messages.get("NOTHING"), Some(&1));
        assert_eq!(summary.file, Archived);
    }
}
