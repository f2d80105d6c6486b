//! Per-item batch outcome reporting.

use serde::{Deserialize, Serialize};

/// A record dropped from a batch, with the reason it was dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of an upsert batch.
///
/// `committed` holds the ids durably written to both stores, in input order.
/// `skipped` holds per-record failures that did not abort the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertReport {
    pub committed: Vec<String>,
    pub skipped: Vec<SkippedRecord>,
}

impl UpsertReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every input record was committed.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_completeness() {
        let mut report = UpsertReport::new();
        report.committed.push("a".to_string());
        assert!(report.is_complete());
        assert_eq!(report.committed_count(), 1);

        report
            .skipped
            .push(SkippedRecord::new("b", "index rejected document"));
        assert!(!report.is_complete());
    }
}
