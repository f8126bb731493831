//! Run statistics for one file's pipeline.

use serde::{Deserialize, Serialize};

use super::record::{RecordOutcome, RejectedRecord};
use crate::models::CanonicalRecord;

/// Default cap on retained rejection diagnostics.
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 100;

/// Counters and a bounded rejection sample.
///
/// Owned by a single transformer; counters only ever grow.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    record_count: usize,
    error_count: usize,
    diagnostics: Vec<RejectedRecord>,
    max_diagnostics: usize,
}

impl RunStatistics {
    pub fn new(max_diagnostics: usize) -> Self {
        Self {
            record_count: 0,
            error_count: 0,
            diagnostics: Vec::new(),
            max_diagnostics,
        }
    }

    /// Fold one outcome in, handing back the record to emit.
    pub fn absorb(&mut self, outcome: RecordOutcome) -> Option<CanonicalRecord> {
        match outcome {
            RecordOutcome::Accepted(record) => {
                self.record_count += 1;
                Some(record)
            }
            RecordOutcome::Rejected(rejected) => {
                self.error_count += 1;
                if self.diagnostics.len() < self.max_diagnostics {
                    self.diagnostics.push(rejected);
                }
                None
            }
        }
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[RejectedRecord] {
        &self.diagnostics
    }

    /// Accepted share as a percentage with two decimals, `"0.00"` when
    /// nothing was seen.
    pub fn success_rate(&self) -> String {
        let total = self.record_count + self.error_count;
        if total == 0 {
            return format!("{:.2}", 0.0);
        }
        format!("{:.2}", self.record_count as f64 * 100.0 / total as f64)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            records_processed: self.record_count,
            error_count: self.error_count,
            success_rate: self.success_rate(),
            errors: self.diagnostics.clone(),
        }
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIAGNOSTICS)
    }
}

/// User-visible run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub records_processed: usize,
    pub error_count: usize,
    pub success_rate: String,
    /// Capped sample of rejected rows.
    pub errors: Vec<RejectedRecord>,
}

impl Default for StatisticsSnapshot {
    fn default() -> Self {
        RunStatistics::default().snapshot()
    }
}
