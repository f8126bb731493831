//! Per-row extraction, validation and normalization.
//!
//! One [`RecordTransformer`] exists per file. Every row yields an explicit
//! [`RecordOutcome`]; rejected rows never interrupt the stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{Clock, RandomSuffix, SuffixSource, SystemClock};
use super::normalize::{
    duration_ms, normalize_protocol, parse_bytes, parse_port, parse_timestamp, service_label,
    synthesize_party_id,
};
use super::stats::{RunStatistics, StatisticsSnapshot, DEFAULT_MAX_DIAGNOSTICS};
use crate::models::{CanonicalRecord, ColumnMapping, RawRecord};
use crate::schema::{
    self, A_PARTY_ID, BYTES_DOWN, BYTES_UP, DST_IP, DST_PORT, DURATION, END_TIME, NAT_IP,
    NAT_PORT, PROTOCOL, SRC_IP, SRC_PORT, START_TIME,
};
use crate::validation::{is_absent, validate_record};

/// Canonical field values read from one row through the mapping.
///
/// Unmapped fields and null placeholders (`""`, `"null"`, `"NULL"`) read as
/// `None`.
#[derive(Debug)]
pub struct ExtractedFields<'a> {
    values: Vec<(&'static str, Option<&'a str>)>,
}

impl<'a> ExtractedFields<'a> {
    pub fn extract(mapping: &ColumnMapping, raw: &'a RawRecord) -> Self {
        let values = schema::fields()
            .iter()
            .map(|field| {
                let value = mapping
                    .get(field.name)
                    .and_then(|header| raw.get(header))
                    .filter(|v| !is_absent(Some(v)));
                (field.name, value)
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, field: &str) -> Option<&'a str> {
        self.values
            .iter()
            .find(|(name, _)| *name == field)
            .and_then(|(_, value)| *value)
    }
}

/// A row that failed data-level validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRecord {
    /// 0-based data row index.
    pub index: usize,
    pub reasons: Vec<String>,
    pub raw: Value,
}

/// Result of transforming one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Accepted(CanonicalRecord),
    Rejected(RejectedRecord),
}

/// Turns raw rows into canonical records for one file.
pub struct RecordTransformer {
    mapping: ColumnMapping,
    stats: RunStatistics,
    clock: Box<dyn Clock>,
    suffixes: Box<dyn SuffixSource>,
    next_index: usize,
}

impl RecordTransformer {
    pub fn new(mapping: ColumnMapping) -> Self {
        Self {
            mapping,
            stats: RunStatistics::new(DEFAULT_MAX_DIAGNOSTICS),
            clock: Box::new(SystemClock),
            suffixes: Box::new(RandomSuffix),
            next_index: 0,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_suffix_source(mut self, suffixes: impl SuffixSource + 'static) -> Self {
        self.suffixes = Box::new(suffixes);
        self
    }

    /// Cap on retained rejection diagnostics.
    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.stats = RunStatistics::new(max);
        self
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Transform the next row without touching the statistics.
    pub fn transform(&mut self, raw: &RawRecord) -> RecordOutcome {
        let index = self.next_index;
        self.next_index += 1;

        let fields = ExtractedFields::extract(&self.mapping, raw);
        let reasons = validate_record(&fields);
        if !reasons.is_empty() {
            return RecordOutcome::Rejected(RejectedRecord {
                index,
                reasons,
                raw: raw.to_json(),
            });
        }

        RecordOutcome::Accepted(self.normalize(&fields))
    }

    /// Transform the next row and fold the outcome into the statistics.
    ///
    /// Returns the record to emit, if the row was accepted.
    pub fn process(&mut self, raw: &RawRecord) -> Option<CanonicalRecord> {
        let outcome = self.transform(raw);
        self.stats.absorb(outcome)
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    fn normalize(&mut self, fields: &ExtractedFields<'_>) -> CanonicalRecord {
        let parsed_start = fields.get(START_TIME).and_then(parse_timestamp);
        let start_time = parsed_start.unwrap_or_else(|| self.clock.now());
        let end_time = fields.get(END_TIME).and_then(parse_timestamp);
        let src_ip = fields.get(SRC_IP).map(str::to_string);

        let a_party_id = match fields.get(A_PARTY_ID).map(str::trim).filter(|v| !v.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let suffix = self.suffixes.next_suffix();
                synthesize_party_id(src_ip.as_deref(), start_time, &suffix)
            }
        };

        CanonicalRecord {
            a_party_id,
            start_time,
            end_time,
            duration_ms: duration_ms(fields.get(DURATION), parsed_start, end_time),
            src_ip,
            src_port: fields.get(SRC_PORT).and_then(parse_port),
            nat_ip: fields.get(NAT_IP).map(str::to_string),
            nat_port: fields.get(NAT_PORT).and_then(parse_port),
            dst_ip: fields.get(DST_IP).map(str::to_string),
            dst_port: fields.get(DST_PORT).and_then(parse_port),
            protocol: normalize_protocol(fields.get(PROTOCOL)),
            service_label: service_label(fields.get(DST_PORT)).to_string(),
            bytes_up: parse_bytes(fields.get(BYTES_UP)),
            bytes_down: parse_bytes(fields.get(BYTES_DOWN)),
        }
    }
}
