//! Domain models for the IPDR load pipeline.
//!
//! - [`ColumnMapping`] - canonical field → source header, fixed per file
//! - [`RawRecord`] - one source row, keyed by header
//! - [`CanonicalRecord`] - one normalized, bulk-loadable session record
//! - [`ValidationReport`] - schema-level mapping validation result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema;

// =============================================================================
// Column Mapping
// =============================================================================

/// Marker used in serialized mappings for fields without a source column.
pub const UNMAPPED: &str = "unmapped";

/// Mapping from canonical field name to source header.
///
/// Built once per file and never mutated afterwards; [`ColumnMapping::with`]
/// returns a new value. Fields absent from the map are unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Option<String>>", into = "BTreeMap<String, String>")]
pub struct ColumnMapping {
    columns: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `field` mapped to `header`.
    pub fn with(mut self, field: impl Into<String>, header: impl Into<String>) -> Self {
        self.columns.insert(field.into(), header.into());
        self
    }

    /// Source header for a canonical field, if mapped.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.columns.get(field).map(String::as_str)
    }

    pub fn is_mapped(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    /// Mapped (field, header) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(f, h)| (f.as_str(), h.as_str()))
    }

    /// Distinct source headers referenced by this mapping.
    pub fn headers(&self) -> Vec<&str> {
        let mut headers: Vec<&str> = self.columns.values().map(String::as_str).collect();
        headers.sort_unstable();
        headers.dedup();
        headers
    }

    pub fn mapped_count(&self) -> usize {
        self.columns.len()
    }

    /// Fill every field left unmapped here from `fallback`.
    ///
    /// Existing entries are never overwritten.
    pub fn merged_with(mut self, fallback: &ColumnMapping) -> Self {
        for (field, header) in fallback.iter() {
            self.columns
                .entry(field.to_string())
                .or_insert_with(|| header.to_string());
        }
        self
    }
}

impl From<BTreeMap<String, Option<String>>> for ColumnMapping {
    fn from(raw: BTreeMap<String, Option<String>>) -> Self {
        let columns = raw
            .into_iter()
            .filter_map(|(field, header)| {
                let header = header?.trim().to_string();
                if header.is_empty() || header == UNMAPPED {
                    None
                } else {
                    Some((field, header))
                }
            })
            .collect();
        Self { columns }
    }
}

impl From<ColumnMapping> for BTreeMap<String, String> {
    fn from(mapping: ColumnMapping) -> Self {
        let mut out: BTreeMap<String, String> = schema::fields()
            .iter()
            .map(|f| (f.name.to_string(), UNMAPPED.to_string()))
            .collect();
        out.extend(mapping.columns);
        out
    }
}

// =============================================================================
// Raw Record
// =============================================================================

/// One source row. Headers are shared across all rows of a file.
#[derive(Debug, Clone)]
pub struct RawRecord {
    headers: Arc<[String]>,
    values: Vec<String>,
}

impl RawRecord {
    /// Build a record; missing trailing values read as empty strings.
    pub fn new(headers: Arc<[String]>, values: Vec<String>) -> Self {
        Self { headers, values }
    }

    /// Value of the column named `header`.
    pub fn get(&self, header: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == header)?;
        Some(self.values.get(idx).map(String::as_str).unwrap_or(""))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// JSON object view used in rejection diagnostics.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (i, header) in self.headers.iter().enumerate() {
            let value = self.values.get(i).cloned().unwrap_or_default();
            obj.insert(header.clone(), Value::String(value));
        }
        Value::Object(obj)
    }
}

// =============================================================================
// Canonical Record
// =============================================================================

/// A normalized session record, ready for the bulk-load sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub a_party_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub src_ip: Option<String>,
    pub src_port: Option<u32>,
    pub nat_ip: Option<String>,
    pub nat_port: Option<u32>,
    pub dst_ip: Option<String>,
    pub dst_port: Option<u32>,
    pub protocol: String,
    pub service_label: String,
    pub bytes_up: u64,
    pub bytes_down: u64,
}

// =============================================================================
// Validation Report
// =============================================================================

/// Schema-level validation of a candidate mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub required_fields_count: usize,
    pub mapped_required_count: usize,
}
