//! Mapping suggestion with a deterministic fallback.
//!
//! The suggester asks an external [`SuggestionSource`] for a JSON object of
//! `field -> header | null`. Anything unusable from the collaborator (an
//! error, prose, a malformed object) falls back to the fuzzy matcher. A
//! usable but thin answer is topped up from the fuzzy matcher without
//! overwriting what the collaborator chose.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::fuzzy;
use crate::error::AiError;
use crate::models::ColumnMapping;
use crate::schema;
use crate::validation::validate_suggestion_response;

/// Minimum share of required fields the collaborator must cover before its
/// answer is used without fuzzy top-up.
pub const COVERAGE_THRESHOLD: f64 = 0.6;

/// What the collaborator is asked.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRequest {
    /// Natural-language description of the canonical schema.
    pub schema_description: String,
    /// File headers, in file order.
    pub headers: Vec<String>,
}

impl SuggestionRequest {
    pub fn new(headers: &[String]) -> Self {
        Self {
            schema_description: schema::describe(),
            headers: headers.to_vec(),
        }
    }
}

/// External mapping-suggestion service.
///
/// Returns the raw response text; parsing is the suggester's job.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<String, AiError>;
}

/// Which strategy produced a candidate mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingSource {
    #[serde(rename = "ai")]
    Ai,
    #[serde(rename = "ai+fuzzy")]
    AiWithFuzzy,
    #[serde(rename = "fuzzy")]
    Fuzzy,
}

impl std::fmt::Display for MappingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MappingSource::Ai => "ai",
            MappingSource::AiWithFuzzy => "ai+fuzzy",
            MappingSource::Fuzzy => "fuzzy",
        };
        f.write_str(s)
    }
}

/// A candidate mapping and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub mapping: ColumnMapping,
    pub source: MappingSource,
}

/// Strip markdown fences and blank lines around a JSON answer.
///
/// If what remains still does not start with `{`, fall back to the outermost
/// `{...}` slice of the original text.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_start())
        .unwrap_or(trimmed);
    let body = body.strip_suffix("```").unwrap_or(body).trim();

    if body.starts_with('{') && body.ends_with('}') {
        return body;
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => body,
    }
}

/// Parse a collaborator answer into a mapping.
///
/// Returns `None` when the text is not a JSON object of `string | null`.
/// Keys that are not canonical fields are ignored, and headers that are not
/// in `headers` are dropped.
pub fn parse_suggestion(raw: &str, headers: &[String]) -> Option<ColumnMapping> {
    let value: Value = match serde_json::from_str(strip_code_fences(raw)) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "suggestion is not valid JSON");
            return None;
        }
    };

    if let Err(errors) = validate_suggestion_response(&value) {
        warn!(errors = ?errors, "suggestion has the wrong shape");
        return None;
    }

    let object = value.as_object()?;
    let mut mapping = ColumnMapping::new();
    for (field, header) in object {
        if !schema::is_field(field) {
            debug!(key = %field, "ignoring unknown suggested field");
            continue;
        }
        let Some(header) = header.as_str().map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        if !headers.iter().any(|h| h == header) {
            warn!(field = %field, header = %header, "suggested header is not in the file");
            continue;
        }
        mapping = mapping.with(field.as_str(), header);
    }
    Some(mapping)
}

/// Share of required fields mapped, in `[0, 1]`.
pub fn coverage(mapping: &ColumnMapping) -> f64 {
    let required: Vec<_> = schema::required_fields().collect();
    if required.is_empty() {
        return 1.0;
    }
    let mapped = required.iter().filter(|f| mapping.is_mapped(f.name)).count();
    mapped as f64 / required.len() as f64
}

/// Produces candidate mappings for a header row.
#[derive(Clone, Default)]
pub struct MappingSuggester {
    source: Option<Arc<dyn SuggestionSource>>,
}

impl MappingSuggester {
    /// Suggester backed by a collaborator.
    pub fn new(source: Arc<dyn SuggestionSource>) -> Self {
        Self { source: Some(source) }
    }

    /// Suggester that only uses the fuzzy matcher.
    pub fn fuzzy_only() -> Self {
        Self { source: None }
    }

    pub fn has_collaborator(&self) -> bool {
        self.source.is_some()
    }

    pub async fn suggest(&self, headers: &[String]) -> Suggestion {
        let Some(source) = &self.source else {
            return fuzzy_suggestion(headers);
        };

        let request = SuggestionRequest::new(headers);
        let raw = match source.suggest(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "suggestion collaborator failed, using fuzzy matching");
                return fuzzy_suggestion(headers);
            }
        };

        let Some(mapping) = parse_suggestion(&raw, headers) else {
            return fuzzy_suggestion(headers);
        };

        let cov = coverage(&mapping);
        if cov < COVERAGE_THRESHOLD {
            debug!(coverage = cov, "suggestion coverage too low, merging fuzzy matches");
            return Suggestion {
                mapping: mapping.merged_with(&fuzzy::match_headers(headers)),
                source: MappingSource::AiWithFuzzy,
            };
        }

        Suggestion { mapping, source: MappingSource::Ai }
    }
}

fn fuzzy_suggestion(headers: &[String]) -> Suggestion {
    Suggestion {
        mapping: fuzzy::match_headers(headers),
        source: MappingSource::Fuzzy,
    }
}
