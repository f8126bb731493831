//! Deterministic header → field matching.
//!
//! Each canonical field carries an alias list in the [`schema`] catalog.
//! A header is scored against every alias and the best score wins:
//!
//! | Rule                                   | Score         |
//! |----------------------------------------|---------------|
//! | normalized strings equal               | 1.0           |
//! | one contains the other                 | 0.8           |
//! | edit-distance similarity above 0.7     | the similarity|
//! | anything else                          | 0.0           |
//!
//! A field only takes a header scoring above [`CONFIDENCE_THRESHOLD`].
//! Fields are matched independently, so one header can end up mapped to
//! several fields.

use rapidfuzz::distance::levenshtein;

use crate::models::ColumnMapping;
use crate::schema::{self, SchemaField};

/// Minimum score for a field-level match.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Minimum edit-distance similarity for a single alias.
const SIMILARITY_THRESHOLD: f64 = 0.7;

const EXACT_SCORE: f64 = 1.0;
const CONTAINS_SCORE: f64 = 0.8;

/// Lower-case and drop `_`, space and `-`.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | ' ' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// (maxLen − distance) / maxLen over normalized strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let distance = levenshtein::distance(a.chars(), b.chars());
    (max_len - distance) as f64 / max_len as f64
}

/// Score a header against one alias.
fn score_alias(header: &str, alias: &str) -> f64 {
    // An empty string is "contained" in everything.
    if header.is_empty() || alias.is_empty() {
        return 0.0;
    }
    if header == alias {
        return EXACT_SCORE;
    }
    if header.contains(alias) || alias.contains(header) {
        return CONTAINS_SCORE;
    }
    let sim = similarity(header, alias);
    if sim > SIMILARITY_THRESHOLD {
        sim
    } else {
        0.0
    }
}

/// Best score of `header` across `aliases`.
pub fn score(header: &str, aliases: &[&str]) -> f64 {
    let header = normalize(header);
    aliases
        .iter()
        .map(|alias| score_alias(&header, &normalize(alias)))
        .fold(0.0, f64::max)
}

/// Highest-scoring header for one field, if it clears the threshold.
///
/// Ties keep the header that appears first.
pub fn best_match<'h>(field: &SchemaField, headers: &'h [String]) -> Option<(&'h str, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for header in headers {
        let s = score(header, field.aliases);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((header.as_str(), s));
        }
    }
    best.filter(|(_, s)| *s > CONFIDENCE_THRESHOLD)
}

/// Map every canonical field independently.
///
/// The same header may be assigned to more than one field; no uniqueness
/// pass is applied.
pub fn match_headers(headers: &[String]) -> ColumnMapping {
    schema::fields()
        .iter()
        .filter_map(|field| best_match(field, headers).map(|(h, _)| (field.name, h)))
        .fold(ColumnMapping::new(), |mapping, (field, header)| {
            mapping.with(field, header)
        })
}
