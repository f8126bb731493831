//! Column mapping derivation.
//!
//! - [`fuzzy`] - deterministic alias/edit-distance matcher
//! - [`suggest`] - collaborator-backed suggester with fuzzy fallback

pub mod fuzzy;
pub mod suggest;

pub use fuzzy::{match_headers, CONFIDENCE_THRESHOLD};
pub use suggest::{MappingSource, MappingSuggester, Suggestion, SuggestionRequest, SuggestionSource};
