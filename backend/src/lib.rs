//! # ipdrload - IPDR session log ingestion
//!
//! ipdrload takes operator session exports (CSV with arbitrary column names,
//! encodings and separators), maps their columns onto a fixed canonical IPDR
//! schema and streams normalized records into a bulk-load destination.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Transform  │────▶│    Sink     │
//! │  (any enc)  │     │  (auto-enc) │     │  (mapping)  │     │ (file/psql) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │   Mapping   │  AI suggestion + fuzzy fallback
//!                     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ipdrload::{process_file, FileSink, JobLog, MappingSuggester, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let info = ipdrload::read_info("sessions.csv").unwrap();
//!     let suggestion = MappingSuggester::fuzzy_only().suggest(&info.headers).await;
//!     let mut sink = FileSink::open("ipdr_records.csv", true).await.unwrap();
//!     let stats = process_file(
//!         "sessions.csv".as_ref(),
//!         suggestion.mapping,
//!         &mut sink,
//!         PipelineOptions::default(),
//!         &JobLog::default(),
//!     )
//!     .await
//!     .unwrap();
//!     println!("{} records loaded", stats.records_processed);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per tier
//! - [`schema`] - Canonical field catalog
//! - [`models`] - Column mappings and records
//! - [`parser`] - Streaming CSV source with auto-detection
//! - [`mapping`] - Fuzzy matching and mapping suggestion
//! - [`ai`] - Anthropic client used as suggestion collaborator
//! - [`validation`] - Mapping and record validation
//! - [`transform`] - Record transformation, pipeline and preflight
//! - [`encoder`] - Canonical CSV line encoding
//! - [`sink`] - Bulk-load destinations
//! - [`cache`] - Saved mapping templates
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod schema;

// Parsing
pub mod parser;

// Mapping
pub mod ai;
pub mod mapping;

// Validation
pub mod validation;

// Transformation and output
pub mod encoder;
pub mod sink;
pub mod transform;

// Caching
pub mod cache;

// Runtime
pub mod api;
pub mod config;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AiError, ConfigError, CsvError, PipelineError, PreflightError, RegistryError, ServerError,
    SinkError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{CanonicalRecord, ColumnMapping, RawRecord, ValidationReport, UNMAPPED};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{detect_delimiter, detect_encoding, read_info, CsvInfo, CsvSource};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use ai::AiClient;
pub use mapping::{match_headers, MappingSource, MappingSuggester, Suggestion, SuggestionSource};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate_mapping, validate_record};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    preflight, process_file, run_pipeline, PipelineOptions, PreflightReport, RecordOutcome,
    RecordTransformer, RejectedRecord, StatisticsSnapshot,
};

// =============================================================================
// Re-exports - Sinks
// =============================================================================

pub use sink::{open_sink, CommandSink, FileSink, MemorySink, RecordSink};

// =============================================================================
// Re-exports - Registry, config and API
// =============================================================================

pub use api::{start_server, JobLog};
pub use cache::{MappingRegistry, StoredMapping};
pub use config::Config;
