//! Error types for the IPDR load pipeline.
//!
//! Errors are grouped by the tier they belong to:
//!
//! - [`CsvError`] - reading the source file (infrastructure)
//! - [`AiError`] - the mapping-suggestion collaborator (always recoverable)
//! - [`RegistryError`] - mapping template storage
//! - [`SinkError`] - the bulk-load sink (infrastructure)
//! - [`PreflightError`] - checks run before any row is read
//! - [`PipelineError`] - fatal pipeline aborts, carrying partial statistics
//! - [`ConfigError`] / [`ServerError`] - binary and HTTP layer
//!
//! Per-record failures are not errors: they are
//! [`RecordOutcome::Rejected`](crate::transform::RecordOutcome) values.

use thiserror::Error;

use crate::transform::stats::StatisticsSnapshot;

// =============================================================================
// CSV Source Errors
// =============================================================================

/// Errors while opening or streaming the source file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed CSV at a given data row.
    #[error("Invalid CSV at row {row}: {message}")]
    ParseError { row: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// AI Collaborator Errors
// =============================================================================

/// Errors from the mapping-suggestion collaborator.
///
/// None of these are fatal: the suggester falls back to fuzzy matching.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API returned an error payload.
    #[error("API error: {0}")]
    ApiError(String),

    /// Response body was not what we expected.
    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the mapping template registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Template not found.
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Invalid template data.
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors from a bulk-load sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the destination failed.
    #[error("Sink IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The load command could not be started.
    #[error("Failed to start load command '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    /// The load command exited unsuccessfully.
    #[error("Load command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    /// The sink was already finished.
    #[error("Sink is closed")]
    Closed,
}

// =============================================================================
// Preflight Errors
// =============================================================================

/// Rejections raised by the process boundary before any row is read.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// The referenced upload does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The confirmed mapping leaves required fields unmapped.
    #[error("Mapping is incomplete: {}", errors.join("; "))]
    IncompleteMapping { errors: Vec<String> },

    /// Mapped headers that are not in the file's header row.
    #[error("Mapped columns not found in file: {}", missing.join(", "))]
    UnknownHeaders {
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// The header row itself could not be read.
    #[error("Cannot read file headers: {0}")]
    Unreadable(#[from] CsvError),
}

impl PreflightError {
    /// Itemized list of violated constraints.
    pub fn details(&self) -> Vec<String> {
        match self {
            PreflightError::FileNotFound(path) => vec![format!("File not found: {}", path)],
            PreflightError::IncompleteMapping { errors } => errors.clone(),
            PreflightError::UnknownHeaders { missing, .. } => missing
                .iter()
                .map(|m| format!("Column '{}' not found in file", m))
                .collect(),
            PreflightError::Unreadable(e) => vec![e.to_string()],
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Fatal pipeline aborts.
///
/// Both infrastructure variants carry the statistics gathered before the
/// failure. Output already delivered to the sink is not rolled back.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading the source failed mid-stream.
    #[error("Source read failed after {} records: {source}", statistics.records_processed)]
    Source {
        source: CsvError,
        statistics: StatisticsSnapshot,
    },

    /// Writing to the sink failed.
    #[error("Sink write failed after {} records: {source}", statistics.records_processed)]
    Sink {
        source: SinkError,
        statistics: StatisticsSnapshot,
    },

    /// A pipeline stage task died.
    #[error("Pipeline stage failed: {0}")]
    Stage(String),
}

impl PipelineError {
    /// Statistics collected up to the failure point, if any.
    pub fn statistics(&self) -> Option<&StatisticsSnapshot> {
        match self {
            PipelineError::Source { statistics, .. } | PipelineError::Sink { statistics, .. } => {
                Some(statistics)
            }
            PipelineError::Stage(_) => None,
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for AI operations.
pub type AiResult<T> = Result<T, AiError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_carries_statistics() {
        let err = PipelineError::Sink {
            source: SinkError::Closed,
            statistics: StatisticsSnapshot {
                records_processed: 42,
                error_count: 1,
                success_rate: "97.67".into(),
                errors: vec![],
            },
        };
        assert!(err.to_string().contains("42"));
        assert_eq!(err.statistics().map(|s| s.error_count), Some(1));
    }

    #[test]
    fn test_preflight_details_are_itemized() {
        let err = PreflightError::UnknownHeaders {
            missing: vec!["Dest IP".into(), "Dst Port".into()],
            available: vec!["msisdn".into()],
        };
        let details = err.details();
        assert_eq!(details.len(), 2);
        assert!(details[0].contains("Dest IP"));
        assert!(err.to_string().contains("Dst Port"));
    }

    #[test]
    fn test_csv_error_into_preflight() {
        let err: PreflightError = CsvError::NoHeaders.into();
        assert!(err.to_string().contains("No headers"));
    }
}
