//! Transformation module.
//!
//! This module turns raw rows into canonical records:
//! - Record: per-row extract, validate, normalize
//! - Normalize: timestamp, duration, port and service rules
//! - Stats: run counters and rejection sample
//! - Pipeline: staged streaming run for one file
//! - Preflight: process-boundary checks

pub mod ids;
pub mod normalize;
pub mod pipeline;
pub mod preflight;
pub mod record;
pub mod stats;

pub use ids::{Clock, FixedClock, RandomSuffix, SequentialSuffix, SuffixSource, SystemClock};
pub use pipeline::{process_file, run_pipeline, PipelineOptions, DEFAULT_CHANNEL_CAPACITY};
pub use preflight::{preflight, resolve_upload, sweep_uploads, PreflightReport, UploadedFile};
pub use record::{RecordOutcome, RecordTransformer, RejectedRecord};
pub use stats::{RunStatistics, StatisticsSnapshot};
