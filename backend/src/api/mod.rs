//! HTTP API module.
//!
//! This module provides the HTTP server, its payload types and the log
//! stream that background jobs report on.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::{JobLog, LogEntry, LogLevel, LOG_BROADCASTER};
pub use server::{router, start_server, AppState};
pub use types::{analyze, AnalyzeResponse, ProcessRequest, ProcessResponse, TemplateMatch};
