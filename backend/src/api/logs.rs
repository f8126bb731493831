//! Real-time log streaming via Server-Sent Events (SSE).
//!
//! Pipeline progress goes through a global broadcast channel that SSE
//! clients subscribe to. Every entry is also emitted as a `tracing` event,
//! so the CLI sees the same messages on its subscriber.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered entries per subscriber before lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Log level for client display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Job the entry belongs to, for background processing runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl LogEntry {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self { level, message: message.into(), job_id: None }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn for_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts log entries to all connected SSE clients
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Send a log entry to all subscribers
    pub fn log(&self, entry: LogEntry) {
        let job = entry.job_id.as_deref().unwrap_or("-");
        match entry.level {
            LogLevel::Info => tracing::info!(job, "{}", entry.message),
            LogLevel::Success => tracing::info!(job, success = true, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(job, "{}", entry.message),
            LogLevel::Error => tracing::error!(job, "{}", entry.message),
        }

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Logger bound to one job id
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    job_id: Option<String>,
}

impl JobLog {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self { job_id: Some(job_id.into()) }
    }

    fn emit(&self, entry: LogEntry) {
        match &self.job_id {
            Some(id) => LOG_BROADCASTER.log(entry.for_job(id.clone())),
            None => LOG_BROADCASTER.log(entry),
        }
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.emit(LogEntry::info(msg));
    }

    pub fn success(&self, msg: impl Into<String>) {
        self.emit(LogEntry::success(msg));
    }

    pub fn warning(&self, msg: impl Into<String>) {
        self.emit(LogEntry::warning(msg));
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.emit(LogEntry::error(msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization() {
        let value = serde_json::to_value(LogEntry::warning("careful").for_job("job-1")).unwrap();
        assert_eq!(value["level"], "warning");
        assert_eq!(value["jobId"], "job-1");

        let value = serde_json::to_value(LogEntry::info("plain")).unwrap();
        assert!(value.get("jobId").is_none());
    }

    #[tokio::test]
    async fn test_subscribers_receive_entries() {
        let broadcaster = LogBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.log(LogEntry::success("done"));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Success);
        assert_eq!(entry.message, "done");
    }
}
