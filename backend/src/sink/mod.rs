//! Bulk-load sinks.
//!
//! A sink consumes encoded lines (see [`crate::encoder`]) in order. Writes
//! are awaited, so a slow destination pushes back on the pipeline through
//! its bounded channels.
//!
//! - [`FileSink`] - appends to a file
//! - [`CommandSink`] - streams into the stdin of a load command, e.g.
//!   `psql -c "\copy sessions FROM STDIN WITH (FORMAT csv)"`
//! - [`MemorySink`] - shared in-memory buffer

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::encoder;
use crate::error::{SinkError, SinkResult};

/// Line-oriented bulk-load destination.
#[async_trait]
pub trait RecordSink: Send {
    /// Write one newline-terminated line.
    async fn write_line(&mut self, line: &str) -> SinkResult<()>;

    /// Flush and close. Further writes fail with [`SinkError::Closed`].
    async fn finish(&mut self) -> SinkResult<()>;
}

#[async_trait]
impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    async fn write_line(&mut self, line: &str) -> SinkResult<()> {
        (**self).write_line(line).await
    }

    async fn finish(&mut self) -> SinkResult<()> {
        (**self).finish().await
    }
}

/// Open the configured destination: the load command when one is set,
/// otherwise an append-only file.
pub async fn open_sink(
    command: Option<&str>,
    output: &Path,
    write_header: bool,
) -> SinkResult<Box<dyn RecordSink>> {
    match command {
        Some(command) => Ok(Box::new(CommandSink::spawn(command)?)),
        None => Ok(Box::new(FileSink::open(output, write_header).await?)),
    }
}

// =============================================================================
// File Sink
// =============================================================================

/// Appends lines to a file.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<tokio::fs::File>>,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    ///
    /// With `write_header`, the column header line is written first when the
    /// file is new or empty.
    pub async fn open<P: AsRef<Path>>(path: P, write_header: bool) -> SinkResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let is_empty = file.metadata().await?.len() == 0;
        let mut writer = BufWriter::new(file);

        if write_header && is_empty {
            writer.write_all(encoder::header_line().as_bytes()).await?;
        }

        debug!(path = %path.display(), "opened file sink");
        Ok(Self { path, writer: Some(writer) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for FileSink {
    async fn write_line(&mut self, line: &str) -> SinkResult<()> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn finish(&mut self) -> SinkResult<()> {
        let mut writer = self.writer.take().ok_or(SinkError::Closed)?;
        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(())
    }
}

// =============================================================================
// Command Sink
// =============================================================================

/// Streams lines to a shell command's stdin.
///
/// The command's exit status is checked on [`RecordSink::finish`]; a non-zero
/// exit is a [`SinkError::CommandFailed`] carrying its stderr. Stderr is
/// drained while rows stream so a chatty loader cannot stall on a full pipe.
pub struct CommandSink {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
}

impl CommandSink {
    pub fn spawn(command: &str) -> SinkResult<Self> {
        let mut child = shell(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SinkError::SpawnFailed {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| SinkError::SpawnFailed {
            command: command.to_string(),
            message: "stdin not captured".to_string(),
        })?;

        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

        debug!(command = %command, "spawned load command");
        Ok(Self {
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            stderr,
        })
    }

    /// Reap the child and turn a bad exit into an error.
    async fn wait(&mut self) -> SinkResult<()> {
        let mut child = self.child.take().ok_or(SinkError::Closed)?;
        let status = child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        if status.success() {
            Ok(())
        } else {
            Err(SinkError::CommandFailed {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

/// Collect everything the command writes to stderr.
async fn drain(mut pipe: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "load command stderr closed early");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[async_trait]
impl RecordSink for CommandSink {
    async fn write_line(&mut self, line: &str) -> SinkResult<()> {
        let stdin = self.stdin.as_mut().ok_or(SinkError::Closed)?;
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            // A broken pipe means the command died; report its exit instead.
            self.stdin = None;
            self.wait().await?;
            return Err(e.into());
        }
        Ok(())
    }

    async fn finish(&mut self) -> SinkResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await?;
            stdin.shutdown().await?;
        }
        self.wait().await
    }
}

// =============================================================================
// Memory Sink
// =============================================================================

/// Collects lines in a shared buffer.
///
/// Clones share the same buffer, so a clone kept outside the pipeline can
/// inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
    finished: Arc<Mutex<bool>>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes fail once `n` lines have been accepted.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.lock().map(|f| *f).unwrap_or(false)
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write_line(&mut self, line: &str) -> SinkResult<()> {
        if self.is_finished() {
            return Err(SinkError::Closed);
        }
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| SinkError::IoError(std::io::Error::other("memory sink poisoned")))?;
        if self.fail_after.is_some_and(|n| lines.len() >= n) {
            return Err(SinkError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "destination closed",
            )));
        }
        lines.push(line.to_string());
        Ok(())
    }

    async fn finish(&mut self) -> SinkResult<()> {
        let mut finished = self
            .finished
            .lock()
            .map_err(|_| SinkError::IoError(std::io::Error::other("memory sink poisoned")))?;
        if *finished {
            return Err(SinkError::Closed);
        }
        *finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("records.csv");

        let mut sink = FileSink::open(&path, true).await.unwrap();
        sink.write_line("a\n").await.unwrap();
        sink.finish().await.unwrap();
        assert!(matches!(sink.write_line("late\n").await, Err(SinkError::Closed)));

        let mut sink = FileSink::open(&path, true).await.unwrap();
        sink.write_line("b\n").await.unwrap();
        sink.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}a\nb\n", encoder::header_line()));
    }

    #[tokio::test]
    async fn test_file_sink_without_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.csv");

        let mut sink = FileSink::open(&path, false).await.unwrap();
        sink.write_line("x\n").await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\n");
    }

    #[tokio::test]
    async fn test_open_sink_defaults_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.csv");

        let mut sink = open_sink(None, &path, false).await.unwrap();
        sink.write_line("z\n").await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "z\n");
    }

    #[tokio::test]
    async fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let mut writer: Box<dyn RecordSink> = Box::new(sink.clone());
        writer.write_line("one\n").await.unwrap();
        writer.finish().await.unwrap();

        assert_eq!(sink.lines(), vec!["one\n".to_string()]);
        assert!(sink.is_finished());
    }

    #[tokio::test]
    async fn test_memory_sink_failure() {
        let mut sink = MemorySink::failing_after(1);
        sink.write_line("ok\n").await.unwrap();
        assert!(matches!(sink.write_line("no\n").await, Err(SinkError::IoError(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sink_streams_to_stdin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loaded.csv");
        let command = format!("cat > '{}'", path.display());

        let mut sink = CommandSink::spawn(&command).unwrap();
        sink.write_line("a,1\n").await.unwrap();
        sink.write_line("b,2\n").await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,1\nb,2\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sink_nonzero_exit() {
        let mut sink = CommandSink::spawn("cat > /dev/null; echo boom >&2; exit 3").unwrap();
        sink.write_line("a\n").await.unwrap();

        match sink.finish().await {
            Err(SinkError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("expected CommandFailed, got {:?}", other.err()),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sink_survives_noisy_stderr() {
        // Far more stderr than a pipe buffer holds, written before stdin is read
        let mut sink = CommandSink::spawn("head -c 200000 /dev/zero >&2; cat > /dev/null").unwrap();
        let line = format!("{}\n", "x".repeat(1023));

        let run = async {
            for _ in 0..500 {
                sink.write_line(&line).await?;
            }
            sink.finish().await
        };
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), run).await;
        assert!(matches!(result, Ok(Ok(()))), "load command stalled: {:?}", result.map(|r| r.err()));
    }
}
