//! Process-wide log sink with size-based rotation.
//!
//! Records are formatted as `[ISO-timestamp] [LEVEL] [component] message
//! {meta}` and appended to `logs/search-mcp.log` inside the bound index
//! directory, rotating at 10 MB with three files retained
//! (`search-mcp.log`, `.1`, `.2`). Until an index directory is bound the
//! sink writes to stderr, so early startup and CLI errors are never lost.
//!
//! File I/O runs on `tracing-appender`'s non-blocking worker thread:
//! emitting a record from an async task never blocks on the filesystem.
//! [`init`] hands back the `WorkerGuard` that flushes the worker; hold
//! it for the life of the process.

use std::{
  fs::{File, OpenOptions},
  io::{self, Write},
  path::{Path, PathBuf},
  sync::{Mutex, OnceLock, RwLock},
};

use chrono::{SecondsFormat, Utc};
use tracing::{Event, Subscriber};
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
  EnvFilter,
  fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
  registry::LookupSpan,
};

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const MAX_BACKUPS: usize = 2;
pub const LOG_FILE_NAME: &str = "search-mcp.log";

// ============================================================================
// Rotating File Writer
// ============================================================================

/// Append-only file writer that rotates when the active file exceeds a
/// size ceiling. Rotation shifts `log -> log.1 -> log.2`, dropping the
/// oldest.
pub struct RotatingFileWriter {
  path: PathBuf,
  max_bytes: u64,
  max_backups: usize,
  file: File,
  written: u64,
}

impl RotatingFileWriter {
  pub fn open(path: PathBuf, max_bytes: u64, max_backups: usize) -> io::Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let written = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok(Self {
      path,
      max_bytes,
      max_backups,
      file,
      written,
    })
  }

  fn rotate(&mut self) -> io::Result<()> {
    self.file.flush()?;

    // Shift backups from oldest to newest: .1 -> .2, log -> .1
    for i in (1..=self.max_backups).rev() {
      let from = if i == 1 {
        self.path.clone()
      } else {
        backup_path(&self.path, i - 1)
      };
      let to = backup_path(&self.path, i);
      if from.exists() {
        std::fs::rename(&from, &to)?;
      }
    }

    self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    self.written = 0;
    Ok(())
  }
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
  let mut os = path.as_os_str().to_os_string();
  os.push(format!(".{n}"));
  PathBuf::from(os)
}

impl Write for RotatingFileWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    if self.written + buf.len() as u64 > self.max_bytes {
      self.rotate()?;
    }
    let n = self.file.write(buf)?;
    self.written += n as u64;
    Ok(n)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.file.flush()
  }
}

// ============================================================================
// Global Sink
// ============================================================================

static SINK: RwLock<Option<Mutex<RotatingFileWriter>>> = RwLock::new(None);
static INIT: OnceLock<()> = OnceLock::new();

/// Bind the sink to an index directory. Subsequent records go to
/// `<index_dir>/logs/search-mcp.log`; stderr is used until this is called.
pub fn bind_index_dir(index_dir: &Path) -> io::Result<()> {
  let path = index_dir.join("logs").join(LOG_FILE_NAME);
  let writer = RotatingFileWriter::open(path, MAX_LOG_BYTES, MAX_BACKUPS)?;
  *SINK.write().expect("log sink poisoned") = Some(Mutex::new(writer));
  Ok(())
}

/// Detach the sink from any index directory (back to stderr).
pub fn unbind() {
  *SINK.write().expect("log sink poisoned") = None;
}

struct SinkWriter;

impl Write for SinkWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let guard = SINK.read().expect("log sink poisoned");
    match guard.as_ref() {
      Some(writer) => writer.lock().expect("log writer poisoned").write(buf),
      None => io::stderr().write(buf),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    let guard = SINK.read().expect("log sink poisoned");
    match guard.as_ref() {
      Some(writer) => writer.lock().expect("log writer poisoned").flush(),
      None => io::stderr().flush(),
    }
  }
}

// ============================================================================
// Record Format
// ============================================================================

/// Formats events as `[ISO-timestamp] [LEVEL] [component] message {meta}`.
struct RecordFormat;

#[derive(Default)]
struct FieldSplitter {
  message: String,
  meta: Vec<String>,
}

impl tracing::field::Visit for FieldSplitter {
  fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
    if field.name() == "message" {
      self.message = format!("{value:?}");
    } else {
      self.meta.push(format!("{}={:?}", field.name(), value));
    }
  }

  fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
    if field.name() == "message" {
      self.message = value.to_string();
    } else {
      self.meta.push(format!("{}={value}", field.name()));
    }
  }
}

impl<S, N> FormatEvent<S, N> for RecordFormat
where
  S: Subscriber + for<'a> LookupSpan<'a>,
  N: for<'a> FormatFields<'a> + 'static,
{
  fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let meta = event.metadata();

    let mut fields = FieldSplitter::default();
    event.record(&mut fields);

    write!(writer, "[{timestamp}] [{}] [{}] {}", meta.level(), meta.target(), fields.message)?;
    if !fields.meta.is_empty() {
      write!(writer, " {{{}}}", fields.meta.join(", "))?;
    }
    writeln!(writer)
  }
}

/// Install the global subscriber writing through the process-wide sink.
///
/// Returns the non-blocking worker's guard on first use; the caller must
/// keep it alive so buffered records flush on shutdown. Idempotent:
/// repeated calls are no-ops returning None, so tests and embedding
/// hosts can call it freely.
pub fn init() -> Option<WorkerGuard> {
  let mut guard = None;
  INIT.get_or_init(|| {
    let (writer, worker_guard) = tracing_appender::non_blocking(SinkWriter);
    let filter = EnvFilter::builder()
      .with_default_directive(tracing::Level::INFO.into())
      .from_env_lossy();

    let _ = tracing_subscriber::fmt()
      .event_format(RecordFormat)
      .with_env_filter(filter)
      .with_writer(writer)
      .with_ansi(false)
      .try_init();
    guard = Some(worker_guard);
  });
  guard
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rotation_shifts_backups() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("search-mcp.log");
    let mut writer = RotatingFileWriter::open(path.clone(), 64, 2).unwrap();

    // Each record is 32 bytes; the third write forces a rotation.
    let record = [b'a'; 32];
    writer.write_all(&record).unwrap();
    writer.write_all(&record).unwrap();
    writer.write_all(&record).unwrap();
    writer.flush().unwrap();

    assert!(path.exists());
    assert!(dir.path().join("search-mcp.log.1").exists());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 32);
  }

  #[test]
  fn test_rotation_drops_oldest() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("search-mcp.log");
    let mut writer = RotatingFileWriter::open(path.clone(), 16, 2).unwrap();

    for fill in [b'a', b'b', b'c', b'd'] {
      writer.write_all(&[fill; 16]).unwrap();
    }
    writer.flush().unwrap();

    // Only the active file plus two backups survive.
    assert!(path.exists());
    assert!(dir.path().join("search-mcp.log.1").exists());
    assert!(dir.path().join("search-mcp.log.2").exists());
    assert!(!dir.path().join("search-mcp.log.3").exists());
  }

  #[test]
  fn test_append_resumes_existing_size() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("search-mcp.log");
    std::fs::write(&path, b"previous-run\n").unwrap();

    let writer = RotatingFileWriter::open(path, 1024, 2).unwrap();
    assert_eq!(writer.written, 13);
  }
}
