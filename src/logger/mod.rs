//! Application log: every `tracing` event is printed by the fmt layer and
//! also kept in a bounded in-memory buffer that the front end can list.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Number of entries kept in memory
    pub logcount: usize,
    pub persist_to_file: bool,
    pub log_file: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            logcount: 1000,
            persist_to_file: false,
            log_file: "app.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub module: String,
    pub message: String,
    pub level: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5} {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.module,
            self.message
        )
    }
}

struct Inner {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    file: Option<File>,
}

/// Ring buffer of the most recent log entries, optionally mirrored to a file
/// as `LEVEL: message` lines. Clones share the same buffer.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl LogBuffer {
    pub fn new(settings: &LoggerSettings) -> Self {
        // The subscriber is not installed yet, so an unopenable log file
        // can only be reported on stderr.
        let file = settings.persist_to_file.then(|| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&settings.log_file)
                .inspect_err(|e| eprintln!("cannot open log file {}: {e}", settings.log_file))
                .ok()
        });
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: VecDeque::with_capacity(settings.logcount.min(4096)),
                capacity: settings.logcount,
                file: file.flatten(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, entry: LogEntry) {
        let mut inner = self.lock();
        if let Some(file) = inner.file.as_mut() {
            // Write failures cannot be reported through the log itself.
            let _ = writeln!(file, "{}: {}", entry.level, entry.message);
        }
        if inner.capacity == 0 {
            return;
        }
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    /// Snapshot, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for LogBuffer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        self.record(LogEntry {
            module: meta.target().to_string(),
            message: visitor.finish(),
            level: meta.level().to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Installs the global subscriber: `RUST_LOG` filter (default `info`),
/// console output, and the returned buffer.
pub fn init_logging(settings: &LoggerSettings) -> anyhow::Result<LogBuffer> {
    let buffer = LogBuffer::new(settings);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt_layer::layer())
        .with(buffer.clone())
        .try_init()?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;
    use tracing::{info, warn};

    fn settings(logcount: usize) -> LoggerSettings {
        LoggerSettings { logcount, ..Default::default() }
    }

    #[test]
    fn test_buffer_keeps_most_recent_entries() {
        let buffer = LogBuffer::new(&settings(2));
        let subscriber = tracing_subscriber::registry().with(buffer.clone());
        with_default(subscriber, || {
            info!("first");
            info!("second");
            warn!(request_id = 7, "third");
        });

        let entries = buffer.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "third request_id=7");
        assert_eq!(entries[1].level, "WARN");
        assert!(entries[1].module.ends_with("logger::tests"));
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let buffer = LogBuffer::new(&settings(0));
        with_default(tracing_subscriber::registry().with(buffer.clone()), || info!("dropped"));
        assert!(buffer.entries().is_empty());
    }

    #[test]
    fn test_persist_to_file_appends_level_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let buffer = LogBuffer::new(&LoggerSettings {
            logcount: 10,
            persist_to_file: true,
            log_file: path.to_string_lossy().into_owned(),
        });
        with_default(tracing_subscriber::registry().with(buffer.clone()), || {
            info!("connected");
            warn!("slow");
        });
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "INFO: connected\nWARN: slow\n");
    }

    #[test]
    fn test_log_file_is_opened_once_and_keeps_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "INFO: earlier run\n").unwrap();
        let buffer = LogBuffer::new(&LoggerSettings {
            logcount: 10,
            persist_to_file: true,
            log_file: path.to_string_lossy().into_owned(),
        });
        assert!(buffer.lock().file.is_some());

        // Removing the path after opening does not stop the open handle.
        let moved = dir.path().join("app.log.1");
        std::fs::rename(&path, &moved).unwrap();
        with_default(tracing_subscriber::registry().with(buffer.clone()), || info!("after rotate"));

        assert!(!path.exists());
        let written = std::fs::read_to_string(&moved).unwrap();
        assert_eq!(written, "INFO: earlier run\nINFO: after rotate\n");
    }

    #[test]
    fn test_defaults() {
        let defaults = LoggerSettings::default();
        assert_eq!(defaults.logcount, 1000);
        assert!(!defaults.persist_to_file);
        assert_eq!(defaults.log_file, "app.log");
    }
}
