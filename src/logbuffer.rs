//! Deferred, serializable log buffers for worker tasks.
//!
//! A task records `(level, template, args)` entries while it runs instead of
//! emitting them, and hands the buffer back with its result. After the step
//! barrier the orchestrator replays every buffer, in station order, into a
//! real [`LogSink`]. Each replayed message is prefixed with `[owner_id]` so
//! that output from parallel tasks stays attributable.
//!
//! ```
//! use ghcnh_curator::logbuffer::{DeferredLogBuffer, LogLevel, LogSink};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Capture(Mutex<Vec<String>>);
//! impl LogSink for Capture {
//!     fn emit(&self, _level: LogLevel, message: &str) {
//!         self.0.lock().unwrap().push(message.to_string());
//!     }
//! }
//!
//! let mut buffer = DeferredLogBuffer::new("AB0001");
//! buffer.info("read {} rows from {}", &[&24, &"2020"]);
//!
//! // Cross the worker boundary as a plain tuple, then rebuild
//! let (owner, records) = buffer.into_parts();
//! let rebuilt = DeferredLogBuffer::from_parts(owner, records);
//!
//! let sink = Capture::default();
//! rebuilt.flush(&sink);
//! assert_eq!(sink.0.lock().unwrap()[0], "[AB0001] read 24 rows from 2020");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five conventional severities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// One deferred entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub template: String,
    pub args: Vec<String>,
}

impl LogRecord {
    /// Substitute `{}` placeholders left to right; surplus args are appended
    pub fn render(&self) -> String {
        let mut rendered = String::with_capacity(self.template.len() + 16 * self.args.len());
        let mut args = self.args.iter();
        let mut pieces = self.template.split("{}").peekable();

        while let Some(piece) = pieces.next() {
            rendered.push_str(piece);
            if pieces.peek().is_some() {
                match args.next() {
                    Some(arg) => rendered.push_str(arg),
                    None => rendered.push_str("{}"),
                }
            }
        }
        for extra in args {
            rendered.push(' ');
            rendered.push_str(extra);
        }
        rendered
    }
}

/// Destination of flushed records
pub trait LogSink {
    fn emit(&self, level: LogLevel, message: &str);
}

/// Sink re-emitting through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Critical => tracing::error!(critical = true, "{}", message),
        }
    }
}

/// Ordered per-task log buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredLogBuffer {
    owner_id: String,
    records: Vec<LogRecord>,
}

impl DeferredLogBuffer {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            records: Vec::new(),
        }
    }

    /// Rebuild a buffer from its transport tuple
    pub fn from_parts(owner_id: String, records: Vec<LogRecord>) -> Self {
        Self { owner_id, records }
    }

    /// Reduce to the transport tuple
    pub fn into_parts(self) -> (String, Vec<LogRecord>) {
        (self.owner_id, self.records)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest severity recorded so far
    pub fn max_level(&self) -> Option<LogLevel> {
        self.records.iter().map(|r| r.level).max()
    }

    pub fn log(&mut self, level: LogLevel, template: impl Into<String>, args: &[&dyn fmt::Display]) {
        self.records.push(LogRecord {
            level,
            template: template.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        });
    }

    pub fn debug(&mut self, template: impl Into<String>, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Debug, template, args);
    }

    pub fn info(&mut self, template: impl Into<String>, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Info, template, args);
    }

    pub fn warning(&mut self, template: impl Into<String>, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Warning, template, args);
    }

    pub fn error(&mut self, template: impl Into<String>, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Error, template, args);
    }

    pub fn critical(&mut self, template: impl Into<String>, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Critical, template, args);
    }

    /// Drain every record, oldest first, into `sink`; the buffer is consumed
    pub fn flush(self, sink: &dyn LogSink) {
        for record in self.records {
            sink.emit(
                record.level,
                &format!("[{}] {}", self.owner_id, record.render()),
            );
        }
    }
}
