//! Structured logging of store operations
//!
//! Every statement execution, transaction step and batch is timed and reported
//! as a `tracing` event on the `fty_common_db` target: `debug` on success,
//! `warn` on failure. Failures are tagged with an [`ErrorClass`] so logs can be
//! filtered by cause; the class never changes the error returned to callers.
//!
//! # Event Fields
//!
//! - `op`: "prepare", "exec", "select", "select_row", "batch", "begin", "commit", "rollback"
//! - `db.system`: "sqlite"
//! - `db.statement`: SQL text (optional, truncated to `max_sql_length`)
//! - `rows`, `duration_us` on success
//! - `error.class`, `error` on failure
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use fty_common_db::tracing_support::{QuerySpan, SpanOperation};
//!
//! let mut span = QuerySpan::new(SpanOperation::Select).with_sql("SELECT 1");
//! span.record_success(1, Duration::from_micros(120));
//! assert_eq!(span.summary(), "op=select duration=120µs rows=1");
//! ```

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Target used for every event emitted by this crate
pub const LOG_TARGET: &str = "fty_common_db";

/// The operation an event reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanOperation {
    /// Compiling a statement
    Prepare,
    /// Executing a modifying statement
    Execute,
    /// Fetching all rows
    Select,
    /// Fetching exactly one row
    SelectRow,
    /// Running a multi-statement script
    Batch,
    /// Opening a transaction
    Begin,
    /// Committing a transaction
    Commit,
    /// Rolling back a transaction
    Rollback,
}

impl SpanOperation {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanOperation::Prepare => "prepare",
            SpanOperation::Execute => "exec",
            SpanOperation::Select => "select",
            SpanOperation::SelectRow => "select_row",
            SpanOperation::Batch => "batch",
            SpanOperation::Begin => "begin",
            SpanOperation::Commit => "commit",
            SpanOperation::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for SpanOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse cause of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A constraint rejected the write
    Constraint,
    /// Malformed SQL or unknown table/column
    Syntax,
    /// The database was locked by another writer
    Busy,
    /// File system or open failure
    Io,
    /// A single-row query found nothing
    NotFound,
    /// Anything else
    Unknown,
}

impl ErrorClass {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Constraint => "constraint",
            ErrorClass::Syntax => "syntax",
            ErrorClass::Busy => "busy",
            ErrorClass::Io => "io",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Unknown => "unknown",
        }
    }

    /// Classify a crate error
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::NotFound(_) => ErrorClass::NotFound,
            Error::Database(message) => Self::from_error_message(message),
        }
    }

    /// Classify an error from the store's message
    pub fn from_error_message(message: &str) -> Self {
        let msg_lower = message.to_lowercase();

        if msg_lower.contains("constraint") || msg_lower.contains("unique") {
            ErrorClass::Constraint
        } else if msg_lower.contains("syntax")
            || msg_lower.contains("no such")
            || msg_lower.contains("incomplete input")
        {
            ErrorClass::Syntax
        } else if msg_lower.contains("locked") || msg_lower.contains("busy") {
            ErrorClass::Busy
        } else if msg_lower.contains("unable to open")
            || msg_lower.contains("disk")
            || msg_lower.contains("i/o")
            || msg_lower.contains("readonly")
        {
            ErrorClass::Io
        } else {
            ErrorClass::Unknown
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for query logging
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to include SQL statements in events
    pub include_sql: bool,
    /// Maximum SQL length to include in events
    pub max_sql_length: usize,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            include_sql: true,
            max_sql_length: 1000,
        }
    }
}

impl TracingConfig {
    /// Configuration that never records SQL text
    pub fn without_sql() -> Self {
        Self {
            include_sql: false,
            ..Self::default()
        }
    }

    /// The SQL text as it should appear in events, if at all
    pub fn render_sql(&self, sql: &str) -> Option<String> {
        if !self.include_sql {
            return None;
        }
        if sql.len() <= self.max_sql_length {
            return Some(sql.to_string());
        }
        let mut end = self.max_sql_length;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        Some(format!("{}...", &sql[..end]))
    }
}

/// Metadata for one reported operation
#[derive(Debug, Clone)]
pub struct QuerySpan {
    /// The operation type
    pub operation: SpanOperation,
    /// SQL statement (if captured)
    pub sql: Option<String>,
    /// Rows affected or returned
    pub rows: Option<usize>,
    /// Execution duration
    pub duration: Option<Duration>,
    /// Error class (if failed)
    pub error_class: Option<ErrorClass>,
    /// Error message (if failed)
    pub error_message: Option<String>,
}

impl QuerySpan {
    /// Create a new span for an operation
    pub fn new(operation: SpanOperation) -> Self {
        Self {
            operation,
            sql: None,
            rows: None,
            duration: None,
            error_class: None,
            error_message: None,
        }
    }

    /// Set the SQL statement
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Record a successful execution
    pub fn record_success(&mut self, rows: usize, duration: Duration) {
        self.rows = Some(rows);
        self.duration = Some(duration);
    }

    /// Record an error
    pub fn record_error(&mut self, error_class: ErrorClass, message: impl Into<String>) {
        self.error_class = Some(error_class);
        self.error_message = Some(message.into());
    }

    /// Check if the span represents a failure
    pub fn is_error(&self) -> bool {
        self.error_class.is_some()
    }

    /// Get a summary string for the span
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("op={}", self.operation)];

        if let Some(ref duration) = self.duration {
            parts.push(format!("duration={:?}", duration));
        }

        if let Some(rows) = self.rows {
            parts.push(format!("rows={}", rows));
        }

        if let Some(ref error) = self.error_class {
            parts.push(format!("error={}", error));
        }

        parts.join(" ")
    }

    /// Write the span out as a `tracing` event
    pub fn emit(&self) {
        let sql = self.sql.as_deref().unwrap_or_default();
        let duration_us = self.duration.map_or(0, |d| d.as_micros() as u64);

        match (self.error_class, &self.error_message) {
            (Some(ErrorClass::NotFound), _) => tracing::debug!(
                target: LOG_TARGET,
                op = self.operation.as_str(),
                db.system = "sqlite",
                db.statement = sql,
                duration_us,
                "no rows"
            ),
            (Some(class), message) => tracing::warn!(
                target: LOG_TARGET,
                op = self.operation.as_str(),
                db.system = "sqlite",
                db.statement = sql,
                duration_us,
                error.class = class.as_str(),
                error = message.as_deref().unwrap_or_default(),
                "query failed"
            ),
            (None, _) => tracing::debug!(
                target: LOG_TARGET,
                op = self.operation.as_str(),
                db.system = "sqlite",
                db.statement = sql,
                duration_us,
                rows = self.rows.unwrap_or_default(),
                "query finished"
            ),
        }
    }
}

/// Helper to time an operation and report it once it completes
pub struct SpanTimer {
    start: Instant,
    span: QuerySpan,
}

impl SpanTimer {
    /// Start timing an operation
    pub fn start(operation: SpanOperation, config: &TracingConfig, sql: &str) -> Self {
        let mut span = QuerySpan::new(operation);
        span.sql = config.render_sql(sql);
        Self {
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed duration so far
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record the outcome, emit the event and hand the outcome back
    ///
    /// `rows` extracts the row count reported for a successful outcome.
    pub fn finish<T>(self, outcome: Result<T>, rows: impl FnOnce(&T) -> usize) -> Result<T> {
        self.into_span(&outcome, rows).emit();
        outcome
    }

    /// Record the outcome without emitting, returning the span
    pub fn into_span<T>(mut self, outcome: &Result<T>, rows: impl FnOnce(&T) -> usize) -> QuerySpan {
        let duration = self.start.elapsed();
        match outcome {
            Ok(value) => self.span.record_success(rows(value), duration),
            Err(err) => {
                self.span.duration = Some(duration);
                self.span
                    .record_error(ErrorClass::from_error(err), err.message());
            }
        }
        self.span
    }
}
