//! Parse outcome reporting.
//!
//! [`super::parse_source`] reports each call to an optional [`IngestionObserver`]. Failures
//! are classified by [`IngestionSeverity`] and forwarded to `on_alert` once they reach
//! the configured threshold.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{ErrorKind, IngestionError};

use super::unified::IngestionFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionSeverity {
    Info,
    Warning,
    /// The input or schema was rejected.
    Error,
    /// The input could not be read, or the decode pool failed.
    Critical,
}

impl IngestionSeverity {
    pub fn for_error(error: &IngestionError) -> Self {
        match error.kind() {
            ErrorKind::Io | ErrorKind::Execution => Self::Critical,
            ErrorKind::Format | ErrorKind::CellAccess | ErrorKind::Decode | ErrorKind::Schema => Self::Error,
        }
    }
}

/// What was parsed.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// Caller-supplied label for the input, usually a file name.
    pub source: String,
    /// `None` when the format was not set and could not be inferred from `source`.
    pub format: Option<IngestionFormat>,
    pub schema_type: String,
    pub schema_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionStats {
    /// Records appended to the output by this call.
    pub rows: usize,
    pub sheets: usize,
}

/// Receives parse outcomes. Every method has an empty default.
pub trait IngestionObserver: Send + Sync {
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called after `on_failure` when `severity` reaches the alert threshold.
    fn on_alert(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}
}

/// Fans every callback out to its children, in insertion order.
#[derive(Default, Clone)]
pub struct CompositeObserver {
    children: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    pub fn new(children: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { children }
    }

    pub fn with(mut self, child: Arc<dyn IngestionObserver>) -> Self {
        self.children.push(child);
        self
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeObserver({} children)", self.children.len())
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.children.iter().for_each(|c| c.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.children.iter().for_each(|c| c.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.children.iter().for_each(|c| c.on_alert(ctx, severity, error));
    }
}

/// Forwards parse outcomes to `tracing`.
///
/// Successes log at `info`, failures at `warn` and alerts at `error`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            source = %ctx.source,
            format = ?ctx.format,
            schema_type = %ctx.schema_type,
            rows = stats.rows,
            sheets = stats.sheets,
            "parse succeeded"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        tracing::warn!(source = %ctx.source, format = ?ctx.format, ?severity, %error, "parse failed");
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        tracing::error!(source = %ctx.source, format = ?ctx.format, ?severity, %error, "parse failure alert");
    }
}

/// One line of a [`FileObserver`] log.
#[derive(Debug, Serialize)]
struct LogLine<'a> {
    ts: u64,
    event: &'static str,
    source: &'a str,
    format: &'static str,
    schema_type: &'a str,
    schema_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<IngestionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<IngestionSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> LogLine<'a> {
    fn new(event: &'static str, ctx: &'a IngestionContext) -> Self {
        Self {
            ts: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            event,
            source: &ctx.source,
            format: match ctx.format {
                Some(IngestionFormat::DelimitedText) => "delimited_text",
                Some(IngestionFormat::Workbook) => "workbook",
                None => "unknown",
            },
            schema_type: &ctx.schema_type,
            schema_version: &ctx.schema_version,
            stats: None,
            severity: None,
            error: None,
        }
    }

    fn failed(mut self, severity: IngestionSeverity, error: &IngestionError) -> Self {
        self.severity = Some(severity);
        self.error = Some(error.to_string());
        self
    }
}

/// Appends one JSON object per event to a local file.
///
/// Writes are best-effort: open and write failures are dropped.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, line: &LogLine<'_>) {
        let Ok(json) = serde_json::to_string(line) else {
            return;
        };
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{json}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        let mut line = LogLine::new("ok", ctx);
        line.stats = Some(stats);
        self.append(&line);
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append(&LogLine::new("fail", ctx).failed(severity, error));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append(&LogLine::new("alert", ctx).failed(severity, error));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{
        CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    };
    use crate::error::IngestionError;
    use crate::ingestion::IngestionFormat;

    fn ctx() -> IngestionContext {
        IngestionContext {
            source: "students.csv".to_string(),
            format: Some(IngestionFormat::DelimitedText),
            schema_type: "coords".to_string(),
            schema_version: "1.0".to_string(),
        }
    }

    #[test]
    fn io_failures_are_critical_and_input_failures_are_errors() {
        let io = IngestionError::from(std::io::Error::other("disk gone"));
        assert_eq!(IngestionSeverity::for_error(&io), IngestionSeverity::Critical);

        let decode = IngestionError::Decode {
            sheet: "default".to_string(),
            row: 2,
            message: "invalid type".to_string(),
        };
        assert_eq!(IngestionSeverity::for_error(&decode), IngestionSeverity::Error);
        assert!(IngestionSeverity::Critical > IngestionSeverity::Error);
    }

    #[test]
    fn file_observer_writes_json_lines() {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let path = std::env::temp_dir().join(format!("rust-sheet-ingest-observer-{nanos}.log"));

        let file = Arc::new(FileObserver::new(&path));
        let composite = CompositeObserver::default().with(file);
        composite.on_success(&ctx(), IngestionStats { rows: 4, sheets: 2 });
        composite.on_failure(
            &ctx(),
            IngestionSeverity::Error,
            &IngestionError::Format {
                message: "bad".to_string(),
            },
        );

        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "ok");
        assert_eq!(lines[0]["format"], "delimited_text");
        assert_eq!(lines[0]["stats"]["rows"], 4);
        assert_eq!(lines[1]["event"], "fail");
        assert_eq!(lines[1]["severity"], "error");
        assert_eq!(lines[1]["error"], "format error: bad");
    }
}
