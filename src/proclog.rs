//! Structured JSONL processing log.
//!
//! One line per event, written to `processing.log.jsonl` in the output
//! directory. Every record carries the trace ID of the document run it
//! belongs to. Logging is best effort; a write failure never fails the
//! pipeline.

use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Serialize)]
pub struct LogRecord<'a> {
    pub timestamp: String,
    pub trace_id: &'a str,
    pub level: LogLevel,
    pub component: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

pub struct ProcessingLog {
    file: Mutex<File>,
}

impl ProcessingLog {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PipelineError::Storage(format!("open processing log: {e}")))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(
        &self,
        trace_id: &str,
        level: LogLevel,
        component: &str,
        message: &str,
        error_code: Option<&str>,
        recovery_action: Option<&str>,
        context: Option<serde_json::Value>,
    ) {
        let record = LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            trace_id,
            level,
            component,
            message,
            error_code,
            recovery_action,
            context,
        };

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize processing log record");
                return;
            }
        };

        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(guard, "{line}") {
            warn!(error = %e, "failed to write processing log record");
        }
    }

    pub fn info(&self, trace_id: &str, component: &str, message: &str) {
        self.append(trace_id, LogLevel::Info, component, message, None, None, None);
    }

    pub fn warning(&self, trace_id: &str, component: &str, message: &str) {
        self.append(
            trace_id,
            LogLevel::Warning,
            component,
            message,
            None,
            None,
            None,
        );
    }

    pub fn error(
        &self,
        trace_id: &str,
        component: &str,
        message: &str,
        error_code: &str,
        recovery_action: &str,
    ) {
        self.append(
            trace_id,
            LogLevel::Error,
            component,
            message,
            Some(error_code),
            Some(recovery_action),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn appends_parseable_jsonl() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("processing.log.jsonl");
        let log = ProcessingLog::open(&path).unwrap();

        log.info("trace-1", "acquisition", "download complete");
        log.error(
            "trace-1",
            "render",
            "renderer returned HTTP 500",
            "render_error",
            "document marked failed",
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["trace_id"], "trace-1");
        assert_eq!(first["level"], "info");
        assert_eq!(first["component"], "acquisition");
        assert!(first.get("error_code").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["level"], "error");
        assert_eq!(second["error_code"], "render_error");
        assert_eq!(second["recovery_action"], "document marked failed");
    }

    #[test]
    fn reopening_appends_rather_than_truncates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("processing.log.jsonl");

        ProcessingLog::open(&path).unwrap().info("t", "pipeline", "run one");
        ProcessingLog::open(&path).unwrap().info("t", "pipeline", "run two");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
