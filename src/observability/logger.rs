//! Structured JSON logger for litedoc
//!
//! One JSON object per line: `event`, then `severity`, then the caller's
//! fields sorted by key. ERROR and FATAL go to stderr, everything else to
//! stdout. Lines below the process-wide threshold (WARN unless configured)
//! are dropped before they are rendered.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::{Map, Value};

static THRESHOLD: AtomicU8 = AtomicU8::new(Severity::Warn as u8);

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-query and per-document detail
    Trace = 0,
    /// Lifecycle of clients, databases and collections
    Info = 1,
    /// Data the store accepted but cannot fully serve
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

const LEVELS: [Severity; 5] = [
    Severity::Trace,
    Severity::Info,
    Severity::Warn,
    Severity::Error,
    Severity::Fatal,
];

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Parses a configured level name, case-insensitive
    pub fn parse(name: &str) -> Option<Self> {
        LEVELS
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(name.trim()))
    }

    fn to_stderr(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide JSON line logger
pub struct Logger;

impl Logger {
    /// Sets the process-wide minimum severity
    pub fn set_min_severity(severity: Severity) {
        THRESHOLD.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        let raw = THRESHOLD.load(Ordering::Relaxed) as usize;
        LEVELS[raw.min(LEVELS.len() - 1)]
    }

    /// Returns true if a line at `severity` would be written
    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    /// Writes one line if `severity` passes the threshold
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = Self::render(severity, event, fields);
        if severity.to_stderr() {
            Self::emit(&mut io::stderr().lock(), &line);
        } else {
            Self::emit(&mut io::stdout().lock(), &line);
        }
    }

    /// Renders a line without writing it; always newline-terminated
    pub fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);

        let mut line = Map::new();
        line.insert("event".into(), Value::from(event));
        line.insert("severity".into(), Value::from(severity.as_str()));
        for (key, value) in sorted {
            line.entry(key.to_string()).or_insert_with(|| Value::from(*value));
        }

        let mut text = Value::Object(line).to_string();
        text.push('\n');
        text
    }

    // Logging must never fail the operation being logged
    fn emit<W: Write>(writer: &mut W, line: &str) {
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(LEVELS.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("warn"), Some(Severity::Warn));
        assert_eq!(Severity::parse(" INFO "), Some(Severity::Info));
        assert_eq!(Severity::parse("verbose"), None);
    }

    #[test]
    fn test_default_threshold_drops_trace() {
        assert!(Logger::enabled(Severity::Error));
        assert!(!Logger::enabled(Severity::Trace));
    }

    #[test]
    fn test_render_json_line() {
        let line = Logger::render(Severity::Info, "COLLECTION_READY", &[("collection", "users")]);

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "COLLECTION_READY");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["collection"], "users");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_render_sorts_fields() {
        let a = Logger::render(Severity::Warn, "X", &[("zebra", "1"), ("apple", "2"), ("mango", "3")]);
        let b = Logger::render(Severity::Warn, "X", &[("mango", "3"), ("zebra", "1"), ("apple", "2")]);
        assert_eq!(a, b);
        assert!(a.starts_with(r#"{"event":"X","severity":"WARN","apple":"2","mango":"3","zebra":"1"}"#));
    }

    #[test]
    fn test_render_cannot_shadow_event() {
        let line = Logger::render(Severity::Warn, "REAL", &[("event", "FAKE")]);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "REAL");
    }

    #[test]
    fn test_render_escapes_values() {
        let line = Logger::render(Severity::Info, "X", &[("message", "hello \"world\"\nline2")]);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["message"], "hello \"world\"\nline2");
    }
}
