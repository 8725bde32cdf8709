//! Structured log records and severity levels

use crate::Error;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log record, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    /// Padded to a fixed five columns so digest lines stay aligned.
    pub fn aligned_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "FATAL" => Ok(Level::Fatal),
            _ => Err(Error::UnknownLevel(s.to_string())),
        }
    }
}

/// A single structured log record.
///
/// Immutable once constructed; attribute order is preserved.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub time: DateTime<Local>,
    pub level: Level,
    pub message: String,
    pub attrs: Vec<(String, String)>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            time: Local::now(),
            level,
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    /// Render one human-readable digest line:
    /// `LEVEL[2026-01-02 15:04:05.99] message    key=value`
    pub fn render_line(&self) -> String {
        // chrono has no two-digit fractional specifier, so the centiseconds
        // are appended by hand.
        let centis = (self.time.timestamp_subsec_millis() / 10).min(99);
        let mut line = format!(
            "{}[{}.{centis:02}] {:<40}",
            self.level.aligned_str(),
            self.time.format("%Y-%m-%d %H:%M:%S"),
            self.message,
        );
        for (key, value) in &self.attrs {
            line.push('\t');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_level_round_trip() {
        for level in [
            Level::Trace,
            Level::Debug,
            Level::Info,
            Level::Warn,
            Level::Error,
            Level::Fatal,
        ] {
            assert_eq!(level.as_str().parse::<Level>().unwrap(), level);
        }
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warn);
        assert!("VERBOSE".parse::<Level>().is_err());
    }

    #[test]
    fn test_render_line_timestamp_fraction() {
        use chrono::{TimeZone, Timelike};

        let mut record = LogRecord::new(Level::Info, "tick");
        record.time = Local
            .with_ymd_and_hms(2026, 1, 2, 15, 4, 5)
            .unwrap()
            .with_nanosecond(987_000_000)
            .unwrap();

        let line = record.render_line();
        assert!(
            line.starts_with("INFO [2026-01-02 15:04:05.98] tick"),
            "unexpected prefix: {line}"
        );
    }

    #[test]
    fn test_render_line() {
        let record = LogRecord::new(Level::Error, "connection refused")
            .with_attr("peer", "10.0.0.7:443")
            .with_attr("attempt", "3");

        let line = record.render_line();
        assert!(line.starts_with("ERROR["));
        assert!(line.contains("connection refused"));
        assert!(line.contains("peer=10.0.0.7:443"));
        assert!(line.ends_with("attempt=3"));
    }
}
