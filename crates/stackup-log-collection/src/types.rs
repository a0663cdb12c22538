//! Core types for log collection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stream type (stdout or stderr)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl StreamType {
    pub(crate) fn index(self) -> usize {
        match self {
            StreamType::Stdout => 0,
            StreamType::Stderr => 1,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}

/// One captured line of process output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub process_id: String,
    pub stream: StreamType,
    pub message: String,
}

impl LogEntry {
    /// Builds an entry from raw line bytes, dropping the line terminator.
    pub fn from_line(process_id: &str, stream: StreamType, line: &[u8]) -> Self {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Self {
            timestamp: Utc::now(),
            process_id: process_id.to_string(),
            stream,
            message: String::from_utf8_lossy(line).into_owned(),
        }
    }
}

/// Format: `[timestamp] [process/stream] message`
impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}/{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.process_id,
            self.stream,
            self.message
        )
    }
}

/// Counters for one process's sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLogStatus {
    pub process_id: String,
    pub lines_processed: u64,
    pub bytes_processed: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_strips_line_terminators() {
        let entry = LogEntry::from_line("api", StreamType::Stderr, b"boom\r\n");
        assert_eq!(entry.message, "boom");

        let rendered = entry.to_string();
        assert!(rendered.ends_with("[api/stderr] boom"), "{}", rendered);
    }

    #[test]
    fn test_entry_tolerates_invalid_utf8() {
        let entry = LogEntry::from_line("api", StreamType::Stdout, &[0x66, 0xff, 0x6f, b'\n']);
        assert_eq!(entry.message, "f\u{fffd}o");
    }
}
