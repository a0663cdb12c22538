//! Output writers for log sinks

use crate::types::LogEntry;
use stackup_common::{ProcessError, ProcessResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for the lines of a single process.
pub trait OutputWriter: Send {
    /// Write one complete line.
    fn write(&mut self, entry: &LogEntry) -> ProcessResult<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> ProcessResult<()>;
}

/// Appends formatted lines to `<directory>/<process>.log`.
pub struct FileOutputWriter {
    process_id: String,
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileOutputWriter {
    pub fn new(process_id: &str, directory: &Path) -> ProcessResult<Self> {
        std::fs::create_dir_all(directory).map_err(|e| {
            ProcessError::logging(process_id, format!("Failed to create log directory: {}", e))
        })?;

        let path = directory.join(format!("{}.log", process_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ProcessError::logging(
                    process_id,
                    format!("Failed to open log file {}: {}", path.display(), e),
                )
            })?;

        Ok(Self {
            process_id: process_id.to_string(),
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputWriter for FileOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> ProcessResult<()> {
        writeln!(self.writer, "{}", entry).map_err(|e| {
            ProcessError::logging(&self.process_id, format!("Failed to write to log file: {}", e))
        })
    }

    fn flush(&mut self) -> ProcessResult<()> {
        self.writer.flush().map_err(|e| {
            ProcessError::logging(&self.process_id, format!("Failed to flush log file: {}", e))
        })
    }
}

/// Re-emits captured lines as `tracing` events under the `stackup::output` target.
pub struct TracingOutputWriter;

impl OutputWriter for TracingOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> ProcessResult<()> {
        tracing::info!(
            target: "stackup::output",
            process = %entry.process_id,
            stream = %entry.stream,
            "{}",
            entry.message
        );
        Ok(())
    }

    fn flush(&mut self) -> ProcessResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamType;

    #[test]
    fn test_file_writer_appends_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileOutputWriter::new("cache", dir.path()).unwrap();
        assert_eq!(writer.path(), dir.path().join("cache.log"));

        writer
            .write(&LogEntry::from_line("cache", StreamType::Stdout, b"ready\n"))
            .unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(writer.path()).unwrap();
        assert!(contents.ends_with("[cache/stdout] ready\n"), "{}", contents);
    }

    #[test]
    fn test_unusable_log_directory_is_a_logging_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        match FileOutputWriter::new("cache", &blocker) {
            Err(ProcessError::LoggingError { id, reason }) => {
                assert_eq!(id, "cache");
                assert!(reason.contains("log directory"), "{}", reason);
            }
            Err(other) => panic!("expected logging error, got {:?}", other),
            Ok(_) => panic!("expected logging error"),
        }
    }
}
