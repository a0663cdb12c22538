//! Routing of process output into per-process sinks.

use crate::output::{FileOutputWriter, OutputWriter, TracingOutputWriter};
use crate::types::{LogEntry, ProcessLogStatus, StreamType};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use stackup_common::{ProcessError, ProcessResult};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_RECORDED_ERRORS: usize = 16;

/// Router configuration
#[derive(Debug, Clone)]
pub struct LogRouterConfig {
    /// Directory receiving one `<name>.log` file per process; no files when unset.
    pub log_directory: Option<PathBuf>,
    /// Number of recent lines kept in memory per process.
    pub tail_lines: usize,
    /// Also re-emit every captured line through `tracing`.
    pub echo: bool,
}

impl Default for LogRouterConfig {
    fn default() -> Self {
        Self {
            log_directory: None,
            tail_lines: 200,
            echo: false,
        }
    }
}

/// Routes output of managed processes to their sinks.
pub struct LogRouter {
    config: LogRouterConfig,
    sinks: RwLock<HashMap<String, Arc<Mutex<ProcessSink>>>>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for LogRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRouter")
            .field("config", &self.config)
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}

impl LogRouter {
    pub fn new(config: LogRouterConfig) -> Self {
        Self {
            config,
            sinks: RwLock::new(HashMap::new()),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Create the sink for `process_id`. Registering twice keeps the first sink.
    pub fn register(&self, process_id: &str) -> ProcessResult<()> {
        if self.sinks.read().contains_key(process_id) {
            return Ok(());
        }

        let mut outputs: Vec<Box<dyn OutputWriter>> = Vec::new();
        if let Some(ref directory) = self.config.log_directory {
            outputs.push(Box::new(FileOutputWriter::new(process_id, directory)?));
        }
        if self.config.echo {
            outputs.push(Box::new(TracingOutputWriter));
        }

        let sink = ProcessSink::new(process_id, outputs, self.config.tail_lines);
        self.sinks
            .write()
            .entry(process_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(sink)));

        debug!(process_id = %process_id, "Log sink registered");
        Ok(())
    }

    pub fn is_registered(&self, process_id: &str) -> bool {
        self.sinks.read().contains_key(process_id)
    }

    /// Drain `reader` line by line into the sink of `process_id`.
    ///
    /// The returned task finishes at end of stream, on a read error, or when the
    /// router shuts down; any unterminated trailing data is flushed first.
    pub fn attach<R>(
        &self,
        process_id: &str,
        stream: StreamType,
        reader: R,
    ) -> ProcessResult<JoinHandle<()>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sink = self.sink(process_id)?;
        let cancel_token = self.cancel_token.child_token();
        let process_id = process_id.to_string();

        Ok(tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = Vec::with_capacity(256);

            loop {
                line.clear();
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!(process_id = %process_id, %stream, "Stream reader cancelled");
                        break;
                    }
                    result = reader.read_until(b'\n', &mut line) => {
                        match result {
                            Ok(0) => break,
                            Ok(_) => {
                                sink.lock().write(stream, &line);
                            }
                            Err(e) => {
                                warn!(
                                    process_id = %process_id,
                                    %stream,
                                    error = %e,
                                    "Error reading from stream"
                                );
                                sink.lock().record_error(format!("{} read error: {}", stream, e));
                                break;
                            }
                        }
                    }
                }
            }

            sink.lock().flush_stream(stream);
            debug!(process_id = %process_id, %stream, "Stream reader finished");
        }))
    }

    /// Append raw bytes to the sink of `process_id`.
    ///
    /// Complete lines are written immediately; a trailing partial line is held
    /// back per stream until its newline arrives or the sink is detached.
    pub fn write(&self, process_id: &str, stream: StreamType, bytes: &[u8]) -> ProcessResult<()> {
        self.sink(process_id)?.lock().write(stream, bytes);
        Ok(())
    }

    /// The last `n` captured lines of `process_id`, oldest first.
    pub fn tail(&self, process_id: &str, n: usize) -> ProcessResult<Vec<LogEntry>> {
        Ok(self.sink(process_id)?.lock().tail(n))
    }

    pub fn status(&self, process_id: &str) -> ProcessResult<ProcessLogStatus> {
        Ok(self.sink(process_id)?.lock().status())
    }

    /// Flush buffered partial lines and file output of `process_id`.
    pub fn detach(&self, process_id: &str) -> ProcessResult<()> {
        let sink = self.sink(process_id)?;
        let mut sink = sink.lock();
        sink.flush_stream(StreamType::Stdout);
        sink.flush_stream(StreamType::Stderr);
        Ok(())
    }

    /// Stop all stream readers and flush every sink.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        let sinks: Vec<_> = self.sinks.read().values().cloned().collect();
        for sink in sinks {
            let mut sink = sink.lock();
            sink.flush_stream(StreamType::Stdout);
            sink.flush_stream(StreamType::Stderr);
        }
    }

    fn sink(&self, process_id: &str) -> ProcessResult<Arc<Mutex<ProcessSink>>> {
        self.sinks
            .read()
            .get(process_id)
            .cloned()
            .ok_or_else(|| ProcessError::not_found(process_id))
    }
}

/// The exclusive destination of one process.
struct ProcessSink {
    process_id: String,
    outputs: Vec<Box<dyn OutputWriter>>,
    tail: VecDeque<LogEntry>,
    tail_capacity: usize,
    partial: [Vec<u8>; 2],
    lines_processed: u64,
    bytes_processed: u64,
    last_activity: Option<chrono::DateTime<Utc>>,
    errors: Vec<String>,
}

impl ProcessSink {
    fn new(process_id: &str, outputs: Vec<Box<dyn OutputWriter>>, tail_capacity: usize) -> Self {
        Self {
            process_id: process_id.to_string(),
            outputs,
            tail: VecDeque::with_capacity(tail_capacity.min(1024)),
            tail_capacity,
            partial: [Vec::new(), Vec::new()],
            lines_processed: 0,
            bytes_processed: 0,
            last_activity: None,
            errors: Vec::new(),
        }
    }

    fn write(&mut self, stream: StreamType, bytes: &[u8]) {
        self.bytes_processed += bytes.len() as u64;

        let mut pending = std::mem::take(&mut self.partial[stream.index()]);
        pending.extend_from_slice(bytes);

        let mut start = 0;
        while let Some(offset) = pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset + 1;
            self.emit(stream, &pending[start..end]);
            start = end;
        }
        pending.drain(..start);

        self.partial[stream.index()] = pending;
        self.flush_outputs();
    }

    fn flush_stream(&mut self, stream: StreamType) {
        let pending = std::mem::take(&mut self.partial[stream.index()]);
        if !pending.is_empty() {
            self.emit(stream, &pending);
        }
        self.flush_outputs();
    }

    fn emit(&mut self, stream: StreamType, line: &[u8]) {
        let entry = LogEntry::from_line(&self.process_id, stream, line);

        let mut failures = Vec::new();
        for output in self.outputs.iter_mut() {
            if let Err(e) = output.write(&entry) {
                failures.push(e.to_string());
            }
        }
        for failure in failures {
            self.record_error(failure);
        }

        self.lines_processed += 1;
        self.last_activity = Some(entry.timestamp);

        if self.tail_capacity > 0 {
            if self.tail.len() == self.tail_capacity {
                self.tail.pop_front();
            }
            self.tail.push_back(entry);
        }
    }

    fn flush_outputs(&mut self) {
        let mut failures = Vec::new();
        for output in self.outputs.iter_mut() {
            if let Err(e) = output.flush() {
                failures.push(e.to_string());
            }
        }
        for failure in failures {
            self.record_error(failure);
        }
    }

    fn record_error(&mut self, error: String) {
        warn!(process_id = %self.process_id, error = %error, "Log sink error");
        if self.errors.len() == MAX_RECORDED_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(error);
    }

    fn tail(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.tail.len().saturating_sub(n);
        self.tail.iter().skip(skip).cloned().collect()
    }

    fn status(&self) -> ProcessLogStatus {
        ProcessLogStatus {
            process_id: self.process_id.clone(),
            lines_processed: self.lines_processed,
            bytes_processed: self.bytes_processed,
            last_activity: self.last_activity,
            errors: self.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_partial_lines_are_buffered_per_stream() {
        let router = LogRouter::new(LogRouterConfig::default());
        router.register("api").unwrap();

        router.write("api", StreamType::Stdout, b"hel").unwrap();
        router.write("api", StreamType::Stderr, b"warn").unwrap();
        router.write("api", StreamType::Stdout, b"lo\nwor").unwrap();
        assert_eq!(messages(&router.tail("api", 10).unwrap()), vec!["hello"]);

        router.write("api", StreamType::Stderr, b"ing\n").unwrap();
        router.detach("api").unwrap();

        let tail = router.tail("api", 10).unwrap();
        assert_eq!(messages(&tail), vec!["hello", "warning", "wor"]);
        assert_eq!(tail[1].stream, StreamType::Stderr);
        assert_eq!(tail[2].stream, StreamType::Stdout);
    }

    #[test]
    fn test_tail_is_bounded() {
        let router = LogRouter::new(LogRouterConfig {
            tail_lines: 3,
            ..Default::default()
        });
        router.register("worker").unwrap();
        for i in 0..10 {
            router
                .write("worker", StreamType::Stdout, format!("line {}\n", i).as_bytes())
                .unwrap();
        }

        assert_eq!(
            messages(&router.tail("worker", 10).unwrap()),
            vec!["line 7", "line 8", "line 9"]
        );
        assert_eq!(messages(&router.tail("worker", 1).unwrap()), vec!["line 9"]);
        assert_eq!(router.status("worker").unwrap().lines_processed, 10);
    }

    #[test]
    fn test_unregistered_process_is_rejected() {
        let router = LogRouter::new(LogRouterConfig::default());
        let err = router.write("ghost", StreamType::Stdout, b"x\n").unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
        assert!(router.tail("ghost", 5).is_err());
    }

    #[tokio::test]
    async fn test_attach_drains_reader_and_flushes_trailing_data() {
        let router = LogRouter::new(LogRouterConfig::default());
        router.register("cache").unwrap();

        let reader = std::io::Cursor::new(b"first\nsecond\nno newline".to_vec());
        let handle = router.attach("cache", StreamType::Stdout, reader).unwrap();
        handle.await.unwrap();

        assert_eq!(
            messages(&router.tail("cache", 10).unwrap()),
            vec!["first", "second", "no newline"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_processes_never_share_a_sink() {
        let dir = tempfile::tempdir().unwrap();
        let router = Arc::new(LogRouter::new(LogRouterConfig {
            log_directory: Some(dir.path().to_path_buf()),
            ..Default::default()
        }));

        let names = ["alpha", "beta"];
        for name in names {
            router.register(name).unwrap();
        }

        let mut tasks = Vec::new();
        for name in names {
            for stream in [StreamType::Stdout, StreamType::Stderr] {
                let router = Arc::clone(&router);
                tasks.push(tokio::spawn(async move {
                    for i in 0..200 {
                        let line = format!("{}-{}-{}-payload\n", name, stream, i);
                        let (head, rest) = line.as_bytes().split_at(line.len() / 2);
                        router.write(name, stream, head).unwrap();
                        tokio::task::yield_now().await;
                        router.write(name, stream, rest).unwrap();
                    }
                }));
            }
        }
        futures::future::join_all(tasks).await;

        for name in names {
            router.detach(name).unwrap();
            let contents =
                std::fs::read_to_string(dir.path().join(format!("{}.log", name))).unwrap();
            let lines: Vec<&str> = contents.lines().collect();
            assert_eq!(lines.len(), 400);

            for line in lines {
                let (_, rest) = line.split_once("] [").unwrap();
                let (label, message) = rest.split_once("] ").unwrap();
                let stream = label.strip_prefix(&format!("{}/", name)).unwrap();
                assert!(
                    message.starts_with(&format!("{}-{}-", name, stream)),
                    "foreign or torn line in {}: {}",
                    name,
                    line
                );
                assert!(message.ends_with("-payload"), "torn line: {}", line);
            }
        }
    }
}
