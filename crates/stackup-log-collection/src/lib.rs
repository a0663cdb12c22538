//! # stackup-log-collection
//!
//! Output capture for managed processes.
//!
//! Every process owns exactly one sink: an optional log file plus an in-memory
//! tail of its most recent lines. Output is routed by process name, so lines
//! from different processes never share a destination, and each line is
//! written under the sink's lock so lines never interleave within one.

pub mod output;
pub mod router;
pub mod types;

// Re-export main types
pub use output::{FileOutputWriter, OutputWriter, TracingOutputWriter};
pub use router::{LogRouter, LogRouterConfig};
pub use types::{LogEntry, ProcessLogStatus, StreamType};
