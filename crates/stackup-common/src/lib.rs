//! # stackup-common
//!
//! Common types, errors and serde helpers shared across the stackup workspace.
//!
//! This crate provides the foundational pieces every other stackup crate builds
//! on: the process error taxonomy, restart policy rules, exit descriptions and
//! duration (de)serialization for configuration files.

pub mod duration;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{LaunchFailureKind, ProcessError, ProcessResult};
pub use types::{ExitInfo, RestartPolicy};
