//! # stackup-process
//!
//! Low-level process operations used by the supervisor.
//!
//! This crate provides the primitives for:
//! - Spawning a child in its own process group with captured output
//! - Checking whether a PID is still alive
//! - Graceful and forced termination of a whole process group
//! - Validating process names and executables

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
