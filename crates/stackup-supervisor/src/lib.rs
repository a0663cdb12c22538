//! # stackup-supervisor
//!
//! Keeps a fixed, statically configured set of processes alive.
//!
//! This crate provides:
//! - Process configuration and validation
//! - [`ProcessSupervisor`]: priority-ordered launch, exit monitoring, restart
//!   policy with a restart-storm bound, graceful stop and shutdown
//! - [`ControlInterface`]: `status | start | stop | restart` for one process,
//!   also served over HTTP by the [`api`] module

pub mod api;
pub mod config;
pub mod control;
pub mod lifecycle;
pub mod supervisor;

// Re-export main types
pub use config::{ControlConfig, ManagedProcessConfig, SupervisorConfig, SupervisorOptions};
pub use control::{ControlCommand, ControlInterface};
pub use lifecycle::{RestartDecision, RestartTracker};
pub use supervisor::{ProcessStatus, ProcessSupervisor};
