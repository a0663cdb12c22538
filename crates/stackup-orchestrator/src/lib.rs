//! # stackup-orchestrator
//!
//! Brings a stack up group by group: every dependency group is launched and
//! must pass its health check before the next one starts.
//!
//! This crate provides:
//! - [`StackConfig`]: the YAML stack description (processes, external services, groups)
//! - [`ExternalLauncher`]: starts collaborators that live outside the supervisor
//! - [`StartupOrchestrator`]: the gated bring-up with an event timeline and
//!   structured failure diagnostics

pub mod config;
pub mod error;
pub mod launcher;
pub mod orchestrator;
pub mod report;

// Re-export main types
pub use config::{ExternalService, GroupConfig, StackConfig};
pub use error::{OrchestrationError, OrchestrationResult};
pub use launcher::{CommandLauncher, ExternalLauncher};
pub use orchestrator::StartupOrchestrator;
pub use report::{
    BringUpFailure, BringUpReport, FailureReason, GroupOutcome, GroupSummary, MemberDiagnostic,
    StartupEvent, Timeline, TimelineEntry,
};
