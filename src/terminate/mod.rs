//! Termination
//!
//! Deletes unused resources of one kind. Runs are dry unless `apply` is set,
//! and every run is reported to the registered hooks before and after the
//! decision.

mod hooks;
mod pipeline;
mod report;
mod senders;

pub use hooks::{AfterHook, BeforeHook, HookContext, Interceptors};
pub use pipeline::{TerminationPipeline, TerminationRequest};
pub use report::{Action, Outcome, TerminationReport};
pub use senders::{
    build_interceptors, AuditEntry, AuditLogSender, AuditStage, DetailLevel, LogSender,
    SenderSettings, SummarySender,
};
