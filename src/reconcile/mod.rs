//! Reconciliation
//!
//! Compares the same logical resources across two regions or accounts and
//! reports every field-level difference.

mod orchestrator;
mod report;

pub use orchestrator::{Orchestrator, ReconcileRequest, DEFAULT_POLL_INTERVAL};
pub use report::{ReconcileEntry, ReconcileReport};
