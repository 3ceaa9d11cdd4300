//! cloud-reaper
//!
//! Enumerates, inspects, compares and retires cloud resources of many kinds
//! through one pipeline. Termination is dry-run unless explicitly applied.

pub mod aws;
pub mod config;
pub mod diff;
pub mod error;
pub mod pool;
pub mod reconcile;
pub mod resource;
pub mod terminate;

pub use error::{ApiError, ReaperError, ValidationError};
