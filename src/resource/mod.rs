//! Resource abstraction layer
//!
//! One uniform pipeline for heterogeneous cloud resources: every kind is
//! enumerated, hydrated and deleted through the same [`ResourceHandler`].
//!
//! # Architecture
//!
//! - [`model`] - `Resource`, `ResourceKind`, `FetchContext`
//! - [`api`] - the collaborator contract each kind is served by
//! - [`fetcher`] - paginated fetch protocol on top of the collaborator
//! - [`registry`] - embedded kind definitions and the handler factory
//! - [`usage`] - usage signals and the window evaluator
//! - [`memory`] - map-backed collaborator

pub mod api;
mod fetcher;
pub mod memory;
pub mod model;
mod registry;
pub mod usage;

pub use api::{Description, Page, ResourceApi};
pub use fetcher::{not_exists_note, FetchOutcome, ResourceHandler};
pub use model::{FetchContext, Resource, ResourceBuilder, ResourceId, ResourceKind};
pub use registry::*;
pub use usage::{Usage, UsageEvaluator, DEFAULT_WINDOW_DAYS};
