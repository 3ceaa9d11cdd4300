//! Termination hooks
//!
//! Two registration lists with distinct signatures. Hooks run in registration
//! order; a failing hook is logged and the pipeline carries on.

use super::report::TerminationReport;
use crate::error::ReaperError;
use crate::resource::{FetchContext, Resource, ResourceKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Arguments every hook receives
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub kind: ResourceKind,
    pub context: &'a FetchContext,
    /// Resources that reached the confirmation stage
    pub resources: &'a [Resource],
    /// Free-text ticket or description; may be absent
    pub audit_info: Option<&'a str>,
    pub apply: bool,
}

#[async_trait]
pub trait BeforeHook: Send + Sync {
    fn name(&self) -> &str;

    async fn before(&self, ctx: &HookContext<'_>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AfterHook: Send + Sync {
    fn name(&self) -> &str;

    async fn after(&self, ctx: &HookContext<'_>, report: &TerminationReport) -> anyhow::Result<()>;
}

/// Ordered hook lists; hooks can be added but never removed
#[derive(Default, Clone)]
pub struct Interceptors {
    before: Vec<Arc<dyn BeforeHook>>,
    after: Vec<Arc<dyn AfterHook>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before(&mut self, hook: Arc<dyn BeforeHook>) {
        tracing::debug!("Registered before hook {}", hook.name());
        self.before.push(hook);
    }

    pub fn register_after(&mut self, hook: Arc<dyn AfterHook>) {
        tracing::debug!("Registered after hook {}", hook.name());
        self.after.push(hook);
    }

    pub fn before_count(&self) -> usize {
        self.before.len()
    }

    pub fn after_count(&self) -> usize {
        self.after.len()
    }

    /// Run before hooks; failures are logged and returned, never raised
    pub async fn run_before(&self, ctx: &HookContext<'_>) -> Vec<ReaperError> {
        let mut failures = Vec::new();
        for hook in &self.before {
            if let Err(e) = hook.before(ctx).await {
                failures.push(hook_failure(hook.name(), e));
            }
        }
        failures
    }

    pub async fn run_after(
        &self,
        ctx: &HookContext<'_>,
        report: &TerminationReport,
    ) -> Vec<ReaperError> {
        let mut failures = Vec::new();
        for hook in &self.after {
            if let Err(e) = hook.after(ctx, report).await {
                failures.push(hook_failure(hook.name(), e));
            }
        }
        failures
    }
}

fn hook_failure(name: &str, err: anyhow::Error) -> ReaperError {
    tracing::warn!("Hook {} failed: {:#}", name, err);
    ReaperError::HookFailure {
        hook: name.to_string(),
        detail: format!("{err:#}"),
    }
}
