//! Termination Pipeline
//!
//! Fetching -> Evaluating -> Confirming -> Deleting -> Reporting -> Done.
//! Resources with recent usage are skipped while evaluating unless the
//! request sets `force`. Nothing is deleted unless the request sets `apply`.

use super::hooks::{HookContext, Interceptors};
use super::report::{Action, TerminationReport};
use crate::error::{ApiError, ReaperError};
use crate::pool::WorkerPool;
use crate::resource::{
    not_exists_note, FetchContext, Resource, ResourceFactory, ResourceKind, UsageEvaluator,
    DEFAULT_WINDOW_DAYS,
};
use std::collections::HashSet;
use std::sync::Arc;

/// One termination invocation
#[derive(Debug, Clone)]
pub struct TerminationRequest {
    pub kind: ResourceKind,
    pub context: FetchContext,
    pub names: Vec<String>,
    pub audit_info: Option<String>,
    pub apply: bool,
    pub force: bool,
    pub window_days: u32,
}

impl TerminationRequest {
    /// Dry-run request with the default usage window
    pub fn new(kind: ResourceKind, context: FetchContext, names: Vec<String>) -> Self {
        Self {
            kind,
            context,
            names,
            audit_info: None,
            apply: false,
            force: false,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fetching,
    Evaluating,
    Confirming,
    Deleting,
    Reporting,
    Done,
}

pub struct TerminationPipeline {
    factory: ResourceFactory,
    interceptors: Arc<Interceptors>,
}

impl TerminationPipeline {
    pub fn new(factory: ResourceFactory, interceptors: Arc<Interceptors>) -> Self {
        Self {
            factory,
            interceptors,
        }
    }

    pub async fn run(&self, request: &TerminationRequest) -> Result<TerminationReport, ReaperError> {
        let handler = self.factory.get(request.kind)?;
        let ctx = &request.context;
        let mut report = TerminationReport::new(
            request.kind,
            ctx.clone(),
            request.apply,
            request.force,
            request.audit_info.clone(),
        );

        trace_stage(Stage::Fetching, request);
        let mut seen = HashSet::new();
        let names: Vec<String> = request
            .names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect();
        let fetched = handler.fetch_details(ctx, &names).await;
        for note in fetched.notes {
            report.note(note);
        }

        trace_stage(Stage::Evaluating, request);
        let evaluator = UsageEvaluator::new(request.window_days);
        let mut confirmed: Vec<Resource> = Vec::new();
        let mut force_reasons: Vec<Option<String>> = Vec::new();
        for resource in fetched.resources {
            let usage = match handler.usage(ctx, resource.name(), request.window_days).await {
                Ok(usage) => usage,
                Err(e) => {
                    tracing::warn!("Usage check failed for {}: {}", resource.id(), e);
                    report.note(format!(
                        "{} usage check failed: [{}] {}",
                        request.kind.display_name(),
                        resource.name(),
                        e
                    ));
                    report.record(
                        resource.id(),
                        Action::Failed,
                        format!("usage check failed: {e}"),
                    );
                    continue;
                }
            };

            if evaluator.was_used(&usage) {
                if !request.force {
                    report.record(resource.id(), Action::Skipped, evaluator.skip_reason(&usage));
                    continue;
                }
                force_reasons.push(Some(format!("forced despite {}", usage)));
            } else {
                force_reasons.push(None);
            }
            confirmed.push(resource);
        }

        trace_stage(Stage::Confirming, request);
        let hook_ctx = HookContext {
            kind: request.kind,
            context: ctx,
            resources: &confirmed,
            audit_info: request.audit_info.as_deref(),
            apply: request.apply,
        };
        for failure in self.interceptors.run_before(&hook_ctx).await {
            report.note(failure.to_string());
        }

        trace_stage(Stage::Deleting, request);
        for (resource, forced) in confirmed.iter().zip(force_reasons) {
            if !request.apply {
                let reason = match forced {
                    Some(forced) => format!("dry run, {forced}"),
                    None => "dry run".to_string(),
                };
                report.record(resource.id(), Action::WouldDelete, reason);
                continue;
            }

            match handler.terminate(ctx, resource.name()).await {
                Ok(()) => {
                    let reason = forced.unwrap_or_else(|| "unused".to_string());
                    report.record(resource.id(), Action::Deleted, reason);
                }
                Err(ApiError::NotFound(_)) => {
                    report.note(not_exists_note(request.kind, resource.name()));
                    report.record(resource.id(), Action::Failed, "vanished before delete");
                }
                Err(e) => {
                    tracing::warn!("Delete failed for {}: {}", resource.id(), e);
                    report.note(format!(
                        "{} delete failed: [{}] {}",
                        request.kind.display_name(),
                        resource.name(),
                        e
                    ));
                    report.record(resource.id(), Action::Failed, e.to_string());
                }
            }
        }

        trace_stage(Stage::Reporting, request);
        report.finish();
        for failure in self.interceptors.run_after(&hook_ctx, &report).await {
            report.note(failure.to_string());
        }

        trace_stage(Stage::Done, request);
        Ok(report)
    }

    /// Run several requests on the worker pool; results keep request order
    pub async fn run_all(
        self: &Arc<Self>,
        pool: &WorkerPool,
        requests: Vec<TerminationRequest>,
    ) -> Vec<Result<TerminationReport, ReaperError>> {
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let pipeline = Arc::clone(self);
            handles.push(pool.submit(async move { pipeline.run(&request).await }).await);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle {
                Ok(handle) => handle.join().await.and_then(|r| r),
                Err(e) => Err(e),
            };
            results.push(result);
        }
        results
    }
}

fn trace_stage(stage: Stage, request: &TerminationRequest) {
    tracing::debug!(
        "{:?}: {} x{} in {} (apply={}, force={})",
        stage,
        request.kind,
        request.names.len(),
        request.context,
        request.apply,
        request.force
    );
}
