//! Reconciliation Orchestrator
//!
//! Two producers list the source and target side concurrently. A name is
//! queued once both sides have listed it; the consumer polls the queue,
//! fetches both sides and hands each pair to the diff engine on the worker
//! pool. When both producers are done the queue is drained one last time.

use super::report::{ReconcileEntry, ReconcileReport};
use crate::diff::{DiffEngine, DiffNode, Schema};
use crate::error::{ReaperError, ValidationError};
use crate::pool::{JobHandle, WorkerPool};
use crate::resource::{FetchContext, Resource, ResourceFactory, ResourceHandler, ResourceKind};
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub kind: ResourceKind,
    pub source: FetchContext,
    pub target: FetchContext,
    /// Comparison fields to keep; empty keeps the kind's full schema
    pub compare_fields: Vec<String>,
    pub poll_interval: Duration,
}

impl ReconcileRequest {
    pub fn new(kind: ResourceKind, source: FetchContext, target: FetchContext) -> Self {
        Self {
            kind,
            source,
            target,
            compare_fields: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Target,
}

impl Side {
    fn label(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

#[derive(Default)]
struct QueueState {
    source_seen: HashSet<String>,
    target_seen: HashSet<String>,
    queue: VecDeque<String>,
    notes: Vec<String>,
    source_aborted: bool,
    target_aborted: bool,
}

/// State shared by both producers and the consumer
#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    source_done: AtomicBool,
    target_done: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a listed name; queue it when the other side has listed it too
    fn offer(&self, side: Side, name: String) {
        let mut state = self.lock();
        let state = &mut *state;
        let (own, other) = match side {
            Side::Source => (&mut state.source_seen, &state.target_seen),
            Side::Target => (&mut state.target_seen, &state.source_seen),
        };
        if !own.insert(name.clone()) {
            return;
        }
        if other.contains(&name) {
            state.queue.push_back(name);
        }
    }

    /// The side's listing stopped early, so its seen set is partial
    fn abort(&self, side: Side, note: String) {
        let mut state = self.lock();
        match side {
            Side::Source => state.source_aborted = true,
            Side::Target => state.target_aborted = true,
        }
        state.notes.push(note);
    }

    fn finish(&self, side: Side) {
        match side {
            Side::Source => self.source_done.store(true, Ordering::SeqCst),
            Side::Target => self.target_done.store(true, Ordering::SeqCst),
        }
    }

    fn producers_done(&self) -> bool {
        self.source_done.load(Ordering::SeqCst) && self.target_done.load(Ordering::SeqCst)
    }

    fn take_queued(&self) -> Vec<String> {
        self.lock().queue.drain(..).collect()
    }
}

pub struct Orchestrator {
    factory: ResourceFactory,
    pool: Arc<WorkerPool>,
}

impl Orchestrator {
    pub fn new(factory: ResourceFactory, pool: Arc<WorkerPool>) -> Self {
        Self { factory, pool }
    }

    pub async fn run(&self, request: &ReconcileRequest) -> Result<ReconcileReport, ReaperError> {
        let handler = self.factory.get(request.kind)?;
        let schema = Schema::for_kind(request.kind)
            .restricted(&request.compare_fields)
            .map_err(|detail| ValidationError::Invalid {
                field: "compareFields",
                detail,
            })?;
        let engine = Arc::new(DiffEngine::new().with_schema(schema));

        tracing::info!(
            "Reconciling {} between {} and {}",
            request.kind,
            request.source,
            request.target
        );

        let shared = Arc::new(Shared::default());
        let producers = [
            tokio::spawn(produce(
                handler.clone(),
                request.source.clone(),
                Side::Source,
                Arc::clone(&shared),
            )),
            tokio::spawn(produce(
                handler.clone(),
                request.target.clone(),
                Side::Target,
                Arc::clone(&shared),
            )),
        ];

        let mut report =
            ReconcileReport::new(request.kind, request.source.clone(), request.target.clone());
        let mut pending: Vec<(String, JobHandle<DiffNode>)> = Vec::new();

        loop {
            // Read the flag before draining so names queued by a producer's
            // last iteration are still picked up below
            let done = producers_finished(&shared, &producers);
            let batch = shared.take_queued();
            if !batch.is_empty() {
                self.compare_batch(&handler, request, &engine, batch, &mut pending, &mut report)
                    .await?;
                continue;
            }
            if done {
                break;
            }
            tokio::time::sleep(request.poll_interval).await;
        }

        // Final drain
        let batch = shared.take_queued();
        if !batch.is_empty() {
            self.compare_batch(&handler, request, &engine, batch, &mut pending, &mut report)
                .await?;
        }

        for producer in producers {
            if let Err(e) = producer.await {
                report.note(format!("producer task failed: {e}"));
            }
        }

        for (name, handle) in pending {
            match handle.join().await {
                Ok(diff) => report.entries.push(ReconcileEntry { name, diff }),
                Err(e) => report.note(format!("comparison of {name} did not finish: {e}")),
            }
        }

        let state = std::mem::take(&mut *shared.lock());
        report.notes.extend(state.notes);
        // A name missing from a partial listing proves nothing about the other side
        if state.target_aborted {
            report.note("source only names not reported: target listing incomplete");
        } else {
            report.unmatched_source = sorted_difference(&state.source_seen, &state.target_seen);
        }
        if state.source_aborted {
            report.note("target only names not reported: source listing incomplete");
        } else {
            report.unmatched_target = sorted_difference(&state.target_seen, &state.source_seen);
        }
        report.finished_at = Some(chrono::Utc::now());

        tracing::info!("{}", report.summary());
        Ok(report)
    }

    /// Fetch both sides of every name and queue the comparisons on the pool
    async fn compare_batch(
        &self,
        handler: &ResourceHandler,
        request: &ReconcileRequest,
        engine: &Arc<DiffEngine>,
        batch: Vec<String>,
        pending: &mut Vec<(String, JobHandle<DiffNode>)>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReaperError> {
        tracing::debug!("Comparing {} {} names", batch.len(), request.kind);
        let (source, target) = tokio::join!(
            handler.fetch_details(&request.source, &batch),
            handler.fetch_details(&request.target, &batch),
        );
        report
            .notes
            .extend(source.notes.into_iter().map(|n| format!("source: {n}")));
        report
            .notes
            .extend(target.notes.into_iter().map(|n| format!("target: {n}")));

        let mut targets: HashMap<String, Resource> = target
            .resources
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();

        for base in source.resources {
            let Some(other) = targets.remove(base.name()) else {
                continue;
            };
            let name = base.name().to_string();
            let engine = Arc::clone(engine);
            let handle = self
                .pool
                .submit(async move { engine.compare(&base, &other) })
                .await?;
            pending.push((name, handle));
        }
        Ok(())
    }
}

async fn produce(handler: ResourceHandler, ctx: FetchContext, side: Side, shared: Arc<Shared>) {
    let mut names = handler.list_all(&ctx);
    let mut count = 0usize;
    while let Some(item) = names.next().await {
        match item {
            Ok(name) => {
                count += 1;
                shared.offer(side, name);
            }
            Err(e) => {
                tracing::warn!("{} listing in {} aborted: {}", side.label(), ctx, e);
                shared.abort(
                    side,
                    format!("{} listing aborted after {} names: {}", side.label(), count, e),
                );
                break;
            }
        }
    }
    tracing::debug!("{} producer listed {} names in {}", side.label(), count, ctx);
    shared.finish(side);
}

/// A producer that panicked never sets its flag, so finished tasks count too
fn producers_finished(shared: &Shared, producers: &[tokio::task::JoinHandle<()>]) -> bool {
    shared.producers_done() || producers.iter().all(|p| p.is_finished())
}

fn sorted_difference(left: &HashSet<String>, right: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = left.difference(right).cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffState;
    use crate::error::ApiError;
    use crate::resource::memory::MemoryApi;
    use crate::resource::{Description, Page, ResourceApi, Usage};
    use async_trait::async_trait;

    /// Serves each region from its own map
    struct Regional {
        regions: HashMap<String, MemoryApi>,
        /// Delay before every page after the first, per region
        slow_pages: HashMap<String, Duration>,
    }

    impl Regional {
        fn side(&self, ctx: &FetchContext) -> Result<&MemoryApi, ApiError> {
            self.regions
                .get(&ctx.region)
                .ok_or_else(|| ApiError::Transient(format!("no region {}", ctx.region)))
        }
    }

    #[async_trait]
    impl ResourceApi for Regional {
        async fn list_page(&self, ctx: &FetchContext, cursor: Option<&str>) -> Result<Page, ApiError> {
            if let (Some(delay), Some(_)) = (self.slow_pages.get(&ctx.region), cursor) {
                tokio::time::sleep(*delay).await;
            }
            self.side(ctx)?.list_page(ctx, cursor).await
        }

        async fn describe(&self, ctx: &FetchContext, name: &str) -> Result<Description, ApiError> {
            self.side(ctx)?.describe(ctx, name).await
        }

        async fn delete(&self, ctx: &FetchContext, name: &str) -> Result<(), ApiError> {
            self.side(ctx)?.delete(ctx, name).await
        }

        async fn usage(&self, ctx: &FetchContext, name: &str, days: u32) -> Result<Usage, ApiError> {
            self.side(ctx)?.usage(ctx, name, days).await
        }
    }

    fn topics(resources: Vec<Resource>) -> MemoryApi {
        let api = MemoryApi::new(ResourceKind::Topic).with_page_size(2);
        for resource in resources {
            api.insert(resource);
        }
        api
    }

    fn regional(source: MemoryApi, target: MemoryApi) -> Regional {
        Regional {
            regions: HashMap::from([
                ("us-east-1".to_string(), source),
                ("eu-west-1".to_string(), target),
            ]),
            slow_pages: HashMap::new(),
        }
    }

    fn orchestrator_on(regional: Regional, pool: Arc<WorkerPool>) -> Orchestrator {
        let factory = ResourceFactory::new().register(ResourceKind::Topic, Arc::new(regional));
        Orchestrator::new(factory, pool)
    }

    fn orchestrator(source: MemoryApi, target: MemoryApi) -> Orchestrator {
        orchestrator_on(regional(source, target), Arc::new(WorkerPool::new(2, 8)))
    }

    fn plain(names: &[&str]) -> Vec<Resource> {
        names
            .iter()
            .map(|name| Resource::builder(ResourceKind::Topic, *name).build())
            .collect()
    }

    fn request() -> ReconcileRequest {
        let mut request = ReconcileRequest::new(
            ResourceKind::Topic,
            FetchContext::new("us-east-1", None),
            FetchContext::new("eu-west-1", None),
        );
        request.poll_interval = Duration::from_millis(5);
        request
    }

    #[tokio::test]
    async fn test_removed_alarm_is_the_only_difference() {
        let source = topics(vec![Resource::builder(ResourceKind::Topic, "topic1")
            .attribute("DisplayName", "orders")
            .relation("alarms", ["x"])
            .build()]);
        let target = topics(vec![Resource::builder(ResourceKind::Topic, "topic1")
            .attribute("DisplayName", "orders")
            .relation("alarms", Vec::<String>::new())
            .build()]);

        let report = orchestrator(source, target).run(&request()).await.unwrap();
        let entry = report.entry("topic1").unwrap();
        let reportable: Vec<_> = entry
            .diff
            .reportable()
            .into_iter()
            .filter(|n| !n.is_root())
            .collect();

        assert_eq!(reportable.len(), 1);
        assert_eq!(reportable[0].path_string(), "alarms[x]");
        assert_eq!(reportable[0].state, DiffState::Removed);
    }

    #[tokio::test]
    async fn test_only_names_on_both_sides_are_compared() {
        let same = |name: &str| {
            Resource::builder(ResourceKind::Topic, name)
                .attribute("DisplayName", name)
                .build()
        };
        let source = topics(vec![same("a"), same("b"), same("c"), same("only-src")]);
        let target = topics(vec![
            same("a"),
            Resource::builder(ResourceKind::Topic, "b")
                .attribute("DisplayName", "renamed")
                .build(),
            same("c"),
            same("only-dst"),
        ]);

        let report = orchestrator(source, target).run(&request()).await.unwrap();
        let mut compared: Vec<&str> = report.entries.iter().map(|e| e.name.as_str()).collect();
        compared.sort();

        assert_eq!(compared, vec!["a", "b", "c"]);
        assert_eq!(report.differing().map(|e| e.name.as_str()).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(report.unmatched_source, vec!["only-src"]);
        assert_eq!(report.unmatched_target, vec!["only-dst"]);
        assert!(report.notes.is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_becomes_a_note() {
        let source = topics(vec![
            Resource::builder(ResourceKind::Topic, "a").build(),
            Resource::builder(ResourceKind::Topic, "b").build(),
            Resource::builder(ResourceKind::Topic, "c").build(),
        ])
        .fail_list_on_page(2);
        let target = topics(vec![
            Resource::builder(ResourceKind::Topic, "a").build(),
            Resource::builder(ResourceKind::Topic, "c").build(),
        ]);

        let report = orchestrator(source, target).run(&request()).await.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].name, "a");
        assert!(report.notes[0].starts_with("source listing aborted after 2 names"));
        // c was never listed on the source, but it exists there
        assert!(report.unmatched_target.is_empty());
        assert!(report
            .notes
            .contains(&"target only names not reported: source listing incomplete".to_string()));
        assert_eq!(report.unmatched_source, vec!["b"]);
    }

    #[tokio::test]
    async fn test_name_from_a_late_page_is_still_compared() {
        let source = topics(plain(&["a", "b"]));
        let target = topics(plain(&["a", "b"])).with_page_size(1);
        let mut regional = regional(source, target);
        regional
            .slow_pages
            .insert("eu-west-1".to_string(), Duration::from_millis(50));

        let report = orchestrator_on(regional, Arc::new(WorkerPool::new(2, 8)))
            .run(&request())
            .await
            .unwrap();

        let mut compared: Vec<&str> = report.entries.iter().map(|e| e.name.as_str()).collect();
        compared.sort();
        assert_eq!(compared, vec!["a", "b"]);
        assert!(report.entry("b").is_some_and(|e| !e.differs()));
        assert!(report.notes.is_empty());
    }

    #[tokio::test]
    async fn test_forced_shutdown_leaves_a_note_for_cancelled_comparisons() {
        let source = topics(plain(&["a", "b"]));
        let target = topics(plain(&["a", "b"])).with_page_size(1);
        let mut regional = regional(source, target);
        regional
            .slow_pages
            .insert("eu-west-1".to_string(), Duration::from_millis(300));
        let pool = Arc::new(WorkerPool::new(1, 8));
        let orchestrator = orchestrator_on(regional, Arc::clone(&pool));
        let req = request();

        let (report, outcome) = tokio::join!(orchestrator.run(&req), async {
            // Occupy the only worker before b is listed
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _blocker = pool
                .submit(tokio::time::sleep(Duration::from_secs(60)))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            pool.shutdown(Duration::from_millis(50)).await
        });

        let report = report.unwrap();
        assert_eq!(outcome, crate::pool::ShutdownOutcome::Forced);
        assert!(report.entry("a").is_some());
        assert!(report.entry("b").is_none());
        assert!(report
            .notes
            .iter()
            .any(|n| n.starts_with("comparison of b did not finish")));
    }

    #[tokio::test]
    async fn test_unknown_compare_field_is_rejected() {
        let mut req = request();
        req.compare_fields = vec!["nope".to_string()];
        let result = orchestrator(topics(vec![]), topics(vec![])).run(&req).await;
        assert!(matches!(result, Err(ReaperError::Validation(_))));
    }
}
