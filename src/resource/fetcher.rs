//! Resource Fetcher
//!
//! Drives the paginated fetch protocol against a [`ResourceApi`] and turns
//! descriptions into [`Resource`] values.

use super::api::ResourceApi;
use super::model::{FetchContext, Resource, ResourceKind};
use super::usage::Usage;
use crate::error::ApiError;
use async_stream::try_stream;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Maximum describe calls in flight for one `fetch_details` batch
const DETAIL_CONCURRENCY: usize = 8;

/// Resources resolved by `fetch_details`, plus notes for names that were not
pub struct FetchOutcome {
    pub resources: Vec<Resource>,
    pub notes: Vec<String>,
}

/// Fetch/terminate implementation for one kind
#[derive(Clone)]
pub struct ResourceHandler {
    kind: ResourceKind,
    api: Arc<dyn ResourceApi>,
}

impl ResourceHandler {
    pub fn new(kind: ResourceKind, api: Arc<dyn ResourceApi>) -> Self {
        Self { kind, api }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Lazily enumerate every name of this kind.
    ///
    /// Each call starts a fresh cursor chain. Pages are requested one after
    /// another; an error on any page ends the stream with that error.
    pub fn list_all(&self, ctx: &FetchContext) -> BoxStream<'static, Result<String, ApiError>> {
        Box::pin(page_stream(Arc::clone(&self.api), ctx.clone(), self.kind))
    }

    /// Collect the whole listing
    pub async fn list_names(&self, ctx: &FetchContext) -> Result<Vec<String>, ApiError> {
        self.list_all(ctx).try_collect().await
    }

    /// Resolve names to resources; vanished or failing names become notes.
    pub async fn fetch_details(&self, ctx: &FetchContext, names: &[String]) -> FetchOutcome {
        let results: Vec<(String, Result<_, ApiError>)> = stream::iter(names.iter().cloned())
            .map(|name| {
                let api = Arc::clone(&self.api);
                async move {
                    let described = api.describe(ctx, &name).await;
                    (name, described)
                }
            })
            .buffered(DETAIL_CONCURRENCY)
            .collect()
            .await;

        let mut outcome = FetchOutcome {
            resources: Vec::with_capacity(results.len()),
            notes: Vec::new(),
        };

        for (name, described) in results {
            match described {
                Ok(desc) => {
                    let mut builder = Resource::builder(self.kind, name).attributes(desc.attributes);
                    for (relation, members) in desc.relations {
                        builder = builder.relation(relation, members);
                    }
                    outcome.resources.push(builder.build());
                }
                Err(ApiError::NotFound(_)) => {
                    tracing::info!("{} {} not found in {}", self.kind, name, ctx);
                    outcome.notes.push(not_exists_note(self.kind, &name));
                }
                Err(e) => {
                    tracing::warn!("Failed to describe {} {}: {}", self.kind, name, e);
                    outcome.notes.push(format!(
                        "{} describe failed: [{}] {}",
                        self.kind.display_name(),
                        name,
                        e
                    ));
                }
            }
        }

        outcome
    }

    pub async fn usage(
        &self,
        ctx: &FetchContext,
        name: &str,
        window_days: u32,
    ) -> Result<Usage, ApiError> {
        self.api.usage(ctx, name, window_days).await
    }

    /// Issue the destructive delete call
    pub async fn terminate(&self, ctx: &FetchContext, name: &str) -> Result<(), ApiError> {
        tracing::info!("Deleting {} {} in {}", self.kind, name, ctx);
        self.api.delete(ctx, name).await
    }
}

fn page_stream(
    api: Arc<dyn ResourceApi>,
    ctx: FetchContext,
    kind: ResourceKind,
) -> impl Stream<Item = Result<String, ApiError>> + Send + 'static {
    try_stream! {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = api.list_page(&ctx, cursor.as_deref()).await?;
            pages += 1;
            tracing::debug!(
                "{} page {} in {}: {} names, has_more={}",
                kind,
                pages,
                ctx,
                page.names.len(),
                page.has_more
            );

            for name in page.names {
                yield name;
            }

            if !page.has_more {
                break;
            }
            match page.next {
                Some(token) => cursor = Some(token),
                None => {
                    Err::<(), _>(ApiError::Transient(format!(
                        "{} listing reported more pages without a cursor after page {}",
                        kind, pages
                    )))?;
                }
            }
        }
    }
}

/// Note recorded for a name that no longer exists
pub fn not_exists_note(kind: ResourceKind, name: &str) -> String {
    format!("{} not exists: [{}]", kind.display_name(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::memory::MemoryApi;
    use futures::StreamExt;

    fn ctx() -> FetchContext {
        FetchContext::new("us-east-1", None)
    }

    #[tokio::test]
    async fn test_list_all_walks_every_page() {
        let api = MemoryApi::new(ResourceKind::Queue).with_page_size(2);
        for name in ["a", "b", "c", "d", "e"] {
            api.insert(Resource::builder(ResourceKind::Queue, name).build());
        }
        let api = Arc::new(api);
        let handler = ResourceHandler::new(ResourceKind::Queue, api.clone());

        let names = handler.list_names(&ctx()).await.unwrap();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(api.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_list_all_is_restartable() {
        let api = MemoryApi::new(ResourceKind::Topic).with_page_size(1);
        api.insert(Resource::builder(ResourceKind::Topic, "t1").build());
        api.insert(Resource::builder(ResourceKind::Topic, "t2").build());
        let handler = ResourceHandler::new(ResourceKind::Topic, Arc::new(api));

        let mut first = handler.list_all(&ctx());
        assert_eq!(first.next().await.unwrap().unwrap(), "t1");
        drop(first);

        let all = handler.list_names(&ctx()).await.unwrap();
        assert_eq!(all, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_list_all_aborts_on_page_failure() {
        let api = MemoryApi::new(ResourceKind::Queue)
            .with_page_size(1)
            .fail_list_on_page(2);
        for name in ["a", "b", "c"] {
            api.insert(Resource::builder(ResourceKind::Queue, name).build());
        }
        let handler = ResourceHandler::new(ResourceKind::Queue, Arc::new(api));

        let items: Vec<_> = handler.list_all(&ctx()).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(matches!(items[1], Err(ApiError::Transient(_))));
    }

    #[tokio::test]
    async fn test_fetch_details_notes_missing_names() {
        let api = MemoryApi::new(ResourceKind::Queue);
        api.insert(
            Resource::builder(ResourceKind::Queue, "orders")
                .attribute("VisibilityTimeout", "30")
                .build(),
        );
        let handler = ResourceHandler::new(ResourceKind::Queue, Arc::new(api));

        let outcome = handler
            .fetch_details(&ctx(), &["orders".to_string(), "ghost".to_string()])
            .await;

        assert_eq!(outcome.resources.len(), 1);
        assert_eq!(outcome.resources[0].attribute("VisibilityTimeout"), Some("30"));
        assert_eq!(outcome.notes, vec!["Queue not exists: [ghost]".to_string()]);
    }
}
