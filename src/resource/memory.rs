//! In-memory collaborator
//!
//! A [`ResourceApi`] backed by a map, used to exercise the engine without a
//! gateway. Listing pages by a fixed size, and every delete call is recorded.

use super::api::{Description, Page, ResourceApi};
use super::model::{FetchContext, Resource, ResourceKind};
use super::usage::Usage;
use crate::error::ApiError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct MemoryApi {
    kind: ResourceKind,
    page_size: usize,
    fail_on_page: Option<usize>,
    resources: Mutex<BTreeMap<String, Resource>>,
    usage: Mutex<BTreeMap<String, Usage>>,
    conflicts: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
}

impl MemoryApi {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            page_size: 50,
            fail_on_page: None,
            resources: Mutex::new(BTreeMap::new()),
            usage: Mutex::new(BTreeMap::new()),
            conflicts: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make the given 1-based listing page fail with a transient error
    pub fn fail_list_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn insert(&self, resource: Resource) {
        lock(&self.resources).insert(resource.name().to_string(), resource);
    }

    pub fn set_usage(&self, name: &str, usage: Usage) {
        lock(&self.usage).insert(name.to_string(), usage);
    }

    /// Deleting `name` will be refused with a conflict
    pub fn refuse_delete(&self, name: &str) {
        lock(&self.conflicts).insert(name.to_string());
    }

    /// Names passed to `delete`, in call order
    pub fn delete_calls(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ResourceApi for MemoryApi {
    async fn list_page(
        &self,
        _ctx: &FetchContext,
        cursor: Option<&str>,
    ) -> Result<Page, ApiError> {
        let page_number = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_page == Some(page_number) {
            return Err(ApiError::Transient(format!(
                "listing {} failed on page {}",
                self.kind, page_number
            )));
        }

        let offset = match cursor {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ApiError::Transient(format!("invalid cursor: {token}")))?,
        };

        let names: Vec<String> = lock(&self.resources).keys().cloned().collect();
        let end = (offset + self.page_size).min(names.len());
        let page = names.get(offset..end).map(<[String]>::to_vec).unwrap_or_default();

        if end < names.len() {
            Ok(Page::more(page, end.to_string()))
        } else {
            Ok(Page::last(page))
        }
    }

    async fn describe(&self, _ctx: &FetchContext, name: &str) -> Result<Description, ApiError> {
        let resources = lock(&self.resources);
        let resource = resources
            .get(name)
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", self.kind, name)))?;
        Ok(Description {
            attributes: resource.attributes().clone(),
            relations: resource.relations().clone(),
        })
    }

    async fn delete(&self, _ctx: &FetchContext, name: &str) -> Result<(), ApiError> {
        lock(&self.deleted).push(name.to_string());
        if lock(&self.conflicts).contains(name) {
            return Err(ApiError::Conflict(format!("{} {} is in use", self.kind, name)));
        }
        match lock(&self.resources).remove(name) {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(format!("{} {}", self.kind, name))),
        }
    }

    async fn usage(
        &self,
        _ctx: &FetchContext,
        name: &str,
        _window_days: u32,
    ) -> Result<Usage, ApiError> {
        Ok(lock(&self.usage).get(name).cloned().unwrap_or(Usage::None))
    }
}
