//! Cloud API collaborator contract
//!
//! The engine never talks to a transport directly. Every kind is served by a
//! [`ResourceApi`] that lists, describes, deletes and reports usage.

use super::model::FetchContext;
use super::usage::Usage;
use crate::error::ApiError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// One page of a listing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub names: Vec<String>,
    /// Continuation token for the next call
    pub next: Option<String>,
    /// Exhaustion signal; `false` ends the cursor chain regardless of `next`
    pub has_more: bool,
}

impl Page {
    pub fn last(names: Vec<String>) -> Self {
        Self {
            names,
            next: None,
            has_more: false,
        }
    }

    pub fn more(names: Vec<String>, next: impl Into<String>) -> Self {
        Self {
            names,
            next: Some(next.into()),
            has_more: true,
        }
    }
}

/// Attributes and relations returned by a describe call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub attributes: BTreeMap<String, String>,
    pub relations: BTreeMap<String, BTreeSet<String>>,
}

#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn list_page(
        &self,
        ctx: &FetchContext,
        cursor: Option<&str>,
    ) -> Result<Page, ApiError>;

    async fn describe(&self, ctx: &FetchContext, name: &str) -> Result<Description, ApiError>;

    async fn delete(&self, ctx: &FetchContext, name: &str) -> Result<(), ApiError>;

    /// Usage over the trailing window; `Usage::None` when no signal exists
    async fn usage(
        &self,
        ctx: &FetchContext,
        name: &str,
        window_days: u32,
    ) -> Result<Usage, ApiError>;
}
