//! Resource Registry - kind definitions and the handler factory
//!
//! Kind definitions describe how the gateway exposes each kind (listing
//! path, cursor fields, describe/delete paths, usage source). They are
//! embedded JSON files parsed once on first access.

use super::api::ResourceApi;
use super::fetcher::ResourceHandler;
use super::model::ResourceKind;
use crate::error::ReaperError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Embedded kind definition files (compiled into the binary)
const DEFINITION_FILES: &[&str] = &[
    include_str!("../resources/messaging.json"),
    include_str!("../resources/compute.json"),
    include_str!("../resources/iam.json"),
];

/// How a kind's listing call is shaped
#[derive(Debug, Clone, Deserialize)]
pub struct ListDef {
    pub path: String,
    /// Dot path to the item array in the response; empty means the body itself
    #[serde(default)]
    pub items_path: String,
    /// Field holding the name when items are objects; `None` for plain strings
    #[serde(default)]
    pub name_field: Option<String>,
    /// Query parameter carrying the cursor
    pub cursor_param: String,
    /// Response field holding the next cursor
    pub next_token_field: String,
    /// Response field with an explicit "more pages" flag, when the API has one
    #[serde(default)]
    pub has_more_field: Option<String>,
}

/// Where the usage signal for a kind comes from
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum UsageDef {
    /// Sum of metric datapoints over the window
    Metric {
        namespace: String,
        dimension: String,
        metrics: Vec<String>,
    },
    /// Timestamp of last authentication or access
    LastAccessed { path: String, field: String },
    #[default]
    None,
}

/// Definition of one resource kind
#[derive(Debug, Clone, Deserialize)]
pub struct KindDef {
    pub display_name: String,
    pub service: String,
    pub list: ListDef,
    pub describe_path: String,
    pub delete_path: String,
    #[serde(default)]
    pub usage: UsageDef,
    /// Relation names the describe call reports
    #[serde(default)]
    pub relations: Vec<String>,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionSet {
    #[serde(default)]
    pub kinds: HashMap<ResourceKind, KindDef>,
}

static DEFINITIONS: OnceLock<DefinitionSet> = OnceLock::new();

/// Get the definition set (parsed from embedded JSON on first access)
pub fn get_definitions() -> &'static DefinitionSet {
    DEFINITIONS.get_or_init(|| {
        let mut merged = DefinitionSet {
            kinds: HashMap::new(),
        };

        for content in DEFINITION_FILES {
            let partial: DefinitionSet = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded kind definitions: {}", e));
            merged.kinds.extend(partial.kinds);
        }

        merged
    })
}

/// Get the definition for a kind
pub fn get_kind_def(kind: ResourceKind) -> Option<&'static KindDef> {
    get_definitions().kinds.get(&kind)
}

/// Maps each supported kind to its fetch/terminate implementation
#[derive(Clone, Default)]
pub struct ResourceFactory {
    handlers: HashMap<ResourceKind, ResourceHandler>,
}

impl ResourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ResourceKind, api: Arc<dyn ResourceApi>) -> Self {
        self.handlers.insert(kind, ResourceHandler::new(kind, api));
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Result<ResourceHandler, ReaperError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| ReaperError::UnsupportedKind(kind.tag().to_string()))
    }

    /// Resolve a configuration tag; unknown tags and unregistered kinds both fail
    pub fn get_by_tag(&self, tag: &str) -> Result<ResourceHandler, ReaperError> {
        self.get(tag.parse()?)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
