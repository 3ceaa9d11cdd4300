//! Resource model
//!
//! Plain values produced by fetchers. A [`Resource`] is built once through
//! [`ResourceBuilder`] and only read afterwards.

use crate::error::ReaperError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Closed set of resource kinds the engine knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKind {
    Queue,
    Function,
    Table,
    Alarm,
    Topic,
    Role,
    Policy,
    Stream,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        Self::Queue,
        Self::Function,
        Self::Table,
        Self::Alarm,
        Self::Topic,
        Self::Role,
        Self::Policy,
        Self::Stream,
    ];

    /// Stable tag used in configuration and dispatch
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Function => "function",
            Self::Table => "table",
            Self::Alarm => "alarm",
            Self::Topic => "topic",
            Self::Role => "role",
            Self::Policy => "policy",
            Self::Stream => "stream",
        }
    }

    /// Human-readable label used in diagnostic notes
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Queue => "Queue",
            Self::Function => "Function",
            Self::Table => "Table",
            Self::Alarm => "Alarm",
            Self::Topic => "Topic",
            Self::Role => "Role",
            Self::Policy => "Policy",
            Self::Stream => "Stream",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ResourceKind {
    type Err = ReaperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| ReaperError::UnsupportedKind(s.to_string()))
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = ReaperError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.tag().to_string()
    }
}

/// Identity of a resource: `(kind, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Credential and region scope a fetch or terminate call runs under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchContext {
    pub region: String,
    #[serde(default)]
    pub assume_role_arn: Option<String>,
}

impl FetchContext {
    pub fn new(region: &str, assume_role_arn: Option<&str>) -> Self {
        Self {
            region: region.to_string(),
            assume_role_arn: assume_role_arn
                .filter(|arn| !arn.is_empty())
                .map(str::to_string),
        }
    }
}

impl fmt::Display for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.assume_role_arn {
            Some(arn) => write!(f, "{} as {}", self.region, arn),
            None => f.write_str(&self.region),
        }
    }
}

/// One cloud object with its attributes and discovered cross-references
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    name: String,
    kind: ResourceKind,
    attributes: BTreeMap<String, String>,
    relations: BTreeMap<String, BTreeSet<String>>,
}

impl Resource {
    pub fn builder(kind: ResourceKind, name: impl Into<String>) -> ResourceBuilder {
        ResourceBuilder {
            inner: Resource {
                name: name.into(),
                kind,
                attributes: BTreeMap::new(),
                relations: BTreeMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind, self.name.clone())
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn relations(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.relations
    }

    pub fn relation(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.relations.get(key)
    }
}

/// Builder used by fetchers; the only way to populate a [`Resource`]
#[derive(Debug)]
pub struct ResourceBuilder {
    inner: Resource,
}

impl ResourceBuilder {
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inner
            .attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add members to a relation; an empty iterator still records the relation
    pub fn relation<I, S>(mut self, key: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner
            .relations
            .entry(key.into())
            .or_default()
            .extend(members.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Resource {
        self.inner
    }
}
