//! Diff Engine
//!
//! Structural walk over schema projections. References to other resources are
//! followed through a [`Snapshot`]; a reference to a resource already on the
//! current path becomes a `Circular` node and the walk stops there.

use super::node::{DiffNode, DiffState, PathSegment};
use super::schema::Schema;
use super::value::Value;
use crate::resource::{Resource, ResourceId, ResourceKind};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

/// Resources a walk may follow references into
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    resources: HashMap<ResourceId, Resource>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: Resource) {
        self.resources.insert(resource.id(), resource);
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl FromIterator<Resource> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for resource in iter {
            snapshot.insert(resource);
        }
        snapshot
    }
}

/// Comparator over per-kind schemas
#[derive(Debug, Clone)]
pub struct DiffEngine {
    schemas: HashMap<ResourceKind, Schema>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self {
            schemas: ResourceKind::ALL
                .into_iter()
                .map(|kind| (kind, Schema::for_kind(kind)))
                .collect(),
        }
    }
}

impl DiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the schema used for one kind
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.insert(schema.kind, schema);
        self
    }

    pub fn schema(&self, kind: ResourceKind) -> Cow<'_, Schema> {
        match self.schemas.get(&kind) {
            Some(schema) => Cow::Borrowed(schema),
            None => Cow::Owned(Schema::for_kind(kind)),
        }
    }

    /// Compare two resources; references resolve only to the resources themselves
    pub fn compare(&self, base: &Resource, target: &Resource) -> DiffNode {
        let base_graph: Snapshot = [base.clone()].into_iter().collect();
        let target_graph: Snapshot = [target.clone()].into_iter().collect();
        self.compare_in(base, target, &base_graph, &target_graph)
    }

    /// Compare two resources, following references through the given snapshots
    pub fn compare_in(
        &self,
        base: &Resource,
        target: &Resource,
        base_graph: &Snapshot,
        target_graph: &Snapshot,
    ) -> DiffNode {
        let mut walk = Walk {
            engine: self,
            base_graph,
            target_graph,
            on_path: Vec::new(),
        };
        walk.resources(Vec::new(), base, target)
    }
}

struct Walk<'a> {
    engine: &'a DiffEngine,
    base_graph: &'a Snapshot,
    target_graph: &'a Snapshot,
    /// Resources entered on the current path
    on_path: Vec<ResourceId>,
}

impl Walk<'_> {
    fn resources(&mut self, path: Vec<PathSegment>, base: &Resource, target: &Resource) -> DiffNode {
        if base.kind() != target.kind() {
            return DiffNode::leaf(
                path,
                DiffState::Changed,
                Some(Value::Ref(base.id())),
                Some(Value::Ref(target.id())),
            );
        }

        let engine = self.engine;
        let schema = engine.schema(base.kind());
        let base_value = schema.project(base);
        let target_value = schema.project(target);

        let base_id = base.id();
        let target_id = target.id();
        self.on_path.push(base_id.clone());
        if target_id != base_id {
            self.on_path.push(target_id.clone());
        }

        let node = self.records(path, &base_value, &target_value, Some(&*schema));

        self.on_path.pop();
        if target_id != base_id {
            self.on_path.pop();
        }
        node
    }

    fn records(
        &mut self,
        path: Vec<PathSegment>,
        base: &Value,
        target: &Value,
        schema: Option<&Schema>,
    ) -> DiffNode {
        let (Value::Record(base_fields), Value::Record(target_fields)) = (base, target) else {
            return self.values(path, base, target);
        };

        // Declaration order: base fields, then fields only the target has
        let mut names: Vec<&str> = base_fields.iter().map(|(n, _)| n.as_str()).collect();
        for (name, _) in target_fields {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        if let Some(schema) = schema {
            let declared: Vec<&str> = schema.fields().iter().map(|f| f.name).collect();
            names.sort_by_key(|n| declared.iter().position(|d| d == n).unwrap_or(usize::MAX));
        }

        let children = names
            .into_iter()
            .map(|name| {
                let child_path = extend(&path, PathSegment::Field(name.to_string()));
                let b = base.field(name);
                let t = target.field(name);
                let ignored = schema.is_some_and(|s| s.is_ignored(name));
                if ignored && b != t {
                    DiffNode::leaf(child_path, DiffState::Ignored, b.cloned(), t.cloned())
                } else if ignored {
                    DiffNode::leaf(child_path, DiffState::Unchanged, b.cloned(), t.cloned())
                } else {
                    self.optional(child_path, b, t)
                }
            })
            .collect();

        parent(path, base, target, children)
    }

    fn optional(
        &mut self,
        path: Vec<PathSegment>,
        base: Option<&Value>,
        target: Option<&Value>,
    ) -> DiffNode {
        match (base, target) {
            (Some(b), Some(t)) => self.values(path, b, t),
            (Some(b), None) => DiffNode::leaf(path, DiffState::Removed, Some(b.clone()), None),
            (None, Some(t)) => DiffNode::leaf(path, DiffState::Added, None, Some(t.clone())),
            (None, None) => DiffNode::leaf(path, DiffState::Unchanged, None, None),
        }
    }

    fn values(&mut self, path: Vec<PathSegment>, base: &Value, target: &Value) -> DiffNode {
        match (base, target) {
            (Value::Ref(b), Value::Ref(t)) => self.references(path, b, t),
            (Value::Keyed(b), Value::Keyed(t)) => {
                let keys: BTreeSet<&String> = b.keys().chain(t.keys()).collect();
                let children = keys
                    .into_iter()
                    .map(|key| {
                        self.optional(extend(&path, PathSegment::Key(key.clone())), b.get(key), t.get(key))
                    })
                    .collect();
                parent(path, base, target, children)
            }
            (Value::Record(_), Value::Record(_)) => self.records(path, base, target, None),
            _ => {
                let state = if base == target {
                    DiffState::Unchanged
                } else {
                    DiffState::Changed
                };
                DiffNode::leaf(path, state, Some(base.clone()), Some(target.clone()))
            }
        }
    }

    fn references(&mut self, path: Vec<PathSegment>, base: &ResourceId, target: &ResourceId) -> DiffNode {
        if self.on_path.contains(base) || self.on_path.contains(target) {
            return DiffNode::leaf(
                path,
                DiffState::Circular,
                Some(Value::Ref(base.clone())),
                Some(Value::Ref(target.clone())),
            );
        }

        match (self.base_graph.get(base), self.target_graph.get(target)) {
            (Some(b), Some(t)) => self.resources(path, b, t),
            _ => {
                // Unresolvable references compare by identity
                let state = if base == target {
                    DiffState::Unchanged
                } else {
                    DiffState::Changed
                };
                DiffNode::leaf(
                    path,
                    state,
                    Some(Value::Ref(base.clone())),
                    Some(Value::Ref(target.clone())),
                )
            }
        }
    }
}

fn extend(path: &[PathSegment], segment: PathSegment) -> Vec<PathSegment> {
    let mut out = path.to_vec();
    out.push(segment);
    out
}

fn parent(path: Vec<PathSegment>, base: &Value, target: &Value, children: Vec<DiffNode>) -> DiffNode {
    let state = if children.iter().any(DiffNode::has_changes) {
        DiffState::Changed
    } else {
        DiffState::Unchanged
    };
    DiffNode {
        path,
        state,
        base: Some(base.clone()),
        target: Some(target.clone()),
        children,
    }
}
