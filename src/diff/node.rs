//! Diff tree

use super::value::Value;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    /// Named field of a record
    Field(String),
    /// Entry of a keyed container
    Key(String),
}

/// Render a path as `field.sub[key]`; the root path renders as `/`
pub fn render_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in path {
        match segment {
            PathSegment::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            PathSegment::Key(key) => {
                out.push('[');
                out.push_str(key);
                out.push(']');
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffState {
    Unchanged,
    Added,
    Removed,
    Changed,
    Ignored,
    Circular,
}

impl DiffState {
    /// Whether this state makes the enclosing node changed
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Added | Self::Removed | Self::Changed)
    }
}

impl fmt::Display for DiffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
            Self::Ignored => "ignored",
            Self::Circular => "circular",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffNode {
    pub path: Vec<PathSegment>,
    pub state: DiffState,
    pub base: Option<Value>,
    pub target: Option<Value>,
    pub children: Vec<DiffNode>,
}

impl DiffNode {
    pub fn leaf(
        path: Vec<PathSegment>,
        state: DiffState,
        base: Option<Value>,
        target: Option<Value>,
    ) -> Self {
        Self {
            path,
            state,
            base,
            target,
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn path_string(&self) -> String {
        render_path(&self.path)
    }

    pub fn has_changes(&self) -> bool {
        self.state.is_change()
    }

    /// Leaf/root filter that yields one line per leaf difference
    pub fn is_reportable(&self) -> bool {
        (self.is_root() && self.state != DiffState::Unchanged)
            || (self.state != DiffState::Unchanged && self.children.is_empty())
    }

    /// Reportable nodes in pre-order (declaration order of fields)
    pub fn reportable(&self) -> Vec<&DiffNode> {
        let mut out = Vec::new();
        self.collect_reportable(&mut out);
        out
    }

    fn collect_reportable<'a>(&'a self, out: &mut Vec<&'a DiffNode>) {
        if self.is_reportable() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_reportable(out);
        }
    }

    /// Find a node by its rendered path
    pub fn find(&self, path: &str) -> Option<&DiffNode> {
        if self.path_string() == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// One human-readable line for this node
    pub fn describe(&self) -> String {
        let detail = match self.state {
            DiffState::Unchanged => "unchanged".to_string(),
            DiffState::Ignored => "ignored".to_string(),
            DiffState::Added => format!("added '{}'", display(&self.target)),
            DiffState::Removed => format!("removed '{}'", display(&self.base)),
            DiffState::Changed if !self.children.is_empty() => {
                let count = self.reportable().iter().filter(|n| !n.is_root()).count();
                format!("changed ({} differences)", count)
            }
            DiffState::Changed => format!(
                "changed from '{}' to '{}'",
                display(&self.base),
                display(&self.target)
            ),
            DiffState::Circular => format!(
                "circular reference to '{}' detected, not descending",
                display(&self.base)
            ),
        };
        format!("{}: {}", self.path_string(), detail)
    }

    /// Render every reportable node
    pub fn render(&self) -> Vec<String> {
        self.reportable().into_iter().map(DiffNode::describe).collect()
    }
}

fn display(value: &Option<Value>) -> String {
    value.as_ref().map(Value::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_path() {
        assert_eq!(render_path(&[]), "/");
        assert_eq!(
            render_path(&[
                PathSegment::Field("alarms".into()),
                PathSegment::Key("x".into()),
                PathSegment::Field("threshold".into()),
            ]),
            "alarms[x].threshold"
        );
    }

    #[test]
    fn test_reportable_filter() {
        let leaf = DiffNode::leaf(
            vec![PathSegment::Field("a".into())],
            DiffState::Changed,
            Some(Value::scalar("1")),
            Some(Value::scalar("2")),
        );
        let unchanged = DiffNode::leaf(
            vec![PathSegment::Field("b".into())],
            DiffState::Unchanged,
            Some(Value::scalar("1")),
            Some(Value::scalar("1")),
        );
        let mut parent = DiffNode::leaf(
            vec![PathSegment::Field("p".into())],
            DiffState::Changed,
            None,
            None,
        );
        parent.children = vec![leaf.clone(), unchanged.clone()];

        assert!(leaf.is_reportable());
        assert!(!unchanged.is_reportable());
        assert!(!parent.is_reportable());
        assert_eq!(parent.reportable().len(), 1);
        assert_eq!(leaf.describe(), "a: changed from '1' to '2'");
    }
}
