//! Values the diff engine walks

use crate::resource::ResourceId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A projected field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Terminal value
    Scalar(String),
    /// Ordered fields, as declared by a schema
    Record(Vec<(String, Value)>),
    /// Keyed container; sets are keyed by their members
    Keyed(BTreeMap<String, Value>),
    /// Reference to another resource, resolved lazily during the walk
    Ref(ResourceId),
}

impl Value {
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Set of plain members
    pub fn set<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Keyed(
            members
                .into_iter()
                .map(Into::into)
                .map(|m: String| (m.clone(), Self::Scalar(m)))
                .collect(),
        )
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Record(_) | Self::Keyed(_))
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// True when a keyed entry only repeats its own key
    fn is_member_of(&self, key: &str) -> bool {
        match self {
            Self::Scalar(s) => s == key,
            Self::Ref(id) => id.name == key,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s),
            Self::Ref(id) => f.write_str(&id.name),
            Self::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Keyed(map) => {
                if map.iter().all(|(k, v)| v.is_member_of(k)) {
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    write!(f, "[{}]", keys.join(", "))
                } else {
                    f.write_str("{")?;
                    for (i, (key, value)) in map.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{key}: {value}")?;
                    }
                    f.write_str("}")
                }
            }
        }
    }
}
