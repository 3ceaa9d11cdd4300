//! Structural diff
//!
//! [`DiffEngine::compare`] walks two resources through the field-descriptor
//! [`Schema`] of their kind and returns the full [`DiffNode`] tree. Rendering
//! applies the reportable filter so only leaf differences are printed.

mod engine;
mod node;
mod schema;
mod value;

pub use engine::{DiffEngine, Snapshot};
pub use node::{render_path, DiffNode, DiffState, PathSegment};
pub use schema::{Accessor, FieldDescriptor, Schema};
pub use value::Value;
