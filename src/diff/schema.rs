//! Field-descriptor tables
//!
//! Each kind declares the fields that take part in a comparison, in the order
//! they are reported. The diff engine only ever sees what a schema projects.

use super::value::Value;
use crate::resource::{Resource, ResourceId, ResourceKind};

/// How a field is read from a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// Attribute value as a terminal
    Attribute(&'static str),
    /// Relation whose members are resources of the given kind
    Relation(&'static str, ResourceKind),
    /// Relation whose members are plain names
    Members(&'static str),
    /// Number of members of a relation
    Count(&'static str),
}

impl Accessor {
    pub fn read(&self, resource: &Resource) -> Option<Value> {
        match *self {
            Self::Attribute(key) => resource.attribute(key).map(Value::scalar),
            Self::Relation(key, kind) => resource.relation(key).map(|members| {
                Value::Keyed(
                    members
                        .iter()
                        .map(|m| (m.clone(), Value::Ref(ResourceId::new(kind, m.clone()))))
                        .collect(),
                )
            }),
            Self::Members(key) => resource.relation(key).map(|members| Value::set(members.iter().cloned())),
            Self::Count(key) => resource
                .relation(key)
                .map(|members| Value::scalar(members.len().to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub accessor: Accessor,
    /// Reported as ignored instead of compared (e.g. account-specific ARNs)
    pub ignored: bool,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, accessor: Accessor) -> Self {
        Self {
            name,
            accessor,
            ignored: false,
        }
    }

    pub const fn ignored(name: &'static str, accessor: Accessor) -> Self {
        Self {
            name,
            accessor,
            ignored: true,
        }
    }
}

use Accessor::{Attribute, Count, Members, Relation};

const QUEUE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("visibility_timeout", Attribute("VisibilityTimeout")),
    FieldDescriptor::new("retention_period", Attribute("MessageRetentionPeriod")),
    FieldDescriptor::new("delay_seconds", Attribute("DelaySeconds")),
    FieldDescriptor::new("max_message_size", Attribute("MaximumMessageSize")),
    FieldDescriptor::new("fifo", Attribute("FifoQueue")),
    FieldDescriptor::new("dead_letter_queue", Relation("dead_letter_queue", ResourceKind::Queue)),
    FieldDescriptor::new("subscription_count", Count("subscriptions")),
    FieldDescriptor::new("alarms", Relation("alarms", ResourceKind::Alarm)),
    FieldDescriptor::ignored("arn", Attribute("QueueArn")),
];

const TOPIC_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("display_name", Attribute("DisplayName")),
    FieldDescriptor::new("subscription_count", Count("subscriptions")),
    FieldDescriptor::new("subscriptions", Members("subscriptions")),
    FieldDescriptor::new("alarms", Relation("alarms", ResourceKind::Alarm)),
    FieldDescriptor::ignored("arn", Attribute("TopicArn")),
];

const FUNCTION_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("runtime", Attribute("Runtime")),
    FieldDescriptor::new("handler", Attribute("Handler")),
    FieldDescriptor::new("memory_size", Attribute("MemorySize")),
    FieldDescriptor::new("timeout", Attribute("Timeout")),
    FieldDescriptor::new("trigger_count", Count("triggers")),
    FieldDescriptor::new("triggers", Members("triggers")),
    FieldDescriptor::new("alarms", Relation("alarms", ResourceKind::Alarm)),
    FieldDescriptor::ignored("arn", Attribute("FunctionArn")),
];

const TABLE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("billing_mode", Attribute("BillingMode")),
    FieldDescriptor::new("read_capacity", Attribute("ReadCapacityUnits")),
    FieldDescriptor::new("write_capacity", Attribute("WriteCapacityUnits")),
    FieldDescriptor::new("stream_enabled", Attribute("StreamEnabled")),
    FieldDescriptor::new("trigger_count", Count("triggers")),
    FieldDescriptor::new("alarms", Relation("alarms", ResourceKind::Alarm)),
    FieldDescriptor::ignored("arn", Attribute("TableArn")),
];

const ALARM_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("metric_name", Attribute("MetricName")),
    FieldDescriptor::new("namespace", Attribute("Namespace")),
    FieldDescriptor::new("threshold", Attribute("Threshold")),
    FieldDescriptor::new("comparison", Attribute("ComparisonOperator")),
    FieldDescriptor::new("evaluation_periods", Attribute("EvaluationPeriods")),
    FieldDescriptor::new("actions", Relation("actions", ResourceKind::Topic)),
];

const ROLE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("path", Attribute("Path")),
    FieldDescriptor::new("max_session_duration", Attribute("MaxSessionDuration")),
    FieldDescriptor::new("policies", Relation("policies", ResourceKind::Policy)),
    FieldDescriptor::new("instance_profiles", Members("instance_profiles")),
    FieldDescriptor::ignored("arn", Attribute("Arn")),
];

const POLICY_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("default_version", Attribute("DefaultVersionId")),
    FieldDescriptor::new("attachment_count", Attribute("AttachmentCount")),
    FieldDescriptor::new("entities", Relation("entities", ResourceKind::Role)),
    FieldDescriptor::ignored("arn", Attribute("Arn")),
];

const STREAM_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("shard_count", Attribute("OpenShardCount")),
    FieldDescriptor::new("retention_period", Attribute("RetentionPeriodHours")),
    FieldDescriptor::new("encryption", Attribute("EncryptionType")),
    FieldDescriptor::new("consumers", Members("consumers")),
    FieldDescriptor::new("alarms", Relation("alarms", ResourceKind::Alarm)),
    FieldDescriptor::ignored("arn", Attribute("StreamARN")),
];

/// Declared comparison fields for one kind
#[derive(Debug, Clone)]
pub struct Schema {
    pub kind: ResourceKind,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new(kind: ResourceKind, fields: Vec<FieldDescriptor>) -> Self {
        Self { kind, fields }
    }

    /// Built-in table for a kind
    pub fn for_kind(kind: ResourceKind) -> Self {
        let fields = match kind {
            ResourceKind::Queue => QUEUE_FIELDS,
            ResourceKind::Topic => TOPIC_FIELDS,
            ResourceKind::Function => FUNCTION_FIELDS,
            ResourceKind::Table => TABLE_FIELDS,
            ResourceKind::Alarm => ALARM_FIELDS,
            ResourceKind::Role => ROLE_FIELDS,
            ResourceKind::Policy => POLICY_FIELDS,
            ResourceKind::Stream => STREAM_FIELDS,
        };
        Self::new(kind, fields.to_vec())
    }

    /// Keep only the named fields, preserving declaration order.
    /// An empty list keeps everything; unknown names are returned as errors.
    pub fn restricted(self, names: &[String]) -> Result<Self, String> {
        if names.is_empty() {
            return Ok(self);
        }
        if let Some(unknown) = names.iter().find(|n| self.field(n).is_none()) {
            return Err(format!("{} has no comparison field '{}'", self.kind, unknown));
        }
        let fields = self
            .fields
            .into_iter()
            .filter(|f| names.iter().any(|n| n == f.name))
            .collect();
        Ok(Self::new(self.kind, fields))
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.ignored)
    }

    /// Project a resource onto this schema; fields the resource lacks are omitted
    pub fn project(&self, resource: &Resource) -> Value {
        Value::Record(
            self.fields
                .iter()
                .filter_map(|f| f.accessor.read(resource).map(|v| (f.name.to_string(), v)))
                .collect(),
        )
    }
}
