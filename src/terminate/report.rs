//! Termination report
//!
//! What a run did, or would have done, to each requested resource.

use crate::resource::{FetchContext, ResourceId, ResourceKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Recent usage; left in place
    Skipped,
    /// Dry run; would have been deleted
    WouldDelete,
    Deleted,
    /// Usage or delete call failed; see the reason
    Failed,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "Skipped",
            Self::WouldDelete => "WouldDelete",
            Self::Deleted => "Deleted",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub resource: ResourceId,
    pub action: Action,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminationReport {
    pub run_id: Uuid,
    pub kind: ResourceKind,
    pub context: FetchContext,
    pub apply: bool,
    pub force: bool,
    pub audit_info: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<Outcome>,
    pub notes: Vec<String>,
}

impl TerminationReport {
    pub fn new(
        kind: ResourceKind,
        context: FetchContext,
        apply: bool,
        force: bool,
        audit_info: Option<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            context,
            apply,
            force,
            audit_info,
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn record(&mut self, resource: ResourceId, action: Action, reason: impl Into<String>) {
        self.outcomes.push(Outcome {
            resource,
            action,
            reason: reason.into(),
        });
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn with_action(&self, action: Action) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(move |o| o.action == action)
    }

    pub fn count(&self, action: Action) -> usize {
        self.with_action(action).count()
    }

    /// Names with the given action, in processing order
    pub fn names(&self, action: Action) -> Vec<&str> {
        self.with_action(action).map(|o| o.resource.name.as_str()).collect()
    }

    pub fn summary(&self) -> String {
        let mode = if self.apply { "apply" } else { "dry-run" };
        format!(
            "{} {} in {}: {} deleted, {} would delete, {} skipped, {} failed, {} notes",
            mode,
            self.kind,
            self.context,
            self.count(Action::Deleted),
            self.count(Action::WouldDelete),
            self.count(Action::Skipped),
            self.count(Action::Failed),
            self.notes.len()
        )
    }

    /// Human-readable lines: one per outcome, then notes
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| format!("{:<12} {} ({})", o.action.as_str(), o.resource.name, o.reason))
            .collect();
        lines.extend(self.notes.iter().map(|n| format!("note: {n}")));
        lines
    }
}
