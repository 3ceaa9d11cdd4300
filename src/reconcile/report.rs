//! Reconciliation report

use crate::diff::DiffNode;
use crate::resource::{FetchContext, ResourceKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Diff of one name listed on both sides
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub name: String,
    pub diff: DiffNode,
}

impl ReconcileEntry {
    pub fn differs(&self) -> bool {
        !self.diff.reportable().is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub run_id: Uuid,
    pub kind: ResourceKind,
    pub source: FetchContext,
    pub target: FetchContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries: Vec<ReconcileEntry>,
    /// Listed by the source only
    pub unmatched_source: Vec<String>,
    /// Listed by the target only
    pub unmatched_target: Vec<String>,
    pub notes: Vec<String>,
}

impl ReconcileReport {
    pub fn new(kind: ResourceKind, source: FetchContext, target: FetchContext) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            source,
            target,
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            unmatched_source: Vec::new(),
            unmatched_target: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn entry(&self, name: &str) -> Option<&ReconcileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn differing(&self) -> impl Iterator<Item = &ReconcileEntry> {
        self.entries.iter().filter(|e| e.differs())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} -> {}: {} compared, {} differ, {} source only, {} target only, {} notes",
            self.kind,
            self.source,
            self.target,
            self.entries.len(),
            self.differing().count(),
            self.unmatched_source.len(),
            self.unmatched_target.len(),
            self.notes.len()
        )
    }

    /// Rendered differences grouped by name, then unmatched names and notes
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for entry in self.differing() {
            lines.push(format!("{}:", entry.name));
            lines.extend(entry.diff.render().into_iter().map(|l| format!("  {l}")));
        }
        lines.extend(self.unmatched_source.iter().map(|n| format!("source only: {n}")));
        lines.extend(self.unmatched_target.iter().map(|n| format!("target only: {n}")));
        lines.extend(self.notes.iter().map(|n| format!("note: {n}")));
        lines
    }
}
