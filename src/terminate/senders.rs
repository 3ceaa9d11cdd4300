//! Output Senders
//!
//! Delivery targets for termination results, registered as hooks. The set is
//! fixed per deployment and assembled once at startup by [`build_interceptors`].

use super::hooks::{AfterHook, BeforeHook, HookContext, Interceptors};
use super::report::{Action, TerminationReport};
use crate::resource::ResourceKind;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Level of detail for the log sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailLevel {
    /// One summary line per run
    Minimal,
    /// Summary plus one line per outcome
    #[default]
    Detailed,
    /// Everything, including diagnostic notes
    Verbose,
}

impl DetailLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "minimal" => Self::Minimal,
            "verbose" => Self::Verbose,
            _ => Self::Detailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Detailed => "detailed",
            Self::Verbose => "verbose",
        }
    }
}

/// Reports runs through `tracing`
pub struct LogSender {
    detail: DetailLevel,
}

impl LogSender {
    pub fn new(detail: DetailLevel) -> Self {
        Self { detail }
    }
}

#[async_trait]
impl BeforeHook for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn before(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        let verb = if ctx.apply { "Deleting" } else { "Dry run for" };
        tracing::info!(
            "{} {} {} resources in {} [{}]",
            verb,
            ctx.resources.len(),
            ctx.kind,
            ctx.context,
            ctx.audit_info.unwrap_or("no audit info")
        );
        if self.detail != DetailLevel::Minimal {
            for resource in ctx.resources {
                tracing::info!("  candidate {}", resource.name());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AfterHook for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn after(&self, _ctx: &HookContext<'_>, report: &TerminationReport) -> anyhow::Result<()> {
        tracing::info!("{}", report.summary());
        if self.detail == DetailLevel::Minimal {
            return Ok(());
        }
        for outcome in &report.outcomes {
            match outcome.action {
                Action::Failed => tracing::warn!(
                    "{} {}: {}",
                    outcome.action,
                    outcome.resource.name,
                    outcome.reason
                ),
                _ => tracing::info!(
                    "{} {}: {}",
                    outcome.action,
                    outcome.resource.name,
                    outcome.reason
                ),
            }
        }
        if self.detail == DetailLevel::Verbose {
            for note in &report.notes {
                tracing::info!("note: {}", note);
            }
        }
        Ok(())
    }
}

/// Prints the report to stdout once the run is done
pub struct SummarySender;

#[async_trait]
impl AfterHook for SummarySender {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn after(&self, _ctx: &HookContext<'_>, report: &TerminationReport) -> anyhow::Result<()> {
        println!("{}", report.summary());
        for line in report.lines() {
            println!("  {line}");
        }
        Ok(())
    }
}

/// Stage of a run an audit entry was written at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    Pending,
    Done,
}

/// One line of the audit log
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub stage: AuditStage,
    pub kind: ResourceKind,
    pub region: String,
    pub resource: String,
    pub action: Option<Action>,
    pub reason: Option<String>,
    pub apply: bool,
    pub audit_info: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Appends JSON lines to an audit file: a pending entry per candidate before
/// the decision, and an entry per outcome after it
pub struct AuditLogSender {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLogSender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, entries: &[AuditEntry]) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl BeforeHook for AuditLogSender {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn before(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        let now = Utc::now();
        let entries: Vec<AuditEntry> = ctx
            .resources
            .iter()
            .map(|r| AuditEntry {
                id: Uuid::new_v4(),
                stage: AuditStage::Pending,
                kind: ctx.kind,
                region: ctx.context.region.clone(),
                resource: r.name().to_string(),
                action: None,
                reason: None,
                apply: ctx.apply,
                audit_info: ctx.audit_info.map(str::to_string),
                recorded_at: now,
            })
            .collect();
        self.append(&entries).await
    }
}

#[async_trait]
impl AfterHook for AuditLogSender {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn after(&self, ctx: &HookContext<'_>, report: &TerminationReport) -> anyhow::Result<()> {
        let now = Utc::now();
        let entries: Vec<AuditEntry> = report
            .outcomes
            .iter()
            .map(|o| AuditEntry {
                id: Uuid::new_v4(),
                stage: AuditStage::Done,
                kind: ctx.kind,
                region: ctx.context.region.clone(),
                resource: o.resource.name.clone(),
                action: Some(o.action),
                reason: Some(o.reason.clone()),
                apply: ctx.apply,
                audit_info: ctx.audit_info.map(str::to_string),
                recorded_at: now,
            })
            .collect();
        self.append(&entries).await
    }
}

/// Settings that decide which senders are registered
#[derive(Debug, Clone, Default)]
pub struct SenderSettings {
    pub log_detail: DetailLevel,
    pub audit_log: Option<PathBuf>,
    /// Print the report to stdout
    pub summary: bool,
}

/// Build the hook lists for this process
pub fn build_interceptors(settings: &SenderSettings) -> Interceptors {
    let mut interceptors = Interceptors::new();

    let log = Arc::new(LogSender::new(settings.log_detail));
    interceptors.register_before(log.clone());
    interceptors.register_after(log);

    if let Some(path) = &settings.audit_log {
        let audit = Arc::new(AuditLogSender::new(path.clone()));
        interceptors.register_before(audit.clone());
        interceptors.register_after(audit);
    }

    if settings.summary {
        interceptors.register_after(Arc::new(SummarySender));
    }

    interceptors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{FetchContext, Resource, ResourceId};

    #[test]
    fn test_detail_level_parsing() {
        assert_eq!(DetailLevel::from_str("MINIMAL"), DetailLevel::Minimal);
        assert_eq!(DetailLevel::from_str("verbose"), DetailLevel::Verbose);
        assert_eq!(DetailLevel::from_str("anything"), DetailLevel::Detailed);
    }

    #[test]
    fn test_build_interceptors_registers_audit_only_when_configured() {
        let plain = build_interceptors(&SenderSettings::default());
        assert_eq!((plain.before_count(), plain.after_count()), (1, 1));

        let audited = build_interceptors(&SenderSettings {
            log_detail: DetailLevel::Minimal,
            audit_log: Some(PathBuf::from("/tmp/audit.jsonl")),
            summary: true,
        });
        assert_eq!((audited.before_count(), audited.after_count()), (2, 3));
    }

    #[tokio::test]
    async fn test_audit_log_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let sender = AuditLogSender::new(&path);

        let context = FetchContext::new("us-east-1", None);
        let resources = vec![
            Resource::builder(ResourceKind::Queue, "a").build(),
            Resource::builder(ResourceKind::Queue, "b").build(),
        ];
        let ctx = HookContext {
            kind: ResourceKind::Queue,
            context: &context,
            resources: &resources,
            audit_info: Some("CHG-42"),
            apply: false,
        };
        sender.before(&ctx).await.unwrap();

        let mut report = TerminationReport::new(
            ResourceKind::Queue,
            context.clone(),
            false,
            false,
            Some("CHG-42".into()),
        );
        report.record(ResourceId::new(ResourceKind::Queue, "a"), Action::WouldDelete, "dry run");
        sender.after(&ctx, &report).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["stage"], "pending");
        assert_eq!(lines[2]["action"], "would_delete");
        assert_eq!(lines[2]["audit_info"], "CHG-42");
        assert_eq!(lines[2]["kind"], "queue");
    }
}
