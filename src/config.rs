//! Configuration Management
//!
//! Run settings merged from three layers, highest first: command-line
//! parameters, a named config file, the default config file. A present field
//! always wins over a missing one.

use crate::error::{ReaperError, ValidationError};
use crate::pool::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE, DEFAULT_WORKERS};
use crate::reconcile::{ReconcileRequest, DEFAULT_POLL_INTERVAL};
use crate::resource::{FetchContext, ResourceKind, DEFAULT_WINDOW_DAYS};
use crate::terminate::TerminationRequest;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One configuration layer; every field is optional until merged
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub region: Option<String>,
    /// Resource kind tag, e.g. `queue`
    #[serde(default)]
    pub kind: Option<String>,
    /// `;`-separated names; `+` stands for a space inside a name
    #[serde(default)]
    pub resources: Option<String>,
    /// Ticket or free-text reason, passed to hooks as audit info
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assume_role_arn: Option<String>,
    #[serde(default)]
    pub apply: Option<bool>,
    #[serde(default)]
    pub force: Option<bool>,
    #[serde(default)]
    pub last_usage_window_days: Option<u32>,
    /// Gateway endpoint; `{region}` is replaced per client
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub source_region: Option<String>,
    #[serde(default)]
    pub target_region: Option<String>,
    #[serde(default)]
    pub source_role_arn: Option<String>,
    #[serde(default)]
    pub target_role_arn: Option<String>,
    #[serde(default)]
    pub compare_fields: Option<Vec<String>>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub shutdown_grace_secs: Option<u64>,
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloud-reaper").join("config.json"))
    }

    /// Read one layer from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load the file layers: the named file over the default file.
    ///
    /// A missing default file is an empty layer; a missing named file is an error.
    pub fn load(named: Option<&Path>) -> Result<Self> {
        let default = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        match named {
            Some(path) => Ok(Self::from_file(path)?.merge(default)),
            None => Ok(default),
        }
    }

    /// Fill every missing field of `self` from `lower`
    pub fn merge(self, lower: Config) -> Config {
        Config {
            region: self.region.or(lower.region),
            kind: self.kind.or(lower.kind),
            resources: self.resources.or(lower.resources),
            description: self.description.or(lower.description),
            assume_role_arn: self.assume_role_arn.or(lower.assume_role_arn),
            apply: self.apply.or(lower.apply),
            force: self.force.or(lower.force),
            last_usage_window_days: self.last_usage_window_days.or(lower.last_usage_window_days),
            endpoint: self.endpoint.or(lower.endpoint),
            source_region: self.source_region.or(lower.source_region),
            target_region: self.target_region.or(lower.target_region),
            source_role_arn: self.source_role_arn.or(lower.source_role_arn),
            target_role_arn: self.target_role_arn.or(lower.target_role_arn),
            compare_fields: self.compare_fields.or(lower.compare_fields),
            workers: self.workers.or(lower.workers),
            queue_capacity: self.queue_capacity.or(lower.queue_capacity),
            poll_interval_ms: self.poll_interval_ms.or(lower.poll_interval_ms),
            shutdown_grace_secs: self.shutdown_grace_secs.or(lower.shutdown_grace_secs),
            audit_log: self.audit_log.or(lower.audit_log),
        }
    }

    pub fn resource_kind(&self) -> Result<ResourceKind, ReaperError> {
        let tag = required(&self.kind, "kind")?;
        tag.parse()
    }

    pub fn fetch_context(&self) -> Result<FetchContext, ValidationError> {
        let region = required(&self.region, "region")?;
        Ok(FetchContext::new(region, self.assume_role_arn.as_deref()))
    }

    pub fn endpoint(&self) -> Result<&str, ValidationError> {
        required(&self.endpoint, "endpoint")
    }

    pub fn window_days(&self) -> Result<u32, ValidationError> {
        match self.last_usage_window_days {
            Some(0) => Err(ValidationError::Invalid {
                field: "lastUsageWindowDays",
                detail: "must be at least 1".to_string(),
            }),
            Some(days) => Ok(days),
            None => Ok(DEFAULT_WINDOW_DAYS),
        }
    }

    /// Validate and build a termination request.
    ///
    /// Missing region, kind, resources or description fail before any API call.
    pub fn termination_request(&self) -> Result<TerminationRequest, ReaperError> {
        let context = self.fetch_context()?;
        let kind = self.resource_kind()?;
        let names = parse_resources(required(&self.resources, "resources")?);
        if names.is_empty() {
            return Err(ValidationError::Missing("resources").into());
        }
        let description = required(&self.description, "description")?;

        Ok(TerminationRequest {
            kind,
            context,
            names,
            audit_info: Some(description.to_string()),
            apply: self.apply.unwrap_or(false),
            force: self.force.unwrap_or(false),
            window_days: self.window_days()?,
        })
    }

    /// Validate and build a reconciliation request.
    ///
    /// Each side falls back to `region`/`assumeRoleArn` when its own
    /// setting is missing.
    pub fn reconcile_request(&self) -> Result<ReconcileRequest, ReaperError> {
        let kind = self.resource_kind()?;
        let source_region = self
            .source_region
            .as_deref()
            .or(self.region.as_deref())
            .ok_or(ValidationError::Missing("sourceRegion"))?;
        let target_region = self
            .target_region
            .as_deref()
            .or(self.region.as_deref())
            .ok_or(ValidationError::Missing("targetRegion"))?;
        let source = FetchContext::new(
            source_region,
            self.source_role_arn.as_deref().or(self.assume_role_arn.as_deref()),
        );
        let target = FetchContext::new(
            target_region,
            self.target_role_arn.as_deref().or(self.assume_role_arn.as_deref()),
        );
        if source == target {
            return Err(ValidationError::Invalid {
                field: "targetRegion",
                detail: format!("source and target are both {source}"),
            }
            .into());
        }

        let mut request = ReconcileRequest::new(kind, source, target);
        request.compare_fields = self.compare_fields.clone().unwrap_or_default();
        request.poll_interval = self
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        Ok(request)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE)
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::Missing(name))
}

/// Split a resource list: `;` separates names and `+` decodes to a space.
/// Blank entries and repeats are dropped; first occurrence keeps its place.
pub fn parse_resources(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(';')
        .map(|name| name.replace('+', " ").trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}
