//! Usage Evaluator
//!
//! Answers "was this resource used in the last N days?" from the usage signal
//! a fetcher returns.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Default trailing window in days
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Usage signal for one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Usage {
    /// No usage signal exists for this resource
    None,
    /// Summed metric volume over the trailing window
    Volume(f64),
    /// Last time the resource was authenticated or accessed
    LastUsed(DateTime<Utc>),
}

impl Usage {
    /// True when the signal shows activity inside the window ending at `now`
    pub fn is_recent(&self, window_days: u32, now: DateTime<Utc>) -> bool {
        match self {
            Self::None => false,
            Self::Volume(v) => *v > 0.0,
            Self::LastUsed(at) => *at >= now - Duration::days(i64::from(window_days)),
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("no usage data"),
            Self::Volume(v) => write!(f, "volume {v}"),
            Self::LastUsed(at) => write!(f, "last used {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        }
    }
}

/// Evaluate a usage signal against a trailing window
#[derive(Debug, Clone, Copy)]
pub struct UsageEvaluator {
    pub window_days: u32,
}

impl Default for UsageEvaluator {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl UsageEvaluator {
    pub fn new(window_days: u32) -> Self {
        Self { window_days }
    }

    pub fn was_used(&self, usage: &Usage) -> bool {
        self.was_used_at(usage, Utc::now())
    }

    pub fn was_used_at(&self, usage: &Usage, now: DateTime<Utc>) -> bool {
        usage.is_recent(self.window_days, now)
    }

    /// Reason text recorded on a skipped resource
    pub fn skip_reason(&self, usage: &Usage) -> String {
        format!("in use within the last {} days ({})", self.window_days, usage)
    }
}
