//! Error taxonomy
//!
//! Fatal conditions (`Validation`, `UnsupportedKind`) stop an invocation before
//! any API call. Everything else is recovered at resource level and turned
//! into a diagnostic note by the caller.

use thiserror::Error;

/// Errors raised by the cloud API collaborator.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The resource vanished between listing and describe/delete.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The API refused a delete because the resource is still in use.
    #[error("resource conflict: {0}")]
    Conflict(String),

    /// Network, pagination or server failure.
    #[error("transient API error: {0}")]
    Transient(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Transient(format!("{err:#}"))
    }
}

/// Missing or malformed run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}

/// Top-level error for core operations.
#[derive(Debug, Error)]
pub enum ReaperError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("hook {hook} failed: {detail}")]
    HookFailure { hook: String, detail: String },

    #[error("job cancelled during shutdown")]
    Cancelled,

    #[error("worker pool is shut down")]
    PoolClosed,
}

impl ReaperError {
    /// Whether this error must terminate the process with a non-zero exit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnsupportedKind(_))
    }
}

pub type Result<T, E = ReaperError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ReaperError::UnsupportedKind("bucket".into()).is_fatal());
        assert!(ReaperError::from(ValidationError::Missing("region")).is_fatal());
        assert!(!ReaperError::Api(ApiError::NotFound("q".into())).is_fatal());
        assert!(!ReaperError::Cancelled.is_fatal());
    }

    #[test]
    fn test_anyhow_converts_to_transient() {
        let err: ApiError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, ApiError::Transient(ref m) if m.contains("connection reset")));
    }
}
