use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoSourceAvailable,
    SourceUnavailable,
    PullFailed,
    ConfigInvalid,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoSourceAvailable => "no_source_available",
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::PullFailed => "pull_failed",
            ErrorKind::ConfigInvalid => "config_invalid",
        }
    }

    /// `false` only for failures that need a project configuration change.
    pub fn self_heals(self) -> bool {
        !matches!(self, ErrorKind::ConfigInvalid)
    }
}

/// Failure of one acquisition. Causes are kept as text for logging; callers
/// branch on [`AcquireError::kind`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquireError {
    #[error("no live source produced a reading")]
    NoSourceAvailable,
    #[error("push store query failed: {cause}")]
    SourceUnavailable { cause: String },
    #[error("pull request failed: {cause}")]
    PullFailed { cause: String },
    #[error("invalid live data configuration: {cause}")]
    ConfigInvalid { cause: String },
}

impl AcquireError {
    pub fn source_unavailable(cause: impl Display) -> Self {
        Self::SourceUnavailable {
            cause: cause.to_string(),
        }
    }

    pub fn pull_failed(cause: impl Display) -> Self {
        Self::PullFailed {
            cause: cause.to_string(),
        }
    }

    pub fn config_invalid(cause: impl Display) -> Self {
        Self::ConfigInvalid {
            cause: cause.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquireError::NoSourceAvailable => ErrorKind::NoSourceAvailable,
            AcquireError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            AcquireError::PullFailed { .. } => ErrorKind::PullFailed,
            AcquireError::ConfigInvalid { .. } => ErrorKind::ConfigInvalid,
        }
    }
}
