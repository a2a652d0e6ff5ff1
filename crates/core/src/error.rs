use std::time::Duration;

use crate::ObservedState;

/// Errors reported by a change-stream client.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },
}

impl ClientError {
    /// Map an API status code onto the taxonomy.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            404 => ClientError::NotFound(message),
            401 | 403 => ClientError::Forbidden(message),
            _ => ClientError::Api { code, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Connection loss, expired watches, throttling and server-side failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Api { code, .. } => matches!(*code, 410 | 429 | 500..=599),
            _ => false,
        }
    }
}

/// Outcome of an await that did not converge.
#[derive(Debug, thiserror::Error)]
pub enum AwaitError {
    #[error("timed out after {}s waiting for '{name}': {reason}", .waited.as_secs())]
    Timeout {
        name: String,
        waited: Duration,
        reason: String,
        /// Latest state seen before the deadline, if any.
        last_observed: Option<Box<ObservedState>>,
    },
    #[error("await for '{name}' was cancelled")]
    Cancelled { name: String },
    #[error("await for '{name}' failed: {source}")]
    Fatal { name: String, source: ClientError },
    #[error("{source}{warnings}")]
    Warnings { source: Box<AwaitError>, warnings: String },
    #[error("{source}; additionally failed to fetch warning events: {fetch}")]
    DiagnosticFetch { source: Box<AwaitError>, fetch: ClientError },
}

pub type AwaitResult = Result<(), AwaitError>;

impl AwaitError {
    pub fn is_timeout(&self) -> bool {
        match self {
            AwaitError::Timeout { .. } => true,
            AwaitError::Warnings { source, .. } | AwaitError::DiagnosticFetch { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AwaitError::Cancelled { .. })
    }

    /// Short label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            AwaitError::Timeout { .. } => "timeout",
            AwaitError::Cancelled { .. } => "cancelled",
            AwaitError::Fatal { .. } => "fatal",
            AwaitError::Warnings { source, .. } | AwaitError::DiagnosticFetch { source, .. } => source.outcome(),
        }
    }

    /// Last observed state carried by the underlying timeout, if any.
    pub fn last_observed(&self) -> Option<&ObservedState> {
        match self {
            AwaitError::Timeout { last_observed, .. } => last_observed.as_deref(),
            AwaitError::Warnings { source, .. } | AwaitError::DiagnosticFetch { source, .. } => source.last_observed(),
            _ => None,
        }
    }
}
