//! Error types for discovery sessions.

use thiserror::Error;
use crate::session::SessionKind;

/// Errors returned synchronously by session start/stop calls.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} session already active")]
    AlreadyActive(SessionKind),

    #[error("Discovery provider failure: {0}")]
    Provider(#[from] ProviderError),

    #[error("Session manager is not running")]
    Closed,
}

/// Failures reported by a discovery provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to browse {service}: {reason}")]
    BrowseFailed { service: String, reason: String },

    #[error("Failed to register {service}: {reason}")]
    RegisterFailed { service: String, reason: String },

    #[error("Discovery service unavailable: {0}")]
    Unavailable(String),
}
