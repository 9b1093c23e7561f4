//! Unified error taxonomy for the nexus core.
//!
//! Every component crate declares operations that return `NexusResult<T>`.
//! The request shell is the only place that maps a `NexusError` to an HTTP
//! status code and a stable `kind` string (see [`NexusError::http_status`]
//! and [`NexusError::kind_name`]); components themselves never think in
//! terms of HTTP.

use thiserror::Error;

/// The full error taxonomy, matching the kind -> surfaced-as table.
#[derive(Debug, Error, Clone)]
pub enum NexusError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("quota exceeded for {resource}")]
    QuotaExceeded { resource: String },

    #[error("password does not meet policy: {0}")]
    WeakPassword(String),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("invalid email: {0}")]
    InvalidEmail(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("agent error: {0}")]
    AgentError(String),

    #[error("agent timed out after {0:?}")]
    AgentTimeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type NexusResult<T> = Result<T, NexusError>;

impl NexusError {
    /// Stable string used in the failure envelope's `error.kind` field.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NexusError::InvalidCredentials => "InvalidCredentials",
            NexusError::RateLimited(_) => "RateLimited",
            NexusError::InvalidToken => "InvalidToken",
            NexusError::TokenExpired => "TokenExpired",
            NexusError::Forbidden(_) => "Forbidden",
            NexusError::QuotaExceeded { .. } => "QuotaExceeded",
            NexusError::WeakPassword(_) => "WeakPassword",
            NexusError::UserExists(_) => "UserExists",
            NexusError::InvalidEmail(_) => "InvalidEmail",
            NexusError::UnknownAgent(_) => "UnknownAgent",
            NexusError::InvalidInput(_) => "InvalidInput",
            NexusError::AgentError(_) => "AgentError",
            NexusError::AgentTimeout(_) => "AgentTimeout",
            NexusError::Cancelled => "Cancelled",
            NexusError::WorkflowNotFound(_) => "WorkflowNotFound",
            NexusError::IllegalTransition(_) => "IllegalTransition",
            NexusError::NotFound(_) => "NotFound",
            NexusError::Internal(_) => "Internal",
        }
    }

    /// HTTP status this error kind is surfaced as.
    pub fn http_status(&self) -> u16 {
        match self {
            NexusError::InvalidCredentials => 401,
            NexusError::RateLimited(_) => 429,
            NexusError::InvalidToken => 401,
            NexusError::TokenExpired => 401,
            NexusError::Forbidden(_) => 403,
            NexusError::QuotaExceeded { .. } => 429,
            NexusError::WeakPassword(_) => 400,
            NexusError::UserExists(_) => 400,
            NexusError::InvalidEmail(_) => 400,
            NexusError::UnknownAgent(_) => 400,
            NexusError::InvalidInput(_) => 400,
            NexusError::AgentError(_) => 502,
            NexusError::AgentTimeout(_) => 504,
            NexusError::Cancelled => 499,
            NexusError::WorkflowNotFound(_) => 404,
            NexusError::IllegalTransition(_) => 409,
            NexusError::NotFound(_) => 404,
            NexusError::Internal(_) => 500,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        NexusError::Internal(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        NexusError::NotFound(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_status_agree_with_taxonomy() {
        assert_eq!(NexusError::InvalidCredentials.http_status(), 401);
        assert_eq!(NexusError::RateLimited("locked".into()).http_status(), 429);
        assert_eq!(
            NexusError::QuotaExceeded { resource: "x".into() }.http_status(),
            429
        );
        assert_eq!(NexusError::AgentError("boom".into()).http_status(), 502);
        assert_eq!(
            NexusError::AgentTimeout(std::time::Duration::from_secs(1)).http_status(),
            504
        );
        assert_eq!(NexusError::Cancelled.http_status(), 499);
        assert_eq!(NexusError::WorkflowNotFound("w1".into()).http_status(), 404);
        assert_eq!(NexusError::IllegalTransition("x".into()).http_status(), 409);
        assert_eq!(NexusError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn kind_name_is_stable() {
        assert_eq!(NexusError::InvalidCredentials.kind_name(), "InvalidCredentials");
        assert_eq!(NexusError::Forbidden("x".into()).kind_name(), "Forbidden");
    }
}
