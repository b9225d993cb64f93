use crate::cluster::ClusterError;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error kinds every operation reports.
///
/// Components below the API layer construct these but never format them for a user; the
/// runtime maps each kind to a status with [`Error::status`] and renders the body.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    UnprocessableState(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{} of {} operations failed", .failures.len(), .failures.len() + .succeeded.len())]
    PartialFailure {
        succeeded: Vec<String>,
        failures: Vec<Failure>,
    },
}

/// One failed item of a bulk operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub name: String,
    pub error: String,
}

// === impl Error ===

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::UnprocessableState(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnprocessableState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream(_) | Self::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A short, stable name for the kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::UnprocessableState(_) => "unprocessable_state",
            Self::Upstream(_) => "upstream_failure",
            Self::PartialFailure { .. } => "partial_failure",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ClusterError> for Error {
    fn from(error: ClusterError) -> Self {
        match error {
            ClusterError::NotFound(what) => Self::NotFound(what),
            ClusterError::Conflict(what) => Self::Conflict(what),
            ClusterError::Invalid(body) => Self::InvalidRequest(body),
            error => Self::Upstream(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Upstream(format!("failed to encode or decode a payload: {error}"))
    }
}
