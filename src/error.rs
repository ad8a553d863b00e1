use std::{fmt, time::Duration};

/// Failure reported by a [`crate::Forge`] for a single repository query.
#[derive(Debug)]
pub enum QueryError {
    /// The remote rejected the credentials (HTTP 401).
    Unauthorized(String),
    /// The response was successful but did not have the expected shape.
    DataShape(String),
    Other(anyhow::Error),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            QueryError::DataShape(msg) => write!(f, "unexpected response shape: {msg}"),
            QueryError::Other(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// Why a repository contributed nothing to a refresh cycle.
#[derive(Debug)]
pub enum FetchError {
    Auth(String),
    Transient(anyhow::Error),
    DataShape(String),
    Timeout(Duration),
    Cancelled,
}

/// Discriminant of [`FetchError`], handy for assertions and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Auth,
    Transient,
    DataShape,
    Timeout,
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Auth(_) => FetchErrorKind::Auth,
            FetchError::Transient(_) => FetchErrorKind::Transient,
            FetchError::DataShape(_) => FetchErrorKind::DataShape,
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::Cancelled => FetchErrorKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

impl From<QueryError> for FetchError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Unauthorized(msg) => FetchError::Auth(msg),
            QueryError::DataShape(msg) => FetchError::DataShape(msg),
            QueryError::Other(err) => FetchError::Transient(err),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Auth(msg) => write!(f, "authentication failed: {msg}"),
            FetchError::Transient(err) => write!(f, "fetch failed: {err:#}"),
            FetchError::DataShape(msg) => write!(f, "unexpected response shape: {msg}"),
            FetchError::Timeout(after) => write!(f, "timed out after {}s", after.as_secs_f64()),
            FetchError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}
