//! Error types shared by every secret backend.

use thiserror::Error;

use crate::bouncer::LockNotAcquired;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors returned by secret backends and onboarders.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No value is stored at a valid location.
    #[error("secret not found: {id}")]
    NotFound { id: String },

    /// The identity string could not be parsed.
    #[error("invalid secret id: {raw}")]
    InvalidSecretId { raw: String },

    /// The secret name is not allowed at this tenant level.
    #[error("secret {id} is not allowed: {reason}")]
    Forbidden { id: String, reason: String },

    /// The stored or requested value has the wrong shape.
    #[error("invalid secret value: {reason}")]
    InvalidValue { reason: String },

    /// The vault could not be reached or answered with a server error.
    #[error("vault unavailable: {message}")]
    Unavailable { message: String },

    /// The vault rejected the request definitively.
    #[error("vault rejected request with status {status}: {message}")]
    Blocked { status: u16, message: String },

    /// Onboarding contention exceeded the caller's wait budget.
    #[error(transparent)]
    LockNotAcquired(#[from] LockNotAcquired),

    /// Any of the above, annotated with the operation that failed.
    ///
    /// Displays only the annotation; the wrapped error is its source.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<BackendError>,
    },
}

impl BackendError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn invalid_secret_id(raw: impl Into<String>) -> Self {
        Self::InvalidSecretId { raw: raw.into() }
    }

    pub fn forbidden(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Forbidden {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn blocked(status: u16, message: impl Into<String>) -> Self {
        Self::Blocked {
            status,
            message: message.into(),
        }
    }

    /// Wrap this error with a description of the failed operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context layers.
    pub fn root(&self) -> &BackendError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// Whether a caller may retry the operation after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            Self::Unavailable { .. } | Self::LockNotAcquired(_)
        )
    }

    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.root() {
            Self::NotFound { .. } => 404,
            Self::InvalidSecretId { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::InvalidValue { .. } => 422,
            Self::Unavailable { .. } => 503,
            Self::Blocked { status, .. } => *status,
            Self::LockNotAcquired(_) => 429,
            Self::Context { source, .. } => source.status_code(),
        }
    }
}

/// Adds operation context to backend results.
pub trait ResultExt<T> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}
