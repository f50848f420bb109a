use thiserror::Error;

/// Failure taxonomy surfaced by every service in this crate.
///
/// `InvalidArgument`, `Forbidden` and `Conflict` are recoverable and meant
/// for caller display. `DependencyUnavailable` is transient and already
/// retried at the store boundary before it reaches a caller. `Fatal` marks a
/// broken invariant and is never retried.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("not authenticated: {reason}")]
    NotAuthenticated { reason: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("dependency unavailable: {message}")]
    DependencyUnavailable { message: String },

    #[error("integrity fault: {message}")]
    Fatal { message: String },
}

impl ChatError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn not_authenticated(reason: impl Into<String>) -> Self {
        Self::NotAuthenticated { reason: reason.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden { reason: reason.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::DependencyUnavailable { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Whether a caller should present this as "try again".
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DependencyUnavailable { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Errors produced by `Repository` implementations.
///
/// Implementations classify their backend's failures into these four;
/// the service layer maps them onto [`ChatError`] after retry handling.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Store unreachable or timed out; safe to retry
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// Unique constraint or concurrent-write conflict
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// A stored record failed to decode
    #[error("stored data invalid: {message}")]
    Data { message: String },

    /// Query rejected or failed for a non-transient reason
    #[error("store error: {message} (operation: {operation})")]
    Backend { message: String, operation: String },
}

impl RepositoryError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data { message: message.into() }
    }

    pub fn backend(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Backend { message: message.into(), operation: operation.into() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<RepositoryError> for ChatError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable { message } => {
                ChatError::DependencyUnavailable { message }
            }
            RepositoryError::Conflict { message } => ChatError::Conflict { message },
            // A record that no longer decodes is a broken invariant, not a
            // transient; never retried.
            RepositoryError::Data { message } => ChatError::Fatal { message },
            RepositoryError::Backend { message, operation } => ChatError::DependencyUnavailable {
                message: format!("{} (operation: {})", message, operation),
            },
        }
    }
}

/// Type alias for Result with this crate's error type
pub type Result<T, E = ChatError> = std::result::Result<T, E>;
