//! Crate-level error taxonomy.

use thiserror::Error;

/// The four error kinds the core ever emits.
///
/// Every fallible operator-facing operation returns one of these. The
/// router's own narrower [`crate::router::RouterError`] converts into this
/// type at the boundary where it becomes operator-visible.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed message, bad target syntax, unknown `AgentType`.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Heartbeat or inspection of an unknown agent.
    #[error("not found: {0}")]
    NotFound(String),

    /// An abstract target could not be resolved at enqueue time.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Persistence or id-collision failure; a programming error by this
    /// definition, never caused by caller input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Shorthand for [`CoreError::Unavailable`].
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Shorthand for [`CoreError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convenience alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
