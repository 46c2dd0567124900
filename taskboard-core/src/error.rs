use serde::Serialize;

/// Failure of a call to the remote store.
///
/// Conflicts are kept apart from transient failures: a conflict means the
/// server refused this exact change and retrying cannot help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized")]
    Unauthorized,

    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Could not decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Conflict,
    Unauthorized,
    Rejected,
    Transient,
    Decode,
}

impl PersistenceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PersistenceError::Conflict(_) => FailureKind::Conflict,
            PersistenceError::Unauthorized => FailureKind::Unauthorized,
            PersistenceError::Rejected { .. } => FailureKind::Rejected,
            PersistenceError::Transient(_) => FailureKind::Transient,
            PersistenceError::Decode(_) => FailureKind::Decode,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Transient(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => PersistenceError::Unauthorized,
            409 | 412 => PersistenceError::Conflict(message),
            408 | 429 | 500..=599 => PersistenceError::Transient(format!("status {}: {}", status, message)),
            _ => PersistenceError::Rejected { status, message },
        }
    }
}
