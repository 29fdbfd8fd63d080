use thiserror::Error;

use procura_core::DomainError;

/// Failure of a procurement service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Deterministic domain rejection; nothing was committed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Every attempt of the unit of work lost an optimistic concurrency race.
    #[error("{operation}: gave up after {attempts} conflicting commit attempt(s)")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    /// A collaborator consulted during the unit of work failed; nothing was
    /// committed.
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },

    /// An event payload could not be serialized for the bus.
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The state change is committed but publishing its events failed
    /// (at-least-once; re-publishing may duplicate).
    #[error("event publication failed after commit: {0}")]
    Publish(String),

    /// The state change is committed but an external collaborator failed.
    #[error("{collaborator} failed after commit: {message}")]
    SideEffect {
        collaborator: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Domain(e) if e.is_conflict())
    }

    /// The domain error behind this failure, if any.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the state change was committed before the failure.
    pub fn is_post_commit(&self) -> bool {
        matches!(
            self,
            ServiceError::Publish(_) | ServiceError::SideEffect { .. }
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
