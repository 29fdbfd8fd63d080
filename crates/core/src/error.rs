//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (guards,
/// validation, commitments, references). Infrastructure concerns belong
/// elsewhere. Tolerance breaches found by matching are *not* errors; they are
/// recorded as match verdicts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A guarded status transition was attempted from a status that does not allow it.
    #[error("invalid state transition for {document}: cannot move from '{from}' to '{to}'")]
    InvalidStateTransition {
        document: &'static str,
        from: String,
        to: String,
    },

    /// A value failed validation (missing field, out-of-range quantity or price).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A blanket order ceiling (amount or quantity) would be breached.
    #[error("commitment exceeded on {commitment}: requested {requested}, remaining {remaining}")]
    CommitmentExceeded {
        commitment: String,
        requested: Decimal,
        remaining: Decimal,
    },

    /// A document references something that does not exist on its source document.
    #[error("referential integrity violated: {0}")]
    ReferentialIntegrity(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested document was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn transition(
        document: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidStateTransition {
            document,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn commitment(
        commitment: impl Into<String>,
        requested: Decimal,
        remaining: Decimal,
    ) -> Self {
        Self::CommitmentExceeded {
            commitment: commitment.into(),
            requested,
            remaining,
        }
    }

    pub fn referential(msg: impl Into<String>) -> Self {
        Self::ReferentialIntegrity(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True for failures caused by a concurrent writer; safe to re-run from fresh state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transition_error_names_document_and_both_states() {
        let err = DomainError::transition("purchase order", "locked", "cancelled");
        assert_eq!(
            err.to_string(),
            "invalid state transition for purchase order: cannot move from 'locked' to 'cancelled'"
        );
    }

    #[test]
    fn commitment_error_carries_amounts() {
        let err = DomainError::commitment("BPO-0001", dec!(500000), dec!(400000));
        match err {
            DomainError::CommitmentExceeded {
                requested,
                remaining,
                ..
            } => {
                assert_eq!(requested, dec!(500000));
                assert_eq!(remaining, dec!(400000));
            }
            _ => panic!("Expected CommitmentExceeded"),
        }
    }
}
