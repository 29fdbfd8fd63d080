//! Explicit acting-user context passed into every state transition.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{TenantId, UserId};

/// Who performs a transition, for which tenant, and when (business time).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub at: DateTime<Utc>,
}

impl Actor {
    pub fn new(tenant_id: TenantId, user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            user_id,
            at,
        }
    }

    /// Same actor, later timestamp.
    pub fn at(self, at: DateTime<Utc>) -> Self {
        Self { at, ..self }
    }

    pub fn today(&self) -> NaiveDate {
        self.at.date_naive()
    }

    /// Reject actors from another tenant than the document owner.
    pub fn ensure_tenant(&self, owner: Option<TenantId>) -> DomainResult<()> {
        match owner {
            Some(t) if t != self.tenant_id => Err(DomainError::invariant("tenant mismatch")),
            _ => Ok(()),
        }
    }
}
