//! External collaborators of the procurement core.
//!
//! Everything here is consumed as a black box. The unit of work only calls
//! the side-effecting ports (stock, journal, approval submission) after a
//! successful commit; read-only ports (numbering, approval policy, catalog)
//! may be consulted while the work runs.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use procura_core::{Money, TenantId, UserId};
use procura_purchasing::{DocumentKind, DocumentRef, JournalEntry, ProductId, WarehouseId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Document-number generation.
pub trait SequenceService: Send + Sync {
    /// Next number for `kind` in the period containing `period`.
    fn next_document_number(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        period: NaiveDate,
    ) -> Result<String, PortError>;
}

/// A document handed to the approval subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSubject {
    pub tenant_id: TenantId,
    pub document: DocumentRef,
    pub number: String,
    pub amount: Money,
    pub submitted_by: UserId,
}

/// Black-box approval routing.
///
/// Decisions come back through `ProcurementService::on_workflow_approved`
/// and `on_workflow_rejected`.
pub trait ApprovalGateway: Send + Sync {
    fn requires_approval(&self, tenant_id: TenantId, kind: DocumentKind, amount: Money) -> bool;

    fn submit_for_approval(&self, subject: &ApprovalSubject) -> Result<(), PortError>;
}

pub trait StockService: Send + Sync {
    fn increment_stock(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Decimal,
    ) -> Result<(), PortError>;

    fn decrement_stock(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Decimal,
    ) -> Result<(), PortError>;
}

/// General-ledger hand-off. Entries are balanced before they get here.
pub trait JournalPoster: Send + Sync {
    fn post(&self, tenant_id: TenantId, entry: &JournalEntry) -> Result<(), PortError>;
}

pub trait ProductCatalog: Send + Sync {
    /// Unit weight of a product, if the catalog knows it.
    fn weight(&self, tenant_id: TenantId, product_id: ProductId) -> Option<Decimal>;
}

// ---------------------------------------------------------------------------
// In-memory implementations (tests/dev)
// ---------------------------------------------------------------------------

/// `<PREFIX>-<YYYYMM>-<00001>` numbering with one counter per tenant, kind
/// and month.
#[derive(Debug, Default)]
pub struct InMemorySequence {
    counters: Mutex<HashMap<(TenantId, DocumentKind, i32, u32), u64>>,
}

impl InMemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceService for InMemorySequence {
    fn next_document_number(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        period: NaiveDate,
    ) -> Result<String, PortError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| PortError::Unavailable("sequence lock poisoned".to_string()))?;
        let counter = counters
            .entry((tenant_id, kind, period.year(), period.month()))
            .or_insert(0);
        *counter += 1;
        Ok(format!(
            "{}-{:04}{:02}-{:05}",
            kind.number_prefix(),
            period.year(),
            period.month(),
            counter
        ))
    }
}

/// Approval policy by amount threshold per document kind.
///
/// Kinds without a threshold never require approval. Submitted subjects are
/// recorded for inspection.
#[derive(Debug, Default)]
pub struct InMemoryApprovals {
    thresholds: HashMap<DocumentKind, Money>,
    submitted: Mutex<Vec<ApprovalSubject>>,
}

impl InMemoryApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require approval for `kind` when the amount is at least `threshold`.
    pub fn with_threshold(mut self, kind: DocumentKind, threshold: Money) -> Self {
        self.thresholds.insert(kind, threshold);
        self
    }

    pub fn submitted(&self) -> Vec<ApprovalSubject> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ApprovalGateway for InMemoryApprovals {
    fn requires_approval(&self, _tenant_id: TenantId, kind: DocumentKind, amount: Money) -> bool {
        self.thresholds
            .get(&kind)
            .is_some_and(|threshold| amount >= *threshold)
    }

    fn submit_for_approval(&self, subject: &ApprovalSubject) -> Result<(), PortError> {
        self.submitted
            .lock()
            .map_err(|_| PortError::Unavailable("approval lock poisoned".to_string()))?
            .push(subject.clone());
        Ok(())
    }
}

/// Stock levels per tenant, warehouse and product. Levels may go negative.
#[derive(Debug, Default)]
pub struct InMemoryStock {
    levels: Mutex<HashMap<(TenantId, WarehouseId, ProductId), Decimal>>,
}

impl InMemoryStock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, tenant_id: TenantId, warehouse_id: WarehouseId, product_id: ProductId) -> Decimal {
        self.levels
            .lock()
            .ok()
            .and_then(|l| l.get(&(tenant_id, warehouse_id, product_id)).copied())
            .unwrap_or_default()
    }

    fn adjust(
        &self,
        key: (TenantId, WarehouseId, ProductId),
        delta: Decimal,
    ) -> Result<(), PortError> {
        let mut levels = self
            .levels
            .lock()
            .map_err(|_| PortError::Unavailable("stock lock poisoned".to_string()))?;
        *levels.entry(key).or_default() += delta;
        Ok(())
    }
}

impl StockService for InMemoryStock {
    fn increment_stock(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Decimal,
    ) -> Result<(), PortError> {
        self.adjust((tenant_id, warehouse_id, product_id), quantity)
    }

    fn decrement_stock(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Decimal,
    ) -> Result<(), PortError> {
        self.adjust((tenant_id, warehouse_id, product_id), -quantity)
    }
}

/// Collects posted journal entries; rejects unbalanced ones.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    entries: Mutex<Vec<(TenantId, JournalEntry)>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, tenant_id: TenantId) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .map(|e| {
                e.iter()
                    .filter(|(t, _)| *t == tenant_id)
                    .map(|(_, entry)| entry.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl JournalPoster for InMemoryJournal {
    fn post(&self, tenant_id: TenantId, entry: &JournalEntry) -> Result<(), PortError> {
        entry
            .validate()
            .map_err(|e| PortError::Rejected(e.to_string()))?;
        self.entries
            .lock()
            .map_err(|_| PortError::Unavailable("journal lock poisoned".to_string()))?
            .push((tenant_id, entry.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    weights: HashMap<ProductId, Decimal>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight(mut self, product_id: ProductId, weight: Decimal) -> Self {
        self.weights.insert(product_id, weight);
        self
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn weight(&self, _tenant_id: TenantId, product_id: ProductId) -> Option<Decimal> {
        self.weights.get(&product_id).copied()
    }
}
