//! Procurement application services.
//!
//! Every public operation runs as one unit of work:
//!
//! ```text
//! begin (tenant snapshot)
//!   ↓
//! load documents, run guarded commands, stage results + deferred effects
//!   ↓
//! commit (optimistic version check; on conflict re-run from a fresh snapshot)
//!   ↓
//! publish events, then call stock / journal / approval collaborators
//! ```
//!
//! Domain failures abort the unit of work before anything is written.

mod agreements;
mod bills;
mod blanket;
mod orders;
mod receipts;
mod requests;
mod returns;
mod rfqs;
mod workflow;

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use procura_core::{Actor, Money, TenantId};
use procura_events::{EventBus, EventEnvelope};
use procura_purchasing::{DocumentKind, DocumentRef, FlowGraph};

use crate::config::ProcurementConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::flow::TableLinks;
use crate::ports::{
    ApprovalGateway, ApprovalSubject, InMemoryApprovals, InMemoryCatalog, InMemoryJournal,
    InMemorySequence, InMemoryStock, JournalPoster, ProductCatalog, SequenceService, StockService,
};
use crate::store::{Committed, Effect, InMemoryDocumentStore, StoredDocument, Transaction};

pub use agreements::NewPurchaseAgreement;
pub use bills::NewVendorBill;
pub use blanket::NewBlanketOrder;
pub use orders::{NewPurchaseOrder, ReleaseQuantity, ReleaseRequest};

/// Bus carrying committed events as JSON envelopes.
pub trait ProcurementBus: EventBus<EventEnvelope<JsonValue>> {}

impl<B> ProcurementBus for B where B: EventBus<EventEnvelope<JsonValue>> {}

/// External collaborators injected into the services.
#[derive(Clone)]
pub struct Collaborators {
    pub sequences: Arc<dyn SequenceService>,
    pub approvals: Arc<dyn ApprovalGateway>,
    pub stock: Arc<dyn StockService>,
    pub journal: Arc<dyn JournalPoster>,
    pub catalog: Arc<dyn ProductCatalog>,
}

impl Collaborators {
    /// In-memory fakes: no approvals required, empty catalog.
    pub fn in_memory() -> Self {
        Self {
            sequences: Arc::new(InMemorySequence::new()),
            approvals: Arc::new(InMemoryApprovals::new()),
            stock: Arc::new(InMemoryStock::new()),
            journal: Arc::new(InMemoryJournal::new()),
            catalog: Arc::new(InMemoryCatalog::new()),
        }
    }
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ProcurementService<B> {
    store: InMemoryDocumentStore,
    bus: B,
    ports: Collaborators,
    config: ProcurementConfig,
}

impl<B> ProcurementService<B> {
    pub fn new(
        store: InMemoryDocumentStore,
        bus: B,
        ports: Collaborators,
        config: ProcurementConfig,
    ) -> Self {
        Self {
            store,
            bus,
            ports,
            config,
        }
    }

    pub fn config(&self) -> &ProcurementConfig {
        &self.config
    }

    pub fn store(&self) -> &InMemoryDocumentStore {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Committed copy of a document.
    pub fn document<D: StoredDocument>(&self, tenant_id: TenantId, id: D::Id) -> Option<D> {
        self.store.get(tenant_id, id)
    }

    /// Lineage of linked documents around `root`, `None` if it does not exist.
    pub fn document_flow(&self, tenant_id: TenantId, root: DocumentRef) -> Option<FlowGraph> {
        let snapshot = self.store.snapshot(tenant_id);
        FlowGraph::build(root, &TableLinks::new(&snapshot))
    }
}

impl<B: ProcurementBus> ProcurementService<B> {
    /// Run `work` as one unit of work, re-running it from fresh state when the
    /// commit loses an optimistic concurrency race.
    pub(crate) fn run<T>(
        &self,
        actor: &Actor,
        operation: &'static str,
        mut work: impl FnMut(&mut Transaction) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.store.begin(actor);
            let value = work(&mut tx)?;
            match self.store.commit(tx) {
                Ok(committed) => {
                    info!(
                        operation,
                        tenant_id = %actor.tenant_id,
                        events = committed.events.len(),
                        attempt,
                        "unit of work committed"
                    );
                    self.after_commit(committed)?;
                    return Ok(value);
                }
                Err(e) if e.is_conflict() && attempt < max_attempts => {
                    warn!(operation, attempt, error = %e, "commit conflict; retrying unit of work");
                }
                Err(e) if e.is_conflict() => {
                    warn!(operation, attempt, error = %e, "commit conflict; giving up");
                    return Err(ServiceError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Publish events, then run deferred collaborator calls. Every step is
    /// attempted; the first failure is reported.
    fn after_commit(&self, committed: Committed) -> ServiceResult<()> {
        let Committed {
            tenant_id,
            events,
            effects,
        } = committed;
        let mut first_failure: Option<ServiceError> = None;

        for envelope in events {
            let event_type = envelope.event_type().to_string();
            if let Err(e) = self.bus.publish(envelope) {
                error!(%tenant_id, event_type = %event_type, error = ?e, "event publication failed after commit");
                first_failure.get_or_insert(ServiceError::Publish(format!("{e:?}")));
            }
        }

        for effect in effects {
            if let Err((collaborator, e)) = self.apply_effect(tenant_id, &effect) {
                error!(%tenant_id, collaborator, error = %e, "collaborator call failed after commit");
                first_failure.get_or_insert(ServiceError::SideEffect {
                    collaborator,
                    message: e.to_string(),
                });
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn apply_effect(
        &self,
        tenant_id: TenantId,
        effect: &Effect,
    ) -> Result<(), (&'static str, crate::ports::PortError)> {
        match effect {
            Effect::IncrementStock {
                warehouse_id,
                product_id,
                quantity,
            } => self
                .ports
                .stock
                .increment_stock(tenant_id, *warehouse_id, *product_id, *quantity)
                .map_err(|e| ("stock", e)),
            Effect::DecrementStock {
                warehouse_id,
                product_id,
                quantity,
            } => self
                .ports
                .stock
                .decrement_stock(tenant_id, *warehouse_id, *product_id, *quantity)
                .map_err(|e| ("stock", e)),
            Effect::PostJournal(entry) => self
                .ports
                .journal
                .post(tenant_id, entry)
                .map_err(|e| ("journal", e)),
            Effect::SubmitForApproval(subject) => self
                .ports
                .approvals
                .submit_for_approval(subject)
                .map_err(|e| ("approval", e)),
        }
    }

    fn next_number(
        &self,
        tx: &Transaction,
        kind: DocumentKind,
        period: NaiveDate,
    ) -> ServiceResult<String> {
        self.ports
            .sequences
            .next_document_number(tx.tenant_id(), kind, period)
            .map_err(|e| ServiceError::Unavailable {
                collaborator: "sequence",
                message: e.to_string(),
            })
    }

    /// Ask the approval policy; when approval is needed, queue the
    /// submission for after the commit.
    fn route_for_approval(
        &self,
        tx: &mut Transaction,
        document: DocumentRef,
        number: &str,
        amount: Money,
    ) -> bool {
        let needed = self
            .ports
            .approvals
            .requires_approval(tx.tenant_id(), document.kind, amount);
        if needed {
            let subject = ApprovalSubject {
                tenant_id: tx.tenant_id(),
                document,
                number: number.to_string(),
                amount,
                submitted_by: tx.actor().user_id,
            };
            tx.push_effect(Effect::SubmitForApproval(subject));
        }
        needed
    }
}

fn log_transition(
    document: DocumentKind,
    number: &str,
    status: impl core::fmt::Display,
    action: &'static str,
) {
    info!(document = %document, number, status = %status, action, "document updated");
}
