use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use procura_core::{Actor, DomainError, TenantId};
use procura_events::{Event, EventEnvelope, execute};
use procura_purchasing::{DocumentRef, JournalEntry, ProductId, WarehouseId};

use super::tables::{StoredDocument, Tables};
use crate::error::ServiceResult;
use crate::ports::ApprovalSubject;

/// Collaborator call deferred until the unit of work has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    IncrementStock {
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Decimal,
    },
    DecrementStock {
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Decimal,
    },
    PostJournal(JournalEntry),
    SubmitForApproval(ApprovalSubject),
}

/// Staged writes of one unit of work over a tenant snapshot.
///
/// Reads see staged copies first, then the snapshot. The version of every
/// document read is remembered so the commit can detect concurrent writers.
#[derive(Debug)]
pub struct Transaction {
    actor: Actor,
    base: Arc<Tables>,
    staged: Tables,
    read_versions: BTreeMap<DocumentRef, Option<u64>>,
    events: Vec<EventEnvelope<JsonValue>>,
    effects: Vec<Effect>,
}

/// What a successful commit hands to the post-commit phase.
#[derive(Debug)]
pub struct Committed {
    pub tenant_id: TenantId,
    pub events: Vec<EventEnvelope<JsonValue>>,
    pub effects: Vec<Effect>,
}

impl Transaction {
    pub(crate) fn new(actor: Actor, base: Arc<Tables>) -> Self {
        Self {
            actor,
            base,
            staged: Tables::default(),
            read_versions: BTreeMap::new(),
            events: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn tenant_id(&self) -> TenantId {
        self.actor.tenant_id
    }

    /// Latest visible copy of a document.
    pub fn find<D: StoredDocument>(&mut self, id: D::Id) -> Option<D> {
        let found = D::table(&self.staged)
            .get(&id)
            .or_else(|| D::table(&self.base).get(&id))
            .cloned();
        self.read_versions
            .entry(D::reference(id))
            .or_insert_with(|| found.as_ref().map(|d| d.version()));
        found
    }

    pub fn load<D: StoredDocument>(&mut self, id: D::Id) -> ServiceResult<D> {
        self.find(id).ok_or_else(|| {
            DomainError::not_found(format!("{} {}", D::KIND, D::reference(id).id)).into()
        })
    }

    /// Every visible document of a kind matching `filter` (staged copies win).
    ///
    /// Scans are not version-tracked; callers that depend on a scan must also
    /// write a document that serializes them.
    pub fn select<D: StoredDocument>(&self, filter: impl Fn(&D) -> bool) -> Vec<D> {
        let staged = D::table(&self.staged);
        let mut out: Vec<D> = staged.values().filter(|d| filter(d)).cloned().collect();
        out.extend(
            D::table(&self.base)
                .iter()
                .filter(|(id, _)| !staged.contains_key(id))
                .map(|(_, d)| d)
                .filter(|d| filter(d))
                .cloned(),
        );
        out
    }

    /// Stage a newly created document with its creation events.
    pub fn insert<D: StoredDocument>(&mut self, doc: D, events: Vec<D::Event>) -> ServiceResult<D> {
        let id = *doc.id();
        if self.find::<D>(id).is_some() {
            return Err(DomainError::conflict(format!(
                "{} {} already exists",
                D::KIND,
                D::reference(id).id
            ))
            .into());
        }
        self.stage(doc.clone(), &events)?;
        Ok(doc)
    }

    /// Run a command against the latest copy of a document and stage the result.
    ///
    /// A rejected command stages nothing.
    pub fn execute<D: StoredDocument>(
        &mut self,
        id: D::Id,
        command: &D::Command,
    ) -> ServiceResult<D> {
        let mut doc: D = self.load(id)?;
        let events = execute(&mut doc, &self.actor, command)?;
        if !events.is_empty() {
            self.stage(doc.clone(), &events)?;
        }
        Ok(doc)
    }

    pub fn push_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    fn stage<D: StoredDocument>(&mut self, doc: D, events: &[D::Event]) -> ServiceResult<()> {
        let reference = D::reference(*doc.id());
        let first = doc.version() + 1 - events.len() as u64;
        for (offset, event) in events.iter().enumerate() {
            let payload = serde_json::to_value(event)?;
            self.events.push(EventEnvelope::new(
                Uuid::now_v7(),
                self.actor.tenant_id,
                self.actor.user_id,
                reference.id,
                event.aggregate_type(),
                first + offset as u64,
                event.event_type(),
                event.occurred_at(),
                payload,
            ));
        }
        D::table_mut(&mut self.staged).insert(*doc.id(), doc);
        Ok(())
    }

    pub(crate) fn has_writes(&self) -> bool {
        !self.staged.is_empty()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Tables, BTreeMap<DocumentRef, Option<u64>>, Committed) {
        (
            self.staged,
            self.read_versions,
            Committed {
                tenant_id: self.actor.tenant_id,
                events: self.events,
                effects: self.effects,
            },
        )
    }
}
