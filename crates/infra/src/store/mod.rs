//! Tenant-partitioned document storage with optimistic, all-or-nothing commits.
//!
//! Each tenant's documents live in an immutable [`Tables`] snapshot. A
//! [`Transaction`] stages changes against a snapshot; committing swaps in a
//! new snapshot only if no document the transaction read has moved on in the
//! meantime. Losing writers get a `Conflict` and re-run their work.

mod tables;
mod transaction;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use procura_core::{Actor, DomainError, ExpectedVersion, TenantId};

use crate::error::ServiceResult;

pub use tables::{StoredDocument, Tables};
pub use transaction::{Committed, Effect, Transaction};

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    tenants: RwLock<HashMap<TenantId, Arc<Tables>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current committed state of a tenant (empty for unknown tenants).
    pub fn snapshot(&self, tenant_id: TenantId) -> Arc<Tables> {
        let tenants = self.tenants.read().unwrap_or_else(PoisonError::into_inner);
        tenants.get(&tenant_id).cloned().unwrap_or_default()
    }

    pub fn get<D: StoredDocument>(&self, tenant_id: TenantId, id: D::Id) -> Option<D> {
        D::table(&self.snapshot(tenant_id)).get(&id).cloned()
    }

    pub fn begin(&self, actor: &Actor) -> Transaction {
        Transaction::new(*actor, self.snapshot(actor.tenant_id))
    }

    /// Atomically apply the staged writes of `tx`.
    ///
    /// Fails with a `Conflict` when any document read by the transaction has
    /// been created, changed or removed by another commit since it was read.
    pub fn commit(&self, tx: Transaction) -> ServiceResult<Committed> {
        if !tx.has_writes() {
            let (_, _, committed) = tx.into_parts();
            return Ok(committed);
        }
        let (staged, read_versions, committed) = tx.into_parts();

        let mut tenants = self.tenants.write().unwrap_or_else(PoisonError::into_inner);
        let current = tenants.entry(committed.tenant_id).or_default();

        for (reference, seen) in &read_versions {
            let expected = match seen {
                Some(version) => ExpectedVersion::Exact(*version),
                None => ExpectedVersion::NoAggregate,
            };
            let actual = current.version_of(*reference);
            if !expected.matches(actual) {
                return Err(DomainError::conflict(format!(
                    "{reference} changed concurrently (read {seen:?}, now {actual:?})"
                ))
                .into());
            }
        }

        Arc::make_mut(current).merge(staged);
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use procura_core::{TaxRates, UserId};
    use procura_purchasing::{
        CreatePurchaseOrder, OrderLineInput, OrderOrigin, ProductId, PurchaseOrder,
        PurchaseOrderCommand, PurchaseOrderId, PurchaseOrderStatus, VendorId, WarehouseId,
    };
    use rust_decimal_macros::dec;

    fn actor() -> Actor {
        Actor::new(TenantId::new(), UserId::new(), Utc::now())
    }

    fn seed(store: &InMemoryDocumentStore, actor: &Actor) -> PurchaseOrderId {
        let cmd = CreatePurchaseOrder {
            order_id: PurchaseOrderId::generate(),
            number: "PO-1".to_string(),
            vendor_id: VendorId::generate(),
            warehouse_id: WarehouseId::generate(),
            order_date: actor.today(),
            expected_date: None,
            origin: OrderOrigin::default(),
            tax: TaxRates::none(),
            lines: vec![OrderLineInput {
                product_id: ProductId::generate(),
                description: None,
                quantity: dec!(1),
                unit_price: dec!(10),
            }],
        };
        let (order, events) = PurchaseOrder::create(actor, &cmd).unwrap();
        let mut tx = store.begin(actor);
        tx.insert(order, events).unwrap();
        store.commit(tx).unwrap();
        cmd.order_id
    }

    #[test]
    fn commit_publishes_staged_state_and_envelopes() {
        let store = InMemoryDocumentStore::new();
        let actor = actor();
        let id = seed(&store, &actor);

        let mut tx = store.begin(&actor);
        tx.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Submit).unwrap();
        let committed = store.commit(tx).unwrap();

        assert_eq!(committed.events.len(), 1);
        assert_eq!(committed.events[0].sequence_number(), 2);
        assert_eq!(
            committed.events[0].event_type(),
            "procurement.purchase_order.submitted"
        );
        let order: PurchaseOrder = store.get(actor.tenant_id, id).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Submitted);
    }

    #[test]
    fn stale_read_loses_the_commit() {
        let store = InMemoryDocumentStore::new();
        let actor = actor();
        let id = seed(&store, &actor);

        let mut slow = store.begin(&actor);
        slow.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Submit).unwrap();

        let mut fast = store.begin(&actor);
        fast.execute::<PurchaseOrder>(
            id,
            &PurchaseOrderCommand::Cancel {
                reason: "duplicate".to_string(),
            },
        )
        .unwrap();
        store.commit(fast).unwrap();

        let err = store.commit(slow).unwrap_err();
        assert!(err.is_conflict());
        let order: PurchaseOrder = store.get(actor.tenant_id, id).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Cancelled);
    }

    #[test]
    fn rejected_command_stages_nothing() {
        let store = InMemoryDocumentStore::new();
        let actor = actor();
        let id = seed(&store, &actor);

        let mut tx = store.begin(&actor);
        let err = tx
            .execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Lock)
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::InvalidStateTransition { .. })
        ));
        assert!(!tx.has_writes());
    }

    #[test]
    fn tenants_are_isolated() {
        let store = InMemoryDocumentStore::new();
        let actor = actor();
        let id = seed(&store, &actor);
        assert!(store.get::<PurchaseOrder>(TenantId::new(), id).is_none());
    }
}
