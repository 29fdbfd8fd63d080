use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use procura_core::{Actor, DomainError, Money, TenantId};
use procura_purchasing::consumption::amount_used;
use procura_purchasing::{
    BlanketLineInput, BlanketOrder, BlanketOrderCommand, BlanketOrderId,
    ConsumptionSummary, CreateBlanketOrder, DocumentKind, PurchaseAgreement,
    PurchaseAgreementId, PurchaseOrder, PurchaseOrderStatus, ReleaseSummary, VendorId,
};

use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;
use crate::store::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlanketOrder {
    pub vendor_id: VendorId,
    pub agreement_id: Option<PurchaseAgreementId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub amount_limit: Money,
    pub lines: Vec<BlanketLineInput>,
}

impl<B: ProcurementBus> ProcurementService<B> {
    /// Draft a blanket order. A referenced agreement must be active and
    /// belong to the same vendor.
    pub fn create_blanket_order(
        &self,
        actor: &Actor,
        input: NewBlanketOrder,
    ) -> ServiceResult<BlanketOrder> {
        self.run(actor, "create_blanket_order", |tx| {
            if let Some(agreement_id) = input.agreement_id {
                let agreement: PurchaseAgreement = tx.load(agreement_id)?;
                agreement.ensure_covers(input.vendor_id)?;
            }
            let cmd = CreateBlanketOrder {
                blanket_order_id: BlanketOrderId::generate(),
                number: self.next_number(tx, DocumentKind::BlanketOrder, actor.today())?,
                vendor_id: input.vendor_id,
                agreement_id: input.agreement_id,
                start_date: input.start_date,
                end_date: input.end_date,
                amount_limit: input.amount_limit,
                lines: input.lines.clone(),
            };
            let (order, events) = BlanketOrder::create(tx.actor(), &cmd)?;
            tx.insert(order, events)
        })
        .inspect(|b| log_transition(DocumentKind::BlanketOrder, b.number(), b.status(), "created"))
    }

    /// Submit for approval; orders below the approval threshold open at once.
    pub fn submit_blanket_order(
        &self,
        actor: &Actor,
        id: BlanketOrderId,
    ) -> ServiceResult<BlanketOrder> {
        self.run(actor, "submit_blanket_order", |tx| {
            let order = tx.execute::<BlanketOrder>(id, &BlanketOrderCommand::Submit)?;
            if self.route_for_approval(tx, id.into(), order.number(), order.amount_limit()) {
                Ok(order)
            } else {
                tx.execute::<BlanketOrder>(id, &BlanketOrderCommand::Activate)
            }
        })
        .inspect(|b| log_transition(DocumentKind::BlanketOrder, b.number(), b.status(), "submitted"))
    }

    pub fn activate_blanket_order(
        &self,
        actor: &Actor,
        id: BlanketOrderId,
    ) -> ServiceResult<BlanketOrder> {
        self.blanket_command(actor, id, "activate_blanket_order", BlanketOrderCommand::Activate)
    }

    pub fn reject_blanket_order(
        &self,
        actor: &Actor,
        id: BlanketOrderId,
        reason: &str,
    ) -> ServiceResult<BlanketOrder> {
        self.blanket_command(
            actor,
            id,
            "reject_blanket_order",
            BlanketOrderCommand::Reject {
                reason: reason.to_string(),
            },
        )
    }

    /// Cancel an order that has no live (non-cancelled) releases.
    pub fn cancel_blanket_order(
        &self,
        actor: &Actor,
        id: BlanketOrderId,
        reason: &str,
    ) -> ServiceResult<BlanketOrder> {
        self.run(actor, "cancel_blanket_order", |tx| {
            let live_releases = releases_of(tx, id).iter().filter(|r| r.is_live()).count();
            tx.execute::<BlanketOrder>(
                id,
                &BlanketOrderCommand::Cancel {
                    reason: reason.to_string(),
                    live_releases,
                },
            )
        })
        .inspect(|b| log_transition(DocumentKind::BlanketOrder, b.number(), b.status(), "cancelled"))
    }

    pub fn close_blanket_order(
        &self,
        actor: &Actor,
        id: BlanketOrderId,
    ) -> ServiceResult<BlanketOrder> {
        self.blanket_command(actor, id, "close_blanket_order", BlanketOrderCommand::Close)
    }

    /// Expire every open or partially ordered blanket order whose end date
    /// lies before `as_of`.
    pub fn expire_lapsed_blanket_orders(
        &self,
        actor: &Actor,
        as_of: NaiveDate,
    ) -> ServiceResult<Vec<BlanketOrderId>> {
        let actor = actor.at(as_of.and_time(NaiveTime::MIN).and_utc());
        self.run(&actor, "expire_lapsed_blanket_orders", |tx| {
            let lapsed: Vec<BlanketOrderId> = tx
                .select::<BlanketOrder>(|b| b.is_lapsed(as_of))
                .iter()
                .map(|b| b.id_typed())
                .collect();
            for id in &lapsed {
                let order = tx.execute::<BlanketOrder>(*id, &BlanketOrderCommand::Expire)?;
                log_transition(DocumentKind::BlanketOrder, order.number(), order.status(), "expired");
            }
            Ok(lapsed)
        })
    }

    /// Re-derive the realization status from the current releases.
    pub fn recalculate_blanket_order(
        &self,
        actor: &Actor,
        id: BlanketOrderId,
    ) -> ServiceResult<BlanketOrder> {
        self.run(actor, "recalculate_blanket_order", |tx| realize(tx, id))
            .inspect(|b| log_transition(DocumentKind::BlanketOrder, b.number(), b.status(), "recalculated"))
    }

    /// Amount and quantity consumption of a blanket order.
    pub fn blanket_order_consumption(
        &self,
        tenant_id: TenantId,
        id: BlanketOrderId,
    ) -> ServiceResult<ConsumptionSummary> {
        let snapshot = self.store().snapshot(tenant_id);
        let order = snapshot
            .blanket_orders
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("blanket order {id}")))?;
        let releases: Vec<ReleaseSummary> = snapshot
            .orders
            .values()
            .filter(|o| o.blanket_order_id() == Some(id))
            .map(release_summary)
            .collect();
        Ok(ConsumptionSummary::compute(
            order.amount_limit(),
            &releases,
            &order.consumption_lines(),
        ))
    }

    fn blanket_command(
        &self,
        actor: &Actor,
        id: BlanketOrderId,
        operation: &'static str,
        command: BlanketOrderCommand,
    ) -> ServiceResult<BlanketOrder> {
        self.run(actor, operation, |tx| tx.execute::<BlanketOrder>(id, &command))
            .inspect(|b| log_transition(DocumentKind::BlanketOrder, b.number(), b.status(), operation))
    }
}

pub(super) fn release_summary(order: &PurchaseOrder) -> ReleaseSummary {
    ReleaseSummary {
        order_id: order.id_typed(),
        status: order.status(),
        total: order.total(),
    }
}

/// Every purchase order released against `id`, staged copies included.
pub(super) fn releases_of(tx: &Transaction, id: BlanketOrderId) -> Vec<ReleaseSummary> {
    tx.select::<PurchaseOrder>(|o| o.blanket_order_id() == Some(id))
        .iter()
        .map(release_summary)
        .collect()
}

/// Run realization against the live releases. No-op unless the order is
/// open or partially ordered and its derived status changed.
pub(super) fn realize(tx: &mut Transaction, id: BlanketOrderId) -> ServiceResult<BlanketOrder> {
    let before: BlanketOrder = tx.load(id)?;
    let used = amount_used(&releases_of(tx, id));
    let order = tx.execute::<BlanketOrder>(id, &BlanketOrderCommand::Realize { amount_used: used })?;
    if order.status() != before.status() {
        info!(
            number = order.number(),
            from = %before.status(),
            to = %order.status(),
            amount_used = %used,
            "blanket order realized"
        );
    }
    Ok(order)
}

/// Releases whose quantities have been drawn from the blanket order.
pub(super) fn is_committed_release(status: PurchaseOrderStatus) -> bool {
    status.accepts_receipts()
}
