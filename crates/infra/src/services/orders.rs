use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{Actor, DomainError, TaxRates};
use procura_purchasing::consumption::amount_used_excluding;
use procura_purchasing::{
    BlanketOrder, BlanketOrderCommand, BlanketOrderId, ConversionTarget, CreatePurchaseOrder,
    DocumentKind, OrderLineInput, OrderOrigin, ProductId, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderId, PurchaseRequest, PurchaseRequestCommand, PurchaseRequestId,
    PurchaseRequestStatus, ReleaseLine, Rfq, RfqCommand, RfqId, VendorId, WarehouseId,
};

use super::blanket::{is_committed_release, realize, releases_of};
use super::requests::sourceable_request;
use super::rfqs::awarded_lines;
use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;
use crate::store::Transaction;

/// Header and lines of a purchase order entered directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub vendor_id: VendorId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub tax: TaxRates,
    pub lines: Vec<OrderLineInput>,
}

/// Quantity of one blanket-order product to release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseQuantity {
    pub product_id: ProductId,
    pub quantity: Decimal,
}

/// A purchase order drawn against a blanket order at the blanket prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub blanket_order_id: BlanketOrderId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub tax: TaxRates,
    pub lines: Vec<ReleaseQuantity>,
}

impl<B: ProcurementBus> ProcurementService<B> {
    pub fn create_purchase_order(
        &self,
        actor: &Actor,
        input: NewPurchaseOrder,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "create_purchase_order", |tx| {
            let cmd = CreatePurchaseOrder {
                order_id: PurchaseOrderId::generate(),
                number: self.next_number(tx, DocumentKind::PurchaseOrder, input.order_date)?,
                vendor_id: input.vendor_id,
                warehouse_id: input.warehouse_id,
                order_date: input.order_date,
                expected_date: input.expected_date,
                origin: OrderOrigin::default(),
                tax: input.tax,
                lines: input.lines.clone(),
            };
            insert_order(tx, &cmd)
        })
        .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "created"))
    }

    /// Order an approved purchase request from `vendor_id` at its estimated
    /// prices; the request becomes `converted`.
    pub fn create_order_from_request(
        &self,
        actor: &Actor,
        request_id: PurchaseRequestId,
        vendor_id: VendorId,
        warehouse_id: WarehouseId,
        order_date: NaiveDate,
        tax: TaxRates,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "create_order_from_request", |tx| {
            let request = sourceable_request(tx, request_id)?;
            let order_id = PurchaseOrderId::generate();
            let cmd = CreatePurchaseOrder {
                order_id,
                number: self.next_number(tx, DocumentKind::PurchaseOrder, order_date)?,
                vendor_id,
                warehouse_id,
                order_date,
                expected_date: request.lines().iter().filter_map(|l| l.required_date).min(),
                origin: OrderOrigin {
                    purchase_request_id: Some(request_id),
                    ..OrderOrigin::default()
                },
                tax,
                lines: request
                    .lines()
                    .iter()
                    .map(|l| OrderLineInput {
                        product_id: l.product_id,
                        description: None,
                        quantity: l.quantity,
                        unit_price: l.estimated_unit_price,
                    })
                    .collect(),
            };
            let order = insert_order(tx, &cmd)?;
            tx.execute::<PurchaseRequest>(
                request_id,
                &PurchaseRequestCommand::MarkConverted {
                    target: ConversionTarget::PurchaseOrder(order_id),
                },
            )?;
            Ok(order)
        })
        .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "created_from_request"))
    }

    /// Order from the winning quote of an awarded RFQ. An approved request
    /// behind the RFQ is marked converted.
    pub fn create_order_from_rfq(
        &self,
        actor: &Actor,
        rfq_id: RfqId,
        warehouse_id: WarehouseId,
        order_date: NaiveDate,
        tax: TaxRates,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "create_order_from_rfq", |tx| {
            let rfq: Rfq = tx.load(rfq_id)?;
            let (vendor_id, priced) = awarded_lines(&rfq)?;
            let order_id = PurchaseOrderId::generate();
            let cmd = CreatePurchaseOrder {
                order_id,
                number: self.next_number(tx, DocumentKind::PurchaseOrder, order_date)?,
                vendor_id,
                warehouse_id,
                order_date,
                expected_date: None,
                origin: OrderOrigin {
                    purchase_request_id: rfq.purchase_request_id(),
                    rfq_id: Some(rfq_id),
                    blanket_order_id: None,
                },
                tax,
                lines: priced
                    .into_iter()
                    .map(|(line, unit_price)| OrderLineInput {
                        product_id: line.product_id,
                        description: line.description,
                        quantity: line.quantity,
                        unit_price,
                    })
                    .collect(),
            };
            let order = insert_order(tx, &cmd)?;
            tx.execute::<Rfq>(rfq_id, &RfqCommand::LinkOrder { order_id })?;

            if let Some(request_id) = rfq.purchase_request_id() {
                let request: PurchaseRequest = tx.load(request_id)?;
                if request.status() == PurchaseRequestStatus::Approved {
                    tx.execute::<PurchaseRequest>(
                        request_id,
                        &PurchaseRequestCommand::MarkConverted {
                            target: ConversionTarget::PurchaseOrder(order_id),
                        },
                    )?;
                }
            }
            Ok(order)
        })
        .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "created_from_rfq"))
    }

    /// Release a purchase order against a blanket order.
    ///
    /// Vendor and prices come from the blanket order. The release total is
    /// checked against the amount left by the other live releases and each
    /// line against the remaining agreed quantity.
    pub fn create_release(
        &self,
        actor: &Actor,
        input: ReleaseRequest,
    ) -> ServiceResult<PurchaseOrder> {
        let result = self.run(actor, "create_release", |tx| self.stage_release(tx, &input));
        if let Err(e) = &result {
            if matches!(e.domain(), Some(DomainError::CommitmentExceeded { .. })) {
                tracing::warn!(blanket_order_id = %input.blanket_order_id, error = %e, "release rejected");
            }
        }
        result.inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "released"))
    }

    /// Insert a release and register it on its blanket order inside `tx`.
    pub(crate) fn stage_release(
        &self,
        tx: &mut Transaction,
        input: &ReleaseRequest,
    ) -> ServiceResult<PurchaseOrder> {
        let blanket: BlanketOrder = tx.load(input.blanket_order_id)?;
        let mut lines = Vec::with_capacity(input.lines.len());
        for requested in &input.lines {
            let line = blanket.line_for(requested.product_id).ok_or_else(|| {
                DomainError::referential(format!(
                    "product {} is not on blanket order {}",
                    requested.product_id,
                    blanket.number()
                ))
            })?;
            lines.push(OrderLineInput {
                product_id: requested.product_id,
                description: None,
                quantity: requested.quantity,
                unit_price: line.unit_price,
            });
        }

        let cmd = CreatePurchaseOrder {
            order_id: PurchaseOrderId::generate(),
            number: self.next_number(tx, DocumentKind::PurchaseOrder, input.order_date)?,
            vendor_id: blanket.vendor_id(),
            warehouse_id: input.warehouse_id,
            order_date: input.order_date,
            expected_date: input.expected_date,
            origin: OrderOrigin {
                blanket_order_id: Some(input.blanket_order_id),
                ..OrderOrigin::default()
            },
            tax: input.tax,
            lines,
        };
        let order = insert_order(tx, &cmd)?;
        register_release(tx, &order)?;
        realize(tx, input.blanket_order_id)?;
        Ok(order)
    }

    /// Replace the lines of a draft order. Releases are re-validated against
    /// their blanket order, excluding their own previous total.
    pub fn update_purchase_order(
        &self,
        actor: &Actor,
        id: PurchaseOrderId,
        lines: Vec<OrderLineInput>,
        tax: TaxRates,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "update_purchase_order", |tx| {
            let order = tx.execute::<PurchaseOrder>(
                id,
                &PurchaseOrderCommand::ReplaceLines {
                    lines: lines.clone(),
                    tax,
                },
            )?;
            if let Some(blanket_id) = order.blanket_order_id() {
                register_release(tx, &order)?;
                realize(tx, blanket_id)?;
            }
            Ok(order)
        })
        .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "updated"))
    }

    /// Submit a draft order. Orders the approval policy gates wait in
    /// `pending_approval`; the rest are approved in the same unit of work.
    pub fn submit_purchase_order(
        &self,
        actor: &Actor,
        id: PurchaseOrderId,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "submit_purchase_order", |tx| {
            let order = tx.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Submit)?;
            if self.route_for_approval(tx, id.into(), order.number(), order.total()) {
                tx.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::RequestApproval)
            } else {
                approve_order(tx, id)
            }
        })
        .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "submitted"))
    }

    /// Approve an order; releases draw their quantities from the blanket
    /// order in the same unit of work.
    pub fn approve_purchase_order(
        &self,
        actor: &Actor,
        id: PurchaseOrderId,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "approve_purchase_order", |tx| approve_order(tx, id))
            .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "approved"))
    }

    /// Send an order back to draft after an approval rejection.
    pub fn reject_purchase_order(
        &self,
        actor: &Actor,
        id: PurchaseOrderId,
        reason: &str,
    ) -> ServiceResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::Reject {
            reason: reason.to_string(),
        };
        self.run(actor, "reject_purchase_order", |tx| tx.execute::<PurchaseOrder>(id, &command))
            .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "rejected"))
    }

    /// Cancel an order that has not been billed. A release is withdrawn from
    /// its blanket order, returning any quantities it drew.
    pub fn cancel_purchase_order(
        &self,
        actor: &Actor,
        id: PurchaseOrderId,
        reason: &str,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "cancel_purchase_order", |tx| {
            let before: PurchaseOrder = tx.load(id)?;
            let order = tx.execute::<PurchaseOrder>(
                id,
                &PurchaseOrderCommand::Cancel {
                    reason: reason.to_string(),
                },
            )?;
            if let Some(blanket_id) = order.blanket_order_id() {
                tx.execute::<BlanketOrder>(
                    blanket_id,
                    &BlanketOrderCommand::WithdrawRelease { order_id: id },
                )?;
                if is_committed_release(before.status()) {
                    tx.execute::<BlanketOrder>(
                        blanket_id,
                        &BlanketOrderCommand::ReverseOrdered {
                            order_id: id,
                            lines: release_lines(&order),
                        },
                    )?;
                }
                realize(tx, blanket_id)?;
            }
            Ok(order)
        })
        .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "cancelled"))
    }

    pub fn lock_purchase_order(
        &self,
        actor: &Actor,
        id: PurchaseOrderId,
    ) -> ServiceResult<PurchaseOrder> {
        self.run(actor, "lock_purchase_order", |tx| {
            tx.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Lock)
        })
        .inspect(|o| log_transition(DocumentKind::PurchaseOrder, o.number(), o.status(), "locked"))
    }
}

fn insert_order(tx: &mut Transaction, cmd: &CreatePurchaseOrder) -> ServiceResult<PurchaseOrder> {
    let (order, events) = PurchaseOrder::create(tx.actor(), cmd)?;
    tx.insert(order, events)
}

fn release_lines(order: &PurchaseOrder) -> Vec<ReleaseLine> {
    order
        .lines()
        .iter()
        .map(|l| ReleaseLine {
            product_id: l.product_id,
            quantity: l.quantity,
            unit_price: l.unit_price,
        })
        .collect()
}

/// Validate a (new or edited) release against its blanket order.
fn register_release(tx: &mut Transaction, order: &PurchaseOrder) -> ServiceResult<()> {
    let Some(blanket_id) = order.blanket_order_id() else {
        return Ok(());
    };
    let others = amount_used_excluding(&releases_of(tx, blanket_id), order.id_typed());
    tx.execute::<BlanketOrder>(
        blanket_id,
        &BlanketOrderCommand::RegisterRelease {
            order_id: order.id_typed(),
            vendor_id: order.vendor_id(),
            order_date: order.order_date(),
            total: order.total(),
            lines: release_lines(order),
            amount_used_excluding: others,
        },
    )?;
    Ok(())
}

/// Approve and, for releases, draw the ordered quantities.
pub(super) fn approve_order(tx: &mut Transaction, id: PurchaseOrderId) -> ServiceResult<PurchaseOrder> {
    let order = tx.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Approve)?;
    if let Some(blanket_id) = order.blanket_order_id() {
        tx.execute::<BlanketOrder>(
            blanket_id,
            &BlanketOrderCommand::RecordOrdered {
                order_id: id,
                lines: release_lines(&order),
            },
        )?;
        realize(tx, blanket_id)?;
    }
    Ok(order)
}
