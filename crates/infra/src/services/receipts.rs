use chrono::NaiveDate;
use rust_decimal::Decimal;

use procura_core::{Actor, DomainError, Money};
use procura_purchasing::{
    AllocationMethod, BillStatus, CreateGoodsReceipt, DocumentKind, GoodsReceipt,
    GoodsReceiptCommand, GoodsReceiptId, LandedCostType, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderId, ReceiptLineInput, VendorBill,
};

use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;
use crate::store::Effect;

const DEFAULT_UOM: &str = "unit";

impl<B: ProcurementBus> ProcurementService<B> {
    /// Draft a goods receipt against an order that accepts receipts.
    ///
    /// Without explicit lines, every order line is received for its
    /// outstanding quantity at the order price.
    pub fn create_goods_receipt(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
        receipt_date: NaiveDate,
        lines: Vec<ReceiptLineInput>,
    ) -> ServiceResult<GoodsReceipt> {
        self.run(actor, "create_goods_receipt", |tx| {
            let order: PurchaseOrder = tx.load(order_id)?;
            if !order.status().accepts_receipts() {
                return Err(DomainError::validation(format!(
                    "purchase order {} is {} and cannot receive goods",
                    order.number(),
                    order.status()
                ))
                .into());
            }

            let lines = if lines.is_empty() {
                outstanding_lines(&order)
            } else {
                for input in &lines {
                    let po_line = order.line(input.po_line_no).ok_or_else(|| {
                        DomainError::referential(format!(
                            "line {} does not exist on purchase order {}",
                            input.po_line_no,
                            order.number()
                        ))
                    })?;
                    if po_line.product_id != input.product_id {
                        return Err(DomainError::referential(format!(
                            "receipt product {} does not match line {} of purchase order {}",
                            input.product_id,
                            input.po_line_no,
                            order.number()
                        ))
                        .into());
                    }
                }
                lines.clone()
            };
            if lines.is_empty() {
                return Err(DomainError::validation(format!(
                    "purchase order {} has nothing left to receive",
                    order.number()
                ))
                .into());
            }

            let cmd = CreateGoodsReceipt {
                receipt_id: GoodsReceiptId::generate(),
                number: self.next_number(tx, DocumentKind::GoodsReceipt, receipt_date)?,
                order_id,
                warehouse_id: order.warehouse_id(),
                receipt_date,
                lines,
            };
            let (receipt, events) = GoodsReceipt::create(tx.actor(), &cmd)?;
            tx.insert(receipt, events)
        })
        .inspect(|r| log_transition(DocumentKind::GoodsReceipt, r.number(), r.status(), "created"))
    }

    pub fn record_quality_check(
        &self,
        actor: &Actor,
        id: GoodsReceiptId,
        line_no: u32,
        passed: Decimal,
        failed: Decimal,
    ) -> ServiceResult<GoodsReceipt> {
        let command = GoodsReceiptCommand::RecordQc {
            line_no,
            passed,
            failed,
        };
        self.run(actor, "record_quality_check", |tx| tx.execute::<GoodsReceipt>(id, &command))
            .inspect(|r| log_transition(DocumentKind::GoodsReceipt, r.number(), r.status(), "inspected"))
    }

    /// Allocate an ancillary cost across the lines of a draft receipt.
    /// Weight-based allocation reads unit weights from the product catalog.
    pub fn add_landed_cost(
        &self,
        actor: &Actor,
        id: GoodsReceiptId,
        cost_type: LandedCostType,
        description: Option<String>,
        amount: Money,
        method: AllocationMethod,
    ) -> ServiceResult<GoodsReceipt> {
        self.run(actor, "add_landed_cost", |tx| {
            let receipt: GoodsReceipt = tx.load(id)?;
            let unit_weights = if method == AllocationMethod::ByWeight {
                receipt
                    .lines()
                    .iter()
                    .filter_map(|l| {
                        self.ports
                            .catalog
                            .weight(tx.tenant_id(), l.product_id)
                            .map(|w| (l.line_no, w))
                    })
                    .collect()
            } else {
                Vec::new()
            };
            tx.execute::<GoodsReceipt>(
                id,
                &GoodsReceiptCommand::AddLandedCost {
                    cost_type,
                    description: description.clone(),
                    amount,
                    method,
                    unit_weights,
                },
            )
        })
        .inspect(|r| log_transition(DocumentKind::GoodsReceipt, r.number(), r.status(), "landed_cost_added"))
    }

    /// Post a receipt: the order's received quantities move, stock is
    /// incremented after commit and draft bills on the order are re-matched.
    pub fn post_goods_receipt(
        &self,
        actor: &Actor,
        id: GoodsReceiptId,
    ) -> ServiceResult<GoodsReceipt> {
        self.run(actor, "post_goods_receipt", |tx| {
            let receipt = tx.execute::<GoodsReceipt>(id, &GoodsReceiptCommand::Post)?;
            let order_id = receipt.order_id();
            tx.execute::<PurchaseOrder>(
                order_id,
                &PurchaseOrderCommand::RecordReceipt {
                    receipt_id: id,
                    lines: receipt.order_quantities(),
                },
            )?;
            for line in receipt.lines() {
                tx.push_effect(Effect::IncrementStock {
                    warehouse_id: receipt.warehouse_id(),
                    product_id: line.product_id,
                    quantity: line.quantity_received,
                });
            }

            let drafts = tx.select::<VendorBill>(|b| {
                b.order_id() == Some(order_id) && b.status() == BillStatus::Draft
            });
            for bill in drafts {
                self.match_bill(tx, bill.id_typed())?;
            }
            Ok(receipt)
        })
        .inspect(|r| log_transition(DocumentKind::GoodsReceipt, r.number(), r.status(), "posted"))
    }

    pub fn cancel_goods_receipt(
        &self,
        actor: &Actor,
        id: GoodsReceiptId,
        reason: &str,
    ) -> ServiceResult<GoodsReceipt> {
        let command = GoodsReceiptCommand::Cancel {
            reason: reason.to_string(),
        };
        self.run(actor, "cancel_goods_receipt", |tx| tx.execute::<GoodsReceipt>(id, &command))
            .inspect(|r| log_transition(DocumentKind::GoodsReceipt, r.number(), r.status(), "cancelled"))
    }
}

fn outstanding_lines(order: &PurchaseOrder) -> Vec<ReceiptLineInput> {
    order
        .lines()
        .iter()
        .filter(|l| !l.is_fully_received())
        .map(|l| ReceiptLineInput {
            po_line_no: l.line_no,
            product_id: l.product_id,
            uom: DEFAULT_UOM.to_string(),
            quantity_received: l.quantity - l.quantity_received,
            unit_cost: l.unit_price,
        })
        .collect()
}
