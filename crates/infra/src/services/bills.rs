use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use procura_core::{Actor, DomainError, TaxRates};
use procura_purchasing::journal::bill_entry;
use procura_purchasing::matching::{OrderedLine, evaluate};
use procura_purchasing::{
    BillLineInput, CreateThreeWayMatch, CreateVendorBill, DocumentKind, GoodsReceipt,
    MatchInput, MatchStatus, ProductId, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId,
    ThreeWayMatch, ThreeWayMatchCommand, ThreeWayMatchId, VendorBill, VendorBillCommand,
    VendorBillId, VendorId,
};

use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;
use crate::store::{Effect, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVendorBill {
    pub vendor_id: VendorId,
    pub order_id: Option<PurchaseOrderId>,
    pub vendor_reference: Option<String>,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax: TaxRates,
    pub lines: Vec<BillLineInput>,
}

impl<B: ProcurementBus> ProcurementService<B> {
    /// Record a vendor bill and match it against its order and receipts.
    ///
    /// Billed quantities are drawn from the order's received-but-unbilled
    /// quantity; exceeding it fails with a referential error. Lines without an
    /// order line number are linked by product, and every line must resolve to
    /// an order line carrying the same product.
    pub fn create_vendor_bill(
        &self,
        actor: &Actor,
        input: NewVendorBill,
    ) -> ServiceResult<VendorBill> {
        self.run(actor, "create_vendor_bill", |tx| {
            let mut lines = input.lines.clone();
            if let Some(order_id) = input.order_id {
                let order: PurchaseOrder = tx.load(order_id)?;
                if order.vendor_id() != input.vendor_id {
                    return Err(DomainError::referential(format!(
                        "purchase order {} belongs to another vendor",
                        order.number()
                    ))
                    .into());
                }
                link_order_lines(&order, &mut lines)?;
            }

            let bill_id = VendorBillId::generate();
            let cmd = CreateVendorBill {
                bill_id,
                number: self.next_number(tx, DocumentKind::VendorBill, input.bill_date)?,
                vendor_id: input.vendor_id,
                order_id: input.order_id,
                vendor_reference: input.vendor_reference.clone(),
                bill_date: input.bill_date,
                due_date: input.due_date,
                tax: input.tax,
                lines,
            };
            let (bill, events) = VendorBill::create(tx.actor(), &cmd)?;
            let bill = tx.insert(bill, events)?;
            record_billing(tx, &bill)?;
            self.match_bill(tx, bill_id)
        })
        .inspect(|b| log_transition(DocumentKind::VendorBill, b.number(), b.status(), "created"))
    }

    /// Replace the lines of a draft bill. The previous quantities are given
    /// back to the order before the new ones are drawn, then the bill is
    /// re-matched.
    pub fn update_vendor_bill(
        &self,
        actor: &Actor,
        id: VendorBillId,
        lines: Vec<BillLineInput>,
        tax: TaxRates,
    ) -> ServiceResult<VendorBill> {
        self.run(actor, "update_vendor_bill", |tx| {
            let before: VendorBill = tx.load(id)?;
            let mut lines = lines.clone();
            if let Some(order_id) = before.order_id() {
                let order: PurchaseOrder = tx.load(order_id)?;
                link_order_lines(&order, &mut lines)?;
                let previous = before.order_quantities();
                if !previous.is_empty() {
                    tx.execute::<PurchaseOrder>(
                        order_id,
                        &PurchaseOrderCommand::ReverseBilling {
                            bill_id: id,
                            lines: previous,
                        },
                    )?;
                }
            }
            let bill =
                tx.execute::<VendorBill>(id, &VendorBillCommand::ReplaceLines { lines, tax })?;
            record_billing(tx, &bill)?;
            self.match_bill(tx, id)
        })
        .inspect(|b| log_transition(DocumentKind::VendorBill, b.number(), b.status(), "updated"))
    }

    /// Post a matched (or variance-approved) bill and hand its journal entry
    /// to the ledger after commit.
    pub fn post_vendor_bill(&self, actor: &Actor, id: VendorBillId) -> ServiceResult<VendorBill> {
        self.run(actor, "post_vendor_bill", |tx| {
            let bill = tx.execute::<VendorBill>(id, &VendorBillCommand::Post)?;
            let entry = bill_entry(id.into(), bill.number(), bill.bill_date(), &bill.totals())?;
            tx.push_effect(Effect::PostJournal(entry));
            Ok(bill)
        })
        .inspect(|b| log_transition(DocumentKind::VendorBill, b.number(), b.status(), "posted"))
    }

    /// Re-run the three-way match of a draft bill against current state.
    pub fn rematch_vendor_bill(
        &self,
        actor: &Actor,
        id: VendorBillId,
    ) -> ServiceResult<ThreeWayMatch> {
        self.run(actor, "rematch_vendor_bill", |tx| {
            let bill = self.match_bill(tx, id)?;
            match_of(tx, &bill)
        })
    }

    /// Accept the variance of a partial or failed match so the bill can be
    /// posted.
    pub fn approve_match(
        &self,
        actor: &Actor,
        bill_id: VendorBillId,
        notes: Option<String>,
    ) -> ServiceResult<ThreeWayMatch> {
        self.run(actor, "approve_match", |tx| {
            let bill: VendorBill = tx.load(bill_id)?;
            let record = match_of(tx, &bill)?;
            let record = tx.execute::<ThreeWayMatch>(
                record.id_typed(),
                &ThreeWayMatchCommand::Approve {
                    notes: notes.clone(),
                },
            )?;
            tx.execute::<VendorBill>(
                bill_id,
                &VendorBillCommand::RecordMatch {
                    match_id: record.id_typed(),
                    status: MatchStatus::Approved,
                },
            )?;
            Ok(record)
        })
        .inspect(|m| {
            info!(bill_id = %bill_id, match_id = %m.id_typed(), status = %m.status(), "match variance approved")
        })
    }

    /// Evaluate a bill against its order and the order's posted receipts,
    /// then create or overwrite its match record and mirror the status on
    /// the bill.
    pub(super) fn match_bill(
        &self,
        tx: &mut Transaction,
        bill_id: VendorBillId,
    ) -> ServiceResult<VendorBill> {
        let bill: VendorBill = tx.load(bill_id)?;
        let order = match bill.order_id() {
            Some(order_id) => Some(tx.load::<PurchaseOrder>(order_id)?),
            None => None,
        };
        let receipts = match &order {
            Some(order) => {
                let order_id = order.id_typed();
                tx.select::<GoodsReceipt>(|r| r.order_id() == order_id && r.is_posted())
            }
            None => Vec::new(),
        };

        let input = MatchInput {
            ordered: order.as_ref().map(ordered_lines),
            received: (!receipts.is_empty()).then(|| received_by_product(&receipts)),
            billed: bill.billed_lines(),
        };
        let outcome = evaluate(&input, &self.config.tolerances);
        let status = outcome.status;
        let receipt_id = receipts
            .iter()
            .max_by_key(|r| (r.posted_at(), r.receipt_date()))
            .map(|r| r.id_typed());

        let match_id = match bill.match_id() {
            Some(match_id) => {
                tx.execute::<ThreeWayMatch>(
                    match_id,
                    &ThreeWayMatchCommand::Rematch {
                        receipt_id,
                        outcome,
                    },
                )?;
                match_id
            }
            None => {
                let cmd = CreateThreeWayMatch {
                    match_id: ThreeWayMatchId::generate(),
                    bill_id,
                    order_id: bill.order_id(),
                    receipt_id,
                    outcome,
                };
                let (record, events) = ThreeWayMatch::create(tx.actor(), &cmd)?;
                tx.insert(record, events)?.id_typed()
            }
        };

        info!(bill = bill.number(), status = %status, "bill matched");
        tx.execute::<VendorBill>(bill_id, &VendorBillCommand::RecordMatch { match_id, status })
    }
}

/// Draw the bill's order-line quantities from its order.
fn record_billing(tx: &mut Transaction, bill: &VendorBill) -> ServiceResult<()> {
    let lines = bill.order_quantities();
    if let (Some(order_id), false) = (bill.order_id(), lines.is_empty()) {
        tx.execute::<PurchaseOrder>(
            order_id,
            &PurchaseOrderCommand::RecordBilling {
                bill_id: bill.id_typed(),
                lines,
            },
        )?;
    }
    Ok(())
}

fn match_of(tx: &mut Transaction, bill: &VendorBill) -> ServiceResult<ThreeWayMatch> {
    let match_id = bill.match_id().ok_or_else(|| {
        DomainError::not_found(format!("three-way match for vendor bill {}", bill.number()))
    })?;
    tx.load(match_id)
}

/// Fill missing order line numbers from the first order line with the same
/// product. A line whose product is not on the order, or whose line number
/// points at another product, is rejected.
fn link_order_lines(order: &PurchaseOrder, lines: &mut [BillLineInput]) -> ServiceResult<()> {
    for line in lines.iter_mut() {
        let order_line = match line.po_line_no {
            Some(line_no) => order.line(line_no).ok_or_else(|| {
                DomainError::referential(format!(
                    "line {line_no} does not exist on purchase order {}",
                    order.number()
                ))
            })?,
            None => order.line_for_product(line.product_id).ok_or_else(|| {
                DomainError::referential(format!(
                    "product {} is not on purchase order {}",
                    line.product_id,
                    order.number()
                ))
            })?,
        };
        if order_line.product_id != line.product_id {
            return Err(DomainError::referential(format!(
                "line {} of purchase order {} is for another product",
                order_line.line_no,
                order.number()
            ))
            .into());
        }
        line.po_line_no = Some(order_line.line_no);
    }
    Ok(())
}

fn ordered_lines(order: &PurchaseOrder) -> Vec<OrderedLine> {
    order
        .lines()
        .iter()
        .map(|l| OrderedLine {
            line_no: l.line_no,
            product_id: l.product_id,
            quantity: l.quantity,
            unit_price: l.unit_price,
            quantity_billed: l.quantity_billed,
        })
        .collect()
}

fn received_by_product(receipts: &[GoodsReceipt]) -> Vec<(ProductId, Decimal)> {
    let mut totals: BTreeMap<ProductId, Decimal> = BTreeMap::new();
    for line in receipts.iter().flat_map(|r| r.lines()) {
        *totals.entry(line.product_id).or_default() += line.quantity_received;
    }
    totals.into_iter().collect()
}
