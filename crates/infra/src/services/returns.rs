use chrono::NaiveDate;

use procura_core::Actor;
use procura_purchasing::journal::return_entry;
use procura_purchasing::{
    CreatePurchaseReturn, DocumentKind, GoodsReceipt, GoodsReceiptCommand, GoodsReceiptId,
    PurchaseOrder, PurchaseOrderCommand, PurchaseReturn, PurchaseReturnCommand, PurchaseReturnId,
    ReturnLineInput,
};

use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;
use crate::store::Effect;

impl<B: ProcurementBus> ProcurementService<B> {
    /// Draft a return of goods from a posted receipt to the order's vendor.
    pub fn create_purchase_return(
        &self,
        actor: &Actor,
        receipt_id: GoodsReceiptId,
        return_date: NaiveDate,
        lines: Vec<ReturnLineInput>,
    ) -> ServiceResult<PurchaseReturn> {
        self.run(actor, "create_purchase_return", |tx| {
            let receipt: GoodsReceipt = tx.load(receipt_id)?;
            let order: PurchaseOrder = tx.load(receipt.order_id())?;
            let cmd = CreatePurchaseReturn {
                return_id: PurchaseReturnId::generate(),
                number: self.next_number(tx, DocumentKind::PurchaseReturn, return_date)?,
                vendor_id: order.vendor_id(),
                return_date,
                lines: lines.clone(),
            };
            let (ret, events) = PurchaseReturn::create(tx.actor(), &receipt, &cmd)?;
            tx.insert(ret, events)
        })
        .inspect(|r| log_transition(DocumentKind::PurchaseReturn, r.number(), r.status(), "created"))
    }

    /// Post a return. Receipt and order returned quantities move in the same
    /// unit of work; stock and the ledger are updated after commit.
    pub fn post_purchase_return(
        &self,
        actor: &Actor,
        id: PurchaseReturnId,
    ) -> ServiceResult<PurchaseReturn> {
        self.run(actor, "post_purchase_return", |tx| {
            let ret = tx.execute::<PurchaseReturn>(id, &PurchaseReturnCommand::Post)?;
            tx.execute::<GoodsReceipt>(
                ret.receipt_id(),
                &GoodsReceiptCommand::RecordReturn {
                    return_id: id,
                    lines: ret.receipt_quantities(),
                },
            )?;
            tx.execute::<PurchaseOrder>(
                ret.order_id(),
                &PurchaseOrderCommand::RecordReturn {
                    return_id: id,
                    lines: ret.order_quantities(),
                },
            )?;

            for line in ret.lines() {
                tx.push_effect(Effect::DecrementStock {
                    warehouse_id: ret.warehouse_id(),
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
            let entry = return_entry(id.into(), ret.number(), ret.return_date(), ret.total())?;
            tx.push_effect(Effect::PostJournal(entry));
            Ok(ret)
        })
        .inspect(|r| log_transition(DocumentKind::PurchaseReturn, r.number(), r.status(), "posted"))
    }

    pub fn cancel_purchase_return(
        &self,
        actor: &Actor,
        id: PurchaseReturnId,
        reason: &str,
    ) -> ServiceResult<PurchaseReturn> {
        let command = PurchaseReturnCommand::Cancel {
            reason: reason.to_string(),
        };
        self.run(actor, "cancel_purchase_return", |tx| tx.execute::<PurchaseReturn>(id, &command))
            .inspect(|r| log_transition(DocumentKind::PurchaseReturn, r.number(), r.status(), "cancelled"))
    }
}
