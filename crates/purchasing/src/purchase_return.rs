use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DomainError, DomainResult, Lifecycle, Money, TenantId,
    UserId, lifecycle,
};
use procura_events::Event;

use crate::receipt::GoodsReceipt;
use crate::reference::{
    GoodsReceiptId, LineQuantity, ProductId, PurchaseOrderId, PurchaseReturnId, VendorId,
    WarehouseId,
};

lifecycle! {
    pub enum ReturnStatus for "purchase return" {
        Draft = "draft",
        Posted = "posted",
        Cancelled = "cancelled",
    }
    transitions {
        Draft => [Posted, Cancelled],
        Posted => [],
        Cancelled => [],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub line_no: u32,
    pub receipt_line_no: u32,
    pub po_line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    /// Receipt unit cost plus allocated landed cost per unit.
    pub unit_cost: Decimal,
    pub amount: Money,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineInput {
    pub receipt_line_no: u32,
    pub quantity: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseReturn {
    pub return_id: PurchaseReturnId,
    pub number: String,
    pub vendor_id: VendorId,
    pub return_date: NaiveDate,
    pub lines: Vec<ReturnLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseReturnCommand {
    Post,
    Cancel { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseReturnChange {
    Created {
        tenant_id: TenantId,
        number: String,
        receipt_id: GoodsReceiptId,
        order_id: PurchaseOrderId,
        vendor_id: VendorId,
        warehouse_id: WarehouseId,
        return_date: NaiveDate,
        lines: Vec<ReturnLine>,
    },
    Posted { by: UserId },
    Cancelled { by: UserId, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReturnEvent {
    pub return_id: PurchaseReturnId,
    pub occurred_at: DateTime<Utc>,
    pub change: PurchaseReturnChange,
}

impl Event for PurchaseReturnEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            PurchaseReturnChange::Created { .. } => "procurement.purchase_return.created",
            PurchaseReturnChange::Posted { .. } => "procurement.purchase_return.posted",
            PurchaseReturnChange::Cancelled { .. } => "procurement.purchase_return.cancelled",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.purchase_return"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: PurchaseReturn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReturn {
    id: PurchaseReturnId,
    tenant_id: TenantId,
    number: String,
    receipt_id: GoodsReceiptId,
    order_id: PurchaseOrderId,
    vendor_id: VendorId,
    warehouse_id: WarehouseId,
    return_date: NaiveDate,
    status: ReturnStatus,
    lines: Vec<ReturnLine>,
    version: u64,
}

impl PurchaseReturn {
    /// Draft a return against a posted goods receipt.
    pub fn create(
        actor: &Actor,
        receipt: &GoodsReceipt,
        cmd: &CreatePurchaseReturn,
    ) -> DomainResult<(Self, Vec<PurchaseReturnEvent>)> {
        if !receipt.is_posted() {
            return Err(DomainError::validation(format!(
                "goods receipt {} must be posted before goods can be returned",
                receipt.number()
            )));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "purchase return requires at least one line",
            ));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            let receipt_line = receipt.line(input.receipt_line_no).ok_or_else(|| {
                DomainError::referential(format!(
                    "line {} does not exist on goods receipt {}",
                    input.receipt_line_no,
                    receipt.number()
                ))
            })?;
            let already: Decimal = cmd.lines[..idx]
                .iter()
                .filter(|l| l.receipt_line_no == input.receipt_line_no)
                .map(|l| l.quantity)
                .sum();
            let returnable = receipt_line.returnable_quantity() - already;
            if input.quantity <= Decimal::ZERO || input.quantity > returnable {
                return Err(DomainError::validation(format!(
                    "receipt line {}: return quantity {} must be within 0..={}",
                    input.receipt_line_no, input.quantity, returnable
                )));
            }
            let unit_cost = receipt_line.landed_unit_cost();
            lines.push(ReturnLine {
                line_no: idx as u32 + 1,
                receipt_line_no: receipt_line.line_no,
                po_line_no: receipt_line.po_line_no,
                product_id: receipt_line.product_id,
                quantity: input.quantity,
                unit_cost,
                amount: Money::line(input.quantity, unit_cost),
                reason: input.reason.clone(),
            });
        }

        let event = PurchaseReturnEvent {
            return_id: cmd.return_id,
            occurred_at: actor.at,
            change: PurchaseReturnChange::Created {
                tenant_id: actor.tenant_id,
                number: cmd.number.clone(),
                receipt_id: receipt.id_typed(),
                order_id: receipt.order_id(),
                vendor_id: cmd.vendor_id,
                warehouse_id: receipt.warehouse_id(),
                return_date: cmd.return_date,
                lines: lines.clone(),
            },
        };
        let ret = Self {
            id: cmd.return_id,
            tenant_id: actor.tenant_id,
            number: cmd.number.clone(),
            receipt_id: receipt.id_typed(),
            order_id: receipt.order_id(),
            vendor_id: cmd.vendor_id,
            warehouse_id: receipt.warehouse_id(),
            return_date: cmd.return_date,
            status: ReturnStatus::Draft,
            lines,
            version: 1,
        };
        Ok((ret, vec![event]))
    }

    pub fn id_typed(&self) -> PurchaseReturnId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn receipt_id(&self) -> GoodsReceiptId {
        self.receipt_id
    }

    pub fn order_id(&self) -> PurchaseOrderId {
        self.order_id
    }

    pub fn vendor_id(&self) -> VendorId {
        self.vendor_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn return_date(&self) -> NaiveDate {
        self.return_date
    }

    pub fn status(&self) -> ReturnStatus {
        self.status
    }

    pub fn lines(&self) -> &[ReturnLine] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(|l| l.amount).sum()
    }

    pub fn receipt_quantities(&self) -> Vec<LineQuantity> {
        self.lines
            .iter()
            .map(|l| LineQuantity::new(l.receipt_line_no, l.quantity))
            .collect()
    }

    pub fn order_quantities(&self) -> Vec<LineQuantity> {
        self.lines
            .iter()
            .map(|l| LineQuantity::new(l.po_line_no, l.quantity))
            .collect()
    }
}

impl AggregateRoot for PurchaseReturn {
    type Id = PurchaseReturnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for PurchaseReturn {
    type Command = PurchaseReturnCommand;
    type Event = PurchaseReturnEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            PurchaseReturnChange::Created { .. } => {}
            PurchaseReturnChange::Posted { .. } => self.status = ReturnStatus::Posted,
            PurchaseReturnChange::Cancelled { .. } => self.status = ReturnStatus::Cancelled,
        }
        self.version += 1;
    }

    fn handle(
        &self,
        actor: &Actor,
        command: &Self::Command,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        actor.ensure_tenant(Some(self.tenant_id))?;

        let change = match command {
            PurchaseReturnCommand::Post => {
                self.status.transition_to(ReturnStatus::Posted)?;
                PurchaseReturnChange::Posted { by: actor.user_id }
            }
            PurchaseReturnCommand::Cancel { reason } => {
                self.status.transition_to(ReturnStatus::Cancelled)?;
                PurchaseReturnChange::Cancelled {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
        };

        Ok(vec![PurchaseReturnEvent {
            return_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}
