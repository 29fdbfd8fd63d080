//! Goods receipt: quantities physically received against a purchase order.
//!
//! Posting is the only point at which the order's received quantities and
//! stock are mutated. A posted receipt is reversed through purchase returns.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DomainError, DomainResult, Lifecycle, Money, TenantId,
    UserId, lifecycle,
};
use procura_events::Event;

use crate::landed_cost::{
    AllocationBasis, AllocationMethod, AppliedMethod, LandedCostAllocation, LandedCostType,
    allocate,
};
use crate::reference::{
    GoodsReceiptId, LineQuantity, ProductId, PurchaseOrderId, PurchaseReturnId, WarehouseId,
};

lifecycle! {
    pub enum ReceiptStatus for "goods receipt" {
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

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub po_line_no: u32,
    pub product_id: ProductId,
    pub uom: String,
    pub quantity_received: Decimal,
    pub unit_cost: Decimal,
    pub landed_cost_total: Money,
    pub qc_status: QcStatus,
    pub quantity_passed: Decimal,
    pub quantity_failed: Decimal,
    pub quantity_returned: Decimal,
}

impl ReceiptLine {
    pub fn value(&self) -> Money {
        Money::line(self.quantity_received, self.unit_cost)
    }

    /// Unit cost including allocated landed cost.
    pub fn landed_unit_cost(&self) -> Decimal {
        if self.quantity_received.is_zero() {
            return self.unit_cost;
        }
        self.unit_cost + self.landed_cost_total.amount() / self.quantity_received
    }

    pub fn returnable_quantity(&self) -> Decimal {
        self.quantity_received - self.quantity_returned
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLineInput {
    pub po_line_no: u32,
    pub product_id: ProductId,
    pub uom: String,
    pub quantity_received: Decimal,
    pub unit_cost: Decimal,
}

/// One ancillary cost and how it was spread over the lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCost {
    pub cost_type: LandedCostType,
    pub description: Option<String>,
    pub amount: Money,
    pub method: AllocationMethod,
    pub applied: AppliedMethod,
    pub allocations: Vec<LandedCostAllocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGoodsReceipt {
    pub receipt_id: GoodsReceiptId,
    pub number: String,
    pub order_id: PurchaseOrderId,
    pub warehouse_id: WarehouseId,
    pub receipt_date: NaiveDate,
    pub lines: Vec<ReceiptLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoodsReceiptCommand {
    RecordQc {
        line_no: u32,
        passed: Decimal,
        failed: Decimal,
    },
    AddLandedCost {
        cost_type: LandedCostType,
        description: Option<String>,
        amount: Money,
        method: AllocationMethod,
        /// Catalog unit weights per line, for by-weight allocation.
        unit_weights: Vec<(u32, Decimal)>,
    },
    Post,
    Cancel { reason: String },
    RecordReturn {
        return_id: PurchaseReturnId,
        lines: Vec<LineQuantity>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoodsReceiptChange {
    Created {
        tenant_id: TenantId,
        number: String,
        order_id: PurchaseOrderId,
        warehouse_id: WarehouseId,
        receipt_date: NaiveDate,
        lines: Vec<ReceiptLine>,
    },
    QcRecorded {
        line_no: u32,
        status: QcStatus,
        passed: Decimal,
        failed: Decimal,
    },
    LandedCostAdded { cost: LandedCost },
    Posted { by: UserId },
    Cancelled { by: UserId, reason: String },
    ReturnRecorded {
        return_id: PurchaseReturnId,
        lines: Vec<LineQuantity>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptEvent {
    pub receipt_id: GoodsReceiptId,
    pub occurred_at: DateTime<Utc>,
    pub change: GoodsReceiptChange,
}

impl Event for GoodsReceiptEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            GoodsReceiptChange::Created { .. } => "procurement.goods_receipt.created",
            GoodsReceiptChange::QcRecorded { .. } => "procurement.goods_receipt.qc_recorded",
            GoodsReceiptChange::LandedCostAdded { .. } => {
                "procurement.goods_receipt.landed_cost_added"
            }
            GoodsReceiptChange::Posted { .. } => "procurement.goods_receipt.posted",
            GoodsReceiptChange::Cancelled { .. } => "procurement.goods_receipt.cancelled",
            GoodsReceiptChange::ReturnRecorded { .. } => "procurement.goods_receipt.return_recorded",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.goods_receipt"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: GoodsReceipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodsReceipt {
    id: GoodsReceiptId,
    tenant_id: TenantId,
    number: String,
    order_id: PurchaseOrderId,
    warehouse_id: WarehouseId,
    receipt_date: NaiveDate,
    status: ReceiptStatus,
    lines: Vec<ReceiptLine>,
    landed_costs: Vec<LandedCost>,
    posted_by: Option<UserId>,
    posted_at: Option<DateTime<Utc>>,
    returns: Vec<PurchaseReturnId>,
    version: u64,
}

impl GoodsReceipt {
    pub fn create(
        actor: &Actor,
        cmd: &CreateGoodsReceipt,
    ) -> DomainResult<(Self, Vec<GoodsReceiptEvent>)> {
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "goods receipt requires at least one line",
            ));
        }
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if input.quantity_received <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity_received must be positive"
                )));
            }
            if input.unit_cost < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit_cost cannot be negative"
                )));
            }
            lines.push(ReceiptLine {
                line_no,
                po_line_no: input.po_line_no,
                product_id: input.product_id,
                uom: input.uom.clone(),
                quantity_received: input.quantity_received,
                unit_cost: input.unit_cost,
                landed_cost_total: Money::ZERO,
                qc_status: QcStatus::Pending,
                quantity_passed: Decimal::ZERO,
                quantity_failed: Decimal::ZERO,
                quantity_returned: Decimal::ZERO,
            });
        }

        let receipt = Self {
            id: cmd.receipt_id,
            tenant_id: actor.tenant_id,
            number: cmd.number.clone(),
            order_id: cmd.order_id,
            warehouse_id: cmd.warehouse_id,
            receipt_date: cmd.receipt_date,
            status: ReceiptStatus::Draft,
            lines: lines.clone(),
            landed_costs: Vec::new(),
            posted_by: None,
            posted_at: None,
            returns: Vec::new(),
            version: 1,
        };
        let event = GoodsReceiptEvent {
            receipt_id: cmd.receipt_id,
            occurred_at: actor.at,
            change: GoodsReceiptChange::Created {
                tenant_id: actor.tenant_id,
                number: cmd.number.clone(),
                order_id: cmd.order_id,
                warehouse_id: cmd.warehouse_id,
                receipt_date: cmd.receipt_date,
                lines,
            },
        };
        Ok((receipt, vec![event]))
    }

    pub fn id_typed(&self) -> GoodsReceiptId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn order_id(&self) -> PurchaseOrderId {
        self.order_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn receipt_date(&self) -> NaiveDate {
        self.receipt_date
    }

    pub fn status(&self) -> ReceiptStatus {
        self.status
    }

    pub fn lines(&self) -> &[ReceiptLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&ReceiptLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn landed_costs(&self) -> &[LandedCost] {
        &self.landed_costs
    }

    pub fn posted_by(&self) -> Option<UserId> {
        self.posted_by
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }

    pub fn returns(&self) -> &[PurchaseReturnId] {
        &self.returns
    }

    pub fn is_posted(&self) -> bool {
        self.status == ReceiptStatus::Posted
    }

    /// Received quantities addressed to purchase order lines.
    pub fn order_quantities(&self) -> Vec<LineQuantity> {
        self.lines
            .iter()
            .map(|l| LineQuantity::new(l.po_line_no, l.quantity_received))
            .collect()
    }

    pub fn allocation_basis(&self, unit_weights: &[(u32, Decimal)]) -> Vec<AllocationBasis> {
        self.lines
            .iter()
            .map(|l| AllocationBasis {
                line_no: l.line_no,
                quantity: l.quantity_received,
                unit_cost: l.unit_cost,
                weight: unit_weights
                    .iter()
                    .find(|(no, _)| *no == l.line_no)
                    .map(|(_, w)| *w),
            })
            .collect()
    }

    fn qc_status(received: Decimal, passed: Decimal, failed: Decimal) -> QcStatus {
        if passed.is_zero() && failed.is_zero() {
            QcStatus::Pending
        } else if failed.is_zero() && passed == received {
            QcStatus::Passed
        } else if passed.is_zero() && failed == received {
            QcStatus::Failed
        } else {
            QcStatus::Partial
        }
    }
}

impl AggregateRoot for GoodsReceipt {
    type Id = GoodsReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for GoodsReceipt {
    type Command = GoodsReceiptCommand;
    type Event = GoodsReceiptEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            GoodsReceiptChange::Created { .. } => {}
            GoodsReceiptChange::QcRecorded {
                line_no,
                status,
                passed,
                failed,
            } => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == *line_no) {
                    line.qc_status = *status;
                    line.quantity_passed = *passed;
                    line.quantity_failed = *failed;
                }
            }
            GoodsReceiptChange::LandedCostAdded { cost } => {
                for alloc in &cost.allocations {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == alloc.line_no) {
                        line.landed_cost_total += alloc.amount;
                    }
                }
                self.landed_costs.push(cost.clone());
            }
            GoodsReceiptChange::Posted { by } => {
                self.status = ReceiptStatus::Posted;
                self.posted_by = Some(*by);
                self.posted_at = Some(event.occurred_at);
            }
            GoodsReceiptChange::Cancelled { .. } => self.status = ReceiptStatus::Cancelled,
            GoodsReceiptChange::ReturnRecorded { return_id, lines } => {
                for lq in lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == lq.line_no) {
                        line.quantity_returned += lq.quantity;
                    }
                }
                self.returns.push(*return_id);
            }
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
            GoodsReceiptCommand::RecordQc {
                line_no,
                passed,
                failed,
            } => {
                if self.status == ReceiptStatus::Cancelled {
                    return Err(DomainError::validation("cannot inspect a cancelled receipt"));
                }
                let line = self.line(*line_no).ok_or_else(|| {
                    DomainError::referential(format!(
                        "line {line_no} does not exist on goods receipt {}",
                        self.number
                    ))
                })?;
                if *passed < Decimal::ZERO || *failed < Decimal::ZERO {
                    return Err(DomainError::validation("qc quantities cannot be negative"));
                }
                if *passed + *failed > line.quantity_received {
                    return Err(DomainError::validation(format!(
                        "line {line_no}: inspected {} exceeds received {}",
                        *passed + *failed,
                        line.quantity_received
                    )));
                }
                GoodsReceiptChange::QcRecorded {
                    line_no: *line_no,
                    status: Self::qc_status(line.quantity_received, *passed, *failed),
                    passed: *passed,
                    failed: *failed,
                }
            }
            GoodsReceiptCommand::AddLandedCost {
                cost_type,
                description,
                amount,
                method,
                unit_weights,
            } => {
                if self.status != ReceiptStatus::Draft {
                    return Err(DomainError::transition(
                        ReceiptStatus::DOCUMENT,
                        self.status,
                        "landed_cost",
                    ));
                }
                let allocation = allocate(*amount, *method, &self.allocation_basis(unit_weights))?;
                GoodsReceiptChange::LandedCostAdded {
                    cost: LandedCost {
                        cost_type: *cost_type,
                        description: description.clone(),
                        amount: *amount,
                        method: *method,
                        applied: allocation.applied,
                        allocations: allocation.lines,
                    },
                }
            }
            GoodsReceiptCommand::Post => {
                self.status.transition_to(ReceiptStatus::Posted)?;
                GoodsReceiptChange::Posted { by: actor.user_id }
            }
            GoodsReceiptCommand::Cancel { reason } => {
                self.status.transition_to(ReceiptStatus::Cancelled)?;
                GoodsReceiptChange::Cancelled {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
            GoodsReceiptCommand::RecordReturn { return_id, lines } => {
                if !self.is_posted() {
                    return Err(DomainError::validation(format!(
                        "goods receipt {} must be posted before returning goods",
                        self.number
                    )));
                }
                for lq in lines {
                    let line = self.line(lq.line_no).ok_or_else(|| {
                        DomainError::referential(format!(
                            "line {} does not exist on goods receipt {}",
                            lq.line_no, self.number
                        ))
                    })?;
                    if lq.quantity <= Decimal::ZERO || lq.quantity > line.returnable_quantity() {
                        return Err(DomainError::validation(format!(
                            "line {}: return quantity {} must be within 0..={}",
                            lq.line_no,
                            lq.quantity,
                            line.returnable_quantity()
                        )));
                    }
                }
                GoodsReceiptChange::ReturnRecorded {
                    return_id: *return_id,
                    lines: lines.clone(),
                }
            }
        };

        Ok(vec![GoodsReceiptEvent {
            receipt_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}
