use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DocumentTotals, DomainError, DomainResult, Lifecycle, Money,
    TaxRates, TenantId, UserId, lifecycle,
};
use procura_events::Event;

use crate::reference::{
    BlanketOrderId, GoodsReceiptId, LineQuantity, ProductId, PurchaseOrderId, PurchaseRequestId,
    PurchaseReturnId, RfqId, VendorBillId, VendorId, WarehouseId,
};

lifecycle! {
    /// Purchase order status lifecycle.
    pub enum PurchaseOrderStatus for "purchase order" {
        Draft = "draft",
        Submitted = "submitted",
        PendingApproval = "pending_approval",
        /// Approved and open for receipts.
        Approved = "approved",
        PartialReceived = "partial_received",
        FullyReceived = "fully_received",
        Cancelled = "cancelled",
        Locked = "locked",
    }
    transitions {
        Draft => [Submitted, Cancelled],
        Submitted => [PendingApproval, Approved, Draft, Cancelled],
        PendingApproval => [Approved, Draft, Cancelled],
        Approved => [PartialReceived, FullyReceived, Locked, Cancelled],
        PartialReceived => [FullyReceived, Cancelled],
        FullyReceived => [Cancelled],
        Cancelled => [],
        Locked => [],
    }
}

impl PurchaseOrderStatus {
    /// Statuses in which goods can be received and billed.
    pub fn accepts_receipts(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Approved
                | PurchaseOrderStatus::PartialReceived
                | PurchaseOrderStatus::FullyReceived
        )
    }
}

/// Requested line of a new or edited purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub product_id: ProductId,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub quantity_received: Decimal,
    pub quantity_billed: Decimal,
    pub quantity_returned: Decimal,
    pub subtotal: Money,
}

impl PurchaseOrderLine {
    /// Quantity received but not yet billed.
    pub fn billable_quantity(&self) -> Decimal {
        self.quantity_received - self.quantity_billed
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity
    }
}

/// Documents a purchase order originates from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOrigin {
    pub purchase_request_id: Option<PurchaseRequestId>,
    pub rfq_id: Option<RfqId>,
    pub blanket_order_id: Option<BlanketOrderId>,
}

/// Command payload: create a purchase order in `draft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub vendor_id: VendorId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub origin: OrderOrigin,
    pub tax: TaxRates,
    pub lines: Vec<OrderLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseOrderCommand {
    /// Replace all lines and tax inputs (draft only).
    ReplaceLines {
        lines: Vec<OrderLineInput>,
        tax: TaxRates,
    },
    Submit,
    RequestApproval,
    Approve,
    /// Return to draft after an approval rejection.
    Reject { reason: String },
    Cancel { reason: String },
    Lock,
    RecordReceipt {
        receipt_id: GoodsReceiptId,
        lines: Vec<LineQuantity>,
    },
    RecordBilling {
        bill_id: VendorBillId,
        lines: Vec<LineQuantity>,
    },
    ReverseBilling {
        bill_id: VendorBillId,
        lines: Vec<LineQuantity>,
    },
    RecordReturn {
        return_id: PurchaseReturnId,
        lines: Vec<LineQuantity>,
    },
}

/// Event payload: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub number: String,
    pub vendor_id: VendorId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub origin: OrderOrigin,
    pub tax: TaxRates,
    pub totals: DocumentTotals,
    pub lines: Vec<PurchaseOrderLine>,
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseOrderChange {
    Created(Box<PurchaseOrderCreated>),
    LinesReplaced {
        lines: Vec<PurchaseOrderLine>,
        tax: TaxRates,
        totals: DocumentTotals,
    },
    Submitted,
    ApprovalRequested,
    Approved { by: UserId },
    Rejected { by: UserId, reason: String },
    Cancelled { by: UserId, reason: String },
    Locked { by: UserId },
    GoodsReceived {
        receipt_id: GoodsReceiptId,
        lines: Vec<LineQuantity>,
        status: PurchaseOrderStatus,
    },
    Billed {
        bill_id: VendorBillId,
        lines: Vec<LineQuantity>,
    },
    BillingReversed {
        bill_id: VendorBillId,
        lines: Vec<LineQuantity>,
    },
    GoodsReturned {
        return_id: PurchaseReturnId,
        lines: Vec<LineQuantity>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderEvent {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
    pub change: PurchaseOrderChange,
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            PurchaseOrderChange::Created(_) => "procurement.purchase_order.created",
            PurchaseOrderChange::LinesReplaced { .. } => "procurement.purchase_order.lines_replaced",
            PurchaseOrderChange::Submitted => "procurement.purchase_order.submitted",
            PurchaseOrderChange::ApprovalRequested => {
                "procurement.purchase_order.approval_requested"
            }
            PurchaseOrderChange::Approved { .. } => "procurement.purchase_order.approved",
            PurchaseOrderChange::Rejected { .. } => "procurement.purchase_order.rejected",
            PurchaseOrderChange::Cancelled { .. } => "procurement.purchase_order.cancelled",
            PurchaseOrderChange::Locked { .. } => "procurement.purchase_order.locked",
            PurchaseOrderChange::GoodsReceived { .. } => "procurement.purchase_order.goods_received",
            PurchaseOrderChange::Billed { .. } => "procurement.purchase_order.billed",
            PurchaseOrderChange::BillingReversed { .. } => {
                "procurement.purchase_order.billing_reversed"
            }
            PurchaseOrderChange::GoodsReturned { .. } => "procurement.purchase_order.goods_returned",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.purchase_order"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: TenantId,
    number: String,
    vendor_id: VendorId,
    warehouse_id: WarehouseId,
    order_date: NaiveDate,
    expected_date: Option<NaiveDate>,
    origin: OrderOrigin,
    status: PurchaseOrderStatus,
    tax: TaxRates,
    totals: DocumentTotals,
    lines: Vec<PurchaseOrderLine>,
    bills: Vec<VendorBillId>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    last_rejection: Option<String>,
    cancel_reason: Option<String>,
    version: u64,
}

impl PurchaseOrder {
    /// Validate a creation command and produce the new aggregate with its
    /// `Created` event.
    pub fn create(
        actor: &Actor,
        cmd: &CreatePurchaseOrder,
    ) -> DomainResult<(Self, Vec<PurchaseOrderEvent>)> {
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("number is required"));
        }
        if let Some(expected) = cmd.expected_date {
            if expected < cmd.order_date {
                return Err(DomainError::validation(
                    "expected_date cannot be before order_date",
                ));
            }
        }
        cmd.tax.validate()?;
        let lines = build_lines(&cmd.lines)?;
        let totals = totals_of(&lines, &cmd.tax);

        let created = PurchaseOrderCreated {
            tenant_id: actor.tenant_id,
            number: cmd.number.clone(),
            vendor_id: cmd.vendor_id,
            warehouse_id: cmd.warehouse_id,
            order_date: cmd.order_date,
            expected_date: cmd.expected_date,
            origin: cmd.origin,
            tax: cmd.tax,
            totals,
            lines,
            created_by: actor.user_id,
        };
        let order = Self::from_created(cmd.order_id, &created);
        let event = PurchaseOrderEvent {
            order_id: cmd.order_id,
            occurred_at: actor.at,
            change: PurchaseOrderChange::Created(Box::new(created)),
        };
        Ok((order, vec![event]))
    }

    fn from_created(id: PurchaseOrderId, e: &PurchaseOrderCreated) -> Self {
        Self {
            id,
            tenant_id: e.tenant_id,
            number: e.number.clone(),
            vendor_id: e.vendor_id,
            warehouse_id: e.warehouse_id,
            order_date: e.order_date,
            expected_date: e.expected_date,
            origin: e.origin,
            status: PurchaseOrderStatus::Draft,
            tax: e.tax,
            totals: e.totals,
            lines: e.lines.clone(),
            bills: Vec::new(),
            approved_by: None,
            approved_at: None,
            last_rejection: None,
            cancel_reason: None,
            version: 1,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn vendor_id(&self) -> VendorId {
        self.vendor_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn expected_date(&self) -> Option<NaiveDate> {
        self.expected_date
    }

    pub fn origin(&self) -> OrderOrigin {
        self.origin
    }

    pub fn blanket_order_id(&self) -> Option<BlanketOrderId> {
        self.origin.blanket_order_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn tax(&self) -> TaxRates {
        self.tax
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn total(&self) -> Money {
        self.totals.total
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    /// First line carrying `product_id`.
    pub fn line_for_product(&self, product_id: ProductId) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    pub fn bills(&self) -> &[VendorBillId] {
        &self.bills
    }

    pub fn has_bills(&self) -> bool {
        !self.bills.is_empty()
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn last_rejection(&self) -> Option<&str> {
        self.last_rejection.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Per-product ordered quantities (multiple lines of one product are summed).
    pub fn ordered_quantities(&self) -> Vec<(ProductId, Decimal)> {
        let mut out: Vec<(ProductId, Decimal)> = Vec::new();
        for line in &self.lines {
            match out.iter_mut().find(|(p, _)| *p == line.product_id) {
                Some((_, qty)) => *qty += line.quantity,
                None => out.push((line.product_id, line.quantity)),
            }
        }
        out
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            PurchaseOrderChange::Created(e) => {
                *self = Self::from_created(event.order_id, e);
                // from_created already accounts for this event.
                return;
            }
            PurchaseOrderChange::LinesReplaced { lines, tax, totals } => {
                self.lines = lines.clone();
                self.tax = *tax;
                self.totals = *totals;
            }
            PurchaseOrderChange::Submitted => {
                self.status = PurchaseOrderStatus::Submitted;
            }
            PurchaseOrderChange::ApprovalRequested => {
                self.status = PurchaseOrderStatus::PendingApproval;
            }
            PurchaseOrderChange::Approved { by } => {
                self.status = PurchaseOrderStatus::Approved;
                self.approved_by = Some(*by);
                self.approved_at = Some(event.occurred_at);
            }
            PurchaseOrderChange::Rejected { reason, .. } => {
                self.status = PurchaseOrderStatus::Draft;
                self.last_rejection = Some(reason.clone());
            }
            PurchaseOrderChange::Cancelled { reason, .. } => {
                self.status = PurchaseOrderStatus::Cancelled;
                self.cancel_reason = Some(reason.clone());
            }
            PurchaseOrderChange::Locked { .. } => {
                self.status = PurchaseOrderStatus::Locked;
            }
            PurchaseOrderChange::GoodsReceived { lines, status, .. } => {
                for lq in lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == lq.line_no) {
                        line.quantity_received += lq.quantity;
                    }
                }
                self.status = *status;
            }
            PurchaseOrderChange::Billed { bill_id, lines } => {
                for lq in lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == lq.line_no) {
                        line.quantity_billed += lq.quantity;
                    }
                }
                if !self.bills.contains(bill_id) {
                    self.bills.push(*bill_id);
                }
            }
            PurchaseOrderChange::BillingReversed { lines, .. } => {
                for lq in lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == lq.line_no) {
                        line.quantity_billed -= lq.quantity;
                    }
                }
            }
            PurchaseOrderChange::GoodsReturned { lines, .. } => {
                for lq in lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == lq.line_no) {
                        line.quantity_returned += lq.quantity;
                    }
                }
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
            PurchaseOrderCommand::ReplaceLines { lines, tax } => self.handle_replace_lines(lines, tax)?,
            PurchaseOrderCommand::Submit => {
                self.status.transition_to(PurchaseOrderStatus::Submitted)?;
                if self.lines.is_empty() {
                    return Err(DomainError::validation(
                        "cannot submit purchase order without lines",
                    ));
                }
                PurchaseOrderChange::Submitted
            }
            PurchaseOrderCommand::RequestApproval => {
                self.status.transition_to(PurchaseOrderStatus::PendingApproval)?;
                PurchaseOrderChange::ApprovalRequested
            }
            PurchaseOrderCommand::Approve => {
                self.status.transition_to(PurchaseOrderStatus::Approved)?;
                PurchaseOrderChange::Approved { by: actor.user_id }
            }
            PurchaseOrderCommand::Reject { reason } => {
                self.status.transition_to(PurchaseOrderStatus::Draft)?;
                PurchaseOrderChange::Rejected {
                    by: actor.user_id,
                    reason: required_reason(reason)?,
                }
            }
            PurchaseOrderCommand::Cancel { reason } => self.handle_cancel(actor, reason)?,
            PurchaseOrderCommand::Lock => {
                self.status.transition_to(PurchaseOrderStatus::Locked)?;
                PurchaseOrderChange::Locked { by: actor.user_id }
            }
            PurchaseOrderCommand::RecordReceipt { receipt_id, lines } => {
                self.handle_receipt(*receipt_id, lines)?
            }
            PurchaseOrderCommand::RecordBilling { bill_id, lines } => {
                self.handle_billing(*bill_id, lines)?
            }
            PurchaseOrderCommand::ReverseBilling { bill_id, lines } => {
                self.handle_reverse_billing(*bill_id, lines)?
            }
            PurchaseOrderCommand::RecordReturn { return_id, lines } => {
                self.handle_return(*return_id, lines)?
            }
        };

        Ok(vec![PurchaseOrderEvent {
            order_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}

impl PurchaseOrder {
    fn handle_replace_lines(
        &self,
        lines: &[OrderLineInput],
        tax: &TaxRates,
    ) -> DomainResult<PurchaseOrderChange> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(format!(
                "purchase order {} can only be edited in draft (status: {})",
                self.number, self.status
            )));
        }
        tax.validate()?;
        let lines = build_lines(lines)?;
        let totals = totals_of(&lines, tax);
        Ok(PurchaseOrderChange::LinesReplaced {
            lines,
            tax: *tax,
            totals,
        })
    }

    fn handle_cancel(&self, actor: &Actor, reason: &str) -> DomainResult<PurchaseOrderChange> {
        self.status.transition_to(PurchaseOrderStatus::Cancelled)?;
        // Billed orders are reversed through purchase returns, never cancelled.
        if self.has_bills() {
            return Err(DomainError::transition(
                PurchaseOrderStatus::DOCUMENT,
                format!("{} (billed)", self.status),
                PurchaseOrderStatus::Cancelled,
            ));
        }
        Ok(PurchaseOrderChange::Cancelled {
            by: actor.user_id,
            reason: required_reason(reason)?,
        })
    }

    fn handle_receipt(
        &self,
        receipt_id: GoodsReceiptId,
        lines: &[LineQuantity],
    ) -> DomainResult<PurchaseOrderChange> {
        if !self.status.accepts_receipts() {
            return Err(DomainError::transition(
                PurchaseOrderStatus::DOCUMENT,
                self.status,
                PurchaseOrderStatus::PartialReceived,
            ));
        }
        self.check_lines(lines)?;

        // Over-receipt is allowed; status follows the cumulative quantities.
        let mut received: Vec<Decimal> = self.lines.iter().map(|l| l.quantity_received).collect();
        for lq in lines {
            if let Some(idx) = self.lines.iter().position(|l| l.line_no == lq.line_no) {
                received[idx] += lq.quantity;
            }
        }
        let complete = self
            .lines
            .iter()
            .zip(&received)
            .all(|(line, qty)| *qty >= line.quantity);
        let next = if complete {
            PurchaseOrderStatus::FullyReceived
        } else {
            PurchaseOrderStatus::PartialReceived
        };
        if next != self.status {
            self.status.transition_to(next)?;
        }

        Ok(PurchaseOrderChange::GoodsReceived {
            receipt_id,
            lines: lines.to_vec(),
            status: next,
        })
    }

    fn handle_billing(
        &self,
        bill_id: VendorBillId,
        lines: &[LineQuantity],
    ) -> DomainResult<PurchaseOrderChange> {
        if !self.status.accepts_receipts() {
            return Err(DomainError::validation(format!(
                "purchase order {} cannot be billed in status {}",
                self.number, self.status
            )));
        }
        self.check_lines(lines)?;

        for line in &self.lines {
            let requested: Decimal = lines
                .iter()
                .filter(|lq| lq.line_no == line.line_no)
                .map(|lq| lq.quantity)
                .sum();
            if requested > line.billable_quantity() {
                return Err(DomainError::referential(format!(
                    "line {} of {}: billed quantity {} exceeds received-but-unbilled quantity {}",
                    line.line_no,
                    self.number,
                    requested,
                    line.billable_quantity()
                )));
            }
        }

        Ok(PurchaseOrderChange::Billed {
            bill_id,
            lines: lines.to_vec(),
        })
    }

    fn handle_reverse_billing(
        &self,
        bill_id: VendorBillId,
        lines: &[LineQuantity],
    ) -> DomainResult<PurchaseOrderChange> {
        if !self.bills.contains(&bill_id) {
            return Err(DomainError::referential(format!(
                "bill {bill_id} is not recorded against purchase order {}",
                self.number
            )));
        }
        self.check_lines(lines)?;
        for lq in lines {
            let billed = self.line(lq.line_no).map(|l| l.quantity_billed).unwrap_or_default();
            if lq.quantity > billed {
                return Err(DomainError::invariant(format!(
                    "line {}: cannot reverse {} of {} billed",
                    lq.line_no, lq.quantity, billed
                )));
            }
        }
        Ok(PurchaseOrderChange::BillingReversed {
            bill_id,
            lines: lines.to_vec(),
        })
    }

    fn handle_return(
        &self,
        return_id: PurchaseReturnId,
        lines: &[LineQuantity],
    ) -> DomainResult<PurchaseOrderChange> {
        self.check_lines(lines)?;
        for lq in lines {
            if let Some(line) = self.line(lq.line_no) {
                let returnable = line.quantity_received - line.quantity_returned;
                if lq.quantity > returnable {
                    return Err(DomainError::validation(format!(
                        "line {}: return quantity {} exceeds returnable quantity {}",
                        lq.line_no, lq.quantity, returnable
                    )));
                }
            }
        }
        Ok(PurchaseOrderChange::GoodsReturned {
            return_id,
            lines: lines.to_vec(),
        })
    }

    fn check_lines(&self, lines: &[LineQuantity]) -> DomainResult<()> {
        if lines.is_empty() {
            return Err(DomainError::validation("at least one line is required"));
        }
        for lq in lines {
            if self.line(lq.line_no).is_none() {
                return Err(DomainError::referential(format!(
                    "line {} does not exist on purchase order {}",
                    lq.line_no, self.number
                )));
            }
            if lq.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {}: quantity must be positive",
                    lq.line_no
                )));
            }
        }
        Ok(())
    }
}

fn required_reason(reason: &str) -> DomainResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(DomainError::validation("reason is required"));
    }
    Ok(reason.to_string())
}

fn build_lines(inputs: &[OrderLineInput]) -> DomainResult<Vec<PurchaseOrderLine>> {
    inputs
        .iter()
        .enumerate()
        .map(|(idx, input)| {
            let line_no = idx as u32 + 1;
            if input.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            if input.unit_price < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit_price cannot be negative"
                )));
            }
            Ok(PurchaseOrderLine {
                line_no,
                product_id: input.product_id,
                description: input.description.clone(),
                quantity: input.quantity,
                unit_price: input.unit_price,
                quantity_received: Decimal::ZERO,
                quantity_billed: Decimal::ZERO,
                quantity_returned: Decimal::ZERO,
                subtotal: Money::line(input.quantity, input.unit_price),
            })
        })
        .collect()
}

fn totals_of(lines: &[PurchaseOrderLine], tax: &TaxRates) -> DocumentTotals {
    DocumentTotals::from_lines(lines.iter().map(|l| l.subtotal), tax)
}
