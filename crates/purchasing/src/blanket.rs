//! Blanket purchase order: a capped commitment against one vendor that
//! purchase orders ("releases") draw down.
//!
//! The aggregate does not hold release totals. The caller computes
//! `amount_used` from the live releases and passes it in; every release
//! registration emits an event, so two concurrent releases against one
//! blanket order collide on its version and one of them is re-run.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DomainError, DomainResult, Lifecycle, Money, TenantId,
    UserId, lifecycle,
};
use procura_events::Event;

use crate::consumption::{
    LineConsumption, RemainingQuantity, realization_status, remaining_amount, remaining_quantity,
};
use crate::reference::{BlanketOrderId, ProductId, PurchaseAgreementId, PurchaseOrderId, VendorId};

lifecycle! {
    pub enum BlanketOrderStatus for "blanket order" {
        Draft = "draft",
        PendingApproval = "pending_approval",
        Open = "open",
        PartiallyOrdered = "partially_ordered",
        Fulfilled = "fulfilled",
        Rejected = "rejected",
        Expired = "expired",
        Cancelled = "cancelled",
        Closed = "closed",
    }
    transitions {
        Draft => [PendingApproval, Cancelled],
        PendingApproval => [Open, Rejected, Cancelled],
        Open => [PartiallyOrdered, Fulfilled, Expired, Cancelled, Closed],
        PartiallyOrdered => [Open, Fulfilled, Expired, Closed],
        Fulfilled => [Closed],
        Rejected => [],
        Expired => [],
        Cancelled => [],
        Closed => [],
    }
}

impl BlanketOrderStatus {
    /// Statuses in which new releases may be drawn.
    pub fn accepts_releases(self) -> bool {
        matches!(
            self,
            BlanketOrderStatus::Open | BlanketOrderStatus::PartiallyOrdered
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlanketOrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub unit_price: Decimal,
    /// `None` means no quantity cap.
    pub quantity_agreed: Option<Decimal>,
    pub quantity_ordered: Decimal,
}

impl BlanketOrderLine {
    pub fn remaining(&self) -> RemainingQuantity {
        remaining_quantity(self.quantity_agreed, self.quantity_ordered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlanketLineInput {
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub quantity_agreed: Option<Decimal>,
}

/// A release line as seen by the blanket order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLine {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBlanketOrder {
    pub blanket_order_id: BlanketOrderId,
    pub number: String,
    pub vendor_id: VendorId,
    pub agreement_id: Option<PurchaseAgreementId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub amount_limit: Money,
    pub lines: Vec<BlanketLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlanketOrderCommand {
    Submit,
    Activate,
    Reject { reason: String },
    Cancel { reason: String, live_releases: usize },
    Close,
    Expire,
    /// Validate and record a release being created or edited.
    RegisterRelease {
        order_id: PurchaseOrderId,
        vendor_id: VendorId,
        order_date: NaiveDate,
        total: Money,
        lines: Vec<ReleaseLine>,
        /// Σ totals of the other live releases.
        amount_used_excluding: Money,
    },
    WithdrawRelease { order_id: PurchaseOrderId },
    /// A release was approved: draw its quantities.
    RecordOrdered {
        order_id: PurchaseOrderId,
        lines: Vec<ReleaseLine>,
    },
    /// An approved release was cancelled: give its quantities back.
    ReverseOrdered {
        order_id: PurchaseOrderId,
        lines: Vec<ReleaseLine>,
    },
    /// Re-derive status from consumption; emits nothing when unchanged.
    Realize { amount_used: Money },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlanketOrderChange {
    Created {
        tenant_id: TenantId,
        number: String,
        vendor_id: VendorId,
        agreement_id: Option<PurchaseAgreementId>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        amount_limit: Money,
        lines: Vec<BlanketOrderLine>,
    },
    Submitted,
    Activated { by: UserId },
    Rejected { by: UserId, reason: String },
    Cancelled { by: UserId, reason: String },
    Closed { by: UserId },
    Expired,
    ReleaseRegistered {
        order_id: PurchaseOrderId,
        total: Money,
    },
    ReleaseWithdrawn { order_id: PurchaseOrderId },
    QuantitiesOrdered {
        order_id: PurchaseOrderId,
        lines: Vec<ReleaseLine>,
    },
    QuantitiesReversed {
        order_id: PurchaseOrderId,
        lines: Vec<ReleaseLine>,
    },
    Realized {
        status: BlanketOrderStatus,
        amount_used: Money,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlanketOrderEvent {
    pub blanket_order_id: BlanketOrderId,
    pub occurred_at: DateTime<Utc>,
    pub change: BlanketOrderChange,
}

impl Event for BlanketOrderEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            BlanketOrderChange::Created { .. } => "procurement.blanket_order.created",
            BlanketOrderChange::Submitted => "procurement.blanket_order.submitted",
            BlanketOrderChange::Activated { .. } => "procurement.blanket_order.activated",
            BlanketOrderChange::Rejected { .. } => "procurement.blanket_order.rejected",
            BlanketOrderChange::Cancelled { .. } => "procurement.blanket_order.cancelled",
            BlanketOrderChange::Closed { .. } => "procurement.blanket_order.closed",
            BlanketOrderChange::Expired => "procurement.blanket_order.expired",
            BlanketOrderChange::ReleaseRegistered { .. } => {
                "procurement.blanket_order.release_registered"
            }
            BlanketOrderChange::ReleaseWithdrawn { .. } => {
                "procurement.blanket_order.release_withdrawn"
            }
            BlanketOrderChange::QuantitiesOrdered { .. } => {
                "procurement.blanket_order.quantities_ordered"
            }
            BlanketOrderChange::QuantitiesReversed { .. } => {
                "procurement.blanket_order.quantities_reversed"
            }
            BlanketOrderChange::Realized { .. } => "procurement.blanket_order.realized",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.blanket_order"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: BlanketOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlanketOrder {
    id: BlanketOrderId,
    tenant_id: TenantId,
    number: String,
    vendor_id: VendorId,
    agreement_id: Option<PurchaseAgreementId>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    amount_limit: Money,
    status: BlanketOrderStatus,
    lines: Vec<BlanketOrderLine>,
    releases: Vec<PurchaseOrderId>,
    approved_by: Option<UserId>,
    version: u64,
}

impl BlanketOrder {
    pub fn create(
        actor: &Actor,
        cmd: &CreateBlanketOrder,
    ) -> DomainResult<(Self, Vec<BlanketOrderEvent>)> {
        if cmd.end_date < cmd.start_date {
            return Err(DomainError::validation(
                "blanket order end_date cannot be before start_date",
            ));
        }
        if !cmd.amount_limit.is_positive() {
            return Err(DomainError::validation("amount_limit must be positive"));
        }

        let mut lines: Vec<BlanketOrderLine> = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if input.unit_price < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit_price cannot be negative"
                )));
            }
            if input.quantity_agreed.is_some_and(|q| q <= Decimal::ZERO) {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity_agreed must be positive"
                )));
            }
            if lines.iter().any(|l| l.product_id == input.product_id) {
                return Err(DomainError::validation(format!(
                    "line {line_no}: product {} appears twice",
                    input.product_id
                )));
            }
            lines.push(BlanketOrderLine {
                line_no,
                product_id: input.product_id,
                unit_price: input.unit_price,
                quantity_agreed: input.quantity_agreed,
                quantity_ordered: Decimal::ZERO,
            });
        }

        let event = BlanketOrderEvent {
            blanket_order_id: cmd.blanket_order_id,
            occurred_at: actor.at,
            change: BlanketOrderChange::Created {
                tenant_id: actor.tenant_id,
                number: cmd.number.clone(),
                vendor_id: cmd.vendor_id,
                agreement_id: cmd.agreement_id,
                start_date: cmd.start_date,
                end_date: cmd.end_date,
                amount_limit: cmd.amount_limit,
                lines,
            },
        };
        let mut order = Self::empty(cmd.blanket_order_id, actor.tenant_id, cmd.vendor_id);
        order.apply(&event);
        Ok((order, vec![event]))
    }

    fn empty(id: BlanketOrderId, tenant_id: TenantId, vendor_id: VendorId) -> Self {
        Self {
            id,
            tenant_id,
            number: String::new(),
            vendor_id,
            agreement_id: None,
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MIN,
            amount_limit: Money::ZERO,
            status: BlanketOrderStatus::Draft,
            lines: Vec::new(),
            releases: Vec::new(),
            approved_by: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> BlanketOrderId {
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

    pub fn agreement_id(&self) -> Option<PurchaseAgreementId> {
        self.agreement_id
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn amount_limit(&self) -> Money {
        self.amount_limit
    }

    pub fn status(&self) -> BlanketOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[BlanketOrderLine] {
        &self.lines
    }

    pub fn line_for(&self, product_id: ProductId) -> Option<&BlanketOrderLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Every purchase order ever registered as a release.
    pub fn releases(&self) -> &[PurchaseOrderId] {
        &self.releases
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn consumption_lines(&self) -> Vec<LineConsumption> {
        self.lines
            .iter()
            .map(|l| LineConsumption {
                product_id: l.product_id,
                quantity_agreed: l.quantity_agreed,
                quantity_ordered: l.quantity_ordered,
            })
            .collect()
    }

    /// Lapsed: past its end date while still drawable.
    pub fn is_lapsed(&self, as_of: NaiveDate) -> bool {
        self.status.accepts_releases() && self.end_date < as_of
    }

    fn requested_by_product(lines: &[ReleaseLine]) -> Vec<(ProductId, Decimal)> {
        let mut out: Vec<(ProductId, Decimal)> = Vec::new();
        for line in lines {
            match out.iter_mut().find(|(p, _)| *p == line.product_id) {
                Some((_, qty)) => *qty += line.quantity,
                None => out.push((line.product_id, line.quantity)),
            }
        }
        out
    }

    /// Every release product must be on the blanket order and fit its remaining quantity.
    fn check_quantities(&self, lines: &[ReleaseLine]) -> DomainResult<()> {
        for (product_id, requested) in Self::requested_by_product(lines) {
            let line = self.line_for(product_id).ok_or_else(|| {
                DomainError::referential(format!(
                    "product {product_id} is not on blanket order {}",
                    self.number
                ))
            })?;
            let remaining = line.remaining();
            if !remaining.allows(requested) {
                return Err(DomainError::commitment(
                    format!("blanket order {} line {}", self.number, line.line_no),
                    requested,
                    remaining.as_decimal().unwrap_or_default(),
                ));
            }
        }
        Ok(())
    }

    fn handle_register_release(
        &self,
        vendor_id: VendorId,
        order_date: NaiveDate,
        total: Money,
        lines: &[ReleaseLine],
        amount_used_excluding: Money,
    ) -> DomainResult<()> {
        if !self.status.accepts_releases() {
            return Err(DomainError::validation(format!(
                "blanket order {} does not accept releases (status: {})",
                self.number, self.status
            )));
        }
        if vendor_id != self.vendor_id {
            return Err(DomainError::validation(format!(
                "release vendor does not match blanket order {}",
                self.number
            )));
        }
        if order_date < self.start_date || order_date > self.end_date {
            return Err(DomainError::validation(format!(
                "release date {order_date} is outside {}..={}",
                self.start_date, self.end_date
            )));
        }
        for line in lines {
            if let Some(bpo_line) = self.line_for(line.product_id) {
                if line.unit_price != bpo_line.unit_price {
                    return Err(DomainError::validation(format!(
                        "release price {} differs from blanket price {} for product {}",
                        line.unit_price, bpo_line.unit_price, line.product_id
                    )));
                }
            }
        }
        self.check_quantities(lines)?;

        let remaining = remaining_amount(self.amount_limit, amount_used_excluding);
        if total > remaining {
            return Err(DomainError::commitment(
                format!("blanket order {}", self.number),
                total.amount(),
                remaining.amount(),
            ));
        }
        Ok(())
    }
}

impl AggregateRoot for BlanketOrder {
    type Id = BlanketOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for BlanketOrder {
    type Command = BlanketOrderCommand;
    type Event = BlanketOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            BlanketOrderChange::Created {
                tenant_id,
                number,
                vendor_id,
                agreement_id,
                start_date,
                end_date,
                amount_limit,
                lines,
            } => {
                self.id = event.blanket_order_id;
                self.tenant_id = *tenant_id;
                self.number = number.clone();
                self.vendor_id = *vendor_id;
                self.agreement_id = *agreement_id;
                self.start_date = *start_date;
                self.end_date = *end_date;
                self.amount_limit = *amount_limit;
                self.lines = lines.clone();
                self.status = BlanketOrderStatus::Draft;
            }
            BlanketOrderChange::Submitted => self.status = BlanketOrderStatus::PendingApproval,
            BlanketOrderChange::Activated { by } => {
                self.status = BlanketOrderStatus::Open;
                self.approved_by = Some(*by);
            }
            BlanketOrderChange::Rejected { .. } => self.status = BlanketOrderStatus::Rejected,
            BlanketOrderChange::Cancelled { .. } => self.status = BlanketOrderStatus::Cancelled,
            BlanketOrderChange::Closed { .. } => self.status = BlanketOrderStatus::Closed,
            BlanketOrderChange::Expired => self.status = BlanketOrderStatus::Expired,
            BlanketOrderChange::ReleaseRegistered { order_id, .. } => {
                if !self.releases.contains(order_id) {
                    self.releases.push(*order_id);
                }
            }
            BlanketOrderChange::ReleaseWithdrawn { .. } => {}
            BlanketOrderChange::QuantitiesOrdered { lines, .. } => {
                for rl in lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == rl.product_id) {
                        line.quantity_ordered += rl.quantity;
                    }
                }
            }
            BlanketOrderChange::QuantitiesReversed { lines, .. } => {
                for rl in lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == rl.product_id) {
                        line.quantity_ordered -= rl.quantity;
                    }
                }
            }
            BlanketOrderChange::Realized { status, .. } => self.status = *status,
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
            BlanketOrderCommand::Submit => {
                self.status.transition_to(BlanketOrderStatus::PendingApproval)?;
                if self.lines.is_empty() {
                    return Err(DomainError::validation(
                        "cannot submit blanket order without lines",
                    ));
                }
                BlanketOrderChange::Submitted
            }
            BlanketOrderCommand::Activate => {
                self.status.transition_to(BlanketOrderStatus::Open)?;
                BlanketOrderChange::Activated { by: actor.user_id }
            }
            BlanketOrderCommand::Reject { reason } => {
                self.status.transition_to(BlanketOrderStatus::Rejected)?;
                BlanketOrderChange::Rejected {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
            BlanketOrderCommand::Cancel {
                reason,
                live_releases,
            } => {
                self.status.transition_to(BlanketOrderStatus::Cancelled)?;
                if *live_releases > 0 {
                    return Err(DomainError::validation(format!(
                        "blanket order {} has {live_releases} live release(s)",
                        self.number
                    )));
                }
                BlanketOrderChange::Cancelled {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
            BlanketOrderCommand::Close => {
                self.status.transition_to(BlanketOrderStatus::Closed)?;
                BlanketOrderChange::Closed { by: actor.user_id }
            }
            BlanketOrderCommand::Expire => {
                self.status.transition_to(BlanketOrderStatus::Expired)?;
                if !self.is_lapsed(actor.today()) {
                    return Err(DomainError::validation(format!(
                        "blanket order {} runs until {}",
                        self.number, self.end_date
                    )));
                }
                BlanketOrderChange::Expired
            }
            BlanketOrderCommand::RegisterRelease {
                order_id,
                vendor_id,
                order_date,
                total,
                lines,
                amount_used_excluding,
            } => {
                self.handle_register_release(
                    *vendor_id,
                    *order_date,
                    *total,
                    lines,
                    *amount_used_excluding,
                )?;
                BlanketOrderChange::ReleaseRegistered {
                    order_id: *order_id,
                    total: *total,
                }
            }
            BlanketOrderCommand::WithdrawRelease { order_id } => {
                if !self.releases.contains(order_id) {
                    return Err(DomainError::referential(format!(
                        "purchase order {order_id} is not a release of blanket order {}",
                        self.number
                    )));
                }
                BlanketOrderChange::ReleaseWithdrawn {
                    order_id: *order_id,
                }
            }
            BlanketOrderCommand::RecordOrdered { order_id, lines } => {
                if !matches!(
                    self.status,
                    BlanketOrderStatus::Open
                        | BlanketOrderStatus::PartiallyOrdered
                        | BlanketOrderStatus::Fulfilled
                ) {
                    return Err(DomainError::validation(format!(
                        "blanket order {} cannot take orders (status: {})",
                        self.number, self.status
                    )));
                }
                self.check_quantities(lines)?;
                BlanketOrderChange::QuantitiesOrdered {
                    order_id: *order_id,
                    lines: lines.clone(),
                }
            }
            BlanketOrderCommand::ReverseOrdered { order_id, lines } => {
                for (product_id, qty) in Self::requested_by_product(lines) {
                    let ordered = self
                        .line_for(product_id)
                        .map(|l| l.quantity_ordered)
                        .unwrap_or_default();
                    if qty > ordered {
                        return Err(DomainError::invariant(format!(
                            "cannot reverse {qty} of product {product_id}; only {ordered} ordered"
                        )));
                    }
                }
                BlanketOrderChange::QuantitiesReversed {
                    order_id: *order_id,
                    lines: lines.clone(),
                }
            }
            BlanketOrderCommand::Realize { amount_used } => {
                let next = realization_status(
                    self.status,
                    self.amount_limit,
                    *amount_used,
                    &self.consumption_lines(),
                );
                if next == self.status {
                    return Ok(Vec::new());
                }
                self.status.transition_to(next)?;
                BlanketOrderChange::Realized {
                    status: next,
                    amount_used: *amount_used,
                }
            }
        };

        Ok(vec![BlanketOrderEvent {
            blanket_order_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use procura_core::check_transition_table;
    use procura_events::execute;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn actor() -> Actor {
        Actor::new(TenantId::new(), UserId::new(), Utc::now())
    }

    fn open_bpo(actor: &Actor, product: ProductId, agreed: Option<Decimal>) -> BlanketOrder {
        let cmd = CreateBlanketOrder {
            blanket_order_id: BlanketOrderId::generate(),
            number: "BPO-0001".to_string(),
            vendor_id: VendorId::generate(),
            agreement_id: None,
            start_date: actor.today() - Duration::days(10),
            end_date: actor.today() + Duration::days(10),
            amount_limit: Money::new(dec!(1000000)),
            lines: vec![BlanketLineInput {
                product_id: product,
                unit_price: dec!(100),
                quantity_agreed: agreed,
            }],
        };
        let (mut bpo, _) = BlanketOrder::create(actor, &cmd).unwrap();
        execute(&mut bpo, actor, &BlanketOrderCommand::Submit).unwrap();
        execute(&mut bpo, actor, &BlanketOrderCommand::Activate).unwrap();
        bpo
    }

    fn register(bpo: &BlanketOrder, actor: &Actor, qty: Decimal, used: Decimal) -> BlanketOrderCommand {
        let product = bpo.lines()[0].product_id;
        BlanketOrderCommand::RegisterRelease {
            order_id: PurchaseOrderId::generate(),
            vendor_id: bpo.vendor_id(),
            order_date: actor.today(),
            total: Money::line(qty, dec!(100)),
            lines: vec![ReleaseLine {
                product_id: product,
                quantity: qty,
                unit_price: dec!(100),
            }],
            amount_used_excluding: Money::new(used),
        }
    }

    #[test]
    fn transition_table_is_well_formed() {
        check_transition_table(BlanketOrderStatus::Draft, BlanketOrderStatus::ALL).unwrap();
    }

    #[test]
    fn ceiling_scenario() {
        let a = actor();
        let mut bpo = open_bpo(&a, ProductId::generate(), None);

        let first = register(&bpo, &a, dec!(6000), Decimal::ZERO);
        execute(&mut bpo, &a, &first).unwrap();
        execute(
            &mut bpo,
            &a,
            &BlanketOrderCommand::Realize {
                amount_used: Money::new(dec!(600000)),
            },
        )
        .unwrap();
        assert_eq!(bpo.status(), BlanketOrderStatus::PartiallyOrdered);

        let err = bpo
            .handle(&a, &register(&bpo, &a, dec!(5000), dec!(600000)))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::CommitmentExceeded {
                commitment: "blanket order BPO-0001".to_string(),
                requested: dec!(500000),
                remaining: dec!(400000),
            }
        );

        let second = register(&bpo, &a, dec!(4000), dec!(600000));
        execute(&mut bpo, &a, &second).unwrap();
        execute(
            &mut bpo,
            &a,
            &BlanketOrderCommand::Realize {
                amount_used: Money::new(dec!(1000000)),
            },
        )
        .unwrap();
        assert_eq!(bpo.status(), BlanketOrderStatus::Fulfilled);
        assert_eq!(bpo.releases().len(), 2);
    }

    #[test]
    fn release_rules() {
        let a = actor();
        let product = ProductId::generate();
        let bpo = open_bpo(&a, product, Some(dec!(10)));

        // Over the agreed quantity.
        let err = bpo.handle(&a, &register(&bpo, &a, dec!(11), Decimal::ZERO)).unwrap_err();
        assert!(matches!(err, DomainError::CommitmentExceeded { remaining, .. } if remaining == dec!(10)));

        let mut cmd = register(&bpo, &a, dec!(1), Decimal::ZERO);
        if let BlanketOrderCommand::RegisterRelease { lines, .. } = &mut cmd {
            lines[0].unit_price = dec!(99);
        }
        assert!(matches!(bpo.handle(&a, &cmd), Err(DomainError::Validation(_))));

        let mut cmd = register(&bpo, &a, dec!(1), Decimal::ZERO);
        if let BlanketOrderCommand::RegisterRelease { lines, .. } = &mut cmd {
            lines[0].product_id = ProductId::generate();
        }
        assert!(matches!(
            bpo.handle(&a, &cmd),
            Err(DomainError::ReferentialIntegrity(_))
        ));

        let mut cmd = register(&bpo, &a, dec!(1), Decimal::ZERO);
        if let BlanketOrderCommand::RegisterRelease { vendor_id, .. } = &mut cmd {
            *vendor_id = VendorId::generate();
        }
        assert!(matches!(bpo.handle(&a, &cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn ordered_quantities_drive_fulfilment() {
        let a = actor();
        let product = ProductId::generate();
        let mut bpo = open_bpo(&a, product, Some(dec!(10)));
        let line = ReleaseLine {
            product_id: product,
            quantity: dec!(10),
            unit_price: dec!(100),
        };
        let order_id = PurchaseOrderId::generate();
        execute(
            &mut bpo,
            &a,
            &BlanketOrderCommand::RecordOrdered {
                order_id,
                lines: vec![line],
            },
        )
        .unwrap();
        assert_eq!(bpo.lines()[0].remaining(), RemainingQuantity::Limited(Decimal::ZERO));

        execute(
            &mut bpo,
            &a,
            &BlanketOrderCommand::Realize {
                amount_used: Money::new(dec!(1000)),
            },
        )
        .unwrap();
        assert_eq!(bpo.status(), BlanketOrderStatus::Fulfilled);

        let err = bpo
            .handle(
                &a,
                &BlanketOrderCommand::RecordOrdered {
                    order_id: PurchaseOrderId::generate(),
                    lines: vec![ReleaseLine {
                        quantity: dec!(1),
                        ..line
                    }],
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::CommitmentExceeded { .. }));
    }

    #[test]
    fn realize_without_change_emits_nothing() {
        let a = actor();
        let bpo = open_bpo(&a, ProductId::generate(), None);
        let events = bpo
            .handle(
                &a,
                &BlanketOrderCommand::Realize {
                    amount_used: Money::ZERO,
                },
            )
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn cancel_requires_no_live_releases() {
        let a = actor();
        let bpo = open_bpo(&a, ProductId::generate(), None);
        let err = bpo
            .handle(
                &a,
                &BlanketOrderCommand::Cancel {
                    reason: "vendor change".to_string(),
                    live_releases: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn expire_only_after_end_date() {
        let a = actor();
        let mut bpo = open_bpo(&a, ProductId::generate(), None);
        assert!(bpo.handle(&a, &BlanketOrderCommand::Expire).is_err());
        let later = a.at(a.at + Duration::days(11));
        execute(&mut bpo, &later, &BlanketOrderCommand::Expire).unwrap();
        assert_eq!(bpo.status(), BlanketOrderStatus::Expired);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: accepted releases never push usage past the limit.
        #[test]
        fn usage_never_exceeds_limit(quantities in prop::collection::vec(1i64..4000i64, 1..20)) {
            let a = actor();
            let mut bpo = open_bpo(&a, ProductId::generate(), None);
            let mut used = Money::ZERO;

            for qty in quantities {
                let cmd = register(&bpo, &a, Decimal::from(qty), used.amount());
                if let Ok(events) = bpo.handle(&a, &cmd) {
                    for e in &events {
                        bpo.apply(e);
                    }
                    used += Money::line(Decimal::from(qty), dec!(100));
                    let realized = execute(&mut bpo, &a, &BlanketOrderCommand::Realize { amount_used: used });
                    prop_assert!(realized.is_ok());
                }
                prop_assert!(used <= bpo.amount_limit());
            }
        }
    }
}
