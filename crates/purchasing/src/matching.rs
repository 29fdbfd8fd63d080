//! Three-way match: purchase order vs goods receipts vs vendor bill.
//!
//! The engine ([`evaluate`]) is a pure function over committed quantities and
//! prices. Tolerance breaches are verdicts (`partial_match` / `mismatch`),
//! never errors. The [`ThreeWayMatch`] aggregate stores the latest verdict for
//! one bill and carries the approval override.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DomainError, DomainResult, Lifecycle, Money, TenantId,
    UserId, lifecycle,
};
use procura_events::Event;

use crate::reference::{GoodsReceiptId, ProductId, PurchaseOrderId, ThreeWayMatchId, VendorBillId};

lifecycle! {
    /// Match verdict / review status.
    pub enum MatchStatus for "three-way match" {
        Pending = "pending",
        Matched = "matched",
        PartialMatch = "partial_match",
        Mismatch = "mismatch",
        /// Variance accepted by a reviewer.
        Approved = "approved",
    }
    transitions {
        Pending => [Matched, PartialMatch, Mismatch],
        Matched => [PartialMatch, Mismatch],
        PartialMatch => [Matched, Mismatch, Approved],
        Mismatch => [Matched, PartialMatch, Approved],
        Approved => [Matched, PartialMatch, Mismatch],
    }
}

impl MatchStatus {
    /// Whether a bill with this match status may be posted.
    pub fn clears_bill_for_posting(self) -> bool {
        matches!(self, MatchStatus::Matched | MatchStatus::Approved)
    }
}

/// Tolerance bands, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTolerances {
    pub quantity_pct: Decimal,
    pub price_pct: Decimal,
    pub amount_pct: Decimal,
    /// Aggregate variance above which the verdict is `mismatch`.
    pub mismatch_threshold_pct: Decimal,
}

impl Default for MatchTolerances {
    fn default() -> Self {
        Self {
            quantity_pct: Decimal::from(5),
            price_pct: Decimal::from(2),
            amount_pct: Decimal::from(3),
            mismatch_threshold_pct: Decimal::from(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyType {
    NoPo,
    NotInPo,
    Quantity,
    OverOrdered,
    Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyType,
    pub product_id: Option<ProductId>,
    /// Bill line the discrepancy was found on (first one for per-product checks).
    pub line_no: Option<u32>,
    pub expected: Decimal,
    pub actual: Decimal,
    pub variance_pct: Decimal,
}

/// One priced line of the purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Billed on this order line so far, over all bills including the one
    /// under review.
    pub quantity_billed: Decimal,
}

/// One line of the bill under review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BilledLine {
    pub line_no: u32,
    pub po_line_no: Option<u32>,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Everything the engine reads.
#[derive(Debug, Clone, Default)]
pub struct MatchInput {
    /// Lines of the linked purchase order; `None` when the bill has no order.
    pub ordered: Option<Vec<OrderedLine>>,
    /// Quantities received per product over all posted receipts of the order;
    /// `None` when nothing has been received yet.
    pub received: Option<Vec<(ProductId, Decimal)>>,
    pub billed: Vec<BilledLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub status: MatchStatus,
    pub discrepancies: Vec<Discrepancy>,
    /// Σ billed quantity − Σ expected quantity.
    pub quantity_variance: Decimal,
    /// Σ (billed price − order price) × billed quantity.
    pub price_variance: Money,
    /// Σ billed amount − Σ ordered amount.
    pub amount_variance: Money,
    /// Aggregate amount variance relative to the order subtotal.
    pub variance_pct: Decimal,
}

/// `|actual − expected| / expected × 100`; a zero expectation yields 0 when
/// `actual` is also zero, otherwise 100.
pub fn variance_pct(actual: Decimal, expected: Decimal) -> Decimal {
    if expected.is_zero() {
        return if actual.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE_HUNDRED
        };
    }
    ((actual - expected).abs() / expected.abs() * Decimal::ONE_HUNDRED).round_dp(4)
}

fn sum_by_product<I>(pairs: I) -> Vec<(ProductId, Decimal)>
where
    I: IntoIterator<Item = (ProductId, Decimal)>,
{
    let mut out: Vec<(ProductId, Decimal)> = Vec::new();
    for (product, qty) in pairs {
        match out.iter_mut().find(|(p, _)| *p == product) {
            Some((_, total)) => *total += qty,
            None => out.push((product, qty)),
        }
    }
    out
}

fn lookup(pairs: &[(ProductId, Decimal)], product: ProductId) -> Option<Decimal> {
    pairs.iter().find(|(p, _)| *p == product).map(|(_, q)| *q)
}

/// Run the three-way match.
pub fn evaluate(input: &MatchInput, tolerances: &MatchTolerances) -> MatchOutcome {
    let billed_amount: Money = input
        .billed
        .iter()
        .map(|l| Money::line(l.quantity, l.unit_price))
        .sum();

    let Some(ordered) = input.ordered.as_deref() else {
        return MatchOutcome {
            status: MatchStatus::Mismatch,
            discrepancies: vec![Discrepancy {
                kind: DiscrepancyType::NoPo,
                product_id: None,
                line_no: None,
                expected: Decimal::ZERO,
                actual: billed_amount.amount(),
                variance_pct: Decimal::ONE_HUNDRED,
            }],
            quantity_variance: Decimal::ZERO,
            price_variance: Money::ZERO,
            amount_variance: billed_amount,
            variance_pct: Decimal::ONE_HUNDRED,
        };
    };

    let mut discrepancies = Vec::new();
    let ordered_qty = sum_by_product(ordered.iter().map(|l| (l.product_id, l.quantity)));
    let billed_qty = sum_by_product(input.billed.iter().map(|l| (l.product_id, l.quantity)));
    let billed_to_date = sum_by_product(ordered.iter().map(|l| (l.product_id, l.quantity_billed)));

    let mut quantity_variance = Decimal::ZERO;
    for &(product, billed) in &billed_qty {
        let first_line = input
            .billed
            .iter()
            .find(|l| l.product_id == product)
            .map(|l| l.line_no);

        let Some(ordered_total) = lookup(&ordered_qty, product) else {
            discrepancies.push(Discrepancy {
                kind: DiscrepancyType::NotInPo,
                product_id: Some(product),
                line_no: first_line,
                expected: Decimal::ZERO,
                actual: billed,
                variance_pct: Decimal::ONE_HUNDRED,
            });
            continue;
        };

        let expected = match &input.received {
            Some(received) => lookup(received, product).unwrap_or_default(),
            None => ordered_total,
        };
        quantity_variance += billed - expected;

        let pct = variance_pct(billed, expected);
        if pct > tolerances.quantity_pct {
            discrepancies.push(Discrepancy {
                kind: DiscrepancyType::Quantity,
                product_id: Some(product),
                line_no: first_line,
                expected,
                actual: billed,
                variance_pct: pct,
            });
        }
        let cumulative = lookup(&billed_to_date, product)
            .unwrap_or_default()
            .max(billed);
        if cumulative > ordered_total {
            discrepancies.push(Discrepancy {
                kind: DiscrepancyType::OverOrdered,
                product_id: Some(product),
                line_no: first_line,
                expected: ordered_total,
                actual: cumulative,
                variance_pct: variance_pct(cumulative, ordered_total),
            });
        }
    }

    let mut price_variance = Money::ZERO;
    for line in &input.billed {
        let order_line = line
            .po_line_no
            .and_then(|no| ordered.iter().find(|o| o.line_no == no && o.product_id == line.product_id))
            .or_else(|| ordered.iter().find(|o| o.product_id == line.product_id));
        let Some(order_line) = order_line else {
            continue;
        };

        price_variance += Money::line(line.quantity, line.unit_price - order_line.unit_price);
        let pct = variance_pct(line.unit_price, order_line.unit_price);
        if pct > tolerances.price_pct {
            discrepancies.push(Discrepancy {
                kind: DiscrepancyType::Price,
                product_id: Some(line.product_id),
                line_no: Some(line.line_no),
                expected: order_line.unit_price,
                actual: line.unit_price,
                variance_pct: pct,
            });
        }
    }

    let ordered_amount: Money = ordered
        .iter()
        .map(|l| Money::line(l.quantity, l.unit_price))
        .sum();
    let amount_variance = billed_amount - ordered_amount;
    let aggregate_pct = variance_pct(billed_amount.amount(), ordered_amount.amount());

    let status = if discrepancies.is_empty() && aggregate_pct <= tolerances.amount_pct {
        MatchStatus::Matched
    } else if aggregate_pct > tolerances.mismatch_threshold_pct {
        MatchStatus::Mismatch
    } else {
        MatchStatus::PartialMatch
    };

    MatchOutcome {
        status,
        discrepancies,
        quantity_variance,
        price_variance,
        amount_variance,
        variance_pct: aggregate_pct,
    }
}

/// Command payload: record the first verdict for a bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateThreeWayMatch {
    pub match_id: ThreeWayMatchId,
    pub bill_id: VendorBillId,
    pub order_id: Option<PurchaseOrderId>,
    pub receipt_id: Option<GoodsReceiptId>,
    pub outcome: MatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreeWayMatchCommand {
    /// Replace the verdict with a fresh evaluation.
    Rematch {
        receipt_id: Option<GoodsReceiptId>,
        outcome: MatchOutcome,
    },
    /// Accept the variance.
    Approve { notes: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreeWayMatchChange {
    Created {
        tenant_id: TenantId,
        bill_id: VendorBillId,
        order_id: Option<PurchaseOrderId>,
        receipt_id: Option<GoodsReceiptId>,
        outcome: MatchOutcome,
    },
    Rematched {
        receipt_id: Option<GoodsReceiptId>,
        outcome: MatchOutcome,
    },
    Approved {
        by: UserId,
        notes: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreeWayMatchEvent {
    pub match_id: ThreeWayMatchId,
    pub occurred_at: DateTime<Utc>,
    pub change: ThreeWayMatchChange,
}

impl Event for ThreeWayMatchEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            ThreeWayMatchChange::Created { .. } => "procurement.three_way_match.created",
            ThreeWayMatchChange::Rematched { .. } => "procurement.three_way_match.rematched",
            ThreeWayMatchChange::Approved { .. } => "procurement.three_way_match.approved",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.three_way_match"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: ThreeWayMatch (one per bill).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreeWayMatch {
    id: ThreeWayMatchId,
    tenant_id: TenantId,
    bill_id: VendorBillId,
    order_id: Option<PurchaseOrderId>,
    receipt_id: Option<GoodsReceiptId>,
    status: MatchStatus,
    outcome: MatchOutcome,
    matched_at: DateTime<Utc>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    approval_notes: Option<String>,
    version: u64,
}

impl ThreeWayMatch {
    pub fn create(
        actor: &Actor,
        cmd: &CreateThreeWayMatch,
    ) -> DomainResult<(Self, Vec<ThreeWayMatchEvent>)> {
        let status = MatchStatus::Pending.transition_to(cmd.outcome.status)?;
        let record = Self {
            id: cmd.match_id,
            tenant_id: actor.tenant_id,
            bill_id: cmd.bill_id,
            order_id: cmd.order_id,
            receipt_id: cmd.receipt_id,
            status,
            outcome: cmd.outcome.clone(),
            matched_at: actor.at,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            version: 1,
        };
        let event = ThreeWayMatchEvent {
            match_id: cmd.match_id,
            occurred_at: actor.at,
            change: ThreeWayMatchChange::Created {
                tenant_id: actor.tenant_id,
                bill_id: cmd.bill_id,
                order_id: cmd.order_id,
                receipt_id: cmd.receipt_id,
                outcome: cmd.outcome.clone(),
            },
        };
        Ok((record, vec![event]))
    }

    pub fn id_typed(&self) -> ThreeWayMatchId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn bill_id(&self) -> VendorBillId {
        self.bill_id
    }

    pub fn order_id(&self) -> Option<PurchaseOrderId> {
        self.order_id
    }

    pub fn receipt_id(&self) -> Option<GoodsReceiptId> {
        self.receipt_id
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn outcome(&self) -> &MatchOutcome {
        &self.outcome
    }

    pub fn discrepancies(&self) -> &[Discrepancy] {
        &self.outcome.discrepancies
    }

    pub fn matched_at(&self) -> DateTime<Utc> {
        self.matched_at
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn approval_notes(&self) -> Option<&str> {
        self.approval_notes.as_deref()
    }
}

impl AggregateRoot for ThreeWayMatch {
    type Id = ThreeWayMatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for ThreeWayMatch {
    type Command = ThreeWayMatchCommand;
    type Event = ThreeWayMatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            ThreeWayMatchChange::Created {
                tenant_id,
                bill_id,
                order_id,
                receipt_id,
                outcome,
            } => {
                self.id = event.match_id;
                self.tenant_id = *tenant_id;
                self.bill_id = *bill_id;
                self.order_id = *order_id;
                self.receipt_id = *receipt_id;
                self.status = outcome.status;
                self.outcome = outcome.clone();
                self.matched_at = event.occurred_at;
            }
            ThreeWayMatchChange::Rematched {
                receipt_id,
                outcome,
            } => {
                self.receipt_id = *receipt_id;
                self.status = outcome.status;
                self.outcome = outcome.clone();
                self.matched_at = event.occurred_at;
                self.approved_by = None;
                self.approved_at = None;
                self.approval_notes = None;
            }
            ThreeWayMatchChange::Approved { by, notes } => {
                self.status = MatchStatus::Approved;
                self.approved_by = Some(*by);
                self.approved_at = Some(event.occurred_at);
                self.approval_notes = notes.clone();
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
            ThreeWayMatchCommand::Rematch {
                receipt_id,
                outcome,
            } => {
                // Re-running with an unchanged verdict is an overwrite, not a transition.
                if outcome.status != self.status {
                    self.status.transition_to(outcome.status)?;
                }
                ThreeWayMatchChange::Rematched {
                    receipt_id: *receipt_id,
                    outcome: outcome.clone(),
                }
            }
            ThreeWayMatchCommand::Approve { notes } => {
                self.status.transition_to(MatchStatus::Approved)?;
                ThreeWayMatchChange::Approved {
                    by: actor.user_id,
                    notes: notes.clone(),
                }
            }
        };

        Ok(vec![ThreeWayMatchEvent {
            match_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procura_core::check_transition_table;
    use procura_events::execute;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn ordered(product: ProductId, quantity: Decimal, price: Decimal) -> OrderedLine {
        OrderedLine {
            line_no: 1,
            product_id: product,
            quantity,
            unit_price: price,
            quantity_billed: Decimal::ZERO,
        }
    }

    fn billed(line_no: u32, product: ProductId, quantity: Decimal, price: Decimal) -> BilledLine {
        BilledLine {
            line_no,
            po_line_no: Some(1),
            product_id: product,
            quantity,
            unit_price: price,
        }
    }

    fn received_input(product: ProductId, bill_price: Decimal) -> MatchInput {
        MatchInput {
            ordered: Some(vec![ordered(product, dec!(100), dec!(10))]),
            received: Some(vec![(product, dec!(100))]),
            billed: vec![billed(1, product, dec!(100), bill_price)],
        }
    }

    #[test]
    fn transition_table_is_well_formed() {
        check_transition_table(MatchStatus::Pending, MatchStatus::ALL).unwrap();
        assert!(!MatchStatus::Matched.can_transition_to(MatchStatus::Approved));
    }

    #[test]
    fn exact_bill_matches_with_no_discrepancies() {
        let p = ProductId::generate();
        let outcome = evaluate(&received_input(p, dec!(10)), &MatchTolerances::default());
        assert_eq!(outcome.status, MatchStatus::Matched);
        assert!(outcome.discrepancies.is_empty());
        assert_eq!(outcome.amount_variance, Money::ZERO);
    }

    #[test]
    fn five_percent_price_increase_is_a_price_discrepancy() {
        let p = ProductId::generate();
        let outcome = evaluate(&received_input(p, dec!(10.5)), &MatchTolerances::default());
        assert_eq!(outcome.discrepancies.len(), 1);
        assert_eq!(outcome.discrepancies[0].kind, DiscrepancyType::Price);
        assert_eq!(outcome.discrepancies[0].variance_pct, dec!(5));
        assert_eq!(outcome.status, MatchStatus::PartialMatch);
        assert_eq!(outcome.price_variance, Money::new(dec!(50)));
    }

    #[test]
    fn large_aggregate_variance_is_a_mismatch() {
        let p = ProductId::generate();
        let outcome = evaluate(&received_input(p, dec!(12)), &MatchTolerances::default());
        assert_eq!(outcome.status, MatchStatus::Mismatch);
        assert_eq!(outcome.variance_pct, dec!(20));
    }

    #[test]
    fn missing_order_is_a_mismatch() {
        let input = MatchInput {
            ordered: None,
            received: None,
            billed: vec![billed(1, ProductId::generate(), dec!(1), dec!(1))],
        };
        let outcome = evaluate(&input, &MatchTolerances::default());
        assert_eq!(outcome.status, MatchStatus::Mismatch);
        assert_eq!(outcome.discrepancies[0].kind, DiscrepancyType::NoPo);
    }

    #[test]
    fn unknown_product_and_over_ordering_are_flagged() {
        let p = ProductId::generate();
        let stranger = ProductId::generate();
        let input = MatchInput {
            ordered: Some(vec![ordered(p, dec!(10), dec!(1))]),
            received: Some(vec![(p, dec!(11))]),
            billed: vec![
                billed(1, p, dec!(11), dec!(1)),
                BilledLine {
                    line_no: 2,
                    po_line_no: None,
                    product_id: stranger,
                    quantity: dec!(1),
                    unit_price: dec!(1),
                },
            ],
        };
        let kinds: Vec<DiscrepancyType> = evaluate(&input, &MatchTolerances::default())
            .discrepancies
            .into_iter()
            .map(|d| d.kind)
            .collect();
        assert!(kinds.contains(&DiscrepancyType::OverOrdered));
        assert!(kinds.contains(&DiscrepancyType::NotInPo));
        assert!(!kinds.contains(&DiscrepancyType::Quantity));
    }

    #[test]
    fn over_ordering_counts_earlier_bills() {
        let p = ProductId::generate();
        let input = MatchInput {
            ordered: Some(vec![OrderedLine {
                quantity_billed: dec!(12),
                ..ordered(p, dec!(10), dec!(1))
            }]),
            received: Some(vec![(p, dec!(12))]),
            billed: vec![billed(1, p, dec!(4), dec!(1))],
        };
        let over = evaluate(&input, &MatchTolerances::default())
            .discrepancies
            .into_iter()
            .find(|d| d.kind == DiscrepancyType::OverOrdered)
            .unwrap();
        assert_eq!(over.expected, dec!(10));
        assert_eq!(over.actual, dec!(12));
    }

    #[test]
    fn without_receipts_ordered_quantity_is_expected() {
        let p = ProductId::generate();
        let input = MatchInput {
            ordered: Some(vec![ordered(p, dec!(100), dec!(10))]),
            received: None,
            billed: vec![billed(1, p, dec!(100), dec!(10))],
        };
        assert_eq!(
            evaluate(&input, &MatchTolerances::default()).status,
            MatchStatus::Matched
        );
    }

    #[test]
    fn quantities_are_compared_per_product_across_bill_lines() {
        let p = ProductId::generate();
        let input = MatchInput {
            ordered: Some(vec![ordered(p, dec!(100), dec!(10))]),
            received: Some(vec![(p, dec!(100))]),
            billed: vec![
                billed(1, p, dec!(60), dec!(10)),
                billed(2, p, dec!(40), dec!(10)),
            ],
        };
        let outcome = evaluate(&input, &MatchTolerances::default());
        assert_eq!(outcome.status, MatchStatus::Matched);
        assert_eq!(outcome.quantity_variance, Decimal::ZERO);
    }

    #[test]
    fn variance_against_zero_expectation() {
        assert_eq!(variance_pct(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(variance_pct(dec!(3), Decimal::ZERO), dec!(100));
    }

    fn record(status: MatchStatus) -> (Actor, ThreeWayMatch) {
        let actor = Actor::new(TenantId::new(), UserId::new(), Utc::now());
        let outcome = MatchOutcome {
            status,
            discrepancies: Vec::new(),
            quantity_variance: Decimal::ZERO,
            price_variance: Money::ZERO,
            amount_variance: Money::ZERO,
            variance_pct: Decimal::ZERO,
        };
        let cmd = CreateThreeWayMatch {
            match_id: ThreeWayMatchId::generate(),
            bill_id: VendorBillId::generate(),
            order_id: Some(PurchaseOrderId::generate()),
            receipt_id: None,
            outcome,
        };
        let (m, _) = ThreeWayMatch::create(&actor, &cmd).unwrap();
        (actor, m)
    }

    #[test]
    fn approval_is_only_allowed_for_variances() {
        let (actor, mut m) = record(MatchStatus::PartialMatch);
        execute(
            &mut m,
            &actor,
            &ThreeWayMatchCommand::Approve {
                notes: Some("freight surcharge agreed".to_string()),
            },
        )
        .unwrap();
        assert_eq!(m.status(), MatchStatus::Approved);
        assert_eq!(m.approved_by(), Some(actor.user_id));

        let (actor, matched) = record(MatchStatus::Matched);
        let err = matched
            .handle(&actor, &ThreeWayMatchCommand::Approve { notes: None })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn rematch_with_same_status_overwrites_verdict() {
        let (actor, mut m) = record(MatchStatus::Matched);
        let mut outcome = m.outcome().clone();
        outcome.variance_pct = dec!(1);
        execute(
            &mut m,
            &actor,
            &ThreeWayMatchCommand::Rematch {
                receipt_id: Some(GoodsReceiptId::generate()),
                outcome,
            },
        )
        .unwrap();
        assert_eq!(m.status(), MatchStatus::Matched);
        assert_eq!(m.outcome().variance_pct, dec!(1));
        assert_eq!(m.version(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: over- and under-billing by the same price delta yield the same verdict.
        #[test]
        fn price_deviation_is_symmetric(delta_cents in 0i64..500i64) {
            let p = ProductId::generate();
            let delta = Decimal::new(delta_cents, 2);
            let up = evaluate(&received_input(p, dec!(10) + delta), &MatchTolerances::default());
            let down = evaluate(&received_input(p, dec!(10) - delta), &MatchTolerances::default());
            prop_assert_eq!(up.status, down.status);
            prop_assert_eq!(up.discrepancies.len(), down.discrepancies.len());
            prop_assert_eq!(up.variance_pct, down.variance_pct);
        }
    }
}
