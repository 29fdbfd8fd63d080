//! Blanket order consumption and realization.
//!
//! Consumption is derived, never stored: `amount_used` is recomputed from the
//! releases (purchase orders carrying the blanket order id) every time it is
//! needed. Realization maps consumption onto the blanket order status.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::Money;

use crate::blanket::BlanketOrderStatus;
use crate::order::PurchaseOrderStatus;
use crate::reference::{ProductId, PurchaseOrderId};

/// What the consumption tracker needs to know about one release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub order_id: PurchaseOrderId,
    pub status: PurchaseOrderStatus,
    pub total: Money,
}

impl ReleaseSummary {
    pub fn is_live(&self) -> bool {
        self.status != PurchaseOrderStatus::Cancelled
    }
}

/// Σ `total` of releases that are not cancelled.
pub fn amount_used(releases: &[ReleaseSummary]) -> Money {
    releases
        .iter()
        .filter(|r| r.is_live())
        .map(|r| r.total)
        .sum()
}

/// Same as [`amount_used`] but ignoring one release (the one being created or edited).
pub fn amount_used_excluding(releases: &[ReleaseSummary], order_id: PurchaseOrderId) -> Money {
    releases
        .iter()
        .filter(|r| r.is_live() && r.order_id != order_id)
        .map(|r| r.total)
        .sum()
}

pub fn remaining_amount(amount_limit: Money, amount_used: Money) -> Money {
    amount_limit - amount_used
}

/// Remaining orderable quantity of one blanket order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "snake_case")]
pub enum RemainingQuantity {
    /// The line has no agreed quantity.
    Unbounded,
    Limited(Decimal),
}

impl RemainingQuantity {
    pub fn allows(self, quantity: Decimal) -> bool {
        match self {
            RemainingQuantity::Unbounded => true,
            RemainingQuantity::Limited(rem) => quantity <= rem,
        }
    }

    pub fn as_decimal(self) -> Option<Decimal> {
        match self {
            RemainingQuantity::Unbounded => None,
            RemainingQuantity::Limited(rem) => Some(rem),
        }
    }
}

/// Quantity view of a blanket order line used by realization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConsumption {
    pub product_id: ProductId,
    pub quantity_agreed: Option<Decimal>,
    pub quantity_ordered: Decimal,
}

pub fn remaining_quantity(quantity_agreed: Option<Decimal>, quantity_ordered: Decimal) -> RemainingQuantity {
    match quantity_agreed {
        None => RemainingQuantity::Unbounded,
        Some(agreed) => RemainingQuantity::Limited(agreed - quantity_ordered),
    }
}

/// Every line with an agreed quantity is fully ordered. Lines without an
/// agreed quantity are ignored; no bounded lines at all is `false`.
pub fn all_bounded_lines_fulfilled(lines: &[LineConsumption]) -> bool {
    let mut bounded = lines
        .iter()
        .filter_map(|l| l.quantity_agreed.map(|agreed| (agreed, l.quantity_ordered)))
        .peekable();
    if bounded.peek().is_none() {
        return false;
    }
    bounded.all(|(agreed, ordered)| ordered >= agreed)
}

/// Derive the realization status of a blanket order.
///
/// Only `open` and `partially_ordered` orders are realized; every other
/// status is returned unchanged.
pub fn realization_status(
    current: BlanketOrderStatus,
    amount_limit: Money,
    used: Money,
    lines: &[LineConsumption],
) -> BlanketOrderStatus {
    if !matches!(
        current,
        BlanketOrderStatus::Open | BlanketOrderStatus::PartiallyOrdered
    ) {
        return current;
    }

    if used >= amount_limit || all_bounded_lines_fulfilled(lines) {
        BlanketOrderStatus::Fulfilled
    } else if used.is_positive() {
        BlanketOrderStatus::PartiallyOrdered
    } else {
        BlanketOrderStatus::Open
    }
}

/// Read-only consumption report for one blanket order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionSummary {
    pub amount_limit: Money,
    pub amount_used: Money,
    pub remaining_amount: Money,
    pub live_releases: usize,
    pub lines: Vec<LineRemaining>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemaining {
    pub product_id: ProductId,
    pub quantity_ordered: Decimal,
    pub remaining: RemainingQuantity,
}

impl ConsumptionSummary {
    pub fn compute(amount_limit: Money, releases: &[ReleaseSummary], lines: &[LineConsumption]) -> Self {
        let used = amount_used(releases);
        Self {
            amount_limit,
            amount_used: used,
            remaining_amount: remaining_amount(amount_limit, used),
            live_releases: releases.iter().filter(|r| r.is_live()).count(),
            lines: lines
                .iter()
                .map(|l| LineRemaining {
                    product_id: l.product_id,
                    quantity_ordered: l.quantity_ordered,
                    remaining: remaining_quantity(l.quantity_agreed, l.quantity_ordered),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn release(total: Decimal, status: PurchaseOrderStatus) -> ReleaseSummary {
        ReleaseSummary {
            order_id: PurchaseOrderId::generate(),
            status,
            total: Money::new(total),
        }
    }

    fn bounded(agreed: Decimal, ordered: Decimal) -> LineConsumption {
        LineConsumption {
            product_id: ProductId::generate(),
            quantity_agreed: Some(agreed),
            quantity_ordered: ordered,
        }
    }

    #[test]
    fn cancelled_releases_do_not_consume() {
        let releases = vec![
            release(dec!(600000), PurchaseOrderStatus::Approved),
            release(dec!(100), PurchaseOrderStatus::Cancelled),
            release(dec!(50), PurchaseOrderStatus::Draft),
        ];
        assert_eq!(amount_used(&releases), Money::new(dec!(600050)));
        assert_eq!(
            amount_used_excluding(&releases, releases[0].order_id),
            Money::new(dec!(50))
        );
    }

    #[test]
    fn remaining_quantity_is_unbounded_without_agreement() {
        assert_eq!(remaining_quantity(None, dec!(99)), RemainingQuantity::Unbounded);
        assert_eq!(
            remaining_quantity(Some(dec!(10)), dec!(4)),
            RemainingQuantity::Limited(dec!(6))
        );
        assert!(RemainingQuantity::Unbounded.allows(dec!(1000000)));
        assert!(!RemainingQuantity::Limited(dec!(6)).allows(dec!(6.01)));
    }

    #[test]
    fn realization_follows_amount_then_quantities() {
        let limit = Money::new(dec!(1000000));
        let open = BlanketOrderStatus::Open;

        assert_eq!(
            realization_status(open, limit, Money::ZERO, &[]),
            BlanketOrderStatus::Open
        );
        assert_eq!(
            realization_status(open, limit, Money::new(dec!(600000)), &[]),
            BlanketOrderStatus::PartiallyOrdered
        );
        assert_eq!(
            realization_status(open, limit, limit, &[]),
            BlanketOrderStatus::Fulfilled
        );
        assert_eq!(
            realization_status(
                open,
                limit,
                Money::new(dec!(10)),
                &[bounded(dec!(5), dec!(5))]
            ),
            BlanketOrderStatus::Fulfilled
        );
    }

    #[test]
    fn unbounded_lines_are_ignored_by_quantity_rule() {
        let lines = [
            bounded(dec!(5), dec!(5)),
            LineConsumption {
                product_id: ProductId::generate(),
                quantity_agreed: None,
                quantity_ordered: Decimal::ZERO,
            },
        ];
        assert!(all_bounded_lines_fulfilled(&lines));
        assert!(!all_bounded_lines_fulfilled(&lines[1..]));
    }

    #[test]
    fn realization_is_a_no_op_outside_open_states() {
        let limit = Money::new(dec!(100));
        for status in [
            BlanketOrderStatus::Draft,
            BlanketOrderStatus::Fulfilled,
            BlanketOrderStatus::Closed,
            BlanketOrderStatus::Cancelled,
        ] {
            assert_eq!(realization_status(status, limit, Money::ZERO, &[]), status);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: realization is idempotent.
        #[test]
        fn realization_is_idempotent(
            limit in 1i64..1_000_000i64,
            used in 0i64..2_000_000i64,
            partially in any::<bool>(),
            agreed in prop::option::of(1i64..100i64),
            ordered in 0i64..150i64,
        ) {
            let limit = Money::new(Decimal::from(limit));
            let used = Money::new(Decimal::from(used));
            let lines = [LineConsumption {
                product_id: ProductId::generate(),
                quantity_agreed: agreed.map(Decimal::from),
                quantity_ordered: Decimal::from(ordered),
            }];
            let start = if partially { BlanketOrderStatus::PartiallyOrdered } else { BlanketOrderStatus::Open };

            let once = realization_status(start, limit, used, &lines);
            let twice = realization_status(once, limit, used, &lines);
            prop_assert_eq!(once, twice);
        }

        /// Property: cancelling a live release strictly decreases amount_used.
        #[test]
        fn cancelling_a_release_decreases_usage(
            totals in prop::collection::vec(1i64..100_000i64, 1..10),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut releases: Vec<ReleaseSummary> = totals
                .into_iter()
                .map(|t| release(Decimal::from(t), PurchaseOrderStatus::Approved))
                .collect();
            let before = amount_used(&releases);
            let idx = pick.index(releases.len());
            releases[idx].status = PurchaseOrderStatus::Cancelled;
            prop_assert!(amount_used(&releases) < before);
        }
    }
}
