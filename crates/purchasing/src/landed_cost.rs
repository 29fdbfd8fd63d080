//! Landed cost allocation across goods receipt lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{DomainError, DomainResult, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandedCostType {
    Freight,
    Customs,
    Insurance,
    Handling,
    Other,
}

/// Requested allocation method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    #[default]
    ByValue,
    ByQuantity,
    ByWeight,
}

/// Method actually used after fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedMethod {
    Value,
    Quantity,
    Weight,
    EqualSplit,
}

/// Per-line inputs to the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationBasis {
    pub line_no: u32,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// Unit weight from the product catalog, when known.
    pub weight: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostAllocation {
    pub line_no: u32,
    pub amount: Money,
}

/// Result of allocating one ancillary cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub requested: AllocationMethod,
    pub applied: AppliedMethod,
    pub lines: Vec<LandedCostAllocation>,
}

impl Allocation {
    pub fn total(&self) -> Money {
        self.lines.iter().map(|a| a.amount).sum()
    }
}

/// Distribute `amount` over `items`.
///
/// Weighted shares are rounded to currency precision and the rounding
/// remainder lands on the last item, so the allocations sum to `amount`.
/// By-weight falls back to by-value when the total weight is zero; any
/// zero-total basis falls back to an equal split.
pub fn allocate(
    amount: Money,
    method: AllocationMethod,
    items: &[AllocationBasis],
) -> DomainResult<Allocation> {
    if items.is_empty() {
        return Err(DomainError::validation(
            "landed cost requires at least one receipt line",
        ));
    }
    if !amount.is_positive() {
        return Err(DomainError::validation("landed cost amount must be positive"));
    }

    let by_value = || -> Vec<Decimal> { items.iter().map(|i| i.unit_cost * i.quantity).collect() };
    let (applied, weights) = match method {
        AllocationMethod::ByValue => (AppliedMethod::Value, by_value()),
        AllocationMethod::ByQuantity => (
            AppliedMethod::Quantity,
            items.iter().map(|i| i.quantity).collect(),
        ),
        AllocationMethod::ByWeight => {
            let weights: Vec<Decimal> = items
                .iter()
                .map(|i| i.weight.unwrap_or_default() * i.quantity)
                .collect();
            if weights.iter().copied().sum::<Decimal>().is_zero() {
                (AppliedMethod::Value, by_value())
            } else {
                (AppliedMethod::Weight, weights)
            }
        }
    };

    let (applied, shares) = match amount.allocate(&weights) {
        Some(shares) => (applied, shares),
        None => (AppliedMethod::EqualSplit, equal_split(amount, items.len())?),
    };

    Ok(Allocation {
        requested: method,
        applied,
        lines: items
            .iter()
            .zip(shares)
            .map(|(item, amount)| LandedCostAllocation {
                line_no: item.line_no,
                amount,
            })
            .collect(),
    })
}

fn equal_split(amount: Money, parts: usize) -> DomainResult<Vec<Money>> {
    amount
        .split_evenly(parts)
        .ok_or_else(|| DomainError::validation("cannot split landed cost across zero lines"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn basis(line_no: u32, quantity: Decimal, unit_cost: Decimal, weight: Option<Decimal>) -> AllocationBasis {
        AllocationBasis {
            line_no,
            quantity,
            unit_cost,
            weight,
        }
    }

    fn amounts(a: &Allocation) -> Vec<Decimal> {
        a.lines.iter().map(|l| l.amount.amount()).collect()
    }

    #[test]
    fn by_value_is_proportional_to_extended_cost() {
        let items = [
            basis(1, dec!(10), dec!(30), None),
            basis(2, dec!(10), dec!(10), None),
        ];
        let a = allocate(Money::new(dec!(100)), AllocationMethod::ByValue, &items).unwrap();
        assert_eq!(a.applied, AppliedMethod::Value);
        assert_eq!(amounts(&a), vec![dec!(75), dec!(25)]);
    }

    #[test]
    fn by_quantity_puts_rounding_remainder_on_last_line() {
        let items = [
            basis(1, dec!(1), dec!(5), None),
            basis(2, dec!(1), dec!(5), None),
            basis(3, dec!(1), dec!(5), None),
        ];
        let a = allocate(Money::new(dec!(100)), AllocationMethod::ByQuantity, &items).unwrap();
        assert_eq!(amounts(&a), vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
        assert_eq!(a.total(), Money::new(dec!(100)));
    }

    #[test]
    fn zero_value_receipt_falls_back_to_equal_split() {
        let items = [
            basis(1, dec!(4), Decimal::ZERO, None),
            basis(2, dec!(8), Decimal::ZERO, None),
        ];
        let a = allocate(Money::new(dec!(50)), AllocationMethod::ByValue, &items).unwrap();
        assert_eq!(a.applied, AppliedMethod::EqualSplit);
        assert_eq!(amounts(&a), vec![dec!(25), dec!(25)]);
    }

    #[test]
    fn by_weight_without_weights_falls_back_to_value() {
        let items = [
            basis(1, dec!(2), dec!(10), None),
            basis(2, dec!(2), dec!(30), Some(Decimal::ZERO)),
        ];
        let a = allocate(Money::new(dec!(40)), AllocationMethod::ByWeight, &items).unwrap();
        assert_eq!(a.requested, AllocationMethod::ByWeight);
        assert_eq!(a.applied, AppliedMethod::Value);
        assert_eq!(amounts(&a), vec![dec!(10), dec!(30)]);
    }

    #[test]
    fn by_weight_uses_unit_weight_times_quantity() {
        let items = [
            basis(1, dec!(1), dec!(100), Some(dec!(3))),
            basis(2, dec!(1), dec!(1), Some(dec!(1))),
        ];
        let a = allocate(Money::new(dec!(8)), AllocationMethod::ByWeight, &items).unwrap();
        assert_eq!(a.applied, AppliedMethod::Weight);
        assert_eq!(amounts(&a), vec![dec!(6), dec!(2)]);
    }

    #[test]
    fn empty_receipt_or_non_positive_amount_is_rejected() {
        let err = allocate(Money::new(dec!(10)), AllocationMethod::ByValue, &[]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let items = [basis(1, dec!(1), dec!(1), None)];
        let err = allocate(Money::ZERO, AllocationMethod::ByValue, &items).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("positive")));
    }

    fn method_strategy() -> impl Strategy<Value = AllocationMethod> {
        prop_oneof![
            Just(AllocationMethod::ByValue),
            Just(AllocationMethod::ByQuantity),
            Just(AllocationMethod::ByWeight),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: allocations always sum exactly to the cost amount.
        #[test]
        fn allocations_sum_to_amount(
            cents in 1i64..10_000_000i64,
            method in method_strategy(),
            lines in prop::collection::vec(
                (0u32..500u32, 0u32..100_000u32, prop::option::of(0u32..50u32)),
                1..15,
            ),
        ) {
            let amount = Money::new(Decimal::new(cents, 2));
            let items: Vec<AllocationBasis> = lines
                .iter()
                .enumerate()
                .map(|(idx, (qty, cost, weight))| basis(
                    idx as u32 + 1,
                    Decimal::from(*qty),
                    Decimal::new(i64::from(*cost), 2),
                    weight.map(Decimal::from),
                ))
                .collect();

            let a = allocate(amount, method, &items).unwrap();
            prop_assert_eq!(a.lines.len(), items.len());
            prop_assert_eq!(a.total(), amount);
        }
    }
}
