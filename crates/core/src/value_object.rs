//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. `Money`,
/// `TaxRates` and `DocumentTotals` are value objects: two amounts of 10.00 are
/// the same amount. Documents (purchase orders, receipts, bills) are not; they
/// have identity and a lifecycle.
///
/// To "modify" a value object, build a new one:
///
/// ```ignore
/// let net = Money::new(dec!(100));
/// let gross = net + net.percent(dec!(10));
/// assert_eq!(gross, Money::new(dec!(110)));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
