//! Money and tax value objects (decimal, currency-precision rounding).
//!
//! Amounts are rounded half away from zero to two decimal places. Currency
//! codes and conversion are supplied by callers; nothing here converts.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of decimal places kept for monetary amounts.
pub const CURRENCY_SCALE: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Round to currency precision.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A monetary amount in the document currency, always at currency precision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(round_currency(amount))
    }

    /// Smallest representable currency unit (0.01).
    pub fn minor_unit() -> Self {
        Self(Decimal::new(1, CURRENCY_SCALE))
    }

    /// `quantity × unit_price`, rounded once.
    pub fn line(quantity: Decimal, unit_price: Decimal) -> Self {
        Self::new(quantity * unit_price)
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// `self × percent / 100`, rounded.
    pub fn percent(self, percent: Decimal) -> Self {
        Self::new(self.0 * percent / HUNDRED)
    }

    /// Split this amount proportionally to `weights`.
    ///
    /// Each share is rounded to currency precision and the rounding remainder
    /// is added to the last share, so the shares always sum to `self`.
    /// Returns `None` when there are no weights or they sum to zero.
    pub fn allocate(self, weights: &[Decimal]) -> Option<Vec<Money>> {
        let total: Decimal = weights.iter().copied().sum();
        if weights.is_empty() || total.is_zero() {
            return None;
        }

        let mut shares: Vec<Money> = weights
            .iter()
            .map(|w| Money::new(self.0 * *w / total))
            .collect();
        let distributed: Money = shares.iter().copied().sum();
        if let Some(last) = shares.last_mut() {
            *last += self - distributed;
        }
        Some(shares)
    }

    /// Split this amount into `parts` equal shares (remainder on the last one).
    pub fn split_evenly(self, parts: usize) -> Option<Vec<Money>> {
        self.allocate(&vec![Decimal::ONE; parts])
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, rhs: Decimal) -> Money {
        Money::new(self.0 * rhs)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

/// Whether document prices already include tax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    #[default]
    Exclusive,
    Inclusive,
}

/// Caller-supplied tax inputs for one document (percentages).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxRates {
    pub tax_rate: Decimal,
    pub withholding_rate: Decimal,
    pub mode: TaxMode,
}

impl ValueObject for TaxRates {}

impl TaxRates {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn exclusive(tax_rate: Decimal, withholding_rate: Decimal) -> Self {
        Self {
            tax_rate,
            withholding_rate,
            mode: TaxMode::Exclusive,
        }
    }

    pub fn inclusive(tax_rate: Decimal, withholding_rate: Decimal) -> Self {
        Self {
            tax_rate,
            withholding_rate,
            mode: TaxMode::Inclusive,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        for (field, rate) in [
            ("tax_rate", self.tax_rate),
            ("withholding_tax_rate", self.withholding_rate),
        ] {
            if rate < Decimal::ZERO || rate > HUNDRED {
                return Err(DomainError::validation(format!(
                    "{field} must be between 0 and 100 (got {rate})"
                )));
            }
        }
        Ok(())
    }

    /// Compute document totals from the sum of line amounts.
    ///
    /// Exclusive: lines are net; tax and withholding are added/subtracted.
    /// Inclusive: lines already contain tax; the net subtotal is backed out.
    /// In both modes `subtotal + tax - withholding == total` exactly.
    pub fn totals(&self, lines_amount: Money) -> DocumentTotals {
        let (subtotal, tax) = match self.mode {
            TaxMode::Exclusive => (lines_amount, lines_amount.percent(self.tax_rate)),
            TaxMode::Inclusive => {
                let net = Money::new(lines_amount.amount() * HUNDRED / (HUNDRED + self.tax_rate));
                (net, lines_amount - net)
            }
        };
        let withholding = subtotal.percent(self.withholding_rate);

        DocumentTotals {
            subtotal,
            tax,
            withholding,
            total: subtotal + tax - withholding,
        }
    }
}

/// Header totals of a priced document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub withholding: Money,
    pub total: Money,
}

impl ValueObject for DocumentTotals {}

impl DocumentTotals {
    pub fn from_lines(lines: impl IntoIterator<Item = Money>, rates: &TaxRates) -> Self {
        rates.totals(lines.into_iter().sum())
    }
}
