//! Balanced journal entries handed to the general ledger on posting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use procura_core::{DocumentTotals, DomainError, DomainResult, Money};

use crate::reference::DocumentRef;

/// Ledger accounts the procurement postings touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingAccount {
    AccountsPayable,
    /// Goods received not yet invoiced.
    PurchaseClearing,
    InputTax,
    WithholdingPayable,
    Inventory,
}

/// One side of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: PostingAccount,
    /// Positive amount.
    pub amount: Money,
    /// true = debit, false = credit.
    pub is_debit: bool,
}

impl JournalLine {
    pub fn debit(account: PostingAccount, amount: Money) -> Self {
        Self {
            account,
            amount,
            is_debit: true,
        }
    }

    pub fn credit(account: PostingAccount, amount: Money) -> Self {
        Self {
            account,
            amount,
            is_debit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub source: DocumentRef,
    pub reference: String,
    pub date: NaiveDate,
    pub description: String,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Build an entry, dropping zero lines and rejecting unbalanced sets.
    pub fn balanced(
        source: DocumentRef,
        reference: impl Into<String>,
        date: NaiveDate,
        description: impl Into<String>,
        lines: impl IntoIterator<Item = JournalLine>,
    ) -> DomainResult<Self> {
        let entry = Self {
            source,
            reference: reference.into(),
            date,
            description: description.into(),
            lines: lines.into_iter().filter(|l| !l.amount.is_zero()).collect(),
        };
        entry.validate()?;
        Ok(entry)
    }

    pub fn debit_total(&self) -> Money {
        self.lines.iter().filter(|l| l.is_debit).map(|l| l.amount).sum()
    }

    pub fn credit_total(&self) -> Money {
        self.lines.iter().filter(|l| !l.is_debit).map(|l| l.amount).sum()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("journal entry must have lines"));
        }
        if self.lines.iter().any(|l| l.amount.is_negative()) {
            return Err(DomainError::validation("journal amounts must be positive"));
        }
        let (debits, credits) = (self.debit_total(), self.credit_total());
        if debits != credits {
            return Err(DomainError::invariant(format!(
                "unbalanced journal entry {}: debits {debits} != credits {credits}",
                self.reference
            )));
        }
        Ok(())
    }
}

/// Vendor bill posting: Dr clearing + input tax, Cr payable + withholding.
pub fn bill_entry(
    source: DocumentRef,
    number: &str,
    date: NaiveDate,
    totals: &DocumentTotals,
) -> DomainResult<JournalEntry> {
    JournalEntry::balanced(
        source,
        number,
        date,
        format!("Vendor bill {number}"),
        [
            JournalLine::debit(PostingAccount::PurchaseClearing, totals.subtotal),
            JournalLine::debit(PostingAccount::InputTax, totals.tax),
            JournalLine::credit(PostingAccount::AccountsPayable, totals.total),
            JournalLine::credit(PostingAccount::WithholdingPayable, totals.withholding),
        ],
    )
}

/// Purchase return posting: Dr payable, Cr inventory at receipt cost.
pub fn return_entry(
    source: DocumentRef,
    number: &str,
    date: NaiveDate,
    amount: Money,
) -> DomainResult<JournalEntry> {
    JournalEntry::balanced(
        source,
        number,
        date,
        format!("Purchase return {number}"),
        [
            JournalLine::debit(PostingAccount::AccountsPayable, amount),
            JournalLine::credit(PostingAccount::Inventory, amount),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::VendorBillId;
    use procura_core::{Decimal, TaxRates};
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn bill_entry_balances_and_omits_zero_lines() {
        let totals = TaxRates::exclusive(dec!(11), Decimal::ZERO).totals(Money::new(dec!(1000)));
        let entry = bill_entry(VendorBillId::generate().into(), "BILL-1", date(), &totals).unwrap();
        assert_eq!(entry.lines.len(), 3);
        assert_eq!(entry.debit_total(), Money::new(dec!(1110)));
        assert_eq!(entry.credit_total(), Money::new(dec!(1110)));
    }

    #[test]
    fn withholding_is_credited_separately() {
        let totals = TaxRates::exclusive(dec!(10), dec!(2)).totals(Money::new(dec!(500)));
        let entry = bill_entry(VendorBillId::generate().into(), "BILL-2", date(), &totals).unwrap();
        assert!(entry
            .lines
            .iter()
            .any(|l| l.account == PostingAccount::WithholdingPayable && l.amount == Money::new(dec!(10))));
        entry.validate().unwrap();
    }

    #[test]
    fn unbalanced_entries_are_rejected() {
        let err = JournalEntry::balanced(
            VendorBillId::generate().into(),
            "X",
            date(),
            "broken",
            [JournalLine::debit(PostingAccount::Inventory, Money::new(dec!(1)))],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("unbalanced")));
    }
}
