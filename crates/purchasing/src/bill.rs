use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DocumentTotals, DomainError, DomainResult, Lifecycle, Money,
    TaxRates, TenantId, UserId, lifecycle,
};
use procura_events::Event;

use crate::matching::{BilledLine, MatchStatus};
use crate::reference::{LineQuantity, ProductId, PurchaseOrderId, ThreeWayMatchId, VendorBillId, VendorId};

lifecycle! {
    pub enum BillStatus for "vendor bill" {
        Draft = "draft",
        Posted = "posted",
    }
    transitions {
        Draft => [Posted],
        Posted => [],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillLine {
    pub line_no: u32,
    pub po_line_no: Option<u32>,
    pub product_id: ProductId,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillLineInput {
    pub po_line_no: Option<u32>,
    pub product_id: ProductId,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVendorBill {
    pub bill_id: VendorBillId,
    pub number: String,
    pub vendor_id: VendorId,
    pub order_id: Option<PurchaseOrderId>,
    pub vendor_reference: Option<String>,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax: TaxRates,
    pub lines: Vec<BillLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VendorBillCommand {
    ReplaceLines {
        lines: Vec<BillLineInput>,
        tax: TaxRates,
    },
    RecordMatch {
        match_id: ThreeWayMatchId,
        status: MatchStatus,
    },
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VendorBillChange {
    Created {
        tenant_id: TenantId,
        number: String,
        vendor_id: VendorId,
        order_id: Option<PurchaseOrderId>,
        vendor_reference: Option<String>,
        bill_date: NaiveDate,
        due_date: NaiveDate,
        tax: TaxRates,
        totals: DocumentTotals,
        lines: Vec<BillLine>,
    },
    LinesReplaced {
        lines: Vec<BillLine>,
        tax: TaxRates,
        totals: DocumentTotals,
    },
    MatchRecorded {
        match_id: ThreeWayMatchId,
        status: MatchStatus,
    },
    Posted { by: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorBillEvent {
    pub bill_id: VendorBillId,
    pub occurred_at: DateTime<Utc>,
    pub change: VendorBillChange,
}

impl Event for VendorBillEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            VendorBillChange::Created { .. } => "procurement.vendor_bill.created",
            VendorBillChange::LinesReplaced { .. } => "procurement.vendor_bill.lines_replaced",
            VendorBillChange::MatchRecorded { .. } => "procurement.vendor_bill.match_recorded",
            VendorBillChange::Posted { .. } => "procurement.vendor_bill.posted",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.vendor_bill"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: VendorBill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorBill {
    id: VendorBillId,
    tenant_id: TenantId,
    number: String,
    vendor_id: VendorId,
    order_id: Option<PurchaseOrderId>,
    vendor_reference: Option<String>,
    bill_date: NaiveDate,
    due_date: NaiveDate,
    tax: TaxRates,
    totals: DocumentTotals,
    lines: Vec<BillLine>,
    status: BillStatus,
    match_status: MatchStatus,
    match_id: Option<ThreeWayMatchId>,
    posted_by: Option<UserId>,
    posted_at: Option<DateTime<Utc>>,
    version: u64,
}

impl VendorBill {
    pub fn create(
        actor: &Actor,
        cmd: &CreateVendorBill,
    ) -> DomainResult<(Self, Vec<VendorBillEvent>)> {
        if cmd.due_date < cmd.bill_date {
            return Err(DomainError::validation("due_date cannot be before bill_date"));
        }
        cmd.tax.validate()?;
        let lines = build_lines(&cmd.lines)?;
        let totals = DocumentTotals::from_lines(lines.iter().map(|l| l.total), &cmd.tax);

        let bill = Self {
            id: cmd.bill_id,
            tenant_id: actor.tenant_id,
            number: cmd.number.clone(),
            vendor_id: cmd.vendor_id,
            order_id: cmd.order_id,
            vendor_reference: cmd.vendor_reference.clone(),
            bill_date: cmd.bill_date,
            due_date: cmd.due_date,
            tax: cmd.tax,
            totals,
            lines: lines.clone(),
            status: BillStatus::Draft,
            match_status: MatchStatus::Pending,
            match_id: None,
            posted_by: None,
            posted_at: None,
            version: 1,
        };
        let event = VendorBillEvent {
            bill_id: cmd.bill_id,
            occurred_at: actor.at,
            change: VendorBillChange::Created {
                tenant_id: actor.tenant_id,
                number: cmd.number.clone(),
                vendor_id: cmd.vendor_id,
                order_id: cmd.order_id,
                vendor_reference: cmd.vendor_reference.clone(),
                bill_date: cmd.bill_date,
                due_date: cmd.due_date,
                tax: cmd.tax,
                totals,
                lines,
            },
        };
        Ok((bill, vec![event]))
    }

    pub fn id_typed(&self) -> VendorBillId {
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

    pub fn order_id(&self) -> Option<PurchaseOrderId> {
        self.order_id
    }

    pub fn vendor_reference(&self) -> Option<&str> {
        self.vendor_reference.as_deref()
    }

    pub fn bill_date(&self) -> NaiveDate {
        self.bill_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn tax(&self) -> TaxRates {
        self.tax
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn lines(&self) -> &[BillLine] {
        &self.lines
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    pub fn match_status(&self) -> MatchStatus {
        self.match_status
    }

    pub fn match_id(&self) -> Option<ThreeWayMatchId> {
        self.match_id
    }

    pub fn posted_by(&self) -> Option<UserId> {
        self.posted_by
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }

    /// Quantities billed per purchase order line.
    pub fn order_quantities(&self) -> Vec<LineQuantity> {
        self.lines
            .iter()
            .filter_map(|l| l.po_line_no.map(|no| LineQuantity::new(no, l.quantity)))
            .collect()
    }

    pub fn billed_lines(&self) -> Vec<BilledLine> {
        self.lines
            .iter()
            .map(|l| BilledLine {
                line_no: l.line_no,
                po_line_no: l.po_line_no,
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect()
    }
}

impl AggregateRoot for VendorBill {
    type Id = VendorBillId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for VendorBill {
    type Command = VendorBillCommand;
    type Event = VendorBillEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            VendorBillChange::Created { .. } => {}
            VendorBillChange::LinesReplaced { lines, tax, totals } => {
                self.lines = lines.clone();
                self.tax = *tax;
                self.totals = *totals;
            }
            VendorBillChange::MatchRecorded { match_id, status } => {
                self.match_id = Some(*match_id);
                self.match_status = *status;
            }
            VendorBillChange::Posted { by } => {
                self.status = BillStatus::Posted;
                self.posted_by = Some(*by);
                self.posted_at = Some(event.occurred_at);
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
            VendorBillCommand::ReplaceLines { lines, tax } => {
                if self.status != BillStatus::Draft {
                    return Err(DomainError::transition(
                        BillStatus::DOCUMENT,
                        self.status,
                        BillStatus::Draft,
                    ));
                }
                tax.validate()?;
                let lines = build_lines(lines)?;
                let totals = DocumentTotals::from_lines(lines.iter().map(|l| l.total), tax);
                VendorBillChange::LinesReplaced {
                    lines,
                    tax: *tax,
                    totals,
                }
            }
            VendorBillCommand::RecordMatch { match_id, status } => {
                if self.status != BillStatus::Draft {
                    return Err(DomainError::validation(format!(
                        "vendor bill {} is already posted",
                        self.number
                    )));
                }
                VendorBillChange::MatchRecorded {
                    match_id: *match_id,
                    status: *status,
                }
            }
            VendorBillCommand::Post => {
                self.status.transition_to(BillStatus::Posted)?;
                if !self.match_status.clears_bill_for_posting() {
                    return Err(DomainError::validation(format!(
                        "vendor bill {} cannot be posted with match status {}",
                        self.number, self.match_status
                    )));
                }
                VendorBillChange::Posted { by: actor.user_id }
            }
        };

        Ok(vec![VendorBillEvent {
            bill_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}

fn build_lines(inputs: &[BillLineInput]) -> DomainResult<Vec<BillLine>> {
    if inputs.is_empty() {
        return Err(DomainError::validation("vendor bill requires at least one line"));
    }
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
            Ok(BillLine {
                line_no,
                po_line_no: input.po_line_no,
                product_id: input.product_id,
                description: input.description.clone(),
                quantity: input.quantity,
                unit_price: input.unit_price,
                total: Money::line(input.quantity, input.unit_price),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use procura_core::check_transition_table;
    use procura_events::execute;
    use rust_decimal_macros::dec;

    fn draft(actor: &Actor) -> VendorBill {
        let cmd = CreateVendorBill {
            bill_id: VendorBillId::generate(),
            number: "BILL-0001".to_string(),
            vendor_id: VendorId::generate(),
            order_id: Some(PurchaseOrderId::generate()),
            vendor_reference: Some("INV-77".to_string()),
            bill_date: actor.today(),
            due_date: actor.today(),
            tax: TaxRates::exclusive(dec!(10), dec!(2)),
            lines: vec![BillLineInput {
                po_line_no: Some(1),
                product_id: ProductId::generate(),
                description: None,
                quantity: dec!(100),
                unit_price: dec!(10),
            }],
        };
        VendorBill::create(actor, &cmd).unwrap().0
    }

    #[test]
    fn transition_table_is_well_formed() {
        check_transition_table(BillStatus::Draft, BillStatus::ALL).unwrap();
    }

    #[test]
    fn totals_include_tax_and_withholding() {
        let a = Actor::new(TenantId::new(), UserId::new(), Utc::now());
        let bill = draft(&a);
        assert_eq!(bill.totals().subtotal, Money::new(dec!(1000)));
        assert_eq!(bill.totals().tax, Money::new(dec!(100)));
        assert_eq!(bill.totals().withholding, Money::new(dec!(20)));
        assert_eq!(bill.totals().total, Money::new(dec!(1080)));
        assert_eq!(bill.order_quantities(), vec![LineQuantity::new(1, dec!(100))]);
    }

    #[test]
    fn posting_requires_a_clearing_match() {
        let a = Actor::new(TenantId::new(), UserId::new(), Utc::now());
        let mut bill = draft(&a);
        assert!(matches!(
            bill.handle(&a, &VendorBillCommand::Post),
            Err(DomainError::Validation(_))
        ));

        let match_id = ThreeWayMatchId::generate();
        execute(
            &mut bill,
            &a,
            &VendorBillCommand::RecordMatch {
                match_id,
                status: MatchStatus::PartialMatch,
            },
        )
        .unwrap();
        assert!(bill.handle(&a, &VendorBillCommand::Post).is_err());

        execute(
            &mut bill,
            &a,
            &VendorBillCommand::RecordMatch {
                match_id,
                status: MatchStatus::Approved,
            },
        )
        .unwrap();
        execute(&mut bill, &a, &VendorBillCommand::Post).unwrap();
        assert_eq!(bill.status(), BillStatus::Posted);

        let err = bill.handle(&a, &VendorBillCommand::Post).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn due_date_before_bill_date_is_rejected() {
        let a = Actor::new(TenantId::new(), UserId::new(), Utc::now());
        let cmd = CreateVendorBill {
            bill_id: VendorBillId::generate(),
            number: "BILL-0002".to_string(),
            vendor_id: VendorId::generate(),
            order_id: None,
            vendor_reference: None,
            bill_date: a.today(),
            due_date: a.today().pred_opt().unwrap(),
            tax: TaxRates::none(),
            lines: Vec::new(),
        };
        assert!(matches!(
            VendorBill::create(&a, &cmd),
            Err(DomainError::Validation(msg)) if msg.contains("due_date")
        ));
    }
}
