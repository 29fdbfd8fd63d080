//! Request for quotation: invited vendors quote per-line prices; one quote wins.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DomainError, DomainResult, Lifecycle, TenantId, UserId,
    lifecycle,
};
use procura_events::Event;

use crate::reference::{ProductId, PurchaseOrderId, PurchaseRequestId, RfqId, VendorId};

lifecycle! {
    pub enum RfqStatus for "request for quotation" {
        Draft = "draft",
        Sent = "sent",
        Awarded = "awarded",
        Closed = "closed",
        Cancelled = "cancelled",
    }
    transitions {
        Draft => [Sent, Cancelled],
        Sent => [Awarded, Closed, Cancelled],
        Awarded => [],
        Closed => [],
        Cancelled => [],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedPrice {
    pub line_no: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorQuote {
    pub vendor_id: VendorId,
    pub prices: Vec<QuotedPrice>,
    pub valid_until: Option<NaiveDate>,
    pub received_at: DateTime<Utc>,
}

impl VendorQuote {
    pub fn price_for(&self, line_no: u32) -> Option<Decimal> {
        self.prices
            .iter()
            .find(|p| p.line_no == line_no)
            .map(|p| p.unit_price)
    }

    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_until.is_none_or(|until| date <= until)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRfq {
    pub rfq_id: RfqId,
    pub number: String,
    pub purchase_request_id: Option<PurchaseRequestId>,
    pub vendors: Vec<VendorId>,
    pub lines: Vec<RfqLine>,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RfqCommand {
    Send,
    RecordQuote {
        vendor_id: VendorId,
        prices: Vec<QuotedPrice>,
        valid_until: Option<NaiveDate>,
    },
    Award { vendor_id: VendorId },
    Close,
    Cancel { reason: String },
    LinkOrder { order_id: PurchaseOrderId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RfqChange {
    Created {
        tenant_id: TenantId,
        number: String,
        purchase_request_id: Option<PurchaseRequestId>,
        vendors: Vec<VendorId>,
        lines: Vec<RfqLine>,
        deadline: Option<NaiveDate>,
    },
    Sent,
    QuoteRecorded { quote: VendorQuote },
    Awarded { vendor_id: VendorId, by: UserId },
    Closed,
    Cancelled { reason: String },
    OrderLinked { order_id: PurchaseOrderId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqEvent {
    pub rfq_id: RfqId,
    pub occurred_at: DateTime<Utc>,
    pub change: RfqChange,
}

impl Event for RfqEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            RfqChange::Created { .. } => "procurement.rfq.created",
            RfqChange::Sent => "procurement.rfq.sent",
            RfqChange::QuoteRecorded { .. } => "procurement.rfq.quote_recorded",
            RfqChange::Awarded { .. } => "procurement.rfq.awarded",
            RfqChange::Closed => "procurement.rfq.closed",
            RfqChange::Cancelled { .. } => "procurement.rfq.cancelled",
            RfqChange::OrderLinked { .. } => "procurement.rfq.order_linked",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.rfq"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfq {
    id: RfqId,
    tenant_id: TenantId,
    number: String,
    purchase_request_id: Option<PurchaseRequestId>,
    vendors: Vec<VendorId>,
    lines: Vec<RfqLine>,
    deadline: Option<NaiveDate>,
    status: RfqStatus,
    quotes: Vec<VendorQuote>,
    awarded_vendor: Option<VendorId>,
    orders: Vec<PurchaseOrderId>,
    version: u64,
}

impl Rfq {
    pub fn create(actor: &Actor, cmd: &CreateRfq) -> DomainResult<(Self, Vec<RfqEvent>)> {
        if cmd.vendors.is_empty() {
            return Err(DomainError::validation("rfq requires at least one invited vendor"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("rfq requires at least one line"));
        }
        if let Some(line) = cmd.lines.iter().find(|l| l.quantity <= Decimal::ZERO) {
            return Err(DomainError::validation(format!(
                "line {}: quantity must be positive",
                line.line_no
            )));
        }

        let event = RfqEvent {
            rfq_id: cmd.rfq_id,
            occurred_at: actor.at,
            change: RfqChange::Created {
                tenant_id: actor.tenant_id,
                number: cmd.number.clone(),
                purchase_request_id: cmd.purchase_request_id,
                vendors: cmd.vendors.clone(),
                lines: cmd.lines.clone(),
                deadline: cmd.deadline,
            },
        };
        let mut rfq = Self {
            id: cmd.rfq_id,
            tenant_id: actor.tenant_id,
            number: String::new(),
            purchase_request_id: None,
            vendors: Vec::new(),
            lines: Vec::new(),
            deadline: None,
            status: RfqStatus::Draft,
            quotes: Vec::new(),
            awarded_vendor: None,
            orders: Vec::new(),
            version: 0,
        };
        rfq.apply(&event);
        Ok((rfq, vec![event]))
    }

    pub fn id_typed(&self) -> RfqId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn purchase_request_id(&self) -> Option<PurchaseRequestId> {
        self.purchase_request_id
    }

    pub fn vendors(&self) -> &[VendorId] {
        &self.vendors
    }

    pub fn lines(&self) -> &[RfqLine] {
        &self.lines
    }

    pub fn deadline(&self) -> Option<NaiveDate> {
        self.deadline
    }

    pub fn status(&self) -> RfqStatus {
        self.status
    }

    pub fn quotes(&self) -> &[VendorQuote] {
        &self.quotes
    }

    pub fn quote_from(&self, vendor_id: VendorId) -> Option<&VendorQuote> {
        self.quotes.iter().find(|q| q.vendor_id == vendor_id)
    }

    pub fn awarded_vendor(&self) -> Option<VendorId> {
        self.awarded_vendor
    }

    /// The winning quote, once awarded.
    pub fn winning_quote(&self) -> Option<&VendorQuote> {
        self.awarded_vendor.and_then(|v| self.quote_from(v))
    }

    pub fn orders(&self) -> &[PurchaseOrderId] {
        &self.orders
    }
}

impl AggregateRoot for Rfq {
    type Id = RfqId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Rfq {
    type Command = RfqCommand;
    type Event = RfqEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            RfqChange::Created {
                tenant_id,
                number,
                purchase_request_id,
                vendors,
                lines,
                deadline,
            } => {
                self.id = event.rfq_id;
                self.tenant_id = *tenant_id;
                self.number = number.clone();
                self.purchase_request_id = *purchase_request_id;
                self.vendors = vendors.clone();
                self.lines = lines.clone();
                self.deadline = *deadline;
                self.status = RfqStatus::Draft;
            }
            RfqChange::Sent => self.status = RfqStatus::Sent,
            RfqChange::QuoteRecorded { quote } => {
                // A vendor's newer quote replaces the older one.
                self.quotes.retain(|q| q.vendor_id != quote.vendor_id);
                self.quotes.push(quote.clone());
            }
            RfqChange::Awarded { vendor_id, .. } => {
                self.status = RfqStatus::Awarded;
                self.awarded_vendor = Some(*vendor_id);
            }
            RfqChange::Closed => self.status = RfqStatus::Closed,
            RfqChange::Cancelled { .. } => self.status = RfqStatus::Cancelled,
            RfqChange::OrderLinked { order_id } => self.orders.push(*order_id),
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
            RfqCommand::Send => {
                self.status.transition_to(RfqStatus::Sent)?;
                RfqChange::Sent
            }
            RfqCommand::RecordQuote {
                vendor_id,
                prices,
                valid_until,
            } => {
                if self.status != RfqStatus::Sent {
                    return Err(DomainError::validation(format!(
                        "quotes can only be recorded while the rfq is sent (status: {})",
                        self.status
                    )));
                }
                if !self.vendors.contains(vendor_id) {
                    return Err(DomainError::referential(format!(
                        "vendor {vendor_id} was not invited to rfq {}",
                        self.number
                    )));
                }
                for line in &self.lines {
                    let price = prices.iter().find(|p| p.line_no == line.line_no);
                    match price {
                        None => {
                            return Err(DomainError::validation(format!(
                                "quote is missing a price for line {}",
                                line.line_no
                            )));
                        }
                        Some(p) if p.unit_price < Decimal::ZERO => {
                            return Err(DomainError::validation(format!(
                                "line {}: quoted price cannot be negative",
                                line.line_no
                            )));
                        }
                        Some(_) => {}
                    }
                }
                if let Some(extra) = prices
                    .iter()
                    .find(|p| !self.lines.iter().any(|l| l.line_no == p.line_no))
                {
                    return Err(DomainError::referential(format!(
                        "line {} does not exist on rfq {}",
                        extra.line_no, self.number
                    )));
                }
                RfqChange::QuoteRecorded {
                    quote: VendorQuote {
                        vendor_id: *vendor_id,
                        prices: prices.clone(),
                        valid_until: *valid_until,
                        received_at: actor.at,
                    },
                }
            }
            RfqCommand::Award { vendor_id } => {
                self.status.transition_to(RfqStatus::Awarded)?;
                let quote = self.quote_from(*vendor_id).ok_or_else(|| {
                    DomainError::validation(format!(
                        "vendor {vendor_id} has not quoted on rfq {}",
                        self.number
                    ))
                })?;
                if !quote.is_valid_on(actor.today()) {
                    return Err(DomainError::validation(format!(
                        "quote from vendor {vendor_id} has expired"
                    )));
                }
                RfqChange::Awarded {
                    vendor_id: *vendor_id,
                    by: actor.user_id,
                }
            }
            RfqCommand::Close => {
                self.status.transition_to(RfqStatus::Closed)?;
                RfqChange::Closed
            }
            RfqCommand::Cancel { reason } => {
                self.status.transition_to(RfqStatus::Cancelled)?;
                RfqChange::Cancelled {
                    reason: reason.clone(),
                }
            }
            RfqCommand::LinkOrder { order_id } => {
                if self.status != RfqStatus::Awarded {
                    return Err(DomainError::validation(format!(
                        "rfq {} must be awarded before ordering (status: {})",
                        self.number, self.status
                    )));
                }
                RfqChange::OrderLinked {
                    order_id: *order_id,
                }
            }
        };

        Ok(vec![RfqEvent {
            rfq_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}
