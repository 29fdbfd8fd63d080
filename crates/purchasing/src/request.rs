use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DomainError, DomainResult, Lifecycle, Money, TenantId,
    UserId, lifecycle,
};
use procura_events::Event;

use crate::reference::{ProductId, PurchaseOrderId, PurchaseRequestId, RfqId};

lifecycle! {
    pub enum PurchaseRequestStatus for "purchase request" {
        Draft = "draft",
        PendingApproval = "pending_approval",
        Approved = "approved",
        Rejected = "rejected",
        Converted = "converted",
        Cancelled = "cancelled",
    }
    transitions {
        Draft => [PendingApproval, Cancelled],
        PendingApproval => [Approved, Rejected, Cancelled],
        Approved => [Converted, Cancelled],
        Rejected => [],
        Converted => [],
        Cancelled => [],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub estimated_unit_price: Decimal,
    pub required_date: Option<NaiveDate>,
}

impl RequestLine {
    pub fn estimated_amount(&self) -> Money {
        Money::line(self.quantity, self.estimated_unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLineInput {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub estimated_unit_price: Decimal,
    pub required_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseRequest {
    pub request_id: PurchaseRequestId,
    pub number: String,
    pub justification: Option<String>,
    pub lines: Vec<RequestLineInput>,
}

/// The document a request was turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversionTarget {
    PurchaseOrder(PurchaseOrderId),
    Rfq(RfqId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseRequestCommand {
    Submit,
    Approve,
    Reject { reason: String },
    Cancel { reason: String },
    MarkConverted { target: ConversionTarget },
    /// An RFQ was raised; the request stays approved until an order exists.
    LinkRfq { rfq_id: RfqId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseRequestChange {
    Created {
        tenant_id: TenantId,
        number: String,
        requested_by: UserId,
        justification: Option<String>,
        lines: Vec<RequestLine>,
    },
    Submitted,
    Approved { by: UserId },
    Rejected { by: UserId, reason: String },
    Cancelled { by: UserId, reason: String },
    Converted { target: ConversionTarget },
    RfqLinked { rfq_id: RfqId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequestEvent {
    pub request_id: PurchaseRequestId,
    pub occurred_at: DateTime<Utc>,
    pub change: PurchaseRequestChange,
}

impl Event for PurchaseRequestEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            PurchaseRequestChange::Created { .. } => "procurement.purchase_request.created",
            PurchaseRequestChange::Submitted => "procurement.purchase_request.submitted",
            PurchaseRequestChange::Approved { .. } => "procurement.purchase_request.approved",
            PurchaseRequestChange::Rejected { .. } => "procurement.purchase_request.rejected",
            PurchaseRequestChange::Cancelled { .. } => "procurement.purchase_request.cancelled",
            PurchaseRequestChange::Converted { .. } => "procurement.purchase_request.converted",
            PurchaseRequestChange::RfqLinked { .. } => "procurement.purchase_request.rfq_linked",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.purchase_request"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: PurchaseRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    id: PurchaseRequestId,
    tenant_id: TenantId,
    number: String,
    requested_by: UserId,
    justification: Option<String>,
    status: PurchaseRequestStatus,
    lines: Vec<RequestLine>,
    rfqs: Vec<RfqId>,
    converted_to: Option<ConversionTarget>,
    approved_by: Option<UserId>,
    rejection_reason: Option<String>,
    version: u64,
}

impl PurchaseRequest {
    pub fn create(
        actor: &Actor,
        cmd: &CreatePurchaseRequest,
    ) -> DomainResult<(Self, Vec<PurchaseRequestEvent>)> {
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "purchase request requires at least one line",
            ));
        }
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if input.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            if input.estimated_unit_price < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {line_no}: estimated_unit_price cannot be negative"
                )));
            }
            lines.push(RequestLine {
                line_no,
                product_id: input.product_id,
                quantity: input.quantity,
                estimated_unit_price: input.estimated_unit_price,
                required_date: input.required_date,
            });
        }

        let event = PurchaseRequestEvent {
            request_id: cmd.request_id,
            occurred_at: actor.at,
            change: PurchaseRequestChange::Created {
                tenant_id: actor.tenant_id,
                number: cmd.number.clone(),
                requested_by: actor.user_id,
                justification: cmd.justification.clone(),
                lines,
            },
        };
        let mut request = Self {
            id: cmd.request_id,
            tenant_id: actor.tenant_id,
            number: String::new(),
            requested_by: actor.user_id,
            justification: None,
            status: PurchaseRequestStatus::Draft,
            lines: Vec::new(),
            rfqs: Vec::new(),
            converted_to: None,
            approved_by: None,
            rejection_reason: None,
            version: 0,
        };
        request.apply(&event);
        Ok((request, vec![event]))
    }

    pub fn id_typed(&self) -> PurchaseRequestId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn status(&self) -> PurchaseRequestStatus {
        self.status
    }

    pub fn lines(&self) -> &[RequestLine] {
        &self.lines
    }

    pub fn rfqs(&self) -> &[RfqId] {
        &self.rfqs
    }

    pub fn converted_to(&self) -> Option<ConversionTarget> {
        self.converted_to
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn estimated_total(&self) -> Money {
        self.lines.iter().map(RequestLine::estimated_amount).sum()
    }

    /// Guard used before sourcing an order or RFQ from this request.
    pub fn ensure_sourceable(&self) -> DomainResult<()> {
        if self.status != PurchaseRequestStatus::Approved {
            return Err(DomainError::validation(format!(
                "purchase request {} must be approved (status: {})",
                self.number, self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for PurchaseRequest {
    type Id = PurchaseRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for PurchaseRequest {
    type Command = PurchaseRequestCommand;
    type Event = PurchaseRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            PurchaseRequestChange::Created {
                tenant_id,
                number,
                requested_by,
                justification,
                lines,
            } => {
                self.id = event.request_id;
                self.tenant_id = *tenant_id;
                self.number = number.clone();
                self.requested_by = *requested_by;
                self.justification = justification.clone();
                self.lines = lines.clone();
                self.status = PurchaseRequestStatus::Draft;
            }
            PurchaseRequestChange::Submitted => {
                self.status = PurchaseRequestStatus::PendingApproval;
            }
            PurchaseRequestChange::Approved { by } => {
                self.status = PurchaseRequestStatus::Approved;
                self.approved_by = Some(*by);
            }
            PurchaseRequestChange::Rejected { reason, .. } => {
                self.status = PurchaseRequestStatus::Rejected;
                self.rejection_reason = Some(reason.clone());
            }
            PurchaseRequestChange::Cancelled { .. } => {
                self.status = PurchaseRequestStatus::Cancelled;
            }
            PurchaseRequestChange::Converted { target } => {
                self.status = PurchaseRequestStatus::Converted;
                self.converted_to = Some(*target);
                if let ConversionTarget::Rfq(rfq_id) = target {
                    if !self.rfqs.contains(rfq_id) {
                        self.rfqs.push(*rfq_id);
                    }
                }
            }
            PurchaseRequestChange::RfqLinked { rfq_id } => {
                if !self.rfqs.contains(rfq_id) {
                    self.rfqs.push(*rfq_id);
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
            PurchaseRequestCommand::Submit => {
                self.status.transition_to(PurchaseRequestStatus::PendingApproval)?;
                PurchaseRequestChange::Submitted
            }
            PurchaseRequestCommand::Approve => {
                self.status.transition_to(PurchaseRequestStatus::Approved)?;
                PurchaseRequestChange::Approved { by: actor.user_id }
            }
            PurchaseRequestCommand::Reject { reason } => {
                self.status.transition_to(PurchaseRequestStatus::Rejected)?;
                PurchaseRequestChange::Rejected {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
            PurchaseRequestCommand::Cancel { reason } => {
                self.status.transition_to(PurchaseRequestStatus::Cancelled)?;
                PurchaseRequestChange::Cancelled {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
            PurchaseRequestCommand::MarkConverted { target } => {
                self.status.transition_to(PurchaseRequestStatus::Converted)?;
                PurchaseRequestChange::Converted { target: *target }
            }
            PurchaseRequestCommand::LinkRfq { rfq_id } => {
                self.ensure_sourceable()?;
                PurchaseRequestChange::RfqLinked { rfq_id: *rfq_id }
            }
        };

        Ok(vec![PurchaseRequestEvent {
            request_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}
