use chrono::NaiveDate;
use rust_decimal::Decimal;

use procura_core::{Actor, DomainError};
use procura_purchasing::{
    CreateRfq, DocumentKind, PurchaseRequest, PurchaseRequestCommand, PurchaseRequestId, QuotedPrice, Rfq,
    RfqCommand, RfqId, RfqLine, VendorId,
};

use super::requests::sourceable_request;
use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;

impl<B: ProcurementBus> ProcurementService<B> {
    /// Draft an RFQ, optionally sourced from an approved purchase request.
    ///
    /// With a request and no explicit lines, the request's lines are quoted.
    pub fn create_rfq(
        &self,
        actor: &Actor,
        purchase_request_id: Option<PurchaseRequestId>,
        vendors: Vec<VendorId>,
        lines: Vec<RfqLine>,
        deadline: Option<NaiveDate>,
    ) -> ServiceResult<Rfq> {
        self.run(actor, "create_rfq", |tx| {
            let rfq_id = RfqId::generate();
            let mut rfq_lines = lines.clone();

            if let Some(request_id) = purchase_request_id {
                let request = sourceable_request(tx, request_id)?;
                if rfq_lines.is_empty() {
                    rfq_lines = request
                        .lines()
                        .iter()
                        .map(|l| RfqLine {
                            line_no: l.line_no,
                            product_id: l.product_id,
                            quantity: l.quantity,
                            description: None,
                        })
                        .collect();
                }
                tx.execute::<PurchaseRequest>(
                    request_id,
                    &PurchaseRequestCommand::LinkRfq { rfq_id },
                )?;
            }

            let cmd = CreateRfq {
                rfq_id,
                number: self.next_number(tx, DocumentKind::RequestForQuotation, actor.today())?,
                purchase_request_id,
                vendors: vendors.clone(),
                lines: rfq_lines,
                deadline,
            };
            let (rfq, events) = Rfq::create(tx.actor(), &cmd)?;
            tx.insert(rfq, events)
        })
        .inspect(|r| log_transition(DocumentKind::RequestForQuotation, r.number(), r.status(), "created"))
    }

    pub fn send_rfq(&self, actor: &Actor, id: RfqId) -> ServiceResult<Rfq> {
        self.rfq_command(actor, id, "send_rfq", RfqCommand::Send)
    }

    pub fn record_quote(
        &self,
        actor: &Actor,
        id: RfqId,
        vendor_id: VendorId,
        prices: Vec<QuotedPrice>,
        valid_until: Option<NaiveDate>,
    ) -> ServiceResult<Rfq> {
        self.rfq_command(
            actor,
            id,
            "record_quote",
            RfqCommand::RecordQuote {
                vendor_id,
                prices,
                valid_until,
            },
        )
    }

    pub fn award_rfq(&self, actor: &Actor, id: RfqId, vendor_id: VendorId) -> ServiceResult<Rfq> {
        self.rfq_command(actor, id, "award_rfq", RfqCommand::Award { vendor_id })
    }

    pub fn close_rfq(&self, actor: &Actor, id: RfqId) -> ServiceResult<Rfq> {
        self.rfq_command(actor, id, "close_rfq", RfqCommand::Close)
    }

    pub fn cancel_rfq(&self, actor: &Actor, id: RfqId, reason: &str) -> ServiceResult<Rfq> {
        self.rfq_command(
            actor,
            id,
            "cancel_rfq",
            RfqCommand::Cancel {
                reason: reason.to_string(),
            },
        )
    }

    fn rfq_command(
        &self,
        actor: &Actor,
        id: RfqId,
        operation: &'static str,
        command: RfqCommand,
    ) -> ServiceResult<Rfq> {
        self.run(actor, operation, |tx| tx.execute::<Rfq>(id, &command))
            .inspect(|r| log_transition(DocumentKind::RequestForQuotation, r.number(), r.status(), operation))
    }
}

/// Priced order lines from the winning quote of an awarded RFQ.
pub(super) fn awarded_lines(rfq: &Rfq) -> ServiceResult<(VendorId, Vec<(RfqLine, Decimal)>)> {
    let quote = rfq.winning_quote().ok_or_else(|| {
        DomainError::validation(format!("rfq {} has not been awarded", rfq.number()))
    })?;
    let mut lines = Vec::with_capacity(rfq.lines().len());
    for line in rfq.lines() {
        let price = quote.price_for(line.line_no).ok_or_else(|| {
            DomainError::validation(format!(
                "winning quote of rfq {} has no price for line {}",
                rfq.number(),
                line.line_no
            ))
        })?;
        lines.push((line.clone(), price));
    }
    Ok((quote.vendor_id, lines))
}
