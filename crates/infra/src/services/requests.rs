use procura_core::Actor;
use procura_purchasing::{
    CreatePurchaseRequest, DocumentKind, PurchaseRequest, PurchaseRequestCommand,
    PurchaseRequestId, RequestLineInput,
};

use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;
use crate::store::Transaction;

impl<B: ProcurementBus> ProcurementService<B> {
    pub fn create_purchase_request(
        &self,
        actor: &Actor,
        justification: Option<String>,
        lines: Vec<RequestLineInput>,
    ) -> ServiceResult<PurchaseRequest> {
        self.run(actor, "create_purchase_request", |tx| {
            let cmd = CreatePurchaseRequest {
                request_id: PurchaseRequestId::generate(),
                number: self.next_number(tx, DocumentKind::PurchaseRequest, actor.today())?,
                justification: justification.clone(),
                lines: lines.clone(),
            };
            let (request, events) = PurchaseRequest::create(tx.actor(), &cmd)?;
            tx.insert(request, events)
        })
        .inspect(|r| log_transition(DocumentKind::PurchaseRequest, r.number(), r.status(), "created"))
    }

    /// Submit for approval; requests the approval policy does not gate are
    /// approved in the same unit of work.
    pub fn submit_purchase_request(
        &self,
        actor: &Actor,
        id: PurchaseRequestId,
    ) -> ServiceResult<PurchaseRequest> {
        self.run(actor, "submit_purchase_request", |tx| {
            let request = tx.execute::<PurchaseRequest>(id, &PurchaseRequestCommand::Submit)?;
            let gated = self.route_for_approval(
                tx,
                id.into(),
                request.number(),
                request.estimated_total(),
            );
            if gated {
                Ok(request)
            } else {
                tx.execute::<PurchaseRequest>(id, &PurchaseRequestCommand::Approve)
            }
        })
        .inspect(|r| log_transition(DocumentKind::PurchaseRequest, r.number(), r.status(), "submitted"))
    }

    pub fn approve_purchase_request(
        &self,
        actor: &Actor,
        id: PurchaseRequestId,
    ) -> ServiceResult<PurchaseRequest> {
        self.request_command(actor, id, "approve_purchase_request", PurchaseRequestCommand::Approve)
    }

    pub fn reject_purchase_request(
        &self,
        actor: &Actor,
        id: PurchaseRequestId,
        reason: &str,
    ) -> ServiceResult<PurchaseRequest> {
        self.request_command(
            actor,
            id,
            "reject_purchase_request",
            PurchaseRequestCommand::Reject {
                reason: reason.to_string(),
            },
        )
    }

    pub fn cancel_purchase_request(
        &self,
        actor: &Actor,
        id: PurchaseRequestId,
        reason: &str,
    ) -> ServiceResult<PurchaseRequest> {
        self.request_command(
            actor,
            id,
            "cancel_purchase_request",
            PurchaseRequestCommand::Cancel {
                reason: reason.to_string(),
            },
        )
    }

    fn request_command(
        &self,
        actor: &Actor,
        id: PurchaseRequestId,
        operation: &'static str,
        command: PurchaseRequestCommand,
    ) -> ServiceResult<PurchaseRequest> {
        self.run(actor, operation, |tx| tx.execute::<PurchaseRequest>(id, &command))
            .inspect(|r| log_transition(DocumentKind::PurchaseRequest, r.number(), r.status(), operation))
    }
}

/// Load a request that an order or RFQ is about to be sourced from.
pub(super) fn sourceable_request(
    tx: &mut Transaction,
    id: PurchaseRequestId,
) -> ServiceResult<PurchaseRequest> {
    let request: PurchaseRequest = tx.load(id)?;
    request.ensure_sourceable()?;
    Ok(request)
}
