//! Callbacks from the approval subsystem.

use tracing::info;

use procura_core::{Actor, DomainError};
use procura_purchasing::{
    BlanketOrderId, DocumentKind, DocumentRef, PurchaseAgreementId, PurchaseOrderId,
    PurchaseRequestId,
};

use super::{ProcurementBus, ProcurementService};
use crate::error::ServiceResult;

impl<B: ProcurementBus> ProcurementService<B> {
    /// A routed document was approved: run its guarded approval transition
    /// with all of its side effects.
    pub fn on_workflow_approved(&self, actor: &Actor, document: DocumentRef) -> ServiceResult<()> {
        info!(%document, user_id = %actor.user_id, "workflow approved");
        match document.kind {
            DocumentKind::PurchaseRequest => {
                self.approve_purchase_request(actor, PurchaseRequestId::new(document.id))?;
            }
            DocumentKind::PurchaseOrder => {
                self.approve_purchase_order(actor, PurchaseOrderId::new(document.id))?;
            }
            DocumentKind::BlanketOrder => {
                self.activate_blanket_order(actor, BlanketOrderId::new(document.id))?;
            }
            DocumentKind::PurchaseAgreement => {
                self.activate_purchase_agreement(actor, PurchaseAgreementId::new(document.id))?;
            }
            other => return Err(not_routed(other).into()),
        }
        Ok(())
    }

    pub fn on_workflow_rejected(
        &self,
        actor: &Actor,
        document: DocumentRef,
        reason: &str,
    ) -> ServiceResult<()> {
        info!(%document, user_id = %actor.user_id, reason, "workflow rejected");
        match document.kind {
            DocumentKind::PurchaseRequest => {
                self.reject_purchase_request(actor, PurchaseRequestId::new(document.id), reason)?;
            }
            DocumentKind::PurchaseOrder => {
                self.reject_purchase_order(actor, PurchaseOrderId::new(document.id), reason)?;
            }
            DocumentKind::BlanketOrder => {
                self.reject_blanket_order(actor, BlanketOrderId::new(document.id), reason)?;
            }
            DocumentKind::PurchaseAgreement => {
                self.reject_purchase_agreement(
                    actor,
                    PurchaseAgreementId::new(document.id),
                    reason,
                )?;
            }
            other => return Err(not_routed(other).into()),
        }
        Ok(())
    }
}

fn not_routed(kind: DocumentKind) -> DomainError {
    DomainError::validation(format!("{kind} documents are not routed for approval"))
}
