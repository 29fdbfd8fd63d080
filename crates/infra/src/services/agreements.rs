use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use procura_core::{Actor, Money};
use procura_purchasing::{
    AgreementCommand, AgreementStatus, CreatePurchaseAgreement, DocumentKind, PurchaseAgreement,
    PurchaseAgreementId, VendorId,
};

use super::{ProcurementBus, ProcurementService, log_transition};
use crate::error::ServiceResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseAgreement {
    pub vendor_id: VendorId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub terms: Option<String>,
    pub committed_amount: Option<Money>,
}

impl<B: ProcurementBus> ProcurementService<B> {
    pub fn create_purchase_agreement(
        &self,
        actor: &Actor,
        input: NewPurchaseAgreement,
    ) -> ServiceResult<PurchaseAgreement> {
        self.run(actor, "create_purchase_agreement", |tx| {
            let cmd = CreatePurchaseAgreement {
                agreement_id: PurchaseAgreementId::generate(),
                number: self.next_number(tx, DocumentKind::PurchaseAgreement, actor.today())?,
                vendor_id: input.vendor_id,
                start_date: input.start_date,
                end_date: input.end_date,
                terms: input.terms.clone(),
                committed_amount: input.committed_amount,
            };
            let (agreement, events) = PurchaseAgreement::create(tx.actor(), &cmd)?;
            tx.insert(agreement, events)
        })
        .inspect(|a| log_transition(DocumentKind::PurchaseAgreement, a.number(), a.status(), "created"))
    }

    pub fn submit_purchase_agreement(
        &self,
        actor: &Actor,
        id: PurchaseAgreementId,
    ) -> ServiceResult<PurchaseAgreement> {
        self.run(actor, "submit_purchase_agreement", |tx| {
            let agreement = tx.execute::<PurchaseAgreement>(id, &AgreementCommand::Submit)?;
            let amount = agreement.committed_amount().unwrap_or(Money::ZERO);
            if self.route_for_approval(tx, id.into(), agreement.number(), amount) {
                Ok(agreement)
            } else {
                tx.execute::<PurchaseAgreement>(id, &AgreementCommand::Activate)
            }
        })
        .inspect(|a| log_transition(DocumentKind::PurchaseAgreement, a.number(), a.status(), "submitted"))
    }

    pub fn activate_purchase_agreement(
        &self,
        actor: &Actor,
        id: PurchaseAgreementId,
    ) -> ServiceResult<PurchaseAgreement> {
        self.agreement_command(actor, id, "activate_purchase_agreement", AgreementCommand::Activate)
    }

    pub fn reject_purchase_agreement(
        &self,
        actor: &Actor,
        id: PurchaseAgreementId,
        reason: &str,
    ) -> ServiceResult<PurchaseAgreement> {
        self.agreement_command(
            actor,
            id,
            "reject_purchase_agreement",
            AgreementCommand::Reject {
                reason: reason.to_string(),
            },
        )
    }

    pub fn close_purchase_agreement(
        &self,
        actor: &Actor,
        id: PurchaseAgreementId,
    ) -> ServiceResult<PurchaseAgreement> {
        self.agreement_command(actor, id, "close_purchase_agreement", AgreementCommand::Close)
    }

    pub fn cancel_purchase_agreement(
        &self,
        actor: &Actor,
        id: PurchaseAgreementId,
        reason: &str,
    ) -> ServiceResult<PurchaseAgreement> {
        self.agreement_command(
            actor,
            id,
            "cancel_purchase_agreement",
            AgreementCommand::Cancel {
                reason: reason.to_string(),
            },
        )
    }

    /// Expire active agreements whose end date lies before `as_of`.
    pub fn expire_lapsed_agreements(
        &self,
        actor: &Actor,
        as_of: NaiveDate,
    ) -> ServiceResult<Vec<PurchaseAgreementId>> {
        let actor = actor.at(as_of.and_time(NaiveTime::MIN).and_utc());
        self.run(&actor, "expire_lapsed_agreements", |tx| {
            let lapsed: Vec<PurchaseAgreementId> = tx
                .select::<PurchaseAgreement>(|a| {
                    a.status() == AgreementStatus::Active && a.end_date() < as_of
                })
                .iter()
                .map(|a| a.id_typed())
                .collect();
            for id in &lapsed {
                let agreement = tx.execute::<PurchaseAgreement>(*id, &AgreementCommand::Expire)?;
                log_transition(
                    DocumentKind::PurchaseAgreement,
                    agreement.number(),
                    agreement.status(),
                    "expired",
                );
            }
            Ok(lapsed)
        })
    }

    fn agreement_command(
        &self,
        actor: &Actor,
        id: PurchaseAgreementId,
        operation: &'static str,
        command: AgreementCommand,
    ) -> ServiceResult<PurchaseAgreement> {
        self.run(actor, operation, |tx| tx.execute::<PurchaseAgreement>(id, &command))
            .inspect(|a| log_transition(DocumentKind::PurchaseAgreement, a.number(), a.status(), operation))
    }
}
