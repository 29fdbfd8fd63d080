use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{
    Actor, Aggregate, AggregateRoot, DomainError, DomainResult, Lifecycle, Money, TenantId,
    UserId, lifecycle,
};
use procura_events::Event;

use crate::reference::{PurchaseAgreementId, VendorId};

lifecycle! {
    pub enum AgreementStatus for "purchase agreement" {
        Draft = "draft",
        PendingApproval = "pending_approval",
        Active = "active",
        Rejected = "rejected",
        Expired = "expired",
        Closed = "closed",
        Cancelled = "cancelled",
    }
    transitions {
        Draft => [PendingApproval, Cancelled],
        PendingApproval => [Active, Rejected, Cancelled],
        Active => [Expired, Closed, Cancelled],
        Rejected => [],
        Expired => [],
        Closed => [],
        Cancelled => [],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseAgreement {
    pub agreement_id: PurchaseAgreementId,
    pub number: String,
    pub vendor_id: VendorId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub terms: Option<String>,
    pub committed_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgreementCommand {
    Submit,
    Activate,
    Reject { reason: String },
    /// Lapse an active agreement whose end date has passed.
    Expire,
    Close,
    Cancel { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgreementChange {
    Created {
        tenant_id: TenantId,
        number: String,
        vendor_id: VendorId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        terms: Option<String>,
        committed_amount: Option<Money>,
    },
    Submitted,
    Activated { by: UserId },
    Rejected { by: UserId, reason: String },
    Expired,
    Closed { by: UserId },
    Cancelled { by: UserId, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementEvent {
    pub agreement_id: PurchaseAgreementId,
    pub occurred_at: DateTime<Utc>,
    pub change: AgreementChange,
}

impl Event for AgreementEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            AgreementChange::Created { .. } => "procurement.purchase_agreement.created",
            AgreementChange::Submitted => "procurement.purchase_agreement.submitted",
            AgreementChange::Activated { .. } => "procurement.purchase_agreement.activated",
            AgreementChange::Rejected { .. } => "procurement.purchase_agreement.rejected",
            AgreementChange::Expired => "procurement.purchase_agreement.expired",
            AgreementChange::Closed { .. } => "procurement.purchase_agreement.closed",
            AgreementChange::Cancelled { .. } => "procurement.purchase_agreement.cancelled",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "procurement.purchase_agreement"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Aggregate root: PurchaseAgreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseAgreement {
    id: PurchaseAgreementId,
    tenant_id: TenantId,
    number: String,
    vendor_id: VendorId,
    start_date: NaiveDate,
    end_date: NaiveDate,
    terms: Option<String>,
    committed_amount: Option<Money>,
    status: AgreementStatus,
    approved_by: Option<UserId>,
    version: u64,
}

impl PurchaseAgreement {
    pub fn create(
        actor: &Actor,
        cmd: &CreatePurchaseAgreement,
    ) -> DomainResult<(Self, Vec<AgreementEvent>)> {
        if cmd.end_date < cmd.start_date {
            return Err(DomainError::validation(
                "agreement end_date cannot be before start_date",
            ));
        }
        if cmd.committed_amount.is_some_and(|m| m.is_negative()) {
            return Err(DomainError::validation(
                "committed_amount cannot be negative",
            ));
        }

        let agreement = Self {
            id: cmd.agreement_id,
            tenant_id: actor.tenant_id,
            number: cmd.number.clone(),
            vendor_id: cmd.vendor_id,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            terms: cmd.terms.clone(),
            committed_amount: cmd.committed_amount,
            status: AgreementStatus::Draft,
            approved_by: None,
            version: 1,
        };
        let event = AgreementEvent {
            agreement_id: cmd.agreement_id,
            occurred_at: actor.at,
            change: AgreementChange::Created {
                tenant_id: actor.tenant_id,
                number: cmd.number.clone(),
                vendor_id: cmd.vendor_id,
                start_date: cmd.start_date,
                end_date: cmd.end_date,
                terms: cmd.terms.clone(),
                committed_amount: cmd.committed_amount,
            },
        };
        Ok((agreement, vec![event]))
    }

    pub fn id_typed(&self) -> PurchaseAgreementId {
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

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn terms(&self) -> Option<&str> {
        self.terms.as_deref()
    }

    pub fn committed_amount(&self) -> Option<Money> {
        self.committed_amount
    }

    pub fn status(&self) -> AgreementStatus {
        self.status
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    /// Whether a blanket order for `vendor_id` may draw on this agreement.
    pub fn ensure_covers(&self, vendor_id: VendorId) -> DomainResult<()> {
        if self.status != AgreementStatus::Active {
            return Err(DomainError::validation(format!(
                "purchase agreement {} is not active (status: {})",
                self.number, self.status
            )));
        }
        if self.vendor_id != vendor_id {
            return Err(DomainError::referential(format!(
                "purchase agreement {} belongs to another vendor",
                self.number
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for PurchaseAgreement {
    type Id = PurchaseAgreementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for PurchaseAgreement {
    type Command = AgreementCommand;
    type Event = AgreementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match &event.change {
            AgreementChange::Created { .. } => {}
            AgreementChange::Submitted => self.status = AgreementStatus::PendingApproval,
            AgreementChange::Activated { by } => {
                self.status = AgreementStatus::Active;
                self.approved_by = Some(*by);
            }
            AgreementChange::Rejected { .. } => self.status = AgreementStatus::Rejected,
            AgreementChange::Expired => self.status = AgreementStatus::Expired,
            AgreementChange::Closed { .. } => self.status = AgreementStatus::Closed,
            AgreementChange::Cancelled { .. } => self.status = AgreementStatus::Cancelled,
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
            AgreementCommand::Submit => {
                self.status.transition_to(AgreementStatus::PendingApproval)?;
                AgreementChange::Submitted
            }
            AgreementCommand::Activate => {
                self.status.transition_to(AgreementStatus::Active)?;
                AgreementChange::Activated { by: actor.user_id }
            }
            AgreementCommand::Reject { reason } => {
                self.status.transition_to(AgreementStatus::Rejected)?;
                AgreementChange::Rejected {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
            AgreementCommand::Expire => {
                self.status.transition_to(AgreementStatus::Expired)?;
                if self.end_date >= actor.today() {
                    return Err(DomainError::validation(format!(
                        "purchase agreement {} runs until {}",
                        self.number, self.end_date
                    )));
                }
                AgreementChange::Expired
            }
            AgreementCommand::Close => {
                self.status.transition_to(AgreementStatus::Closed)?;
                AgreementChange::Closed { by: actor.user_id }
            }
            AgreementCommand::Cancel { reason } => {
                self.status.transition_to(AgreementStatus::Cancelled)?;
                AgreementChange::Cancelled {
                    by: actor.user_id,
                    reason: reason.clone(),
                }
            }
        };

        Ok(vec![AgreementEvent {
            agreement_id: self.id,
            occurred_at: actor.at,
            change,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use procura_core::check_transition_table;
    use procura_events::execute;

    fn active(actor: &Actor, vendor_id: VendorId, end_date: NaiveDate) -> PurchaseAgreement {
        let cmd = CreatePurchaseAgreement {
            agreement_id: PurchaseAgreementId::generate(),
            number: "PA-0001".to_string(),
            vendor_id,
            start_date: end_date - Duration::days(365),
            end_date,
            terms: Some("net 30".to_string()),
            committed_amount: None,
        };
        let (mut pa, _) = PurchaseAgreement::create(actor, &cmd).unwrap();
        execute(&mut pa, actor, &AgreementCommand::Submit).unwrap();
        execute(&mut pa, actor, &AgreementCommand::Activate).unwrap();
        pa
    }

    #[test]
    fn transition_table_is_well_formed() {
        check_transition_table(AgreementStatus::Draft, AgreementStatus::ALL).unwrap();
    }

    #[test]
    fn active_agreement_covers_only_its_vendor() {
        let a = Actor::new(TenantId::new(), UserId::new(), Utc::now());
        let vendor = VendorId::generate();
        let pa = active(&a, vendor, a.today() + Duration::days(30));
        pa.ensure_covers(vendor).unwrap();
        assert!(matches!(
            pa.ensure_covers(VendorId::generate()),
            Err(DomainError::ReferentialIntegrity(_))
        ));
    }

    #[test]
    fn expire_requires_lapsed_end_date() {
        let a = Actor::new(TenantId::new(), UserId::new(), Utc::now());
        let mut running = active(&a, VendorId::generate(), a.today());
        assert!(running.handle(&a, &AgreementCommand::Expire).is_err());

        let later = a.at(a.at + Duration::days(1));
        execute(&mut running, &later, &AgreementCommand::Expire).unwrap();
        assert_eq!(running.status(), AgreementStatus::Expired);
        assert!(running.ensure_covers(running.vendor_id()).is_err());
    }
}
