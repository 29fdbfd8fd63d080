//! End-to-end procurement flows through the service layer.
//!
//! Every scenario runs against the in-memory store, bus and collaborator
//! fakes, and checks both committed document state and what was handed to
//! the outside world after commit.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use procura_core::{Actor, AggregateRoot, DomainError, Money, TaxRates, TenantId, UserId};
use procura_events::{EventBus, EventEnvelope, InMemoryEventBus};
use procura_purchasing::{
    AllocationMethod, AppliedMethod, BillLineInput, BlanketLineInput, BlanketOrder,
    BlanketOrderId, BlanketOrderStatus, DiscrepancyType, DocumentKind, DocumentRef, FlowRelation,
    GoodsReceipt, LandedCostType, MatchStatus, OrderLineInput, ProductId, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, PurchaseOrderStatus, PurchaseRequest,
    PurchaseRequestStatus, QuotedPrice, ReceiptLineInput, RequestLineInput, ReturnLineInput,
    ReturnStatus, Rfq, ThreeWayMatch, VendorBill, VendorId, WarehouseId,
};

use crate::config::ProcurementConfig;
use crate::error::ServiceError;
use crate::ports::{
    InMemoryApprovals, InMemoryCatalog, InMemoryJournal, InMemorySequence, InMemoryStock,
};
use crate::services::{
    Collaborators, NewBlanketOrder, NewPurchaseAgreement, NewPurchaseOrder, NewVendorBill,
    ProcurementService, ReleaseQuantity, ReleaseRequest,
};
use crate::store::InMemoryDocumentStore;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

struct Harness {
    service: ProcurementService<Bus>,
    bus: Bus,
    stock: Arc<InMemoryStock>,
    journal: Arc<InMemoryJournal>,
    approvals: Arc<InMemoryApprovals>,
    actor: Actor,
    vendor: VendorId,
    warehouse: WarehouseId,
}

fn harness() -> Harness {
    harness_with(InMemoryApprovals::new(), InMemoryCatalog::new(), ProcurementConfig::default())
}

fn harness_with(
    approvals: InMemoryApprovals,
    catalog: InMemoryCatalog,
    config: ProcurementConfig,
) -> Harness {
    procura_observability::init_for_tests();

    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let stock = Arc::new(InMemoryStock::new());
    let journal = Arc::new(InMemoryJournal::new());
    let approvals = Arc::new(approvals);
    let ports = Collaborators {
        sequences: Arc::new(InMemorySequence::new()),
        approvals: approvals.clone(),
        stock: stock.clone(),
        journal: journal.clone(),
        catalog: Arc::new(catalog),
    };
    let service = ProcurementService::new(InMemoryDocumentStore::new(), bus.clone(), ports, config);
    Harness {
        service,
        bus,
        stock,
        journal,
        approvals,
        actor: Actor::new(
            TenantId::new(),
            UserId::new(),
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ),
        vendor: VendorId::generate(),
        warehouse: WarehouseId::generate(),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn order_line(product_id: ProductId, quantity: Decimal, unit_price: Decimal) -> OrderLineInput {
    OrderLineInput {
        product_id,
        description: None,
        quantity,
        unit_price,
    }
}

fn bill_line(product_id: ProductId, quantity: Decimal, unit_price: Decimal) -> BillLineInput {
    BillLineInput {
        po_line_no: None,
        product_id,
        description: None,
        quantity,
        unit_price,
    }
}

impl Harness {
    fn doc<D: crate::store::StoredDocument>(&self, id: D::Id) -> D {
        self.service.document::<D>(self.actor.tenant_id, id).unwrap()
    }

    fn draft_order(&self, lines: Vec<OrderLineInput>) -> PurchaseOrder {
        self.service
            .create_purchase_order(
                &self.actor,
                NewPurchaseOrder {
                    vendor_id: self.vendor,
                    warehouse_id: self.warehouse,
                    order_date: self.actor.today(),
                    expected_date: None,
                    tax: TaxRates::none(),
                    lines,
                },
            )
            .unwrap()
    }

    fn approved_order(&self, lines: Vec<OrderLineInput>) -> PurchaseOrder {
        let order = self.draft_order(lines);
        self.service
            .submit_purchase_order(&self.actor, order.id_typed())
            .unwrap()
    }

    /// Receive every outstanding line and post the receipt.
    fn receive_all(&self, order_id: PurchaseOrderId) -> GoodsReceipt {
        let receipt = self
            .service
            .create_goods_receipt(&self.actor, order_id, self.actor.today(), Vec::new())
            .unwrap();
        self.service
            .post_goods_receipt(&self.actor, receipt.id_typed())
            .unwrap()
    }

    fn bill(
        &self,
        order_id: PurchaseOrderId,
        lines: Vec<BillLineInput>,
    ) -> Result<VendorBill, ServiceError> {
        self.service.create_vendor_bill(
            &self.actor,
            NewVendorBill {
                vendor_id: self.vendor,
                order_id: Some(order_id),
                vendor_reference: Some("INV-4471".to_string()),
                bill_date: self.actor.today(),
                due_date: date(2026, 4, 1),
                tax: TaxRates::none(),
                lines,
            },
        )
    }

    /// Open blanket order for one product, unlimited quantity.
    fn open_blanket(&self, product_id: ProductId, unit_price: Decimal, limit: Decimal) -> BlanketOrder {
        let blanket = self
            .service
            .create_blanket_order(
                &self.actor,
                NewBlanketOrder {
                    vendor_id: self.vendor,
                    agreement_id: None,
                    start_date: date(2026, 1, 1),
                    end_date: date(2026, 12, 31),
                    amount_limit: Money::new(limit),
                    lines: vec![BlanketLineInput {
                        product_id,
                        unit_price,
                        quantity_agreed: None,
                    }],
                },
            )
            .unwrap();
        self.service
            .submit_blanket_order(&self.actor, blanket.id_typed())
            .unwrap()
    }

    fn release(
        &self,
        blanket_order_id: BlanketOrderId,
        product_id: ProductId,
        quantity: Decimal,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.service.create_release(
            &self.actor,
            ReleaseRequest {
                blanket_order_id,
                warehouse_id: self.warehouse,
                order_date: self.actor.today(),
                expected_date: None,
                tax: TaxRates::none(),
                lines: vec![ReleaseQuantity {
                    product_id,
                    quantity,
                }],
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Blanket order consumption
// ---------------------------------------------------------------------------

#[test]
fn blanket_order_ceiling_is_enforced_across_releases() {
    let h = harness();
    let product = ProductId::generate();
    let blanket = h.open_blanket(product, dec!(1000), dec!(1000000));
    let id = blanket.id_typed();
    assert_eq!(blanket.status(), BlanketOrderStatus::Open);

    h.release(id, product, dec!(600)).unwrap();
    assert_eq!(h.doc::<BlanketOrder>(id).status(), BlanketOrderStatus::PartiallyOrdered);

    let err = h.release(id, product, dec!(500)).unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::CommitmentExceeded { requested, remaining, .. })
            if *requested == dec!(500000) && *remaining == dec!(400000)
    ));

    h.release(id, product, dec!(400)).unwrap();
    assert_eq!(h.doc::<BlanketOrder>(id).status(), BlanketOrderStatus::Fulfilled);

    let consumption = h.service.blanket_order_consumption(h.actor.tenant_id, id).unwrap();
    assert_eq!(consumption.amount_used, Money::new(dec!(1000000)));
    assert_eq!(consumption.remaining_amount, Money::ZERO);
    assert_eq!(consumption.live_releases, 2);
}

#[test]
fn racing_releases_cannot_overrun_the_ceiling() {
    let h = harness();
    let product = ProductId::generate();
    let blanket = h.open_blanket(product, dec!(1000), dec!(1000000));
    let id = blanket.id_typed();
    let request = |quantity| ReleaseRequest {
        blanket_order_id: id,
        warehouse_id: h.warehouse,
        order_date: h.actor.today(),
        expected_date: None,
        tax: TaxRates::none(),
        lines: vec![ReleaseQuantity {
            product_id: product,
            quantity,
        }],
    };

    let mut attempts = 0;
    let err = h
        .service
        .run(&h.actor, "test_release", |tx| {
            attempts += 1;
            // Checked against an empty blanket order on the first pass.
            let staged = h.service.stage_release(tx, &request(dec!(500)))?;
            if attempts == 1 {
                h.service.create_release(&h.actor, request(dec!(600)))?;
            }
            Ok(staged)
        })
        .unwrap_err();

    assert_eq!(attempts, 2);
    assert!(matches!(
        err.domain(),
        Some(DomainError::CommitmentExceeded { requested, remaining, .. })
            if *requested == dec!(500000) && *remaining == dec!(400000)
    ));

    let committed = h.doc::<BlanketOrder>(id);
    assert_eq!(committed.releases().len(), 1);
    assert_eq!(committed.status(), BlanketOrderStatus::PartiallyOrdered);
    let consumption = h.service.blanket_order_consumption(h.actor.tenant_id, id).unwrap();
    assert_eq!(consumption.amount_used, Money::new(dec!(600000)));
    assert!(consumption.amount_used <= consumption.amount_limit);
}

#[test]
fn approving_and_cancelling_a_release_moves_ordered_quantities() {
    let h = harness();
    let product = ProductId::generate();
    let blanket = h.open_blanket(product, dec!(50), dec!(10000));
    let id = blanket.id_typed();

    let release = h.release(id, product, dec!(40)).unwrap();
    assert_eq!(release.vendor_id(), h.vendor);
    assert_eq!(release.lines()[0].unit_price, dec!(50));
    assert_eq!(h.doc::<BlanketOrder>(id).lines()[0].quantity_ordered, Decimal::ZERO);

    let approved = h
        .service
        .submit_purchase_order(&h.actor, release.id_typed())
        .unwrap();
    assert_eq!(approved.status(), PurchaseOrderStatus::Approved);
    assert_eq!(h.doc::<BlanketOrder>(id).lines()[0].quantity_ordered, dec!(40));

    h.service
        .cancel_purchase_order(&h.actor, release.id_typed(), "no longer needed")
        .unwrap();
    let blanket = h.doc::<BlanketOrder>(id);
    assert_eq!(blanket.lines()[0].quantity_ordered, Decimal::ZERO);
    assert_eq!(blanket.status(), BlanketOrderStatus::Open);
    let consumption = h.service.blanket_order_consumption(h.actor.tenant_id, id).unwrap();
    assert_eq!(consumption.amount_used, Money::ZERO);
}

#[test]
fn editing_a_release_excludes_its_own_previous_total() {
    let h = harness();
    let product = ProductId::generate();
    let blanket = h.open_blanket(product, dec!(100), dec!(1000));
    let release = h.release(blanket.id_typed(), product, dec!(8)).unwrap();

    // 10 × 100 would not fit next to the old 800 if the release counted twice.
    let updated = h
        .service
        .update_purchase_order(
            &h.actor,
            release.id_typed(),
            vec![order_line(product, dec!(10), dec!(100))],
            TaxRates::none(),
        )
        .unwrap();
    assert_eq!(updated.total(), Money::new(dec!(1000)));
    assert_eq!(
        h.doc::<BlanketOrder>(blanket.id_typed()).status(),
        BlanketOrderStatus::Fulfilled
    );
}

#[test]
fn releasing_a_product_outside_the_blanket_order_is_referential() {
    let h = harness();
    let blanket = h.open_blanket(ProductId::generate(), dec!(10), dec!(1000));
    let err = h
        .release(blanket.id_typed(), ProductId::generate(), dec!(1))
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::ReferentialIntegrity(_))));
}

#[test]
fn cancelling_a_blanket_order_requires_no_live_releases() {
    let h = harness();
    let product = ProductId::generate();
    let blanket = h.open_blanket(product, dec!(10), dec!(1000));
    let release = h.release(blanket.id_typed(), product, dec!(5)).unwrap();

    assert!(
        h.service
            .cancel_blanket_order(&h.actor, blanket.id_typed(), "vendor exit")
            .is_err()
    );

    h.service
        .cancel_purchase_order(&h.actor, release.id_typed(), "superseded")
        .unwrap();
    let cancelled = h
        .service
        .cancel_blanket_order(&h.actor, blanket.id_typed(), "vendor exit")
        .unwrap();
    assert_eq!(cancelled.status(), BlanketOrderStatus::Cancelled);
}

#[test]
fn lapsed_blanket_orders_expire() {
    let h = harness();
    let product = ProductId::generate();
    let blanket = h.open_blanket(product, dec!(10), dec!(1000));

    let none = h
        .service
        .expire_lapsed_blanket_orders(&h.actor, date(2026, 12, 31))
        .unwrap();
    assert!(none.is_empty());

    let expired = h
        .service
        .expire_lapsed_blanket_orders(&h.actor, date(2027, 1, 1))
        .unwrap();
    assert_eq!(expired, vec![blanket.id_typed()]);
    assert_eq!(
        h.doc::<BlanketOrder>(blanket.id_typed()).status(),
        BlanketOrderStatus::Expired
    );
}

#[test]
fn blanket_orders_need_an_active_agreement_of_the_same_vendor() {
    let h = harness();
    let agreement = h
        .service
        .create_purchase_agreement(
            &h.actor,
            NewPurchaseAgreement {
                vendor_id: h.vendor,
                start_date: date(2026, 1, 1),
                end_date: date(2026, 12, 31),
                terms: Some("net 30".to_string()),
                committed_amount: Some(Money::new(dec!(50000))),
            },
        )
        .unwrap();

    let new_blanket = |vendor_id| NewBlanketOrder {
        vendor_id,
        agreement_id: Some(agreement.id_typed()),
        start_date: date(2026, 2, 1),
        end_date: date(2026, 6, 30),
        amount_limit: Money::new(dec!(20000)),
        lines: vec![BlanketLineInput {
            product_id: ProductId::generate(),
            unit_price: dec!(5),
            quantity_agreed: Some(dec!(100)),
        }],
    };

    // Still a draft agreement.
    assert!(h.service.create_blanket_order(&h.actor, new_blanket(h.vendor)).is_err());

    h.service
        .submit_purchase_agreement(&h.actor, agreement.id_typed())
        .unwrap();
    assert!(
        h.service
            .create_blanket_order(&h.actor, new_blanket(VendorId::generate()))
            .is_err()
    );
    let blanket = h
        .service
        .create_blanket_order(&h.actor, new_blanket(h.vendor))
        .unwrap();

    let graph = h
        .service
        .document_flow(h.actor.tenant_id, blanket.id_typed().into())
        .unwrap();
    assert!(graph.contains(agreement.id_typed().into()));
    assert_eq!(graph.edges[0].relation, FlowRelation::Governs);
}

// ---------------------------------------------------------------------------
// Three-way match and billing
// ---------------------------------------------------------------------------

#[test]
fn bill_at_order_price_matches_cleanly() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);
    let receipt = h.receive_all(order.id_typed());

    let bill = h
        .bill(order.id_typed(), vec![bill_line(product, dec!(100), dec!(10))])
        .unwrap();
    assert_eq!(bill.match_status(), MatchStatus::Matched);
    assert_eq!(bill.lines()[0].po_line_no, Some(1));

    let record = h.doc::<ThreeWayMatch>(bill.match_id().unwrap());
    assert_eq!(record.status(), MatchStatus::Matched);
    assert!(record.discrepancies().is_empty());
    assert_eq!(record.receipt_id(), Some(receipt.id_typed()));
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).lines()[0].quantity_billed,
        dec!(100)
    );

    let posted = h.service.post_vendor_bill(&h.actor, bill.id_typed()).unwrap();
    assert!(posted.posted_at().is_some());
    let entries = h.journal.entries(h.actor.tenant_id);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].debit_total(), Money::new(dec!(1000)));
}

#[test]
fn price_variance_needs_review_before_posting() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);
    h.receive_all(order.id_typed());

    let bill = h
        .bill(order.id_typed(), vec![bill_line(product, dec!(100), dec!(10.5))])
        .unwrap();
    assert_eq!(bill.match_status(), MatchStatus::PartialMatch);
    let record = h.doc::<ThreeWayMatch>(bill.match_id().unwrap());
    assert_eq!(record.discrepancies().len(), 1);
    assert_eq!(record.discrepancies()[0].kind, DiscrepancyType::Price);

    let err = h.service.post_vendor_bill(&h.actor, bill.id_typed()).unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
    assert!(h.journal.entries(h.actor.tenant_id).is_empty());

    let approved = h
        .service
        .approve_match(&h.actor, bill.id_typed(), Some("freight surcharge".to_string()))
        .unwrap();
    assert_eq!(approved.status(), MatchStatus::Approved);
    assert_eq!(approved.approval_notes(), Some("freight surcharge"));

    h.service.post_vendor_bill(&h.actor, bill.id_typed()).unwrap();
    assert_eq!(h.journal.entries(h.actor.tenant_id).len(), 1);
}

#[test]
fn billing_beyond_received_quantity_is_rejected_without_side_effects() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);
    h.receive_all(order.id_typed());

    let err = h
        .bill(order.id_typed(), vec![bill_line(product, dec!(100.01), dec!(10))])
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::ReferentialIntegrity(_))));

    let snapshot = h.service.store().snapshot(h.actor.tenant_id);
    assert!(snapshot.bills.is_empty());
    assert!(snapshot.matches.is_empty());
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).lines()[0].quantity_billed,
        Decimal::ZERO
    );
}

#[test]
fn bill_lines_must_resolve_to_an_order_line_of_the_same_product() {
    let h = harness();
    let product = ProductId::generate();
    let stranger = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);
    h.receive_all(order.id_typed());

    let err = h
        .bill(order.id_typed(), vec![bill_line(stranger, dec!(5000), dec!(10))])
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::ReferentialIntegrity(_))));

    let err = h
        .bill(
            order.id_typed(),
            vec![BillLineInput {
                po_line_no: Some(1),
                ..bill_line(stranger, dec!(100), dec!(10))
            }],
        )
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::ReferentialIntegrity(_))));

    let snapshot = h.service.store().snapshot(h.actor.tenant_id);
    assert!(snapshot.bills.is_empty());
    assert!(snapshot.matches.is_empty());
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).lines()[0].quantity_billed,
        Decimal::ZERO
    );
}

#[test]
fn bill_updates_cannot_introduce_foreign_products() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);
    h.receive_all(order.id_typed());
    let bill = h
        .bill(order.id_typed(), vec![bill_line(product, dec!(40), dec!(10))])
        .unwrap();

    let err = h
        .service
        .update_vendor_bill(
            &h.actor,
            bill.id_typed(),
            vec![bill_line(ProductId::generate(), dec!(40), dec!(10))],
            TaxRates::none(),
        )
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::ReferentialIntegrity(_))));

    assert_eq!(h.doc::<VendorBill>(bill.id_typed()).lines()[0].product_id, product);
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).lines()[0].quantity_billed,
        dec!(40)
    );
}

#[test]
fn updating_a_bill_gives_back_its_previous_quantities() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);
    h.receive_all(order.id_typed());
    let bill = h
        .bill(order.id_typed(), vec![bill_line(product, dec!(100), dec!(10.5))])
        .unwrap();

    let updated = h
        .service
        .update_vendor_bill(
            &h.actor,
            bill.id_typed(),
            vec![bill_line(product, dec!(100), dec!(10))],
            TaxRates::none(),
        )
        .unwrap();
    assert_eq!(updated.match_status(), MatchStatus::Matched);
    assert_eq!(updated.match_id(), bill.match_id());
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).lines()[0].quantity_billed,
        dec!(100)
    );
}

#[test]
fn bills_without_an_order_are_mismatched() {
    let h = harness();
    let bill = h
        .service
        .create_vendor_bill(
            &h.actor,
            NewVendorBill {
                vendor_id: h.vendor,
                order_id: None,
                vendor_reference: None,
                bill_date: h.actor.today(),
                due_date: date(2026, 4, 1),
                tax: TaxRates::none(),
                lines: vec![bill_line(ProductId::generate(), dec!(1), dec!(99))],
            },
        )
        .unwrap();
    assert_eq!(bill.match_status(), MatchStatus::Mismatch);
    let record = h.doc::<ThreeWayMatch>(bill.match_id().unwrap());
    assert_eq!(record.discrepancies()[0].kind, DiscrepancyType::NoPo);
}

#[test]
fn posting_a_later_receipt_rematches_draft_bills() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);
    h.receive_all(order.id_typed());
    let bill = h
        .bill(order.id_typed(), vec![bill_line(product, dec!(100), dec!(10))])
        .unwrap();
    assert_eq!(bill.match_status(), MatchStatus::Matched);

    // Over-receipt is tracked, and pushes received past the tolerance band.
    let later = h.actor.at(h.actor.at + chrono::Duration::hours(2));
    let extra = h
        .service
        .create_goods_receipt(
            &later,
            order.id_typed(),
            h.actor.today(),
            vec![ReceiptLineInput {
                po_line_no: 1,
                product_id: product,
                uom: "unit".to_string(),
                quantity_received: dec!(10),
                unit_cost: dec!(10),
            }],
        )
        .unwrap();
    h.service.post_goods_receipt(&later, extra.id_typed()).unwrap();

    let bill = h.doc::<VendorBill>(bill.id_typed());
    assert_eq!(bill.match_status(), MatchStatus::PartialMatch);
    let record = h.doc::<ThreeWayMatch>(bill.match_id().unwrap());
    assert_eq!(record.receipt_id(), Some(extra.id_typed()));
}

#[test]
fn cancelling_a_billed_order_is_an_invalid_transition() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(10), dec!(10))]);
    h.receive_all(order.id_typed());
    h.bill(order.id_typed(), vec![bill_line(product, dec!(10), dec!(10))])
        .unwrap();

    let err = h
        .service
        .cancel_purchase_order(&h.actor, order.id_typed(), "vendor failed")
        .unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidStateTransition { .. })
    ));
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).status(),
        PurchaseOrderStatus::FullyReceived
    );
}

// ---------------------------------------------------------------------------
// Receipts, landed cost and returns
// ---------------------------------------------------------------------------

#[test]
fn receipts_and_returns_move_stock_and_post_journals() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(100), dec!(10))]);

    let draft = h
        .service
        .create_goods_receipt(&h.actor, order.id_typed(), h.actor.today(), Vec::new())
        .unwrap();
    assert_eq!(h.stock.level(h.actor.tenant_id, h.warehouse, product), Decimal::ZERO);
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).lines()[0].quantity_received,
        Decimal::ZERO
    );

    let receipt = h.service.post_goods_receipt(&h.actor, draft.id_typed()).unwrap();
    assert_eq!(h.stock.level(h.actor.tenant_id, h.warehouse, product), dec!(100));
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).status(),
        PurchaseOrderStatus::FullyReceived
    );

    let ret = h
        .service
        .create_purchase_return(
            &h.actor,
            receipt.id_typed(),
            h.actor.today(),
            vec![ReturnLineInput {
                receipt_line_no: 1,
                quantity: dec!(10),
                reason: Some("damaged".to_string()),
            }],
        )
        .unwrap();
    assert_eq!(ret.vendor_id(), h.vendor);

    let posted = h.service.post_purchase_return(&h.actor, ret.id_typed()).unwrap();
    assert_eq!(posted.status(), ReturnStatus::Posted);
    assert_eq!(h.stock.level(h.actor.tenant_id, h.warehouse, product), dec!(90));
    assert_eq!(
        h.doc::<PurchaseOrder>(order.id_typed()).lines()[0].quantity_returned,
        dec!(10)
    );
    assert_eq!(
        h.doc::<GoodsReceipt>(receipt.id_typed()).lines()[0].quantity_returned,
        dec!(10)
    );

    let entries = h.journal.entries(h.actor.tenant_id);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].credit_total(), Money::new(dec!(100)));
}

#[test]
fn returns_cannot_exceed_what_is_left_on_the_receipt() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.approved_order(vec![order_line(product, dec!(5), dec!(10))]);
    let receipt = h.receive_all(order.id_typed());

    let err = h
        .service
        .create_purchase_return(
            &h.actor,
            receipt.id_typed(),
            h.actor.today(),
            vec![ReturnLineInput {
                receipt_line_no: 1,
                quantity: dec!(6),
                reason: None,
            }],
        )
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
}

#[test]
fn receipts_only_reach_approved_orders() {
    let h = harness();
    let order = h.draft_order(vec![order_line(ProductId::generate(), dec!(5), dec!(10))]);
    let err = h
        .service
        .create_goods_receipt(&h.actor, order.id_typed(), h.actor.today(), Vec::new())
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
}

#[test]
fn landed_cost_by_value_allocates_the_exact_amount() {
    let h = harness();
    let (a, b) = (ProductId::generate(), ProductId::generate());
    let order = h.approved_order(vec![
        order_line(a, dec!(10), dec!(10)),
        order_line(b, dec!(30), dec!(10)),
    ]);
    let draft = h
        .service
        .create_goods_receipt(&h.actor, order.id_typed(), h.actor.today(), Vec::new())
        .unwrap();

    let receipt = h
        .service
        .add_landed_cost(
            &h.actor,
            draft.id_typed(),
            LandedCostType::Freight,
            Some("inbound truck".to_string()),
            Money::new(dec!(40)),
            AllocationMethod::ByValue,
        )
        .unwrap();
    let totals: Vec<Money> = receipt.lines().iter().map(|l| l.landed_cost_total).collect();
    assert_eq!(totals, vec![Money::new(dec!(10)), Money::new(dec!(30))]);

    // Posted receipts take no more landed cost.
    h.service.post_goods_receipt(&h.actor, draft.id_typed()).unwrap();
    let err = h
        .service
        .add_landed_cost(
            &h.actor,
            draft.id_typed(),
            LandedCostType::Customs,
            None,
            Money::new(dec!(5)),
            AllocationMethod::ByQuantity,
        )
        .unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidStateTransition { .. })
    ));
}

#[test]
fn zero_value_receipts_split_landed_cost_evenly() {
    let h = harness();
    let products = [ProductId::generate(), ProductId::generate(), ProductId::generate()];
    let order = h.approved_order(
        products
            .iter()
            .map(|p| order_line(*p, dec!(1), dec!(10)))
            .collect(),
    );
    let lines = products
        .iter()
        .enumerate()
        .map(|(idx, p)| ReceiptLineInput {
            po_line_no: idx as u32 + 1,
            product_id: *p,
            uom: "unit".to_string(),
            quantity_received: dec!(1),
            unit_cost: Decimal::ZERO,
        })
        .collect();
    let draft = h
        .service
        .create_goods_receipt(&h.actor, order.id_typed(), h.actor.today(), lines)
        .unwrap();

    let receipt = h
        .service
        .add_landed_cost(
            &h.actor,
            draft.id_typed(),
            LandedCostType::Handling,
            None,
            Money::new(dec!(100)),
            AllocationMethod::ByValue,
        )
        .unwrap();
    let cost = &receipt.landed_costs()[0];
    assert_eq!(cost.applied, AppliedMethod::EqualSplit);
    let amounts: Vec<Decimal> = cost.allocations.iter().map(|a| a.amount.amount()).collect();
    assert_eq!(amounts, vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
}

#[test]
fn landed_cost_by_weight_reads_the_catalog() {
    let (a, b) = (ProductId::generate(), ProductId::generate());
    let h = harness_with(
        InMemoryApprovals::new(),
        InMemoryCatalog::new().with_weight(a, dec!(2)).with_weight(b, dec!(0.5)),
        ProcurementConfig::default(),
    );
    let order = h.approved_order(vec![
        order_line(a, dec!(10), dec!(10)),
        order_line(b, dec!(30), dec!(10)),
    ]);
    let draft = h
        .service
        .create_goods_receipt(&h.actor, order.id_typed(), h.actor.today(), Vec::new())
        .unwrap();

    let receipt = h
        .service
        .add_landed_cost(
            &h.actor,
            draft.id_typed(),
            LandedCostType::Freight,
            None,
            Money::new(dec!(40)),
            AllocationMethod::ByWeight,
        )
        .unwrap();
    let cost = &receipt.landed_costs()[0];
    assert_eq!(cost.applied, AppliedMethod::Weight);
    let total: Money = cost.allocations.iter().map(|a| a.amount).sum();
    assert_eq!(total, Money::new(dec!(40)));
    assert!(cost.allocations[0].amount > cost.allocations[1].amount);
}

// ---------------------------------------------------------------------------
// Sourcing: requests, RFQs, approvals
// ---------------------------------------------------------------------------

#[test]
fn request_to_rfq_to_order_links_the_whole_chain() {
    let h = harness();
    let product = ProductId::generate();
    let other_vendor = VendorId::generate();

    let request = h
        .service
        .create_purchase_request(
            &h.actor,
            Some("line 3 restock".to_string()),
            vec![RequestLineInput {
                product_id: product,
                quantity: dec!(20),
                estimated_unit_price: dec!(12),
                required_date: Some(date(2026, 3, 20)),
            }],
        )
        .unwrap();
    let request = h
        .service
        .submit_purchase_request(&h.actor, request.id_typed())
        .unwrap();
    assert_eq!(request.status(), PurchaseRequestStatus::Approved);

    let rfq = h
        .service
        .create_rfq(
            &h.actor,
            Some(request.id_typed()),
            vec![h.vendor, other_vendor],
            Vec::new(),
            Some(date(2026, 3, 10)),
        )
        .unwrap();
    assert_eq!(rfq.lines().len(), 1);
    h.service.send_rfq(&h.actor, rfq.id_typed()).unwrap();
    h.service
        .record_quote(
            &h.actor,
            rfq.id_typed(),
            h.vendor,
            vec![QuotedPrice {
                line_no: 1,
                unit_price: dec!(11),
            }],
            None,
        )
        .unwrap();
    h.service
        .record_quote(
            &h.actor,
            rfq.id_typed(),
            other_vendor,
            vec![QuotedPrice {
                line_no: 1,
                unit_price: dec!(11.5),
            }],
            None,
        )
        .unwrap();
    h.service.award_rfq(&h.actor, rfq.id_typed(), h.vendor).unwrap();

    let order = h
        .service
        .create_order_from_rfq(
            &h.actor,
            rfq.id_typed(),
            h.warehouse,
            h.actor.today(),
            TaxRates::none(),
        )
        .unwrap();
    assert_eq!(order.vendor_id(), h.vendor);
    assert_eq!(order.lines()[0].unit_price, dec!(11));
    assert_eq!(order.origin().purchase_request_id, Some(request.id_typed()));
    assert_eq!(
        h.doc::<PurchaseRequest>(request.id_typed()).status(),
        PurchaseRequestStatus::Converted
    );
    assert_eq!(h.doc::<Rfq>(rfq.id_typed()).orders(), &[order.id_typed()]);

    // A converted request cannot be sourced again.
    assert!(
        h.service
            .create_order_from_request(
                &h.actor,
                request.id_typed(),
                h.vendor,
                h.warehouse,
                h.actor.today(),
                TaxRates::none(),
            )
            .is_err()
    );
}

#[test]
fn order_from_request_uses_estimated_prices() {
    let h = harness();
    let product = ProductId::generate();
    let request = h
        .service
        .create_purchase_request(
            &h.actor,
            None,
            vec![RequestLineInput {
                product_id: product,
                quantity: dec!(4),
                estimated_unit_price: dec!(25),
                required_date: None,
            }],
        )
        .unwrap();

    // Draft requests are not sourceable.
    assert!(
        h.service
            .create_order_from_request(
                &h.actor,
                request.id_typed(),
                h.vendor,
                h.warehouse,
                h.actor.today(),
                TaxRates::none(),
            )
            .is_err()
    );

    h.service
        .submit_purchase_request(&h.actor, request.id_typed())
        .unwrap();
    let order = h
        .service
        .create_order_from_request(
            &h.actor,
            request.id_typed(),
            h.vendor,
            h.warehouse,
            h.actor.today(),
            TaxRates::none(),
        )
        .unwrap();
    assert_eq!(order.total(), Money::new(dec!(100)));
    assert!(order.number().starts_with("PO-202603-"));
    assert_eq!(
        h.doc::<PurchaseRequest>(request.id_typed()).status(),
        PurchaseRequestStatus::Converted
    );
}

#[test]
fn orders_above_the_threshold_wait_for_workflow_approval() {
    let h = harness_with(
        InMemoryApprovals::new()
            .with_threshold(DocumentKind::PurchaseOrder, Money::new(dec!(5000))),
        InMemoryCatalog::new(),
        ProcurementConfig::default(),
    );
    let product = ProductId::generate();

    let small = h.approved_order(vec![order_line(product, dec!(10), dec!(10))]);
    assert_eq!(small.status(), PurchaseOrderStatus::Approved);
    assert!(h.approvals.submitted().is_empty());

    let large = h.approved_order(vec![order_line(product, dec!(500), dec!(10))]);
    assert_eq!(large.status(), PurchaseOrderStatus::PendingApproval);
    let submitted = h.approvals.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].document, DocumentRef::from(large.id_typed()));
    assert_eq!(submitted[0].amount, Money::new(dec!(5000)));

    h.service
        .on_workflow_rejected(&h.actor, large.id_typed().into(), "split the order")
        .unwrap();
    assert_eq!(
        h.doc::<PurchaseOrder>(large.id_typed()).status(),
        PurchaseOrderStatus::Draft
    );

    h.service
        .submit_purchase_order(&h.actor, large.id_typed())
        .unwrap();
    h.service
        .on_workflow_approved(&h.actor, large.id_typed().into())
        .unwrap();
    assert_eq!(
        h.doc::<PurchaseOrder>(large.id_typed()).status(),
        PurchaseOrderStatus::Approved
    );
}

#[test]
fn workflow_callbacks_for_unrouted_documents_are_rejected() {
    let h = harness();
    let order = h.approved_order(vec![order_line(ProductId::generate(), dec!(1), dec!(1))]);
    let receipt = h.receive_all(order.id_typed());
    let err = h
        .service
        .on_workflow_approved(&h.actor, receipt.id_typed().into())
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
}

// ---------------------------------------------------------------------------
// Unit of work: events, concurrency, lineage
// ---------------------------------------------------------------------------

#[test]
fn committed_events_are_published_in_order() {
    let h = harness();
    let subscription = h.bus.subscribe();
    let order = h.approved_order(vec![order_line(ProductId::generate(), dec!(1), dec!(10))]);

    let events = subscription.drain();
    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec![
            "procurement.purchase_order.created",
            "procurement.purchase_order.submitted",
            "procurement.purchase_order.approved",
        ]
    );
    let sequence: Vec<u64> = events.iter().map(|e| e.sequence_number()).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
    assert!(events.iter().all(|e| e.tenant_id() == h.actor.tenant_id));
    assert_eq!(events[0].aggregate_id(), order.id_typed().aggregate_id());
    assert_eq!(events[0].payload()["change"]["type"], "created");
}

#[test]
fn rejected_commands_publish_nothing() {
    let h = harness();
    let order = h.draft_order(vec![order_line(ProductId::generate(), dec!(1), dec!(10))]);
    let subscription = h.bus.subscribe();

    assert!(h.service.lock_purchase_order(&h.actor, order.id_typed()).is_err());
    assert!(subscription.drain().is_empty());
}

#[test]
fn conflicting_commit_reruns_the_unit_of_work() {
    let h = harness();
    let product = ProductId::generate();
    let order = h.draft_order(vec![order_line(product, dec!(1), dec!(10))]);
    let id = order.id_typed();

    let mut attempts = 0;
    let submitted = h
        .service
        .run(&h.actor, "test_submit", |tx| {
            attempts += 1;
            tx.load::<PurchaseOrder>(id)?;
            if attempts == 1 {
                // A competing writer commits between our read and our commit.
                h.service.update_purchase_order(
                    &h.actor,
                    id,
                    vec![order_line(product, dec!(2), dec!(10))],
                    TaxRates::none(),
                )?;
            }
            tx.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Submit)
        })
        .unwrap();

    assert_eq!(attempts, 2);
    assert_eq!(submitted.status(), PurchaseOrderStatus::Submitted);
    assert_eq!(submitted.total(), Money::new(dec!(20)));
    assert_eq!(submitted.version(), 3);
}

#[test]
fn conflicts_give_up_after_the_configured_attempts() {
    let h = harness_with(
        InMemoryApprovals::new(),
        InMemoryCatalog::new(),
        ProcurementConfig::default().with_max_commit_attempts(1),
    );
    let product = ProductId::generate();
    let order = h.draft_order(vec![order_line(product, dec!(1), dec!(10))]);
    let id = order.id_typed();

    let err = h
        .service
        .run(&h.actor, "test_submit", |tx| {
            tx.load::<PurchaseOrder>(id)?;
            h.service.update_purchase_order(
                &h.actor,
                id,
                vec![order_line(product, dec!(3), dec!(10))],
                TaxRates::none(),
            )?;
            tx.execute::<PurchaseOrder>(id, &PurchaseOrderCommand::Submit)
        })
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RetriesExhausted {
            operation: "test_submit",
            attempts: 1
        }
    ));
    assert_eq!(
        h.doc::<PurchaseOrder>(id).status(),
        PurchaseOrderStatus::Draft
    );
}

#[test]
fn document_flow_walks_from_any_document() {
    let h = harness();
    let product = ProductId::generate();
    let request = h
        .service
        .create_purchase_request(
            &h.actor,
            None,
            vec![RequestLineInput {
                product_id: product,
                quantity: dec!(10),
                estimated_unit_price: dec!(10),
                required_date: None,
            }],
        )
        .unwrap();
    h.service
        .submit_purchase_request(&h.actor, request.id_typed())
        .unwrap();
    let rfq = h
        .service
        .create_rfq(&h.actor, Some(request.id_typed()), vec![h.vendor], Vec::new(), None)
        .unwrap();
    h.service.send_rfq(&h.actor, rfq.id_typed()).unwrap();
    h.service
        .record_quote(
            &h.actor,
            rfq.id_typed(),
            h.vendor,
            vec![QuotedPrice {
                line_no: 1,
                unit_price: dec!(10),
            }],
            None,
        )
        .unwrap();
    h.service.award_rfq(&h.actor, rfq.id_typed(), h.vendor).unwrap();
    let order = h
        .service
        .create_order_from_rfq(&h.actor, rfq.id_typed(), h.warehouse, h.actor.today(), TaxRates::none())
        .unwrap();
    h.service
        .submit_purchase_order(&h.actor, order.id_typed())
        .unwrap();
    let receipt = h.receive_all(order.id_typed());
    let bill = h
        .bill(order.id_typed(), vec![bill_line(product, dec!(10), dec!(10))])
        .unwrap();
    let ret = h
        .service
        .create_purchase_return(
            &h.actor,
            receipt.id_typed(),
            h.actor.today(),
            vec![ReturnLineInput {
                receipt_line_no: 1,
                quantity: dec!(1),
                reason: None,
            }],
        )
        .unwrap();

    let graph = h
        .service
        .document_flow(h.actor.tenant_id, ret.id_typed().into())
        .unwrap();
    assert_eq!(graph.nodes.len(), 7);
    assert_eq!(graph.edges.len(), 7);
    assert_eq!(graph.nodes[0].number, ret.number());
    for reference in [
        DocumentRef::from(request.id_typed()),
        rfq.id_typed().into(),
        order.id_typed().into(),
        bill.id_typed().into(),
        bill.match_id().unwrap().into(),
    ] {
        assert!(graph.contains(reference), "{reference} missing from flow");
    }
    assert_eq!(
        graph.node(order.id_typed().into()).unwrap().status,
        "fully_received"
    );

    assert!(
        h.service
            .document_flow(TenantId::new(), order.id_typed().into())
            .is_none()
    );
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Release(u32),
        Approve(usize),
        Cancel(usize),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => (1u32..600).prop_map(Step::Release),
            1 => (0usize..8).prop_map(Step::Approve),
            1 => (0usize..8).prop_map(Step::Cancel),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        /// Property: whatever the mix of releases, approvals and
        /// cancellations, committed consumption never passes the ceiling.
        #[test]
        fn blanket_amount_used_never_exceeds_the_limit(
            steps in prop::collection::vec(step_strategy(), 1..16)
        ) {
            let h = harness();
            let product = ProductId::generate();
            let blanket = h.open_blanket(product, dec!(1000), dec!(1000000));
            let id = blanket.id_typed();
            let mut releases: Vec<PurchaseOrderId> = Vec::new();

            for step in steps {
                match step {
                    Step::Release(qty) => {
                        if let Ok(order) = h.release(id, product, Decimal::from(qty)) {
                            releases.push(order.id_typed());
                        }
                    }
                    Step::Approve(idx) => {
                        if let Some(order_id) = releases.get(idx % releases.len().max(1)) {
                            let _ = h.service.submit_purchase_order(&h.actor, *order_id);
                        }
                    }
                    Step::Cancel(idx) => {
                        if let Some(order_id) = releases.get(idx % releases.len().max(1)) {
                            let before = h
                                .service
                                .blanket_order_consumption(h.actor.tenant_id, id)
                                .unwrap()
                                .amount_used;
                            if h.service.cancel_purchase_order(&h.actor, *order_id, "dropped").is_ok() {
                                let after = h
                                    .service
                                    .blanket_order_consumption(h.actor.tenant_id, id)
                                    .unwrap()
                                    .amount_used;
                                prop_assert!(after < before);
                            }
                        }
                    }
                }

                let consumption = h.service.blanket_order_consumption(h.actor.tenant_id, id).unwrap();
                prop_assert!(consumption.amount_used <= consumption.amount_limit);
            }
        }
    }
}
