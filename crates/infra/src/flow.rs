//! Document lineage over one tenant's committed tables.

use procura_purchasing::{
    BlanketOrderId, DocumentKind, DocumentLinks, DocumentRef, FlowEdge, FlowNode, FlowRelation,
    GoodsReceiptId, PurchaseAgreementId, PurchaseOrderId, PurchaseRequestId, PurchaseReturnId,
    RfqId, ThreeWayMatchId, VendorBillId,
};

use crate::store::Tables;

/// [`DocumentLinks`] backed by a tenant snapshot.
///
/// Every document knows its upstream references; downstream links are found
/// by scanning for documents whose upstream points back.
pub struct TableLinks<'a> {
    tables: &'a Tables,
}

impl<'a> TableLinks<'a> {
    pub fn new(tables: &'a Tables) -> Self {
        Self { tables }
    }

    fn upstream(&self, reference: DocumentRef) -> Vec<FlowEdge> {
        let t = self.tables;
        let id = reference.id;
        let mut edges = Vec::new();
        match reference.kind {
            DocumentKind::PurchaseRequest | DocumentKind::PurchaseAgreement => {}
            DocumentKind::RequestForQuotation => {
                if let Some(pr) = t.rfqs.get(&RfqId::new(id)).and_then(|r| r.purchase_request_id()) {
                    edges.push(FlowEdge::new(pr, reference, FlowRelation::Sourced));
                }
            }
            DocumentKind::PurchaseOrder => {
                if let Some(order) = t.orders.get(&PurchaseOrderId::new(id)) {
                    let origin = order.origin();
                    if let Some(pr) = origin.purchase_request_id {
                        edges.push(FlowEdge::new(pr, reference, FlowRelation::Ordered));
                    }
                    if let Some(rfq) = origin.rfq_id {
                        edges.push(FlowEdge::new(rfq, reference, FlowRelation::Ordered));
                    }
                    if let Some(bpo) = origin.blanket_order_id {
                        edges.push(FlowEdge::new(bpo, reference, FlowRelation::Released));
                    }
                }
            }
            DocumentKind::BlanketOrder => {
                if let Some(pa) = t
                    .blanket_orders
                    .get(&BlanketOrderId::new(id))
                    .and_then(|b| b.agreement_id())
                {
                    edges.push(FlowEdge::new(pa, reference, FlowRelation::Governs));
                }
            }
            DocumentKind::GoodsReceipt => {
                if let Some(receipt) = t.receipts.get(&GoodsReceiptId::new(id)) {
                    edges.push(FlowEdge::new(receipt.order_id(), reference, FlowRelation::Received));
                }
            }
            DocumentKind::VendorBill => {
                if let Some(po) = t.bills.get(&VendorBillId::new(id)).and_then(|b| b.order_id()) {
                    edges.push(FlowEdge::new(po, reference, FlowRelation::Billed));
                }
            }
            DocumentKind::PurchaseReturn => {
                if let Some(ret) = t.returns.get(&PurchaseReturnId::new(id)) {
                    edges.push(FlowEdge::new(ret.receipt_id(), reference, FlowRelation::Returned));
                }
            }
            DocumentKind::ThreeWayMatch => {
                if let Some(record) = t.matches.get(&ThreeWayMatchId::new(id)) {
                    edges.push(FlowEdge::new(record.bill_id(), reference, FlowRelation::Matched));
                }
            }
        }
        edges
    }

    /// Every document that can have an upstream link.
    fn all_references(&self) -> impl Iterator<Item = DocumentRef> + '_ {
        let t = self.tables;
        t.requests
            .keys()
            .map(|&id| DocumentRef::from(id))
            .chain(t.rfqs.keys().map(|&id| id.into()))
            .chain(t.orders.keys().map(|&id| id.into()))
            .chain(t.receipts.keys().map(|&id| id.into()))
            .chain(t.bills.keys().map(|&id| id.into()))
            .chain(t.returns.keys().map(|&id| id.into()))
            .chain(t.blanket_orders.keys().map(|&id| id.into()))
            .chain(t.matches.keys().map(|&id| id.into()))
    }
}

impl DocumentLinks for TableLinks<'_> {
    fn node(&self, reference: DocumentRef) -> Option<FlowNode> {
        let t = self.tables;
        let id = reference.id;
        let (number, status) = match reference.kind {
            DocumentKind::PurchaseRequest => t
                .requests
                .get(&PurchaseRequestId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            DocumentKind::RequestForQuotation => t
                .rfqs
                .get(&RfqId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            DocumentKind::PurchaseOrder => t
                .orders
                .get(&PurchaseOrderId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            DocumentKind::GoodsReceipt => t
                .receipts
                .get(&GoodsReceiptId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            DocumentKind::VendorBill => t
                .bills
                .get(&VendorBillId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            DocumentKind::PurchaseReturn => t
                .returns
                .get(&PurchaseReturnId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            DocumentKind::PurchaseAgreement => t
                .agreements
                .get(&PurchaseAgreementId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            DocumentKind::BlanketOrder => t
                .blanket_orders
                .get(&BlanketOrderId::new(id))
                .map(|d| (d.number().to_string(), d.status().to_string())),
            // Match records are unnumbered; they carry their bill's number.
            DocumentKind::ThreeWayMatch => t.matches.get(&ThreeWayMatchId::new(id)).map(|d| {
                let bill = t
                    .bills
                    .get(&d.bill_id())
                    .map_or_else(|| d.bill_id().to_string(), |b| b.number().to_string());
                (
                    format!("{}-{bill}", DocumentKind::ThreeWayMatch.number_prefix()),
                    d.status().to_string(),
                )
            }),
        }?;
        Some(FlowNode {
            reference,
            number,
            status,
        })
    }

    fn links(&self, reference: DocumentRef) -> Vec<FlowEdge> {
        let mut edges = self.upstream(reference);
        edges.extend(
            self.all_references()
                .filter(|other| *other != reference)
                .flat_map(|other| self.upstream(other))
                .filter(|edge| edge.from == reference),
        );
        edges
    }
}
