use std::collections::HashMap;

use serde::Serialize;

use procura_core::{Aggregate, AggregateRoot, DomainError};
use procura_events::Event as PublishedEvent;
use procura_purchasing::{
    BlanketOrder, BlanketOrderId, DocumentKind, DocumentRef, GoodsReceipt, GoodsReceiptId,
    PurchaseAgreement, PurchaseAgreementId, PurchaseOrder, PurchaseOrderId, PurchaseRequest,
    PurchaseRequestId, PurchaseReturn, PurchaseReturnId, Rfq, RfqId, ThreeWayMatch,
    ThreeWayMatchId, VendorBill, VendorBillId,
};

/// A procurement document the unit of work can load, stage and commit.
pub trait StoredDocument:
    Aggregate<Error = DomainError, Event: PublishedEvent + Serialize> + Clone + Send + Sync + 'static
{
    const KIND: DocumentKind;

    fn table(tables: &Tables) -> &HashMap<Self::Id, Self>;

    fn table_mut(tables: &mut Tables) -> &mut HashMap<Self::Id, Self>;

    fn reference(id: Self::Id) -> DocumentRef;
}

macro_rules! document_tables {
    ($( $field:ident : $doc:ident [$id:ident] => $kind:ident ),+ $(,)?) => {
        /// One tenant's documents, by kind.
        #[derive(Debug, Clone, Default)]
        pub struct Tables {
            $( pub $field: HashMap<$id, $doc>, )+
        }

        impl Tables {
            /// Current version of the referenced document, `None` if absent.
            pub fn version_of(&self, reference: DocumentRef) -> Option<u64> {
                match reference.kind {
                    $(
                        DocumentKind::$kind => self
                            .$field
                            .get(&$id::new(reference.id))
                            .map(|doc| doc.version()),
                    )+
                }
            }

            pub(crate) fn merge(&mut self, staged: Tables) {
                $( self.$field.extend(staged.$field); )+
            }

            pub fn is_empty(&self) -> bool {
                true $( && self.$field.is_empty() )+
            }
        }

        $(
            impl StoredDocument for $doc {
                const KIND: DocumentKind = DocumentKind::$kind;

                fn table(tables: &Tables) -> &HashMap<$id, $doc> {
                    &tables.$field
                }

                fn table_mut(tables: &mut Tables) -> &mut HashMap<$id, $doc> {
                    &mut tables.$field
                }

                fn reference(id: $id) -> DocumentRef {
                    id.into()
                }
            }
        )+
    };
}

document_tables! {
    requests: PurchaseRequest[PurchaseRequestId] => PurchaseRequest,
    rfqs: Rfq[RfqId] => RequestForQuotation,
    orders: PurchaseOrder[PurchaseOrderId] => PurchaseOrder,
    receipts: GoodsReceipt[GoodsReceiptId] => GoodsReceipt,
    bills: VendorBill[VendorBillId] => VendorBill,
    returns: PurchaseReturn[PurchaseReturnId] => PurchaseReturn,
    agreements: PurchaseAgreement[PurchaseAgreementId] => PurchaseAgreement,
    blanket_orders: BlanketOrder[BlanketOrderId] => BlanketOrder,
    matches: ThreeWayMatch[ThreeWayMatchId] => ThreeWayMatch,
}
