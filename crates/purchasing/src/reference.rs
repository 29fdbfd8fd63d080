//! Typed identifiers and the polymorphic document reference.

use serde::{Deserialize, Serialize};

use procura_core::{AggregateId, typed_id};

typed_id!(
    /// Vendor (supplier party) reference.
    VendorId
);
typed_id!(
    /// Receiving warehouse reference.
    WarehouseId
);
typed_id!(
    /// Product reference.
    ProductId
);

/// Every document type the procurement core owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PurchaseRequest,
    RequestForQuotation,
    PurchaseOrder,
    GoodsReceipt,
    VendorBill,
    PurchaseReturn,
    PurchaseAgreement,
    BlanketOrder,
    ThreeWayMatch,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::PurchaseRequest => "purchase_request",
            DocumentKind::RequestForQuotation => "request_for_quotation",
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::GoodsReceipt => "goods_receipt",
            DocumentKind::VendorBill => "vendor_bill",
            DocumentKind::PurchaseReturn => "purchase_return",
            DocumentKind::PurchaseAgreement => "purchase_agreement",
            DocumentKind::BlanketOrder => "blanket_order",
            DocumentKind::ThreeWayMatch => "three_way_match",
        }
    }

    /// Prefix used when numbering new documents.
    pub fn number_prefix(self) -> &'static str {
        match self {
            DocumentKind::PurchaseRequest => "PR",
            DocumentKind::RequestForQuotation => "RFQ",
            DocumentKind::PurchaseOrder => "PO",
            DocumentKind::GoodsReceipt => "GR",
            DocumentKind::VendorBill => "BILL",
            DocumentKind::PurchaseReturn => "PRT",
            DocumentKind::PurchaseAgreement => "PA",
            DocumentKind::BlanketOrder => "BPO",
            DocumentKind::ThreeWayMatch => "TWM",
        }
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed `{kind, id}` reference to any procurement document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    pub kind: DocumentKind,
    pub id: AggregateId,
}

impl DocumentRef {
    pub fn new(kind: DocumentKind, id: AggregateId) -> Self {
        Self { kind, id }
    }
}

impl core::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

macro_rules! document_ids {
    ($( $(#[$meta:meta])* $name:ident => $kind:ident ),+ $(,)?) => {
        $(
            typed_id!($(#[$meta])* $name);

            impl From<$name> for DocumentRef {
                fn from(value: $name) -> Self {
                    DocumentRef::new(DocumentKind::$kind, value.0)
                }
            }
        )+
    };
}

document_ids! {
    /// Purchase request identifier.
    PurchaseRequestId => PurchaseRequest,
    /// Request-for-quotation identifier.
    RfqId => RequestForQuotation,
    /// Purchase order identifier.
    PurchaseOrderId => PurchaseOrder,
    /// Goods receipt identifier.
    GoodsReceiptId => GoodsReceipt,
    /// Vendor bill identifier.
    VendorBillId => VendorBill,
    /// Purchase return identifier.
    PurchaseReturnId => PurchaseReturn,
    /// Purchase agreement identifier.
    PurchaseAgreementId => PurchaseAgreement,
    /// Blanket order identifier.
    BlanketOrderId => BlanketOrder,
    /// Three-way match record identifier.
    ThreeWayMatchId => ThreeWayMatch,
}

/// Quantity addressed to a numbered line of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantity {
    pub line_no: u32,
    pub quantity: rust_decimal::Decimal,
}

impl LineQuantity {
    pub fn new(line_no: u32, quantity: rust_decimal::Decimal) -> Self {
        Self { line_no, quantity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_ids_convert_into_document_refs() {
        let po = PurchaseOrderId::generate();
        let r: DocumentRef = po.into();
        assert_eq!(r.kind, DocumentKind::PurchaseOrder);
        assert_eq!(r.id, po.aggregate_id());
        assert!(r.to_string().starts_with("purchase_order:"));
    }
}
