//! Procurement domain: the document aggregates and the reconciliation
//! algorithms that keep them consistent.
//!
//! Everything here is deterministic domain logic (no IO, no storage). Each
//! document is an aggregate whose `handle` decides events and whose `apply`
//! evolves state; cross-document work is orchestrated by `procura-infra`.

pub mod agreement;
pub mod bill;
pub mod blanket;
pub mod consumption;
pub mod flow;
pub mod journal;
pub mod landed_cost;
pub mod matching;
pub mod order;
pub mod purchase_return;
pub mod receipt;
pub mod reference;
pub mod request;
pub mod rfq;

pub use agreement::{
    AgreementCommand, AgreementEvent, AgreementStatus, CreatePurchaseAgreement, PurchaseAgreement,
};
pub use bill::{
    BillLine, BillLineInput, BillStatus, CreateVendorBill, VendorBill, VendorBillCommand,
    VendorBillEvent,
};
pub use blanket::{
    BlanketLineInput, BlanketOrder, BlanketOrderCommand, BlanketOrderEvent, BlanketOrderLine,
    BlanketOrderStatus, CreateBlanketOrder, ReleaseLine,
};
pub use consumption::{ConsumptionSummary, ReleaseSummary, RemainingQuantity};
pub use flow::{DocumentLinks, FlowEdge, FlowGraph, FlowNode, FlowRelation};
pub use journal::{JournalEntry, JournalLine, PostingAccount};
pub use landed_cost::{AllocationBasis, AllocationMethod, AppliedMethod, LandedCostType};
pub use matching::{
    CreateThreeWayMatch, Discrepancy, DiscrepancyType, MatchInput, MatchOutcome, MatchStatus,
    MatchTolerances, ThreeWayMatch, ThreeWayMatchCommand, ThreeWayMatchEvent,
};
pub use order::{
    CreatePurchaseOrder, OrderLineInput, OrderOrigin, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderEvent, PurchaseOrderLine, PurchaseOrderStatus,
};
pub use purchase_return::{
    CreatePurchaseReturn, PurchaseReturn, PurchaseReturnCommand, PurchaseReturnEvent,
    ReturnLineInput, ReturnStatus,
};
pub use receipt::{
    CreateGoodsReceipt, GoodsReceipt, GoodsReceiptCommand, GoodsReceiptEvent, QcStatus,
    ReceiptLineInput, ReceiptStatus,
};
pub use reference::{
    BlanketOrderId, DocumentKind, DocumentRef, GoodsReceiptId, LineQuantity, ProductId,
    PurchaseAgreementId, PurchaseOrderId, PurchaseRequestId, PurchaseReturnId, RfqId,
    ThreeWayMatchId, VendorBillId, VendorId, WarehouseId,
};
pub use request::{
    ConversionTarget, CreatePurchaseRequest, PurchaseRequest, PurchaseRequestCommand,
    PurchaseRequestEvent, PurchaseRequestStatus, RequestLineInput,
};
pub use rfq::{CreateRfq, QuotedPrice, Rfq, RfqCommand, RfqEvent, RfqLine, RfqStatus};
