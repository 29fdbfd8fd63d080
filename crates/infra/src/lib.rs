//! Infrastructure layer: the unit-of-work store, the procurement services
//! that orchestrate cross-document work, collaborator ports and config.

pub mod config;
pub mod error;
pub mod flow;
pub mod ports;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::ProcurementConfig;
pub use error::{ServiceError, ServiceResult};
pub use services::{
    Collaborators, NewBlanketOrder, NewPurchaseAgreement, NewPurchaseOrder, NewVendorBill,
    ProcurementBus, ProcurementService, ReleaseQuantity, ReleaseRequest,
};
pub use store::{InMemoryDocumentStore, Tables, Transaction};
