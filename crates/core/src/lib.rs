//! `procura-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the acting-user context, the aggregate and lifecycle traits,
//! the domain error model and the money/tax value objects.

pub mod actor;
pub mod aggregate;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod money;
pub mod value_object;

pub use actor::Actor;
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use lifecycle::{Lifecycle, check_transition_table};
pub use money::{CURRENCY_SCALE, DocumentTotals, Money, TaxMode, TaxRates, round_currency};
pub use value_object::ValueObject;

// Re-exported for the `typed_id!` / `lifecycle!` macros and downstream crates.
pub use rust_decimal::Decimal;
