//! `procura-events`: domain event mechanics.
//!
//! Aggregates return typed events; the orchestrating unit of work wraps them
//! in [`EventEnvelope`]s and hands them to an injected [`EventBus`] after a
//! successful commit. Nothing in here knows about procurement documents.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
