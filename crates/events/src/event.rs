use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are immutable facts, versioned for schema evolution, and named
/// `<context>.<document>.<change>` (e.g. "procurement.purchase_order.approved").
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier.
    fn event_type(&self) -> &'static str;

    /// Aggregate type the event belongs to (e.g. "procurement.purchase_order").
    fn aggregate_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32 {
        1
    }

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
