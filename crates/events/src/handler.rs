use procura_core::{Actor, Aggregate};

/// Execute an aggregate command deterministically (no IO).
///
/// 1. **Decide**: `aggregate.handle(actor, command)` produces events without
///    touching state; a rejected command leaves the aggregate unchanged.
/// 2. **Evolve**: each event is applied, bumping the aggregate version.
///
/// Persisting and publishing the returned events is the caller's job (the
/// unit of work in `procura-infra`).
pub fn execute<A>(
    aggregate: &mut A,
    actor: &Actor,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = aggregate.handle(actor, command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
