//! Closed status enums with explicit transition tables.
//!
//! Each document status type lists its allowed edges once, in a static table.
//! Every guarded transition goes through [`Lifecycle::transition_to`], which
//! either returns the target status or an `InvalidStateTransition` naming the
//! document, the current status and the attempted target.

use crate::error::{DomainError, DomainResult};

pub trait Lifecycle: Copy + Eq + core::fmt::Debug + core::fmt::Display + 'static {
    /// Human-readable document name used in error messages.
    const DOCUMENT: &'static str;

    /// Allowed `(from, to)` edges.
    const TRANSITIONS: &'static [(Self, Self)];

    fn can_transition_to(self, next: Self) -> bool {
        Self::TRANSITIONS
            .iter()
            .any(|&(from, to)| from == self && to == next)
    }

    /// Guard: returns `next` when the edge exists, otherwise an
    /// `InvalidStateTransition` error.
    fn transition_to(self, next: Self) -> DomainResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::transition(Self::DOCUMENT, self, next))
        }
    }

    /// A status with no outgoing edges.
    fn is_terminal(self) -> bool {
        !Self::TRANSITIONS.iter().any(|&(from, _)| from == self)
    }
}

/// Structural check of a transition table: no self-loops, no duplicate edges,
/// and every status reachable from `initial`.
pub fn check_transition_table<L: Lifecycle>(initial: L, all: &[L]) -> Result<(), String> {
    for (idx, &(from, to)) in L::TRANSITIONS.iter().enumerate() {
        if from == to {
            return Err(format!("{}: self-loop on '{from}'", L::DOCUMENT));
        }
        if L::TRANSITIONS[..idx].contains(&(from, to)) {
            return Err(format!("{}: duplicate edge '{from}' -> '{to}'", L::DOCUMENT));
        }
    }

    let mut reached = vec![initial];
    let mut frontier = vec![initial];
    while let Some(state) = frontier.pop() {
        for &(from, to) in L::TRANSITIONS {
            if from == state && !reached.contains(&to) {
                reached.push(to);
                frontier.push(to);
            }
        }
    }

    match all.iter().find(|s| !reached.contains(s)) {
        Some(orphan) => Err(format!("{}: '{orphan}' is unreachable", L::DOCUMENT)),
        None => Ok(()),
    }
}

/// Declare a document status enum together with its transition table.
///
/// ```ignore
/// lifecycle! {
///     pub enum ReceiptStatus for "goods receipt" {
///         Draft = "draft",
///         Posted = "posted",
///     }
///     transitions {
///         Draft => [Posted],
///         Posted => [],
///     }
/// }
/// ```
#[macro_export]
macro_rules! lifecycle {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $doc:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $label:literal ),+ $(,)?
        }
        transitions {
            $( $from:ident => [ $( $to:ident ),* $(,)? ] ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant, )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::Lifecycle for $name {
            const DOCUMENT: &'static str = $doc;
            const TRANSITIONS: &'static [($name, $name)] = &[
                $( $( ($name::$from, $name::$to), )* )*
            ];
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    lifecycle! {
        enum Door for "door" {
            Closed = "closed",
            Open = "open",
            Welded = "welded",
        }
        transitions {
            Closed => [Open, Welded],
            Open => [Closed],
            Welded => [],
        }
    }

    #[test]
    fn allowed_edge_returns_target() {
        assert_eq!(Door::Closed.transition_to(Door::Open).unwrap(), Door::Open);
    }

    #[test]
    fn disallowed_edge_names_both_states() {
        let err = Door::Welded.transition_to(Door::Open).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                document: "door",
                from: "welded".to_string(),
                to: "open".to_string(),
            }
        );
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        assert!(Door::Welded.is_terminal());
        assert!(!Door::Open.is_terminal());
    }

    #[test]
    fn table_check_detects_unreachable_states() {
        assert!(check_transition_table(Door::Closed, Door::ALL).is_ok());
        let err = check_transition_table(Door::Welded, Door::ALL).unwrap_err();
        assert!(err.contains("unreachable"));
    }
}
