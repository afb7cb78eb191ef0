//! # State
//!
//! The four-state lifecycle shared by every promise: `Pending` is the only
//! non-terminal state; `Resolved`, `Rejected`, and `Cancelled` are terminal
//! and, once reached, never change (invariant 1 of the data model).

use std::rc::Rc;

use crate::error::PromiseError;

/// The full state of a promise, including any terminal payload.
///
/// `Rejected` holds an `Rc<PromiseError>` rather than a bare `PromiseError`
/// because `anyhow::Error` is not `Clone`: a combinator that forwards a
/// rejection it did not itself originate (`Then`, `All`, `Race`, `First`,
/// `Sequence`, ...) clones the `Rc` instead of reconstructing a new error
/// from a formatted string, so the original error's concrete type and source
/// chain survive every hop.
pub enum PromiseState<T> {
    Pending,
    Resolved(T),
    Rejected(Rc<PromiseError>),
    Cancelled,
}

impl<T> PromiseState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn kind(&self) -> StateKind {
        match self {
            PromiseState::Pending => StateKind::Pending,
            PromiseState::Resolved(_) => StateKind::Resolved,
            PromiseState::Rejected(_) => StateKind::Rejected,
            PromiseState::Cancelled => StateKind::Cancelled,
        }
    }
}

/// A promise's state without its payload.
///
/// Useful wherever the chain graph needs to inspect or compare states across
/// promises of differing value types `T` (the graph itself is type-erased —
/// see [`crate::node`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateKind {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

impl StateKind {
    pub fn is_pending(self) -> bool {
        matches!(self, StateKind::Pending)
    }
}
