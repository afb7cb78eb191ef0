//! # Errors
//!
//! A promise's rejection reason is a single, open-ended error type so that any
//! producer-side failure (an I/O error, a parse error, a user-defined fault)
//! can flow through the same chain without a per-chain error type parameter —
//! the same role `System.Exception` plays in the library this crate's
//! semantics are modeled on.

use thiserror::Error;

/// The uniform rejection payload carried by a rejected promise.
///
/// This is a type alias rather than a newtype so that `?` and `From`
/// conversions from any `std::error::Error` work without extra ceremony.
pub type PromiseError = anyhow::Error;

/// Faults the library itself can produce, distinct from producer/user errors.
///
/// These convert into [`PromiseError`] via `From` so they can be used
/// anywhere a rejection reason is expected.
#[derive(Debug, Error)]
pub enum CombinatorError {
    /// `Race` was called with zero input promises.
    #[error("Race() requires at least one promise")]
    EmptyRace,

    /// A chain operation would have made a promise its own ancestor.
    #[error("refusing to attach promise {child} as a descendant of itself via {parent}")]
    SelfParent {
        /// The promise that attempted to attach a parent.
        child: crate::id::PromiseId,
        /// The parent that would have closed the cycle.
        parent: crate::id::PromiseId,
    },
}
