//! # Identity
//!
//! Process-wide promise identity: a monotonically increasing id plus an
//! optional diagnostic name.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A unique, immutable identifier assigned to a promise at construction.
///
/// Ids are allocated from a single process-wide counter so that they stay
/// unique even across unrelated chains. Allocation uses an atomic so it is
/// safe even if independent single-threaded arenas end up running on
/// different threads of the same process; the promises themselves are still
/// not safe to share across threads (see the crate's concurrency notes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    /// Allocate the next id in sequence.
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw integer value, for diagnostics.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = PromiseId::next();
        let b = PromiseId::next();
        assert!(b.value() > a.value());
    }

    #[test]
    fn display_has_hash_prefix() {
        let id = PromiseId::next();
        assert!(id.to_string().starts_with('#'));
    }
}
