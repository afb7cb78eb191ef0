//! # Void promises
//!
//! A "void" promise carries no value on resolution. Since `()` is `Clone`
//! (trivially) and `'static`, [`crate::value::Promise`]'s entire generic
//! surface already applies to `Promise<()>` — component F collapses to a
//! handful of ergonomic, zero-argument-closure wrappers around the value
//! surface rather than a parallel implementation (see the Open Question
//! resolution in the design notes).

use crate::value::Promise;

/// A promise that resolves with no payload.
pub type VoidPromise = Promise<()>;

impl Promise<()> {
    /// A promise already resolved with no value.
    pub fn resolved_void() -> Self {
        Self::resolved(())
    }

    /// `Then(Func<Promise<U>> f)` on a void source: ergonomic zero-argument
    /// form of [`Promise::then`].
    pub fn then_void<U: Clone + 'static>(
        &self,
        on_resolved: impl FnOnce() -> Promise<U> + 'static,
    ) -> Promise<U> {
        self.then(move |()| on_resolved())
    }

    /// `Then(Action f)` on a void source: ergonomic zero-argument form of
    /// [`Promise::then_action`].
    pub fn then_action_void(&self, f: impl FnOnce() + 'static) -> Promise<()> {
        self.then_action(move |()| f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn then_void_chains_without_an_explicit_unit_argument() {
        let p = VoidPromise::pending();
        let chained = p.then_void(|| VoidPromise::resolved_void());
        p.resolve(());
        assert!(matches!(
            chained.state_kind(),
            crate::state::StateKind::Resolved
        ));
    }

    #[test]
    fn resolved_void_is_resolved_immediately() {
        let p = VoidPromise::resolved_void();
        assert!(matches!(p.state_kind(), crate::state::StateKind::Resolved));
    }
}
