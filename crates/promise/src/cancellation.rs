//! # Cancellation convertor
//!
//! *(Supplemented feature.)* §6 names `FromCancellationTokenSource` as an
//! external-interface convertor without detailing its shape. Rendered here as
//! a small trait any host cancellation primitive can implement, plus a free
//! function that wires it to a fresh void promise's `OnCancel` handler — so a
//! caller can plug this library into whatever cancellation primitive their
//! host environment already has without the core crate depending on any of
//! them.

use crate::void::VoidPromise;

/// Something that can be told to cancel, from the host environment's own
/// cancellation primitive (a cancellation token, an `AtomicBool` flag, a
/// channel close, ...).
pub trait CancellationSource {
    fn cancel(&self);
}

/// A void promise whose cancellation is forwarded to `source`.
///
/// The promise itself is otherwise a plain pending promise: callers settle it
/// (or cancel it) the same way as any other, and cancelling it additionally
/// invokes `source.cancel()`.
pub fn from_cancellation_source(source: impl CancellationSource + 'static) -> VoidPromise {
    let promise = VoidPromise::pending();
    promise.on_cancel(move || source.cancel());
    promise
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateKind;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FlagSource(Rc<Cell<bool>>);

    impl CancellationSource for FlagSource {
        fn cancel(&self) {
            self.0.set(true);
        }
    }

    #[test]
    fn cancelling_the_promise_invokes_the_source() {
        let flag = Rc::new(Cell::new(false));
        let promise = from_cancellation_source(FlagSource(flag.clone()));
        promise.cancel();
        assert!(flag.get());
        assert!(matches!(promise.state_kind(), StateKind::Cancelled));
    }

    #[test]
    fn settling_normally_never_touches_the_source() {
        let flag = Rc::new(Cell::new(false));
        let promise = from_cancellation_source(FlagSource(flag.clone()));
        promise.resolve(());
        assert!(!flag.get());
    }
}
