//! # Value-carrying promises
//!
//! [`Promise<T>`] is the library's one concrete handle type; a "void promise"
//! (see [`crate::void`]) is simply `Promise<()>`. A promise is a cheap,
//! `Clone`-able handle (an `Rc` underneath) onto a shared [`Inner<T>`] — every
//! clone observes and can drive the same underlying state machine.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::diagnostics;
use crate::error::PromiseError;
use crate::handlers::HandlerQueue;
use crate::id::PromiseId;
use crate::node::{self, ChainNode};
use crate::state::{PromiseState, StateKind};

type ResolveHandler<T> = Box<dyn FnOnce(&T)>;
// Reject handlers receive an owned `Rc` clone (a refcount bump) rather than a
// borrowed `&PromiseError`, so that a handler which simply forwards the
// rejection onward (`Then`, `All`, `Race`, `First`, `Sequence`, ...) can pass
// the very same error object down the chain instead of reconstructing one
// from a formatted string.
type RejectHandler = Box<dyn FnOnce(Rc<PromiseError>)>;
type CancelHandler = Box<dyn FnOnce()>;
type ProgressHandler = Box<dyn FnMut(f64)>;

struct Inner<T> {
    id: PromiseId,
    name: Option<String>,
    state: RefCell<PromiseState<T>>,
    resolve_handlers: RefCell<HandlerQueue<ResolveHandler<T>>>,
    reject_handlers: RefCell<HandlerQueue<RejectHandler>>,
    cancel_handlers: RefCell<HandlerQueue<CancelHandler>>,
    progress_handlers: RefCell<HandlerQueue<ProgressHandler>>,
    parent: RefCell<Option<Weak<dyn ChainNode>>>,
    children: RefCell<Vec<Weak<dyn ChainNode>>>,
}

/// A one-shot container for an asynchronous outcome: a value, an error, or a
/// cancellation.
///
/// Cloning a `Promise` clones the handle, not the outcome — every clone shares
/// one underlying state machine, the same way `Rc::clone` shares one
/// allocation.
pub struct Promise<T>(Rc<Inner<T>>);

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("state", &self.0.state.borrow().kind())
            .finish()
    }
}

impl<T: 'static> ChainNode for Inner<T> {
    fn node_id(&self) -> PromiseId {
        self.id
    }

    fn node_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn state_kind(&self) -> StateKind {
        self.state.borrow().kind()
    }

    fn cancel_self(&self) {
        if !self.state.borrow().is_pending() {
            return;
        }
        *self.state.borrow_mut() = PromiseState::Cancelled;
        diagnostics::untrack_pending(self.id);
        for handler in self.cancel_handlers.borrow_mut().drain() {
            handler();
        }
        self.clear_handlers();
    }

    fn parent_node(&self) -> Option<Rc<dyn ChainNode>> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn set_parent_node(&self, parent: Weak<dyn ChainNode>) {
        *self.parent.borrow_mut() = Some(parent);
    }

    fn add_child_node(&self, child: Weak<dyn ChainNode>) {
        self.children.borrow_mut().push(child);
    }

    fn child_nodes(&self) -> Vec<Weak<dyn ChainNode>> {
        self.children.borrow().clone()
    }
}

impl<T: 'static> Inner<T> {
    fn clear_handlers(&self) {
        self.resolve_handlers.borrow_mut().drain();
        self.reject_handlers.borrow_mut().drain();
        self.cancel_handlers.borrow_mut().drain();
        self.progress_handlers.borrow_mut().drain();
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// A fresh, unnamed promise in the `Pending` state.
    pub fn pending() -> Self {
        Self::pending_named(None)
    }

    /// A fresh `Pending` promise carrying a diagnostic name.
    pub fn pending_named(name: impl Into<Option<String>>) -> Self {
        let inner = Rc::new(Inner {
            id: PromiseId::next(),
            name: name.into(),
            state: RefCell::new(PromiseState::Pending),
            resolve_handlers: RefCell::new(HandlerQueue::default()),
            reject_handlers: RefCell::new(HandlerQueue::default()),
            cancel_handlers: RefCell::new(HandlerQueue::default()),
            progress_handlers: RefCell::new(HandlerQueue::default()),
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
        });
        let promise = Promise(inner);
        diagnostics::track_pending(promise.id(), promise.weak_node());
        promise
    }

    /// A promise already `Resolved` with `value`. No tracking side effects.
    pub fn resolved(value: T) -> Self {
        let promise = Self::pending_named(None);
        diagnostics::untrack_pending(promise.id());
        *promise.0.state.borrow_mut() = PromiseState::Resolved(value);
        promise
    }

    /// A promise already `Rejected` with `error`. No tracking side effects.
    pub fn rejected(error: impl Into<PromiseError>) -> Self {
        Self::rejected_rc(Rc::new(error.into()))
    }

    /// Like [`Self::rejected`] but takes an already-shared error, so a
    /// forwarding combinator can reuse the original `Rc` instead of wrapping
    /// a fresh one.
    pub(crate) fn rejected_rc(error: Rc<PromiseError>) -> Self {
        let promise = Self::pending_named(None);
        diagnostics::untrack_pending(promise.id());
        *promise.0.state.borrow_mut() = PromiseState::Rejected(error);
        promise
    }

    /// A promise already `Cancelled`. No tracking side effects.
    pub fn canceled() -> Self {
        let promise = Self::pending_named(None);
        diagnostics::untrack_pending(promise.id());
        *promise.0.state.borrow_mut() = PromiseState::Cancelled;
        promise
    }

    pub fn id(&self) -> PromiseId {
        self.0.id
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn state_kind(&self) -> StateKind {
        self.0.state.borrow().kind()
    }

    /// This promise as a node in the type-erased chain graph.
    pub fn as_chain_node(&self) -> Rc<dyn ChainNode> {
        self.0.clone() as Rc<dyn ChainNode>
    }

    fn weak_node(&self) -> Weak<dyn ChainNode> {
        Rc::downgrade(&self.0) as Weak<dyn ChainNode>
    }

    /// `Resolve(value)`: permitted only while `Pending`.
    pub fn resolve(&self, value: T) {
        if !self.try_resolve(value) {
            diagnostics::sink().on_state_exception(&format!(
                "Resolve() called on promise {} that is not Pending",
                self.id()
            ));
        }
    }

    /// `TryResolve(value)`: identical to [`Self::resolve`] but reports whether
    /// the transition actually happened.
    pub fn try_resolve(&self, value: T) -> bool {
        if !self.0.state.borrow().is_pending() {
            return false;
        }
        *self.0.state.borrow_mut() = PromiseState::Resolved(value);
        diagnostics::untrack_pending(self.id());
        let handlers = self.0.resolve_handlers.borrow_mut().drain();
        let value_ref = self.0.state.borrow();
        let PromiseState::Resolved(ref value) = *value_ref else {
            unreachable!("state was just set to Resolved");
        };
        for handler in handlers {
            handler(value);
        }
        drop(value_ref);
        self.0.clear_handlers();
        true
    }

    /// `Reject(error)`: permitted only while `Pending`; reports `OnException`
    /// before the transition, unlike [`Self::reject_silent`].
    pub fn reject(&self, error: impl Into<PromiseError>) {
        let error = error.into();
        if !self.0.state.borrow().is_pending() {
            diagnostics::sink().on_state_exception(&format!(
                "Reject() called on promise {} that is not Pending: {error}",
                self.id()
            ));
            return;
        }
        diagnostics::sink().on_exception(&error.to_string());
        self.reject_silent(error);
    }

    /// `RejectSilent(error)`: identical gating to [`Self::reject`] but does
    /// not report `OnException` — used when the error was already logged by
    /// whoever is forwarding it.
    pub fn reject_silent(&self, error: impl Into<PromiseError>) {
        self.reject_silent_rc(Rc::new(error.into()));
    }

    /// Like [`Self::reject_silent`] but takes an already-shared error,
    /// forwarding it unchanged instead of boxing a new one. Every combinator
    /// that relays a rejection it did not itself originate (`Then`, `All`,
    /// `Race`, `First`, `Sequence`, ...) goes through this so the original
    /// error's concrete type and source chain survive the hop.
    pub(crate) fn reject_silent_rc(&self, error: Rc<PromiseError>) {
        if !self.0.state.borrow().is_pending() {
            diagnostics::sink().on_state_exception(&format!(
                "Reject() called on promise {} that is not Pending: {error}",
                self.id()
            ));
            return;
        }
        diagnostics::untrack_pending(self.id());
        let handlers = self.0.reject_handlers.borrow_mut().drain();
        *self.0.state.borrow_mut() = PromiseState::Rejected(error.clone());
        for handler in handlers {
            handler(error.clone());
        }
        self.0.clear_handlers();
    }

    /// `ReportProgress(p)`: fires every registered progress handler, in
    /// registration order. No-op (besides the handlers seeing it) while
    /// terminal.
    pub fn report_progress(&self, p: f64) {
        if !self.0.state.borrow().is_pending() {
            return;
        }
        let mut handlers = self.0.progress_handlers.borrow_mut().drain();
        for handler in handlers.iter_mut() {
            handler(p);
        }
        self.0.progress_handlers.borrow_mut().restore_front(handlers);
    }

    /// `Cancel()`: §4.4 — walk to the topmost pending ancestor, then cancel
    /// down to (and including) this promise.
    pub fn cancel(&self) {
        node::cancel(&self.as_chain_node());
    }

    /// `CancelSelf()`: a no-op unless `Pending`.
    pub fn cancel_self(&self) {
        ChainNode::cancel_self(&*self.0);
    }

    /// `CancelSelfAndAllChildren()`.
    pub fn cancel_self_and_all_children(&self) {
        node::cancel_self_and_all_children(&self.as_chain_node());
    }

    fn attach_as_child_of<U: 'static>(&self, result: &Promise<U>) {
        node::attach_parent(&result.as_chain_node(), &self.as_chain_node());
    }

    /// The `install(resolveH, rejectH, cancelH)` primitive from §4.2: dispatch
    /// immediately if this promise is already terminal, otherwise enqueue all
    /// three handlers to run on the eventual transition. Used by the static
    /// combinators, which subscribe to arbitrary input promises without
    /// producing a chained result promise of their own.
    pub(crate) fn subscribe(
        &self,
        on_resolved: impl FnOnce(&T) + 'static,
        on_rejected: impl FnOnce(Rc<PromiseError>) + 'static,
        on_cancelled: impl FnOnce() + 'static,
    ) {
        match &*self.0.state.borrow() {
            PromiseState::Resolved(v) => {
                on_resolved(v);
                return;
            }
            PromiseState::Rejected(e) => {
                on_rejected(e.clone());
                return;
            }
            PromiseState::Cancelled => {
                on_cancelled();
                return;
            }
            PromiseState::Pending => {}
        }
        self.0.resolve_handlers.borrow_mut().push(Box::new(on_resolved));
        self.0.reject_handlers.borrow_mut().push(Box::new(on_rejected));
        self.0.cancel_handlers.borrow_mut().push(Box::new(on_cancelled));
    }

    /// Subscribe `on_progress` to this promise's progress queue. Silently
    /// ignored if the promise is already terminal. Always returns `self`.
    pub fn progress(&self, mut on_progress: impl FnMut(f64) + 'static) -> Self {
        if self.0.state.borrow().is_pending() {
            self.0
                .progress_handlers
                .borrow_mut()
                .push(Box::new(move |p| on_progress(p)));
        }
        self.clone()
    }

    /// Install a handler invoked only on cancellation, directly on this
    /// promise (no new promise is created).
    pub fn on_cancel(&self, on_cancel: impl FnOnce() + 'static) {
        match &*self.0.state.borrow() {
            PromiseState::Cancelled => on_cancel(),
            PromiseState::Pending => {
                self.0
                    .cancel_handlers
                    .borrow_mut()
                    .push(Box::new(on_cancel));
            }
            _ => {}
        }
    }

    /// `Then(Func<T, Promise<U>> f)`: chain into another promise-producing
    /// continuation. Rejection and cancellation are forwarded unchanged.
    pub fn then<U: Clone + 'static>(
        &self,
        on_resolved: impl FnOnce(T) -> Promise<U> + 'static,
    ) -> Promise<U> {
        self.then_or_catch_rc(on_resolved, move |e| Promise::rejected_rc(e))
    }

    /// `Then(Func<T, U> transform)`: equivalent to
    /// `Then(v => Resolved(transform(v)))`, with no possibility of a fault.
    pub fn then_value<U: Clone + 'static>(
        &self,
        transform: impl FnOnce(T) -> U + 'static,
    ) -> Promise<U> {
        self.then(move |v| Promise::resolved(transform(v)))
    }

    /// `Then(Func<T, Result<U, Error>> transform)`: per §4.1's dispatch rule,
    /// a fault from `transform` is reported to the sink and rejects the
    /// result instead of propagating out of the dispatch call.
    pub fn then_value_try<U: Clone + 'static>(
        &self,
        transform: impl FnOnce(T) -> Result<U, PromiseError> + 'static,
    ) -> Promise<U> {
        self.then(move |v| match transform(v) {
            Ok(value) => Promise::resolved(value),
            Err(error) => {
                diagnostics::sink().on_exception(&error.to_string());
                Promise::rejected(error)
            }
        })
    }

    /// `Then(Action<T> f)`: run a side-effecting action, then resolve the
    /// result with no value. A fault in `f` rejects the result.
    pub fn then_action(&self, f: impl FnOnce(T) + 'static) -> Promise<()> {
        self.then_value(f)
    }

    /// `Then(Action<T> f)` where `f` is fallible: a fault rejects the result
    /// instead of propagating out of the dispatch call.
    pub fn then_action_try(
        &self,
        f: impl FnOnce(T) -> Result<(), PromiseError> + 'static,
    ) -> Promise<()> {
        self.then_value_try(f)
    }

    /// `Then(resolveH, rejectH)`: the full two-handed overload, where a
    /// rejection is handled by producing a recovery promise instead of being
    /// forwarded automatically.
    pub fn then_or_catch<U: Clone + 'static>(
        &self,
        on_resolved: impl FnOnce(T) -> Promise<U> + 'static,
        on_rejected: impl FnOnce(&PromiseError) -> Promise<U> + 'static,
    ) -> Promise<U> {
        self.then_or_catch_rc(on_resolved, move |error| on_rejected(&error))
    }

    /// The real foundation behind [`Self::then`] and [`Self::then_or_catch`]:
    /// operates on the shared `Rc<PromiseError>` so a rejection handler that
    /// merely forwards the error (as [`Self::then`] does via
    /// [`Promise::rejected_rc`]) never has to reconstruct one.
    fn then_or_catch_rc<U: Clone + 'static>(
        &self,
        on_resolved: impl FnOnce(T) -> Promise<U> + 'static,
        on_rejected: impl FnOnce(Rc<PromiseError>) -> Promise<U> + 'static,
    ) -> Promise<U> {
        // Fast path: a Resolved source dispatches synchronously and, per
        // §4.1, returns the continuation's promise directly with no chain
        // edge recorded.
        if let PromiseState::Resolved(value) = &*self.0.state.borrow() {
            return on_resolved(value.clone());
        }
        if let PromiseState::Rejected(error) = &*self.0.state.borrow() {
            let continuation = on_rejected(error.clone());
            let result = Promise::<U>::pending_named(self.0.name.clone());
            self.attach_as_child_of(&result);
            bridge(result.clone(), continuation);
            return result;
        }
        if let PromiseState::Cancelled = &*self.0.state.borrow() {
            let result = Promise::<U>::pending();
            self.attach_as_child_of(&result);
            result.cancel_self();
            return result;
        }

        let result = Promise::<U>::pending_named(self.0.name.clone());
        self.attach_as_child_of(&result);

        let resolve_result = result.clone();
        self.0
            .resolve_handlers
            .borrow_mut()
            .push(Box::new(move |v| {
                bridge(resolve_result, on_resolved(v.clone()));
            }));

        let reject_result = result.clone();
        self.0
            .reject_handlers
            .borrow_mut()
            .push(Box::new(move |e| {
                bridge(reject_result, on_rejected(e));
            }));

        let cancel_result = result.clone();
        self.0
            .cancel_handlers
            .borrow_mut()
            .push(Box::new(move || cancel_result.cancel_self()));

        result
    }

    /// `Catch(Func<Exception, T>)`: recover from a rejection by mapping the
    /// error into a replacement value. If the source is already `Resolved`,
    /// returns the source itself (no chain edge, since nothing downstream of
    /// a `Resolved` source can ever observe a rejection).
    pub fn catch(&self, recover: impl FnOnce(&PromiseError) -> T + 'static) -> Promise<T> {
        self.catch_try(move |e| Ok(recover(e)))
    }

    /// `Catch` where `recover` is fallible: a fault rejects the result
    /// instead of propagating out of the dispatch call.
    pub fn catch_try(
        &self,
        recover: impl FnOnce(&PromiseError) -> Result<T, PromiseError> + 'static,
    ) -> Promise<T> {
        if matches!(&*self.0.state.borrow(), PromiseState::Resolved(_)) {
            return self.clone();
        }
        if let PromiseState::Rejected(error) = &*self.0.state.borrow() {
            let result = Promise::<T>::pending();
            self.attach_as_child_of(&result);
            settle_try_result(&result, recover(error));
            return result;
        }
        if matches!(&*self.0.state.borrow(), PromiseState::Cancelled) {
            let result = Promise::<T>::pending();
            self.attach_as_child_of(&result);
            result.cancel_self();
            return result;
        }

        let result = Promise::<T>::pending();
        self.attach_as_child_of(&result);

        let resolve_result = result.clone();
        self.0
            .resolve_handlers
            .borrow_mut()
            .push(Box::new(move |v| resolve_result.resolve(v.clone())));

        let reject_result = result.clone();
        self.0.reject_handlers.borrow_mut().push(Box::new(move |e| {
            settle_try_result(&reject_result, recover(&e));
        }));

        let cancel_result = result.clone();
        self.0
            .cancel_handlers
            .borrow_mut()
            .push(Box::new(move || cancel_result.cancel_self()));

        result
    }

    /// `Catch(Action<Exception>)`: returns a void promise. Resolves on any
    /// outcome; the action runs only on rejection.
    pub fn catch_ignore(&self, on_rejected: impl FnOnce(&PromiseError) + 'static) -> Promise<()> {
        self.catch_ignore_try(move |e| {
            on_rejected(e);
            Ok(())
        })
    }

    /// `Catch(Action<Exception>)` where the action is fallible: a fault
    /// rejects the result instead of propagating out of the dispatch call.
    pub fn catch_ignore_try(
        &self,
        on_rejected: impl FnOnce(&PromiseError) -> Result<(), PromiseError> + 'static,
    ) -> Promise<()> {
        if matches!(&*self.0.state.borrow(), PromiseState::Resolved(_)) {
            return Promise::resolved(());
        }
        if let PromiseState::Rejected(error) = &*self.0.state.borrow() {
            let result = Promise::<()>::pending();
            self.attach_as_child_of(&result);
            settle_try_result(&result, on_rejected(error));
            return result;
        }
        if matches!(&*self.0.state.borrow(), PromiseState::Cancelled) {
            let result = Promise::<()>::pending();
            self.attach_as_child_of(&result);
            result.cancel_self();
            return result;
        }

        let result = Promise::<()>::pending();
        self.attach_as_child_of(&result);

        let resolve_result = result.clone();
        self.0
            .resolve_handlers
            .borrow_mut()
            .push(Box::new(move |_| resolve_result.resolve(())));

        let reject_result = result.clone();
        self.0.reject_handlers.borrow_mut().push(Box::new(move |e| {
            settle_try_result(&reject_result, on_rejected(&e));
        }));

        let cancel_result = result.clone();
        self.0
            .cancel_handlers
            .borrow_mut()
            .push(Box::new(move || cancel_result.cancel_self()));

        result
    }

    /// The shared plumbing behind `Finally` and `ContinueWith`: a void
    /// promise `P` that settles to `Resolved` no matter which of resolve,
    /// reject, or cancel this promise reaches (§4.2: "on any of source
    /// {resolve, reject, cancel}, P is Resolved"). Unlike `Catch`, a
    /// cancellation here does *not* propagate as a cancellation of `P` — the
    /// whole point is that the follow-up action/continuation always runs.
    /// Only a `Resolved` source is exempt from the chain-attach rule (it has
    /// nothing left to report); `Rejected` and `Cancelled` sources still
    /// attach `P` as a child so the chain graph stays accurate.
    fn settle_as_void(&self) -> Promise<()> {
        if matches!(&*self.0.state.borrow(), PromiseState::Resolved(_)) {
            return Promise::resolved(());
        }
        if matches!(
            &*self.0.state.borrow(),
            PromiseState::Rejected(_) | PromiseState::Cancelled
        ) {
            let result = Promise::<()>::pending();
            self.attach_as_child_of(&result);
            result.resolve(());
            return result;
        }

        let result = Promise::<()>::pending();
        self.attach_as_child_of(&result);

        let resolve_result = result.clone();
        self.0
            .resolve_handlers
            .borrow_mut()
            .push(Box::new(move |_| resolve_result.resolve(())));

        let reject_result = result.clone();
        self.0
            .reject_handlers
            .borrow_mut()
            .push(Box::new(move |_| reject_result.resolve(())));

        let cancel_result = result.clone();
        self.0
            .cancel_handlers
            .borrow_mut()
            .push(Box::new(move || cancel_result.resolve(())));

        result
    }

    /// `Finally(Action)`: the action runs exactly once, regardless of
    /// outcome, via an intermediate void promise. Returns the tail of that
    /// chain (its own faults do not propagate back onto `self`'s consumers).
    pub fn finally(&self, action: impl FnOnce() + 'static) -> Promise<()> {
        self.settle_as_void().then_action(move |()| action())
    }

    /// `ContinueWith(Func<Promise<U>> f)`: the source's own outcome is
    /// entirely masked; `f` runs once the source settles in any way.
    pub fn continue_with<U: Clone + 'static>(
        &self,
        f: impl FnOnce() -> Promise<U> + 'static,
    ) -> Promise<U> {
        self.settle_as_void().then(move |()| f())
    }

    /// `ThenAll`: `Then(v => All(chain(v)))`.
    pub fn then_all<U: Clone + 'static>(
        &self,
        chain: impl FnOnce(T) -> Vec<Promise<U>> + 'static,
    ) -> Promise<Vec<U>> {
        self.then(move |v| crate::statics::all(chain(v)))
    }

    /// `ThenRace`: `Then(v => Race(chain(v)))`.
    pub fn then_race<U: Clone + 'static>(
        &self,
        chain: impl FnOnce(T) -> Vec<Promise<U>> + 'static,
    ) -> Promise<U> {
        self.then(move |v| crate::statics::race(chain(v)))
    }

    /// Terminal operator: attaches a `Catch` that forwards any otherwise
    /// unhandled rejection to the diagnostic sink. No-op if already
    /// `Resolved`.
    pub fn done(&self) {
        if matches!(&*self.0.state.borrow(), PromiseState::Resolved(_)) {
            return;
        }
        let id = self.id();
        let name = self.0.name.clone();
        self.catch_ignore(move |error| {
            propagate_unhandled_exception(id, name.as_deref(), error);
        });
    }

    /// Like [`Self::done`] but also attaches a resolve-side observer.
    pub fn done_with(&self, on_resolved: impl FnOnce(T) + 'static) {
        let id = self.id();
        let name = self.0.name.clone();
        self.then_action(on_resolved)
            .catch_ignore(move |error| {
                propagate_unhandled_exception(id, name.as_deref(), error);
            });
    }
}

/// §4.1's dispatch-rule guard: a callback that returned `Err` had a fault,
/// which is reported to the sink and turned into a silent rejection on
/// `result` instead of being allowed to settle as a success.
fn settle_try_result<U>(result: &Promise<U>, outcome: Result<U, PromiseError>)
where
    U: Clone + 'static,
{
    match outcome {
        Ok(value) => result.resolve(value),
        Err(error) => {
            diagnostics::sink().on_exception(&error.to_string());
            result.reject_silent(error);
        }
    }
}

fn propagate_unhandled_exception(id: PromiseId, name: Option<&str>, error: &PromiseError) {
    let label = match name {
        Some(name) => format!("promise {id} ({name})"),
        None => format!("promise {id}"),
    };
    diagnostics::sink().on_exception(&format!("unhandled rejection from {label}: {error}"));
}

/// Wire an already-produced continuation promise's outcome into `target`.
fn bridge<U: Clone + 'static>(target: Promise<U>, continuation: Promise<U>) {
    match &*continuation.0.state.borrow() {
        PromiseState::Resolved(v) => {
            target.resolve(v.clone());
            return;
        }
        PromiseState::Rejected(e) => {
            target.reject_silent_rc(e.clone());
            return;
        }
        PromiseState::Cancelled => {
            target.cancel_self();
            return;
        }
        PromiseState::Pending => {}
    }

    let resolve_target = target.clone();
    continuation
        .0
        .resolve_handlers
        .borrow_mut()
        .push(Box::new(move |v| resolve_target.resolve(v.clone())));

    let reject_target = target.clone();
    continuation
        .0
        .reject_handlers
        .borrow_mut()
        .push(Box::new(move |e| reject_target.reject_silent_rc(e)));

    let cancel_target = target.clone();
    continuation
        .0
        .cancel_handlers
        .borrow_mut()
        .push(Box::new(move || cancel_target.cancel_self()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_chain_resolves() {
        let p = Promise::<i32>::pending();
        let chained = p.then_value(|x| x + 1).then_value(|x| x * 2);
        p.resolve(3);
        assert!(matches!(chained.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn rejected_source_recovers_through_catch_ignore() {
        let p = Promise::<i32>::pending();
        let recovered = p.catch_ignore(|_| {});
        p.reject(anyhow::anyhow!("boom"));
        assert!(matches!(recovered.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn finally_runs_exactly_once_on_each_outcome() {
        let calls = Rc::new(RefCell::new(Vec::new()));

        let p = Promise::<i32>::pending();
        let log = calls.clone();
        p.then_action(move |_| log.borrow_mut().push("t"));
        let log = calls.clone();
        p.finally(move || log.borrow_mut().push("f"));
        p.resolve(1);
        assert_eq!(*calls.borrow(), vec!["t", "f"]);
    }

    #[test]
    fn finally_runs_even_when_the_source_is_cancelled() {
        let ran = Rc::new(RefCell::new(false));
        let p = Promise::<i32>::pending();
        let flag = ran.clone();
        let tail = p.finally(move || *flag.borrow_mut() = true);
        p.cancel();
        assert!(*ran.borrow());
        // The masking is intentional: the tail promise resolves even though
        // the source was cancelled.
        assert!(matches!(tail.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn continue_with_masks_a_cancelled_source() {
        let p = Promise::<i32>::pending();
        let result = p.continue_with(|| Promise::resolved(42));
        p.cancel();
        assert!(matches!(result.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn resolving_twice_is_a_no_op_and_reports_state_exception() {
        let p = Promise::<i32>::pending();
        assert!(p.try_resolve(1));
        assert!(!p.try_resolve(2));
        assert!(matches!(p.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn cancel_propagates_through_pending_prefix() {
        let root = Promise::<i32>::pending();
        let mid = root.then_value(|x| x + 1);
        let leaf = mid.then_value(|x| x * 2);
        leaf.cancel();
        assert!(matches!(root.state_kind(), StateKind::Cancelled));
        assert!(matches!(mid.state_kind(), StateKind::Cancelled));
        assert!(matches!(leaf.state_kind(), StateKind::Cancelled));
    }

    #[test]
    fn then_value_try_rejects_the_result_on_a_callback_fault() {
        let p = Promise::<i32>::pending();
        let chained = p.then_value_try(|v| {
            if v < 0 {
                Err(anyhow::anyhow!("negative value"))
            } else {
                Ok(v * 2)
            }
        });
        p.resolve(-1);
        assert!(matches!(chained.state_kind(), StateKind::Rejected));
    }

    #[test]
    fn then_value_try_reports_the_fault_to_the_sink() {
        struct CountingSink(Rc<RefCell<usize>>);
        impl crate::diagnostics::EventsReceiver for CountingSink {
            fn on_exception(&self, _message: &str) {
                *self.0.borrow_mut() += 1;
            }
        }
        let count = Rc::new(RefCell::new(0));
        diagnostics::set_events_receiver(Rc::new(CountingSink(count.clone())));

        let p = Promise::<i32>::pending();
        let _chained = p.then_action_try(|_| Err(anyhow::anyhow!("boom")));
        p.resolve(1);
        assert_eq!(*count.borrow(), 1);

        diagnostics::clear_events_receiver();
    }

    #[test]
    fn catch_try_rejects_the_result_when_recovery_itself_faults() {
        let p = Promise::<i32>::pending();
        let recovered = p.catch_try(|_| Err(anyhow::anyhow!("recovery also failed")));
        p.reject(anyhow::anyhow!("original"));
        assert!(matches!(recovered.state_kind(), StateKind::Rejected));
    }

    #[test]
    fn catch_attaches_child_even_when_source_is_already_rejected() {
        let source = Promise::<i32>::rejected(anyhow::anyhow!("already gone"));
        let recovered = source.catch(|_| 0);

        assert!(recovered.as_chain_node().parent_node().is_some());
        assert_eq!(source.as_chain_node().child_nodes().len(), 1);
    }

    #[test]
    fn catch_ignore_attaches_child_even_when_source_is_already_cancelled() {
        let source = Promise::<i32>::canceled();
        let recovered = source.catch_ignore(|_| {});

        assert!(recovered.as_chain_node().parent_node().is_some());
        assert_eq!(source.as_chain_node().child_nodes().len(), 1);
    }

    #[test]
    fn then_attaches_child_even_when_source_is_already_rejected() {
        let source = Promise::<i32>::rejected(anyhow::anyhow!("already gone"));
        let chained = source.then_value(|x| x + 1);

        assert!(chained.as_chain_node().parent_node().is_some());
        assert_eq!(source.as_chain_node().child_nodes().len(), 1);
        assert!(matches!(chained.state_kind(), StateKind::Rejected));
    }

    #[test]
    fn settle_as_void_attaches_child_when_source_is_cancelled() {
        let source = Promise::<i32>::pending();
        let tail = source.finally(|| {});
        source.cancel();

        assert!(tail.as_chain_node().parent_node().is_some());
        assert_eq!(source.as_chain_node().child_nodes().len(), 1);
    }

    #[test]
    fn rejection_identity_survives_a_then_hop() {
        #[derive(Debug, thiserror::Error)]
        #[error("marker failure")]
        struct Marker;

        let p = Promise::<i32>::pending();
        let chained = p.then_value(|x| x + 1);
        p.reject(Marker);

        let observed = Rc::new(RefCell::new(false));
        let flag = observed.clone();
        chained.catch_ignore(move |e| {
            *flag.borrow_mut() = e.downcast_ref::<Marker>().is_some();
        });
        assert!(*observed.borrow());
    }
}
