//! # Static combinators
//!
//! Free functions that build a result promise out of several independent
//! input promises, rather than chaining off of one source: `All`, `Race`,
//! `First`, and `Sequence`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::diagnostics;
use crate::error::CombinatorError;
use crate::node;
use crate::value::Promise;
use crate::void::VoidPromise;

/// `All(promises)`: resolves once every input resolves, with the results in
/// input order; rejects with the first rejection; cancels if the aggregate
/// itself is cancelled. Inputs are attached as children of the result (not
/// the other way around) so that cancelling the aggregate cancels every
/// still-pending input.
pub fn all<T: Clone + 'static>(promises: Vec<Promise<T>>) -> Promise<Vec<T>> {
    let n = promises.len();
    if n == 0 {
        return Promise::resolved(Vec::new());
    }

    let result = Promise::<Vec<T>>::pending_named(Some("All".to_string()));
    let results: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; n]));
    let progress: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(vec![0.0; n]));
    let remaining = Rc::new(Cell::new(n));

    for (i, input) in promises.into_iter().enumerate() {
        node::attach_parent(&input.as_chain_node(), &result.as_chain_node());

        let result_progress = result.clone();
        let progress_store = progress.clone();
        input.progress(move |p| {
            progress_store.borrow_mut()[i] = p;
            if result_progress.state_kind().is_pending() {
                let mean = progress_store.borrow().iter().sum::<f64>() / n as f64;
                result_progress.report_progress(mean);
            }
        });

        let result_resolve = result.clone();
        let results_store = results.clone();
        let progress_done = progress.clone();
        let remaining_store = remaining.clone();
        let result_reject = result.clone();
        let result_cancel = result.clone();
        input.subscribe(
            move |v| {
                results_store.borrow_mut()[i] = Some(v.clone());
                progress_done.borrow_mut()[i] = 1.0;
                remaining_store.set(remaining_store.get() - 1);
                if remaining_store.get() == 0 && result_resolve.state_kind().is_pending() {
                    let values = results_store
                        .borrow_mut()
                        .iter_mut()
                        .map(|slot| slot.take().expect("All: every slot filled before resolving"))
                        .collect();
                    result_resolve.resolve(values);
                }
            },
            move |e| {
                if result_reject.state_kind().is_pending() {
                    result_reject.reject_silent_rc(e);
                }
            },
            move || result_cancel.cancel_self(),
        );
    }

    result
}

/// The void analogue of [`all`]: resolves with no value once every input
/// settles, same first-rejection-wins and cancellation semantics.
pub fn all_void(promises: Vec<VoidPromise>) -> VoidPromise {
    all(promises).then_value(|_| ())
}

/// `Race(promises)`: resolves or rejects with whichever input settles first;
/// later arrivals are ignored. `Race([])` is a `CombinatorError::EmptyRace`.
/// Inputs are *not* attached as children of the result.
pub fn race<T: Clone + 'static>(promises: Vec<Promise<T>>) -> Promise<T> {
    if promises.is_empty() {
        let err = CombinatorError::EmptyRace;
        diagnostics::sink().on_exception(&err.to_string());
        return Promise::rejected(err);
    }

    let result = Promise::<T>::pending_named(Some("Race".to_string()));
    let n = promises.len();
    let progress: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(vec![0.0; n]));

    for (i, input) in promises.into_iter().enumerate() {
        let result_progress = result.clone();
        let progress_store = progress.clone();
        input.progress(move |p| {
            progress_store.borrow_mut()[i] = p;
            if result_progress.state_kind().is_pending() {
                let max = progress_store.borrow().iter().cloned().fold(0.0_f64, f64::max);
                result_progress.report_progress(max);
            }
        });

        let result_resolve = result.clone();
        let result_reject = result.clone();
        let result_cancel = result.clone();
        input.subscribe(
            move |v| {
                if result_resolve.state_kind().is_pending() {
                    result_resolve.resolve(v.clone());
                }
            },
            move |e| {
                if result_reject.state_kind().is_pending() {
                    result_reject.reject_silent_rc(e);
                }
            },
            move || result_cancel.cancel_self(),
        );
    }

    result
}

type Candidate<T> = Box<dyn FnOnce() -> Promise<T>>;

/// `First(fns)`: try each thunk in order, returning the first promise that
/// resolves. A rejection advances to the next candidate; the overall promise
/// rejects with the last attempt's error once every candidate is exhausted.
///
/// A cancelled attempt is treated as a cancellation of the whole `First` —
/// the spec does not describe this case, so this is a design choice recorded
/// alongside the other Open Question resolutions.
pub fn first<T: Clone + 'static>(fns: Vec<Candidate<T>>) -> Promise<T> {
    let result = Promise::<T>::pending_named(Some("First".to_string()));
    try_candidate(VecDeque::from(fns), 0, result.clone());
    result
}

fn try_candidate<T: Clone + 'static>(
    mut remaining: VecDeque<Candidate<T>>,
    attempted: usize,
    result: Promise<T>,
) {
    let Some(next) = remaining.pop_front() else {
        // Only reachable when `fns` was empty to begin with; Race's
        // empty-input rejection is the closest documented analogue.
        result.reject_silent(anyhow::anyhow!("First() requires at least one candidate"));
        return;
    };

    let attempt = next();
    let k = (attempted + 1) as f64;

    let result_progress = result.clone();
    attempt.progress(move |p| {
        if result_progress.state_kind().is_pending() {
            result_progress.report_progress((k - 1.0 + p) / k);
        }
    });

    let result_resolve = result.clone();
    let result_reject = result.clone();
    let result_cancel = result.clone();
    attempt.subscribe(
        move |v| {
            if result_resolve.state_kind().is_pending() {
                result_resolve.report_progress(1.0);
                result_resolve.resolve(v.clone());
            }
        },
        move |e| {
            if !result_reject.state_kind().is_pending() {
                return;
            }
            if remaining.is_empty() {
                result_reject.report_progress(1.0);
                result_reject.reject_silent_rc(e);
            } else {
                try_candidate(remaining, attempted + 1, result_reject);
            }
        },
        move || result_cancel.cancel_self(),
    );
}

type SequenceStep = Box<dyn FnOnce() -> VoidPromise>;

/// `Sequence(fns)` *(supplemented)*: run a list of void-producing thunks
/// strictly in order, stopping at (and forwarding) the first rejection or
/// cancellation. Resolves once every thunk has resolved; `Sequence([])`
/// resolves immediately. Does not aggregate progress, matching
/// `ContinueWith`'s masking of its intermediate promises.
pub fn sequence(fns: Vec<SequenceStep>) -> VoidPromise {
    let result = VoidPromise::pending_named(Some("Sequence".to_string()));
    run_sequence_step(VecDeque::from(fns), result.clone());
    result
}

fn run_sequence_step(mut remaining: VecDeque<SequenceStep>, result: VoidPromise) {
    let Some(next) = remaining.pop_front() else {
        if result.state_kind().is_pending() {
            result.resolve(());
        }
        return;
    };

    let step = next();
    let result_resolve = result.clone();
    let result_reject = result.clone();
    let result_cancel = result.clone();
    step.subscribe(
        move |_| run_sequence_step(remaining, result_resolve),
        move |e| {
            if result_reject.state_kind().is_pending() {
                result_reject.reject_silent_rc(e);
            }
        },
        move || result_cancel.cancel_self(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateKind;

    #[test]
    fn all_of_empty_resolves_immediately() {
        let result = all::<i32>(Vec::new());
        assert!(matches!(result.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn all_resolves_once_every_input_resolves() {
        let a = Promise::<i32>::pending();
        let b = Promise::<i32>::pending();
        let result = all(vec![a.clone(), b.clone()]);

        a.resolve(1);
        assert!(matches!(result.state_kind(), StateKind::Pending));
        b.resolve(2);
        assert!(matches!(result.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn all_reports_mean_progress() {
        let a = Promise::<i32>::pending();
        let b = Promise::<i32>::pending();
        let reports = Rc::new(RefCell::new(Vec::new()));
        let result = all(vec![a.clone(), b.clone()]);
        let log = reports.clone();
        result.progress(move |p| log.borrow_mut().push(p));

        a.report_progress(0.5);
        b.report_progress(1.0);
        assert_eq!(*reports.borrow(), vec![0.25, 0.75]);
    }

    #[test]
    fn race_resolves_with_first_arrival_and_ignores_the_rest() {
        let a = Promise::<i32>::pending();
        let b = Promise::<i32>::pending();
        let result = race(vec![a.clone(), b.clone()]);

        b.resolve(2);
        assert!(matches!(result.state_kind(), StateKind::Resolved));
        a.resolve(1); // no-op, result already settled
        assert!(matches!(result.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn race_of_empty_rejects() {
        let result = race::<i32>(Vec::new());
        assert!(matches!(result.state_kind(), StateKind::Rejected));
    }

    #[test]
    fn first_tries_candidates_in_order_until_one_resolves() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let order1 = order.clone();
        let order2 = order.clone();
        let result = first(vec![
            Box::new(move || {
                order1.borrow_mut().push(1);
                Promise::<i32>::rejected(anyhow::anyhow!("first candidate failed"))
            }),
            Box::new(move || {
                order2.borrow_mut().push(2);
                Promise::resolved(42)
            }),
        ]);
        assert_eq!(*order.borrow(), vec![1, 2]);
        assert!(matches!(result.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn sequence_runs_strictly_in_order_and_resolves() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let order1 = order.clone();
        let order2 = order.clone();
        let result = sequence(vec![
            Box::new(move || {
                order1.borrow_mut().push(1);
                VoidPromise::resolved(())
            }),
            Box::new(move || {
                order2.borrow_mut().push(2);
                VoidPromise::resolved(())
            }),
        ]);
        assert_eq!(*order.borrow(), vec![1, 2]);
        assert!(matches!(result.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn sequence_stops_at_first_rejection() {
        let order: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
        let order1 = order.clone();
        let order2 = order.clone();
        let result = sequence(vec![
            Box::new(move || {
                order1.borrow_mut().push(1);
                VoidPromise::rejected(anyhow::anyhow!("nope"))
            }),
            Box::new(move || {
                order2.borrow_mut().push(2);
                VoidPromise::resolved(())
            }),
        ]);
        assert_eq!(*order.borrow(), vec![1]);
        assert!(matches!(result.state_kind(), StateKind::Rejected));
    }
}
