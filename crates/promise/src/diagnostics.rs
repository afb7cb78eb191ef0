//! # Diagnostics
//!
//! A thread-local, swappable sink for the library's own warnings and
//! exceptions, plus an opt-in registry of currently-pending promises used for
//! leak/hang diagnosis. Both are thread-local rather than process-global
//! because a [`crate::Promise`] is built on `Rc` and is therefore itself
//! confined to a single thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::id::PromiseId;
use crate::node::ChainNode;

/// Receives events the promise runtime itself produces: warnings about
/// misuse, and faults that would otherwise be silently dropped.
pub trait EventsReceiver {
    /// Routine, high-volume tracing (handler registration, dispatch).
    fn on_verbose(&self, _message: &str) {}

    /// Something unusual but not incorrect happened (e.g. reattaching a
    /// parent).
    fn on_warning(&self, _message: &str) {}

    /// A minor, likely-harmless anomaly (e.g. a self-parent attempt that was
    /// refused).
    fn on_warning_minor(&self, _message: &str) {}

    /// A handler closure returned or produced an error outside of a `catch`.
    fn on_exception(&self, _message: &str) {}

    /// A rejection reached a promise with no reject handler registered
    /// anywhere in its downstream chain, so it could not be observed.
    fn on_state_exception(&self, _message: &str) {}
}

/// The default sink: discards everything. Matches the library's default of
/// imposing no observability cost on callers who never configured one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventsReceiver;

impl EventsReceiver for NullEventsReceiver {}

/// A sink that forwards every event to the `tracing` crate at a level that
/// matches its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventsReceiver;

impl EventsReceiver for TracingEventsReceiver {
    fn on_verbose(&self, message: &str) {
        tracing::trace!(target: "promise", "{message}");
    }

    fn on_warning(&self, message: &str) {
        tracing::warn!(target: "promise", "{message}");
    }

    fn on_warning_minor(&self, message: &str) {
        tracing::debug!(target: "promise", "{message}");
    }

    fn on_exception(&self, message: &str) {
        tracing::error!(target: "promise", "{message}");
    }

    fn on_state_exception(&self, message: &str) {
        tracing::error!(target: "promise", "unhandled rejection: {message}");
    }
}

thread_local! {
    static SINK: RefCell<Rc<dyn EventsReceiver>> = RefCell::new(Rc::new(NullEventsReceiver));
    static PENDING_REGISTRY: RefCell<HashMap<PromiseId, Weak<dyn ChainNode>>> =
        RefCell::new(HashMap::new());
}

static TRACKING_ENABLED: AtomicBool = AtomicBool::new(false);

/// The events sink currently installed on this thread.
pub fn sink() -> Rc<dyn EventsReceiver> {
    SINK.with(|s| s.borrow().clone())
}

/// Install a new events sink for this thread, replacing whatever was there.
pub fn set_events_receiver(receiver: Rc<dyn EventsReceiver>) {
    SINK.with(|s| *s.borrow_mut() = receiver);
}

/// Restore the default, discarding sink.
pub fn clear_events_receiver() {
    set_events_receiver(Rc::new(NullEventsReceiver));
}

/// Turn the pending-promise registry on or off for this thread.
///
/// The registry is a diagnostic aid for finding promises that were created
/// and never settled; it is off by default because walking every live
/// promise on registration has a cost callers should opt into.
pub fn enable_tracking(enabled: bool) {
    TRACKING_ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        PENDING_REGISTRY.with(|r| r.borrow_mut().clear());
    }
}

pub fn is_tracking_enabled() -> bool {
    TRACKING_ENABLED.load(Ordering::Relaxed)
}

/// Record a newly pending promise, if tracking is enabled.
pub(crate) fn track_pending(id: PromiseId, node: Weak<dyn ChainNode>) {
    if !is_tracking_enabled() {
        return;
    }
    PENDING_REGISTRY.with(|r| r.borrow_mut().insert(id, node));
}

/// Remove a promise from the registry once it settles.
pub(crate) fn untrack_pending(id: PromiseId) {
    PENDING_REGISTRY.with(|r| {
        r.borrow_mut().remove(&id);
    });
}

/// How many tracked promises are still pending right now.
///
/// Dead entries (whose promise was dropped without settling) are pruned as a
/// side effect of counting.
pub fn tracked_pending_count() -> usize {
    PENDING_REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        registry.retain(|_, node| node.upgrade().is_some_and(|n| n.state_kind().is_pending()));
        registry.len()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingReceiver {
        warnings: RefCell<Vec<String>>,
    }

    impl EventsReceiver for RecordingReceiver {
        fn on_warning(&self, message: &str) {
            self.warnings.borrow_mut().push(message.to_string());
        }
    }

    #[test]
    fn default_sink_swallows_everything_silently() {
        sink().on_exception("should not panic");
    }

    #[test]
    fn installed_sink_receives_events() {
        let marker = Rc::new(Cell::new(false));
        struct MarkingReceiver(Rc<Cell<bool>>);
        impl EventsReceiver for MarkingReceiver {
            fn on_warning(&self, _message: &str) {
                self.0.set(true);
            }
        }
        set_events_receiver(Rc::new(MarkingReceiver(marker.clone())));
        sink().on_warning("hello");
        assert!(marker.get());
        clear_events_receiver();
    }

    #[test]
    fn tracking_toggles_and_counts() {
        assert!(!is_tracking_enabled());
        enable_tracking(true);
        assert!(is_tracking_enabled());
        assert_eq!(tracked_pending_count(), 0);
        enable_tracking(false);
    }

    #[test]
    fn tracing_sink_emits_through_a_real_subscriber() {
        use tracing_subscriber::fmt;

        let subscriber = fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || {
            let sink = TracingEventsReceiver;
            sink.on_warning("routed through tracing-subscriber");
            sink.on_exception("routed through tracing-subscriber");
            sink.on_state_exception("routed through tracing-subscriber");
        });
    }
}
