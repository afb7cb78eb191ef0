//! # promise
//!
//! A single-threaded, cooperative promise library: one-shot containers for an
//! asynchronous outcome (a value, an error, or a cancellation), with explicit
//! cancellation propagation along a parent/child chain graph, progress
//! reporting, and unhandled-rejection diagnostics.
//!
//! There is no internal scheduler and no suspension point inside the crate —
//! producers drive a [`Promise`] to a terminal state by calling
//! [`Promise::resolve`], [`Promise::reject`], or [`Promise::cancel_self`]
//! synchronously from wherever their own I/O callback runs. See the crate's
//! design notes for why this is a deliberate scope boundary rather than an
//! oversight.

#![forbid(unsafe_code)]

mod cancellation;
mod diagnostics;
mod error;
mod handlers;
mod id;
mod node;
mod state;
mod statics;
mod value;
mod void;

pub use cancellation::{from_cancellation_source, CancellationSource};
pub use diagnostics::{
    enable_tracking, is_tracking_enabled, set_events_receiver, tracked_pending_count,
    EventsReceiver, NullEventsReceiver, TracingEventsReceiver,
};
pub use error::{CombinatorError, PromiseError};
pub use id::PromiseId;
pub use state::StateKind;
pub use statics::{all, all_void, first, sequence, race};
pub use value::Promise;
pub use void::VoidPromise;
