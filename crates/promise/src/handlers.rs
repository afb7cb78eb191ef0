//! # Handler store
//!
//! Per-promise queues of resolve/reject/cancel/progress handlers. Storage is
//! lazily allocated (most promises are observed zero or one times) and is
//! released as soon as a handler set is drained, so a long-settled promise
//! retains no dead closures.

/// An ordered, lazily-allocated list of handlers of one kind.
///
/// Each entry's callback is expected to close over whatever downstream target
/// it must notify of a fault — see the crate-level design notes for why this
/// replaces a separate "paired downstream rejectable" field.
pub struct HandlerQueue<F> {
    items: Option<Vec<F>>,
}

impl<F> Default for HandlerQueue<F> {
    fn default() -> Self {
        Self { items: None }
    }
}

impl<F> HandlerQueue<F> {
    pub fn push(&mut self, handler: F) {
        self.items.get_or_insert_with(Vec::new).push(handler);
    }

    /// Remove and return every handler currently queued, in registration
    /// order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<F> {
        self.items.take().unwrap_or_default()
    }

    /// Put a previously-drained batch back in front of anything registered
    /// since, preserving overall registration order. Used by progress
    /// dispatch, which must not permanently consume its handlers.
    pub fn restore_front(&mut self, mut front: Vec<F>) {
        if front.is_empty() {
            return;
        }
        if let Some(mut rest) = self.items.take() {
            front.append(&mut rest);
        }
        self.items = Some(front);
    }

    pub fn is_empty(&self) -> bool {
        self.items.as_ref().map_or(true, Vec::is_empty)
    }
}
