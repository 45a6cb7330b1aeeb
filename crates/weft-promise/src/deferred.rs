// SPDX-License-Identifier: MIT OR Apache-2.0
//! The producer side: externally-controlled settlement of one promise.

use crate::promise::Promise;
use std::cell::Cell;
use std::rc::Rc;
use weft_error::WeftError;

/// Owning producer handle for exactly one [`Promise`].
///
/// `settled` tracks whether any of `resolve` / `reject` / `cancel` has been
/// called on this deferred; a second `resolve` or `reject` is an error,
/// while `cancel` after settlement is a harmless no-op.
pub struct Deferred<T> {
    promise: Promise<T>,
    settled: Rc<Cell<bool>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            settled: Rc::clone(&self.settled),
        }
    }
}

impl<T> Deferred<T> {
    /// A fresh deferred with a pending promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            promise: Promise::pending(),
            settled: Rc::new(Cell::new(false)),
        }
    }

    /// A handle to the promise this deferred settles.
    #[must_use]
    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// `true` once `resolve`, `reject`, or `cancel` has been called.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled.get()
    }

    /// Attach a canceller that runs when the promise is cancelled while
    /// still pending. A canceller error becomes the rejection reason.
    pub fn set_canceller<F>(&self, canceller: F)
    where
        F: FnOnce() -> Result<(), WeftError> + 'static,
    {
        self.promise.set_canceller(Box::new(canceller));
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Fulfil the promise with `value`.
    ///
    /// # Errors
    ///
    /// `AlreadySettled` when the deferred was already settled.
    pub fn resolve(&self, value: T) -> Result<(), WeftError> {
        self.mark_settled("resolve")?;
        self.promise.fulfil(value);
        Ok(())
    }

    /// Reject the promise with `reason`.
    ///
    /// # Errors
    ///
    /// `AlreadySettled` when the deferred was already settled.
    pub fn reject(&self, reason: WeftError) -> Result<(), WeftError> {
        self.mark_settled("reject")?;
        self.promise.reject_with(reason);
        Ok(())
    }

    /// Resolve by adopting another promise's eventual settlement
    /// (thenable absorption; cancellation flows back to `source`).
    ///
    /// # Errors
    ///
    /// `AlreadySettled` when the deferred was already settled.
    pub fn adopt(&self, source: Promise<T>) -> Result<(), WeftError> {
        self.mark_settled("resolve")?;
        self.promise.adopt(&source);
        Ok(())
    }

    /// Cancel the promise. No-op when already settled.
    pub fn cancel(&self) {
        if self.settled.get() {
            return;
        }
        self.settled.set(true);
        self.promise.cancel();
    }

    fn mark_settled(&self, operation: &str) -> Result<(), WeftError> {
        if self.settled.get() {
            return Err(WeftError::already_settled(operation));
        }
        self.settled.set(true);
        Ok(())
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.settled.get())
            .field("promise", &self.promise)
            .finish()
    }
}
