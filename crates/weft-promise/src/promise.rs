// SPDX-License-Identifier: MIT OR Apache-2.0
//! The consumer side: chainable transformations over a shared settlement cell.

use crate::state::PromiseState;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use weft_error::{ErrorKind, PROMISE_CANCELLED_REASON, WeftError};

type FulfilCallback<T> = Box<dyn FnOnce(&T)>;
type RejectCallback = Box<dyn FnOnce(&WeftError)>;
type Canceller = Box<dyn FnOnce() -> Result<(), WeftError>>;

struct Inner<T> {
    state: PromiseState<T>,
    // Populated only while pending; drained and cleared on settlement.
    on_fulfilled: Vec<FulfilCallback<T>>,
    on_rejected: Vec<RejectCallback>,
    canceller: Option<Canceller>,
}

/// A three-state container for a deferred value.
///
/// Cloning a `Promise` clones the handle; all clones share one settlement
/// cell. Settlement is one-way and one-shot: after the first transition out
/// of pending, later settle attempts are no-ops and both callback lists are
/// empty.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Promise<T> {
    pub(crate) fn pending() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: PromiseState::Pending,
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
                canceller: None,
            })),
        }
    }

    /// `true` while not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.borrow().state.is_pending()
    }

    /// `true` once settled either way.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.borrow().state.is_settled()
    }

    /// `true` if settled with a value.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.inner.borrow().state.is_fulfilled()
    }

    /// `true` if settled with a rejection.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.inner.borrow().state.is_rejected()
    }

    /// `true` if both handles share one settlement cell.
    #[must_use]
    pub fn same_instance(&self, other: &Promise<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_canceller(&self, canceller: Canceller) {
        let mut inner = self.inner.borrow_mut();
        if inner.state.is_pending() {
            inner.canceller = Some(canceller);
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// An already-fulfilled promise.
    pub fn resolved(value: T) -> Self {
        let p = Self::pending();
        p.fulfil(value);
        p
    }

    /// An already-rejected promise.
    pub fn rejected(reason: WeftError) -> Self {
        let p = Self::pending();
        p.reject_with(reason);
        p
    }

    /// Snapshot of the current settlement state.
    #[must_use]
    pub fn state(&self) -> PromiseState<T> {
        self.inner.borrow().state.clone()
    }

    /// The fulfilment value.
    ///
    /// # Errors
    ///
    /// `WrongState` unless the promise is fulfilled.
    pub fn value(&self) -> Result<T, WeftError> {
        self.inner.borrow().state.value().cloned()
    }

    /// The rejection reason.
    ///
    /// # Errors
    ///
    /// `WrongState` unless the promise is rejected.
    pub fn rejection(&self) -> Result<WeftError, WeftError> {
        self.inner.borrow().state.rejection().cloned()
    }

    /// Register a pair of settlement observers.
    ///
    /// On a pending promise both are stored; on a settled promise the
    /// matching one runs immediately. Each observer runs at most once.
    pub(crate) fn subscribe(&self, on_fulfilled: FulfilCallback<T>, on_rejected: RejectCallback) {
        enum Immediate<T> {
            Fulfil(T),
            Reject(WeftError),
        }
        let immediate = {
            let mut inner = self.inner.borrow_mut();
            match &inner.state {
                PromiseState::Pending => {
                    inner.on_fulfilled.push(on_fulfilled);
                    inner.on_rejected.push(on_rejected);
                    return;
                }
                PromiseState::Fulfilled(v) => Immediate::Fulfil(v.clone()),
                PromiseState::Rejected(e) => Immediate::Reject(e.clone()),
            }
        };
        match immediate {
            Immediate::Fulfil(v) => on_fulfilled(&v),
            Immediate::Reject(e) => on_rejected(&e),
        }
    }

    /// Transition to fulfilled and drain fulfilment observers in
    /// registration order. No-op on a settled promise.
    pub(crate) fn fulfil(&self, value: T) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_settled() {
                return;
            }
            inner.state = PromiseState::Fulfilled(value.clone());
            inner.canceller = None;
            inner.on_rejected.clear();
            std::mem::take(&mut inner.on_fulfilled)
        };
        for cb in callbacks {
            weft_error::guard_dispatch("promise fulfilment callback", || cb(&value));
        }
    }

    /// Transition to rejected and drain rejection observers in registration
    /// order. No-op on a settled promise.
    pub(crate) fn reject_with(&self, reason: WeftError) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_settled() {
                return;
            }
            inner.state = PromiseState::Rejected(reason.clone());
            inner.canceller = None;
            inner.on_fulfilled.clear();
            std::mem::take(&mut inner.on_rejected)
        };
        for cb in callbacks {
            weft_error::guard_dispatch("promise rejection callback", || cb(&reason));
        }
    }

    /// Adopt `source`'s eventual settlement, and cancel `source` if this
    /// promise is cancelled first.
    pub(crate) fn adopt(&self, source: &Promise<T>) {
        let upstream = source.clone();
        self.set_canceller(Box::new(move || {
            upstream.cancel();
            Ok(())
        }));
        let ok = self.clone();
        let ko = self.clone();
        source.subscribe(
            Box::new(move |v| ok.fulfil(v.clone())),
            Box::new(move |e| ko.reject_with(e.clone())),
        );
    }

    /// Observe settlement of either polarity exactly once.
    ///
    /// On a pending promise the observer is queued; on a settled promise it
    /// runs immediately. Combinators are built on this.
    pub fn on_settled<F>(&self, f: F)
    where
        F: FnOnce(Result<T, WeftError>) + 'static,
    {
        let slot = Rc::new(RefCell::new(Some(f)));
        let other = Rc::clone(&slot);
        self.subscribe(
            Box::new(move |v| {
                if let Some(observer) = slot.borrow_mut().take() {
                    observer(Ok(v.clone()));
                }
            }),
            Box::new(move |e| {
                if let Some(observer) = other.borrow_mut().take() {
                    observer(Err(e.clone()));
                }
            }),
        );
    }

    /// Map the fulfilment value; rejections pass through unchanged.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        let out = Promise::pending();
        let ok = out.clone();
        let ko = out.clone();
        self.subscribe(
            Box::new(move |v| ok.fulfil(f(v.clone()))),
            Box::new(move |e| ko.reject_with(e.clone())),
        );
        out
    }

    /// Map the fulfilment value through a fallible handler; an `Err` becomes
    /// the downstream rejection.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, WeftError> + 'static,
    {
        let out = Promise::pending();
        let ok = out.clone();
        let ko = out.clone();
        self.subscribe(
            Box::new(move |v| match f(v.clone()) {
                Ok(u) => ok.fulfil(u),
                Err(e) => ok.reject_with(e),
            }),
            Box::new(move |e| ko.reject_with(e.clone())),
        );
        out
    }

    /// Chain into a promise-returning handler; the result adopts the
    /// returned promise's settlement (thenable absorption).
    pub fn chain<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Promise<U> + 'static,
    {
        let out = Promise::pending();
        let ok = out.clone();
        let ko = out.clone();
        self.subscribe(
            Box::new(move |v| ok.adopt(&f(v.clone()))),
            Box::new(move |e| ko.reject_with(e.clone())),
        );
        out
    }

    /// Recover from a rejection; fulfilments pass through unchanged.
    ///
    /// On an already-fulfilled promise this returns a clone of the same
    /// handle (settled fast path).
    pub fn catch<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(WeftError) -> T + 'static,
    {
        if self.is_fulfilled() {
            return self.clone();
        }
        let out = Promise::pending();
        let ok = out.clone();
        let ko = out.clone();
        self.subscribe(
            Box::new(move |v| ok.fulfil(v.clone())),
            Box::new(move |e| ko.fulfil(f(e.clone()))),
        );
        out
    }

    /// Recover from a rejection through a fallible handler; an `Err`
    /// becomes the downstream rejection.
    pub fn try_catch<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(WeftError) -> Result<T, WeftError> + 'static,
    {
        if self.is_fulfilled() {
            return self.clone();
        }
        let out = Promise::pending();
        let ok = out.clone();
        let ko = out.clone();
        self.subscribe(
            Box::new(move |v| ok.fulfil(v.clone())),
            Box::new(move |e| match f(e.clone()) {
                Ok(v) => ko.fulfil(v),
                Err(e2) => ko.reject_with(e2),
            }),
        );
        out
    }

    /// Recover only from rejections of the given [`ErrorKind`]; any other
    /// rejection passes through to the result unchanged, so `catch_kind`
    /// calls chain like type-filtered catch clauses.
    pub fn catch_kind<F>(&self, kind: ErrorKind, f: F) -> Promise<T>
    where
        F: FnOnce(WeftError) -> T + 'static,
    {
        if self.is_fulfilled() {
            return self.clone();
        }
        let out = Promise::pending();
        let ok = out.clone();
        let ko = out.clone();
        self.subscribe(
            Box::new(move |v| ok.fulfil(v.clone())),
            Box::new(move |e| {
                if e.kind() == kind {
                    ko.fulfil(f(e.clone()));
                } else {
                    ko.reject_with(e.clone());
                }
            }),
        );
        out
    }

    /// Run `f` on settlement of either polarity; the original settlement
    /// and payload pass through unchanged.
    pub fn finally<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce() + 'static,
    {
        self.try_finally(move || {
            f();
            Ok(())
        })
    }

    /// Like [`finally`](Self::finally), but an `Err` from `f` overrides the
    /// settlement with that rejection.
    pub fn try_finally<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce() -> Result<(), WeftError> + 'static,
    {
        let out = Promise::pending();
        let ok = out.clone();
        let ko = out.clone();
        let f = Rc::new(RefCell::new(Some(f)));
        let f2 = Rc::clone(&f);
        self.subscribe(
            Box::new(move |v| {
                let side = f.borrow_mut().take().map(|g| g()).unwrap_or(Ok(()));
                match side {
                    Ok(()) => ok.fulfil(v.clone()),
                    Err(e) => ok.reject_with(e),
                }
            }),
            Box::new(move |e| {
                let side = f2.borrow_mut().take().map(|g| g()).unwrap_or(Ok(()));
                match side {
                    Ok(()) => ko.reject_with(e.clone()),
                    Err(over) => ko.reject_with(over),
                }
            }),
        );
        out
    }

    /// Cancel a pending promise.
    ///
    /// No-op on a settled promise. If a canceller is attached it runs
    /// first; a canceller error becomes the rejection reason. Unless the
    /// canceller already settled the promise some other way, the promise
    /// ends rejected with a cancellation error.
    pub fn cancel(&self) {
        let canceller = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_settled() {
                return;
            }
            inner.canceller.take()
        };
        if let Some(c) = canceller {
            if let Err(e) = c() {
                self.reject_with(e);
                return;
            }
        }
        self.reject_with(WeftError::cancelled_with(PROMISE_CANCELLED_REASON));
    }

    /// A future view of this promise, awaitable inside a fiber.
    #[must_use]
    pub fn wait(&self) -> PromiseFuture<T> {
        PromiseFuture {
            promise: self.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.inner.borrow().state)
            .finish()
    }
}

/// Future that resolves when the underlying promise settles.
///
/// Polled cooperatively: the weft scheduler re-polls every live fiber each
/// tick, so no waker wiring is needed.
pub struct PromiseFuture<T> {
    promise: Promise<T>,
}

impl<T: Clone + 'static> Future for PromiseFuture<T> {
    type Output = Result<T, WeftError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &self.promise.inner.borrow().state {
            PromiseState::Pending => Poll::Pending,
            PromiseState::Fulfilled(v) => Poll::Ready(Ok(v.clone())),
            PromiseState::Rejected(e) => Poll::Ready(Err(e.clone())),
        }
    }
}
