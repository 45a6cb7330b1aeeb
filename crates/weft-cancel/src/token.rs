// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tokens, subscriptions, and combined-token construction.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use weft_error::{TOKEN_CANCELLED_REASON, WeftError, guard_dispatch};
use weft_promise::{Deferred, Promise};

type CancelCallback = Box<dyn FnOnce()>;

pub(crate) struct TokenInner {
    cancelled: bool,
    reason: Option<String>,
    cancellable: bool,
    // Populated only while not cancelled; drained and cleared on cancel.
    callbacks: Vec<(u64, CancelCallback)>,
    next_subscription_id: u64,
    // Held by combined tokens: handles into the upstream tokens, released
    // on self-cancel or when the combined token is dropped.
    upstream_subscriptions: Vec<Subscription>,
}

impl Drop for TokenInner {
    fn drop(&mut self) {
        for sub in std::mem::take(&mut self.upstream_subscriptions) {
            sub.unregister();
        }
    }
}

/// A cancellation signal observable by many subscribers.
///
/// Cloning clones the handle; all clones share one flag. The false→true
/// transition is one-way and stores the reason atomically with the flag.
pub struct CancelToken {
    inner: Rc<RefCell<TokenInner>>,
}

impl Clone for CancelToken {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl CancelToken {
    fn with_inner(cancelled: bool, reason: Option<String>, cancellable: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TokenInner {
                cancelled,
                reason,
                cancellable,
                callbacks: Vec::new(),
                next_subscription_id: 0,
                upstream_subscriptions: Vec::new(),
            })),
        }
    }

    /// A fresh cancellable token, not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_inner(false, None, true)
    }

    /// A token that ignores every cancel request.
    #[must_use]
    pub fn never() -> Self {
        Self::with_inner(false, None, false)
    }

    /// A token constructed already cancelled.
    pub(crate) fn precancelled(reason: Option<String>) -> Self {
        Self::with_inner(true, reason, true)
    }

    /// `true` if both handles share one flag.
    #[must_use]
    pub fn same_instance(&self, other: &CancelToken) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.borrow().cancelled
    }

    /// `false` for never-cancel tokens.
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        self.inner.borrow().cancellable
    }

    /// The stored cancellation reason, if one was given.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.borrow().reason.clone()
    }

    /// Raise a cancellation error if cancellation has been requested.
    ///
    /// The error carries the stored reason, or the default token reason
    /// when the cancel call gave none.
    ///
    /// # Errors
    ///
    /// `Cancelled` once the token is cancelled.
    pub fn throw_if_cancellation_requested(&self) -> Result<(), WeftError> {
        let inner = self.inner.borrow();
        if inner.cancelled {
            let reason = inner
                .reason
                .clone()
                .unwrap_or_else(|| TOKEN_CANCELLED_REASON.to_string());
            return Err(WeftError::cancelled_with(reason));
        }
        Ok(())
    }

    /// Request cancellation with no explicit reason.
    ///
    /// No-op if already cancelled or if the token is not cancellable.
    pub fn cancel(&self) {
        self.cancel_opt(None);
    }

    /// Request cancellation with a reason.
    pub fn cancel_with(&self, reason: impl Into<String>) {
        self.cancel_opt(Some(reason.into()));
    }

    pub(crate) fn cancel_opt(&self, reason: Option<String>) {
        let (callbacks, upstream) = {
            let mut inner = self.inner.borrow_mut();
            if inner.cancelled || !inner.cancellable {
                return;
            }
            inner.cancelled = true;
            inner.reason = reason;
            (
                std::mem::take(&mut inner.callbacks),
                std::mem::take(&mut inner.upstream_subscriptions),
            )
        };
        tracing::debug!(
            target: "weft.cancel",
            subscribers = callbacks.len(),
            reason = self.inner.borrow().reason.as_deref(),
            "token cancelled"
        );
        for (_, callback) in callbacks {
            guard_dispatch("cancellation callback", callback);
        }
        for sub in upstream {
            sub.unregister();
        }
    }

    /// Subscribe a callback to run when the token cancels.
    ///
    /// On an already-cancelled token the callback runs immediately and the
    /// returned handle is a no-op. On a never-cancel token the callback is
    /// dropped (it can never run) and the handle is a no-op. Callback
    /// panics during dispatch are reported to the background sink, never
    /// propagated.
    pub fn register<F: FnOnce() + 'static>(&self, callback: F) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        if inner.cancelled {
            drop(inner);
            guard_dispatch("cancellation callback", callback);
            return Subscription::noop();
        }
        if !inner.cancellable {
            drop(inner);
            drop(callback);
            return Subscription::noop();
        }
        let id = inner.next_subscription_id;
        inner.next_subscription_id += 1;
        inner.callbacks.push((id, Box::new(callback)));
        drop(inner);
        Subscription::live(Rc::downgrade(&self.inner), id)
    }

    /// A promise that fulfils when the token cancels.
    ///
    /// Already-cancelled tokens yield an already-fulfilled promise;
    /// never-cancel tokens yield a promise that never settles.
    #[must_use]
    pub fn wait_for_cancellation(&self) -> Promise<()> {
        if self.is_cancellation_requested() {
            return Promise::resolved(());
        }
        if !self.can_be_cancelled() {
            return Deferred::new().promise();
        }
        let deferred = Deferred::new();
        let producer = deferred.clone();
        // The subscription lives in the token's callback list; the handle
        // itself is not needed again.
        let _ = self.register(move || {
            let _ = producer.resolve(());
        });
        deferred.promise()
    }

    /// Combine this token with `others` into a fan-in token.
    ///
    /// With no arguments this returns the same instance (identity).
    #[must_use]
    pub fn combine_with(&self, others: &[CancelToken]) -> CancelToken {
        if others.is_empty() {
            return self.clone();
        }
        let mut all = Vec::with_capacity(1 + others.len());
        all.push(self.clone());
        all.extend(others.iter().cloned());
        Self::combine(&all)
    }

    /// Build a token cancelled exactly when any of `tokens` cancels.
    ///
    /// Never-cancel upstreams are filtered out at construction. If an
    /// upstream is already cancelled, the result is constructed cancelled
    /// with that upstream's reason; otherwise the first upstream to cancel
    /// wins the reason. Upstream subscriptions are released when the
    /// combined token cancels or is dropped.
    #[must_use]
    pub fn combine(tokens: &[CancelToken]) -> CancelToken {
        let cancellable: Vec<&CancelToken> =
            tokens.iter().filter(|t| t.can_be_cancelled()).collect();
        if cancellable.is_empty() {
            return CancelToken::never();
        }
        if let Some(done) = cancellable.iter().find(|t| t.is_cancellation_requested()) {
            return CancelToken::precancelled(done.reason());
        }
        let combined = CancelToken::new();
        let mut subscriptions = Vec::with_capacity(cancellable.len());
        for upstream in cancellable {
            let weak = Rc::downgrade(&combined.inner);
            let upstream_handle = upstream.clone();
            subscriptions.push(upstream.register(move || {
                if let Some(inner) = weak.upgrade() {
                    let combined = CancelToken { inner };
                    combined.cancel_opt(upstream_handle.reason());
                }
            }));
        }
        combined.inner.borrow_mut().upstream_subscriptions = subscriptions;
        combined
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CancelToken")
            .field("cancelled", &inner.cancelled)
            .field("cancellable", &inner.cancellable)
            .field("reason", &inner.reason)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Opaque unregister handle returned by [`CancelToken::register`].
///
/// Dropping the handle does **not** unregister the callback; call
/// [`unregister`](Self::unregister) to remove it. Handles returned for
/// already-cancelled or never-cancel tokens are inert.
pub struct Subscription {
    target: Option<(Weak<RefCell<TokenInner>>, u64)>,
}

impl Subscription {
    fn noop() -> Self {
        Self { target: None }
    }

    fn live(token: Weak<RefCell<TokenInner>>, id: u64) -> Self {
        Self {
            target: Some((token, id)),
        }
    }

    /// Remove the subscribed callback from the token, if it is still
    /// registered and the token is still alive.
    pub fn unregister(self) {
        if let Some((weak, id)) = self.target {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().callbacks.retain(|(cid, _)| *cid != id);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.target.is_some())
            .finish()
    }
}
