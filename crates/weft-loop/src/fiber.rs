// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fibers: suspendable user futures stepped once per tick.
//!
//! A fiber wraps a user future together with the [`Deferred`] it settles
//! and, optionally, a governing [`CancelToken`]. The scheduler polls each
//! live fiber once per tick with a no-op waker; [`yield_now`] suspends back
//! to the loop, and awaiting a pending promise suspends until it settles.
//!
//! Cancellation is cooperative. When the governing token cancels while the
//! fiber is suspended, the next step rejects the fiber's promise and drops
//! the future (running its destructors — the Rust rendition of throwing a
//! cancellation into a suspended coroutine). When the token cancels while
//! the fiber is the one currently running, the promise is rejected
//! directly and the future is reaped at the next step.

use crate::scheduler::with_scheduler;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use weft_cancel::{CancelToken, Subscription};
use weft_error::{WeftError, report_background};
use weft_promise::{Deferred, Promise};

pub(crate) struct FiberRecord {
    // Taken out while the fiber is being polled.
    pub(crate) future: Option<LocalBoxFuture<'static, ()>>,
    // Rejects the fiber's deferred unless it has already settled.
    pub(crate) reject: Rc<dyn Fn(WeftError)>,
    pub(crate) cancel_requested: Option<WeftError>,
    pub(crate) token: Option<CancelToken>,
    pub(crate) token_subscription: Option<Subscription>,
    pub(crate) started: bool,
}

/// Launch a fiber running `future`, optionally governed by `token`.
///
/// Returns a promise settling with the future's result. If the token is
/// already cancelled, no fiber is created and the promise comes back
/// rejected with the cancellation. The fiber takes its first step on the
/// next scheduler tick; cancelling the returned promise tears the fiber
/// down.
pub fn spawn<T, F>(future: F, token: Option<CancelToken>) -> Promise<T>
where
    T: Clone + 'static,
    F: Future<Output = Result<T, WeftError>> + 'static,
{
    if let Some(tok) = &token {
        if let Err(e) = tok.throw_if_cancellation_requested() {
            return Promise::rejected(e);
        }
    }

    let deferred = Deferred::new();
    let promise = deferred.promise();

    let wrapped = {
        let settle = deferred.clone();
        let token = token.clone();
        async move {
            if let Some(tok) = &token {
                if let Err(e) = tok.throw_if_cancellation_requested() {
                    let _ = settle.reject(e);
                    return;
                }
            }
            match future.await {
                Ok(value) => {
                    let _ = settle.resolve(value);
                }
                Err(e) => {
                    let _ = settle.reject(e);
                }
            }
        }
        .boxed_local()
    };

    let reject: Rc<dyn Fn(WeftError)> = {
        let deferred = deferred.clone();
        Rc::new(move |e| {
            let _ = deferred.reject(e);
        })
    };

    let id = with_scheduler(|s| {
        let id = s.next_fiber_id;
        s.next_fiber_id += 1;
        s.fibers.insert(
            id,
            FiberRecord {
                future: Some(wrapped),
                reject,
                cancel_requested: None,
                token: token.clone(),
                token_subscription: None,
                started: false,
            },
        );
        id
    });

    if let Some(tok) = &token {
        let observed = tok.clone();
        let subscription = tok.register(move || {
            let reason = observed
                .reason()
                .map(WeftError::cancelled_with)
                .unwrap_or_else(WeftError::cancelled);
            request_fiber_cancel(id, reason);
        });
        with_scheduler(|s| {
            if let Some(record) = s.fibers.get_mut(&id) {
                record.token_subscription = Some(subscription);
            }
        });
    }

    // Cancelling the promise reaps the fiber; the promise itself handles
    // the rejection.
    deferred.set_canceller(move || {
        mark_fiber_cancelled(id, WeftError::cancelled_with(weft_error::PROMISE_CANCELLED_REASON));
        Ok(())
    });

    tracing::debug!(target: "weft.fiber", fiber = id, governed = token.is_some(), "fiber spawned");
    promise
}

/// Flag a fiber for teardown at its next step. First request wins.
pub(crate) fn mark_fiber_cancelled(id: u64, reason: WeftError) {
    with_scheduler(|s| {
        if let Some(record) = s.fibers.get_mut(&id) {
            if record.cancel_requested.is_none() {
                record.cancel_requested = Some(reason);
            }
        }
    });
}

/// Deliver a token cancellation to a fiber: reject immediately when the
/// fiber is the one currently running, otherwise at its next step.
pub(crate) fn request_fiber_cancel(id: u64, reason: WeftError) {
    let direct = with_scheduler(|s| {
        let Some(record) = s.fibers.get_mut(&id) else {
            return None;
        };
        if record.cancel_requested.is_none() {
            record.cancel_requested = Some(reason.clone());
        }
        if s.current_fiber == Some(id) {
            Some(Rc::clone(&record.reject))
        } else {
            None
        }
    });
    if let Some(reject) = direct {
        reject(reason);
    }
}

/// Step one fiber: start or resume it with a single poll, or reap it if a
/// cancellation was requested. Returns `true` when the step made progress
/// (first start, completion, or teardown).
pub(crate) fn step_fiber(id: u64) -> bool {
    enum Action {
        Gone,
        Reap {
            reject: Rc<dyn Fn(WeftError)>,
            reason: WeftError,
            subscription: Option<Subscription>,
            future: Option<LocalBoxFuture<'static, ()>>,
        },
        Poll {
            future: LocalBoxFuture<'static, ()>,
            first: bool,
        },
    }

    let action = with_scheduler(|s| {
        let Some(record) = s.fibers.get_mut(&id) else {
            return Action::Gone;
        };
        if record.cancel_requested.is_some() {
            let Some(mut record) = s.fibers.remove(&id) else {
                return Action::Gone;
            };
            let reason = record
                .cancel_requested
                .take()
                .unwrap_or_else(WeftError::cancelled);
            return Action::Reap {
                reject: record.reject,
                reason,
                subscription: record.token_subscription,
                future: record.future,
            };
        }
        let Some(future) = record.future.take() else {
            // Already being polled further up the stack; skip.
            return Action::Gone;
        };
        let first = !record.started;
        record.started = true;
        s.current_fiber = Some(id);
        Action::Poll { future, first }
    });

    match action {
        Action::Gone => false,
        Action::Reap {
            reject,
            reason,
            subscription,
            future,
        } => {
            tracing::debug!(target: "weft.fiber", fiber = id, "fiber cancelled");
            reject(reason);
            if let Some(sub) = subscription {
                sub.unregister();
            }
            // Dropping the future runs its destructors, outside any
            // scheduler borrow.
            drop(future);
            true
        }
        Action::Poll { mut future, first } => {
            if first {
                tracing::trace!(target: "weft.fiber", fiber = id, "fiber started");
            }
            let waker = Waker::noop();
            let mut cx = Context::from_waker(waker);
            let polled = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
            match polled {
                Ok(Poll::Pending) => {
                    let leftover = with_scheduler(|s| {
                        s.current_fiber = None;
                        match s.fibers.get_mut(&id) {
                            Some(record) => {
                                record.future = Some(future);
                                None
                            }
                            // The scheduler was reset mid-poll; release the
                            // future outside the borrow.
                            None => Some(future),
                        }
                    });
                    drop(leftover);
                    first
                }
                Ok(Poll::Ready(())) => {
                    let record = with_scheduler(|s| {
                        s.current_fiber = None;
                        s.fibers.remove(&id)
                    });
                    if let Some(record) = record {
                        if let Some(sub) = record.token_subscription {
                            sub.unregister();
                        }
                    }
                    tracing::debug!(target: "weft.fiber", fiber = id, "fiber completed");
                    drop(future);
                    true
                }
                Err(payload) => {
                    let message = panic_text(payload.as_ref());
                    report_background("fiber", &WeftError::failed(message.clone()));
                    let record = with_scheduler(|s| {
                        s.current_fiber = None;
                        s.fibers.remove(&id)
                    });
                    if let Some(record) = record {
                        (record.reject)(WeftError::failed(message));
                        if let Some(sub) = record.token_subscription {
                            sub.unregister();
                        }
                    }
                    drop(future);
                    true
                }
            }
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "fiber panicked".to_string()
    }
}

/// The governing token of the currently running fiber, if any.
#[must_use]
pub fn current_token() -> Option<CancelToken> {
    with_scheduler(|s| {
        s.current_fiber
            .and_then(|id| s.fibers.get(&id))
            .and_then(|record| record.token.clone())
    })
}

/// Suspend the current fiber until the next tick.
///
/// Outside a fiber the returned future completes immediately (yielding is
/// a no-op when there is nothing to yield). This is the sole cooperative
/// suspension point the runtime offers.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        let inside_fiber = with_scheduler(|s| s.current_fiber.is_some());
        if !inside_fiber {
            return Poll::Ready(());
        }
        self.yielded = true;
        Poll::Pending
    }
}
