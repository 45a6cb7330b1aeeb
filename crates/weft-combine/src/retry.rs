// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resilience combinators: retry with exponential backoff, and timeout.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use weft_cancel::CancelToken;
use weft_error::WeftError;
use weft_loop::{set_timeout, spawn, timeout_source};
use weft_promise::{Deferred, Promise};

/// Run `op` until it fulfils or `max_attempts` attempts have rejected.
///
/// The delay before attempt `n` (n ≥ 2) is
/// `min(base_delay_ms · 2^(n-2), max_delay_ms)`: attempt 2 waits the base
/// delay, attempt 3 twice that, and so on. The final rejection surfaces
/// the last underlying error.
///
/// # Errors
///
/// `InvalidArgument` when `max_attempts` is zero, synchronously.
pub fn retry<T, F>(
    op: F,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
) -> Result<Promise<T>, WeftError>
where
    T: Clone + 'static,
    F: FnMut() -> Promise<T> + 'static,
{
    if max_attempts == 0 {
        return Err(WeftError::invalid_argument(
            "retry requires at least one attempt",
        ));
    }
    let deferred = Deferred::new();
    let op: Rc<RefCell<dyn FnMut() -> Promise<T>>> = Rc::new(RefCell::new(op));
    attempt(op, deferred.clone(), 1, max_attempts, base_delay_ms, max_delay_ms);
    Ok(deferred.promise())
}

fn attempt<T: Clone + 'static>(
    op: Rc<RefCell<dyn FnMut() -> Promise<T>>>,
    deferred: Deferred<T>,
    attempt_no: u32,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
) {
    let promise = {
        let mut call = op.borrow_mut();
        call()
    };
    promise.on_settled(move |outcome| match outcome {
        Ok(value) => {
            let _ = deferred.resolve(value);
        }
        Err(reason) => {
            if attempt_no >= max_attempts {
                tracing::debug!(target: "weft.retry", attempt = attempt_no, "retry exhausted");
                let _ = deferred.reject(reason);
                return;
            }
            let backoff = base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt_no - 1))
                .min(max_delay_ms);
            tracing::debug!(
                target: "weft.retry",
                attempt = attempt_no,
                backoff_ms = backoff,
                "attempt failed, backing off"
            );
            set_timeout(
                move || {
                    attempt(
                        op,
                        deferred,
                        attempt_no + 1,
                        max_attempts,
                        base_delay_ms,
                        max_delay_ms,
                    );
                },
                backoff,
            );
        }
    });
}

/// Run `f` as a fiber governed by a timeout token: if `ms` milliseconds
/// pass first, the token cancels and the fiber rejects with the timeout
/// cancellation.
///
/// The closure receives the timeout token so it can poll it or combine it
/// further.
///
/// # Errors
///
/// `InvalidArgument` when `ms` is zero, synchronously.
pub fn timeout<T, F, Fut>(f: F, ms: u64) -> Result<Promise<T>, WeftError>
where
    T: Clone + 'static,
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = Result<T, WeftError>> + 'static,
{
    let source = timeout_source(ms)?;
    let token = source.token()?;
    Ok(spawn(f(token.clone()), Some(token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use weft_error::ErrorKind;
    use weft_loop::{delay_value, now_ms, reset, run, yield_now};

    #[test]
    fn zero_attempts_is_invalid_argument() {
        let err = retry(|| Promise::resolved(1), 0, 10, 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn immediate_success_needs_one_attempt() {
        reset();
        let calls = Rc::new(Cell::new(0u32));
        let calls2 = Rc::clone(&calls);
        let p = retry(
            move || {
                calls2.set(calls2.get() + 1);
                Promise::resolved("ok")
            },
            3,
            10,
            100,
        )
        .unwrap();
        run();
        assert_eq!(p.value().unwrap(), "ok");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn fulfils_on_third_attempt_after_two_failures() {
        reset();
        let calls = Rc::new(Cell::new(0u32));
        let calls2 = Rc::clone(&calls);
        let p = retry(
            move || {
                calls2.set(calls2.get() + 1);
                if calls2.get() <= 2 {
                    Promise::rejected(WeftError::failed("flaky"))
                } else {
                    Promise::resolved(calls2.get())
                }
            },
            5,
            2,
            50,
        )
        .unwrap();
        run();
        assert_eq!(p.value().unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_surface_last_error() {
        reset();
        let calls = Rc::new(Cell::new(0u32));
        let calls2 = Rc::clone(&calls);
        let p: Promise<i32> = retry(
            move || {
                calls2.set(calls2.get() + 1);
                Promise::rejected(WeftError::failed(format!("attempt {}", calls2.get())))
            },
            3,
            1,
            10,
        )
        .unwrap();
        run();
        assert_eq!(p.rejection().unwrap(), WeftError::failed("attempt 3"));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn backoff_grows_exponentially_up_to_the_cap() {
        reset();
        // Four failing attempts with base 10ms, cap 20ms: waits are
        // 10, 20, 20 — at least 50ms in total.
        let p: Promise<i32> = retry(
            || Promise::rejected(WeftError::failed("always")),
            4,
            10,
            20,
        )
        .unwrap();
        let before = now_ms();
        run();
        let elapsed = now_ms() - before;
        assert!(p.is_rejected());
        assert!(elapsed >= 45.0, "elapsed {elapsed}ms, expected >= 45ms");
    }

    #[test]
    fn timeout_zero_is_invalid_argument() {
        reset();
        let err = timeout(|_| async { Ok(()) }, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn fast_work_beats_the_timeout() {
        reset();
        // The timeout timer itself stays registered until it fires, so keep
        // it short: run() drains the loop fully.
        let p = timeout(|_| async { delay_value(2, "quick").wait().await }, 40).unwrap();
        run();
        assert_eq!(p.value().unwrap(), "quick");
    }

    #[test]
    fn slow_fiber_rejects_with_timeout_cancellation() {
        reset();
        let p: Promise<()> = timeout(
            |_| async {
                loop {
                    yield_now().await;
                }
            },
            10,
        )
        .unwrap();
        run();
        let reason = p.rejection().unwrap();
        assert!(reason.is_cancelled());
        assert_eq!(
            reason.cancel_reason(),
            Some("Timeout of 10 milliseconds exceeded")
        );
    }

    #[test]
    fn cooperative_fiber_can_poll_the_timeout_token() {
        reset();
        let p: Promise<i32> = timeout(
            |token| async move {
                loop {
                    token.throw_if_cancellation_requested()?;
                    yield_now().await;
                }
            },
            8,
        )
        .unwrap();
        run();
        assert!(p.rejection().unwrap().is_cancelled());
    }
}
