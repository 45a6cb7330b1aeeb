// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delayed promises and the token-source factories that need the loop.

use crate::scheduler::{clear_timer, set_timeout, with_scheduler};
use crate::signal;
use weft_cancel::CancelSource;
use weft_error::{WeftError, timeout_reason};
use weft_promise::{Deferred, Promise};

/// A promise fulfilling with `()` after `ms` milliseconds.
#[must_use]
pub fn delay(ms: u64) -> Promise<()> {
    delay_value(ms, ())
}

/// A promise fulfilling with `value` after `ms` milliseconds.
///
/// Cancelling the promise clears the underlying timer.
pub fn delay_value<T: Clone + 'static>(ms: u64, value: T) -> Promise<T> {
    let deferred = Deferred::new();
    let producer = deferred.clone();
    let id = set_timeout(
        move || {
            let _ = producer.resolve(value);
        },
        ms,
    );
    deferred.set_canceller(move || {
        clear_timer(id);
        Ok(())
    });
    deferred.promise()
}

/// A cancellation source whose token auto-cancels after `ms` milliseconds,
/// with the reason `"Timeout of {ms} milliseconds exceeded"`.
///
/// # Errors
///
/// `InvalidArgument` when `ms` is zero.
pub fn timeout_source(ms: u64) -> Result<CancelSource, WeftError> {
    if ms == 0 {
        return Err(WeftError::invalid_argument(
            "timeout must be greater than zero milliseconds",
        ));
    }
    let source = CancelSource::new();
    let token = source.token()?;
    set_timeout(move || token.cancel_with(timeout_reason(ms)), ms);
    Ok(source)
}

/// A cancellation source whose token cancels when OS signal `sig` is
/// delivered, with the reason `"Received signal {sig}"`.
///
/// Where signal handling is unavailable (unsupported platform, out-of-range
/// or refused signal), handler registration is silently omitted and the
/// returned source simply never signal-cancels.
#[must_use]
pub fn signal_source(sig: i32) -> CancelSource {
    let source = CancelSource::new();
    if signal::install(sig) {
        if let Ok(token) = source.token() {
            with_scheduler(|s| s.signal_watchers.push((sig, token)));
        }
    } else {
        tracing::debug!(target: "weft.loop", sig, "signal registration unavailable");
    }
    source
}
