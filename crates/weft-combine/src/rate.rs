// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rate shaping: debounce and throttle.

use std::cell::Cell;
use std::rc::Rc;
use weft_loop::{clear_timer, now_ms, set_timeout};
use weft_promise::{Deferred, Promise};

/// Wrap `op` so bursts of calls collapse into one execution `delay_ms`
/// after the burst ends.
pub fn debounce<T, F>(op: F, delay_ms: u64) -> Debounced<T>
where
    T: Clone + 'static,
    F: Fn() -> Promise<T> + 'static,
{
    Debounced {
        op: Rc::new(op),
        delay_ms,
        pending_timer: Rc::new(Cell::new(None)),
    }
}

/// Debounced callable returned by [`debounce`].
///
/// Each [`call`](Self::call) rearms the timer and returns a fresh promise.
/// When the timer finally fires, `op` runs once and its settlement flows
/// into the promise returned by the *last* call; promises returned by
/// superseded calls stay pending forever.
pub struct Debounced<T> {
    op: Rc<dyn Fn() -> Promise<T>>,
    delay_ms: u64,
    pending_timer: Rc<Cell<Option<u64>>>,
}

impl<T: Clone + 'static> Debounced<T> {
    /// Record a call: cancel the pending execution (if any) and schedule a
    /// new one after the configured delay.
    pub fn call(&self) -> Promise<T> {
        if let Some(id) = self.pending_timer.take() {
            clear_timer(id);
        }
        let deferred = Deferred::new();
        let producer = deferred.clone();
        let op = Rc::clone(&self.op);
        let pending = Rc::clone(&self.pending_timer);
        let id = set_timeout(
            move || {
                pending.set(None);
                let _ = producer.adopt(op());
            },
            self.delay_ms,
        );
        self.pending_timer.set(Some(id));
        deferred.promise()
    }

    /// Drop the pending execution without running `op`. The last returned
    /// promise stays pending.
    pub fn cancel_pending(&self) {
        if let Some(id) = self.pending_timer.take() {
            clear_timer(id);
        }
    }
}

impl<T> Drop for Debounced<T> {
    fn drop(&mut self) {
        // Keep the timer table clean when the callable goes away.
        if let Some(id) = self.pending_timer.take() {
            clear_timer(id);
        }
    }
}

/// Wrap `op` so executions are spaced at least `interval_ms` apart.
pub fn throttle<T, F>(op: F, interval_ms: u64) -> Throttled<T>
where
    T: Clone + 'static,
    F: Fn() -> Promise<T> + 'static,
{
    Throttled {
        op: Rc::new(op),
        interval_ms,
        last_exec_ms: Rc::new(Cell::new(None)),
    }
}

/// Throttled callable returned by [`throttle`].
///
/// The first call (or a call arriving after a full idle interval) runs
/// immediately. A call arriving early is queued for the residual wait;
/// bursts serialize in arrival order, each spaced one interval after the
/// virtual last execution.
pub struct Throttled<T> {
    op: Rc<dyn Fn() -> Promise<T>>,
    interval_ms: u64,
    // Virtual last-execution time in scheduler milliseconds.
    last_exec_ms: Rc<Cell<Option<f64>>>,
}

impl<T: Clone + 'static> Throttled<T> {
    /// Run `op` now or after the residual wait, returning the promise for
    /// this call's execution.
    pub fn call(&self) -> Promise<T> {
        let now = now_ms();
        let interval = self.interval_ms as f64;
        match self.last_exec_ms.get() {
            Some(last) if now - last < interval => {
                let scheduled = last + interval;
                self.last_exec_ms.set(Some(scheduled));
                let residual = (scheduled - now).ceil().max(0.0) as u64;
                let deferred = Deferred::new();
                let producer = deferred.clone();
                let op = Rc::clone(&self.op);
                set_timeout(
                    move || {
                        let _ = producer.adopt(op());
                    },
                    residual,
                );
                deferred.promise()
            }
            _ => {
                self.last_exec_ms.set(Some(now));
                (self.op)()
            }
        }
    }
}
