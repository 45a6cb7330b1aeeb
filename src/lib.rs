// SPDX-License-Identifier: MIT OR Apache-2.0
//! weft — a cooperative, single-threaded async runtime.
//!
//! Composable deferred values ([`Promise`]/[`Deferred`]), a propagating
//! cancellation tree ([`CancelToken`]/[`CancelSource`]), a fiber-stepping
//! event loop with microtasks and timers, and the combinator layer on top.
//! The [`Async`] facade bundles the whole surface behind static entry
//! points; everything it does is equally reachable through the member
//! crates it delegates to.
//!
//! ```
//! use weft::Async;
//!
//! let doubled = Async::resolve(21).then(|x| x * 2);
//! assert_eq!(doubled.value().unwrap(), 42);
//!
//! let later = Async::delay_value(5, "done");
//! Async::await_all();
//! assert_eq!(later.value().unwrap(), "done");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::future::Future;

pub use weft_cancel::{CancelSource, CancelToken, Subscription};
pub use weft_combine::{Debounced, SettledOutcome, Task, Throttled};
pub use weft_error::{
    AggregateError, BackgroundSink, ErrorKind, TracingSink, WeftError, WeftErrorDto,
    set_background_sink,
};
pub use weft_loop::{MICROTASK_BUDGET, YieldNow};
pub use weft_promise::{Deferred, Promise, PromiseFuture, PromiseState};

/// Pool concurrency used by [`Async::pool_default`].
pub const DEFAULT_POOL_CONCURRENCY: usize = 10;

/// Attempt count used by [`Async::retry_default`].
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Base backoff delay used by [`Async::retry_default`], in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Backoff delay cap used by [`Async::retry_default`], in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Static facade over the whole runtime.
pub struct Async;

impl Async {
    // -- Fibers ----------------------------------------------------------

    /// Launch `future` as a fiber, optionally governed by `token`.
    /// See [`weft_loop::spawn`].
    pub fn run<T, F>(future: F, token: Option<CancelToken>) -> Promise<T>
    where
        T: Clone + 'static,
        F: Future<Output = Result<T, WeftError>> + 'static,
    {
        weft_loop::spawn(future, token)
    }

    /// Suspend the current fiber until the next tick.
    #[must_use]
    pub fn yield_now() -> YieldNow {
        weft_loop::yield_now()
    }

    /// The governing token of the currently running fiber, if any.
    #[must_use]
    pub fn current_token() -> Option<CancelToken> {
        weft_loop::current_token()
    }

    // -- Promises --------------------------------------------------------

    /// An already-fulfilled promise. A value that is already a [`Promise`]
    /// needs no wrapping: promises are their own resolved form.
    pub fn resolve<T: Clone + 'static>(value: T) -> Promise<T> {
        Promise::resolved(value)
    }

    /// An already-rejected promise.
    pub fn reject<T: Clone + 'static>(reason: WeftError) -> Promise<T> {
        Promise::rejected(reason)
    }

    /// A promise fulfilling with `()` after `ms` milliseconds.
    #[must_use]
    pub fn delay(ms: u64) -> Promise<()> {
        weft_loop::delay(ms)
    }

    /// A promise fulfilling with `value` after `ms` milliseconds.
    pub fn delay_value<T: Clone + 'static>(ms: u64, value: T) -> Promise<T> {
        weft_loop::delay_value(ms, value)
    }

    // -- Combinators -----------------------------------------------------

    /// See [`weft_combine::all`].
    pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
    where
        T: Clone + 'static,
        I: IntoIterator<Item = Promise<T>>,
    {
        weft_combine::all(promises)
    }

    /// See [`weft_combine::all_entries`].
    pub fn all_entries<K, T, I>(entries: I) -> Promise<Vec<(K, T)>>
    where
        K: Clone + 'static,
        T: Clone + 'static,
        I: IntoIterator<Item = (K, Promise<T>)>,
    {
        weft_combine::all_entries(entries)
    }

    /// See [`weft_combine::race`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on empty input.
    pub fn race<T, I>(promises: I) -> Result<Promise<T>, WeftError>
    where
        T: Clone + 'static,
        I: IntoIterator<Item = Promise<T>>,
    {
        weft_combine::race(promises)
    }

    /// See [`weft_combine::any`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on empty input.
    pub fn any<T, I>(promises: I) -> Result<Promise<T>, WeftError>
    where
        T: Clone + 'static,
        I: IntoIterator<Item = Promise<T>>,
    {
        weft_combine::any(promises)
    }

    /// See [`weft_combine::all_settled`].
    pub fn all_settled<T, I>(promises: I) -> Promise<Vec<SettledOutcome<T>>>
    where
        T: Clone + 'static,
        I: IntoIterator<Item = Promise<T>>,
    {
        weft_combine::all_settled(promises)
    }

    /// See [`weft_combine::timeout`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `ms` is zero.
    pub fn timeout<T, F, Fut>(f: F, ms: u64) -> Result<Promise<T>, WeftError>
    where
        T: Clone + 'static,
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = Result<T, WeftError>> + 'static,
    {
        weft_combine::timeout(f, ms)
    }

    /// See [`weft_combine::pool`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `concurrency` is zero.
    pub fn pool<T: Clone + 'static>(
        tasks: Vec<Task<T>>,
        concurrency: usize,
    ) -> Result<Promise<Vec<T>>, WeftError> {
        weft_combine::pool(tasks, concurrency)
    }

    /// [`Async::pool`] at [`DEFAULT_POOL_CONCURRENCY`].
    pub fn pool_default<T: Clone + 'static>(tasks: Vec<Task<T>>) -> Promise<Vec<T>> {
        match weft_combine::pool(tasks, DEFAULT_POOL_CONCURRENCY) {
            Ok(promise) => promise,
            Err(reason) => Promise::rejected(reason),
        }
    }

    /// See [`weft_combine::sequence`].
    pub fn sequence<T: Clone + 'static>(tasks: Vec<Task<T>>) -> Promise<Vec<T>> {
        weft_combine::sequence(tasks)
    }

    /// See [`weft_combine::retry`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `max_attempts` is zero.
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
        weft_combine::retry(op, max_attempts, base_delay_ms, max_delay_ms)
    }

    /// [`Async::retry`] with the default attempt count and backoff window.
    pub fn retry_default<T, F>(op: F) -> Promise<T>
    where
        T: Clone + 'static,
        F: FnMut() -> Promise<T> + 'static,
    {
        match weft_combine::retry(
            op,
            DEFAULT_RETRY_ATTEMPTS,
            DEFAULT_RETRY_BASE_DELAY_MS,
            DEFAULT_RETRY_MAX_DELAY_MS,
        ) {
            Ok(promise) => promise,
            Err(reason) => Promise::rejected(reason),
        }
    }

    /// See [`weft_combine::debounce`].
    pub fn debounce<T, F>(op: F, delay_ms: u64) -> Debounced<T>
    where
        T: Clone + 'static,
        F: Fn() -> Promise<T> + 'static,
    {
        weft_combine::debounce(op, delay_ms)
    }

    /// See [`weft_combine::throttle`].
    pub fn throttle<T, F>(op: F, interval_ms: u64) -> Throttled<T>
    where
        T: Clone + 'static,
        F: Fn() -> Promise<T> + 'static,
    {
        weft_combine::throttle(op, interval_ms)
    }

    // -- Scheduling ------------------------------------------------------

    /// Enqueue a microtask for the next tick.
    pub fn schedule<F: FnOnce() + 'static>(task: F) {
        weft_loop::schedule(task);
    }

    /// Schedule a one-shot timer; returns its id.
    pub fn set_timeout<F: FnOnce() + 'static>(callback: F, ms: u64) -> u64 {
        weft_loop::set_timeout(callback, ms)
    }

    /// Schedule a repeating timer; returns its id.
    pub fn set_interval<F: FnMut() + 'static>(callback: F, ms: u64) -> u64 {
        weft_loop::set_interval(callback, ms)
    }

    /// Cancel a timer by id.
    pub fn clear_timer(id: u64) {
        weft_loop::clear_timer(id);
    }

    /// Mark the event loop started.
    pub fn start_event_loop() {
        weft_loop::start();
    }

    /// Drive the loop until no pending work remains (or the loop is
    /// stopped).
    pub fn await_all() {
        weft_loop::run();
    }

    /// Stop the loop at the next tick boundary.
    pub fn stop_event_loop() {
        weft_loop::stop();
    }

    /// Flush pending work once, then stop.
    pub fn shutdown() {
        weft_loop::shutdown();
    }

    /// Drop all scheduled work and start from a clean scheduler. A test
    /// hook.
    pub fn reset() {
        weft_loop::reset();
    }

    /// `true` while microtasks, timers, or fibers remain.
    #[must_use]
    pub fn has_pending_work() -> bool {
        weft_loop::has_pending_work()
    }

    /// Monotonic milliseconds since the scheduler came up.
    #[must_use]
    pub fn current_time() -> f64 {
        weft_loop::now_ms()
    }

    // -- Cancellation ----------------------------------------------------

    /// A fresh cancellation source.
    #[must_use]
    pub fn cancellation_source() -> CancelSource {
        CancelSource::new()
    }

    /// A source whose token auto-cancels after `ms` milliseconds.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `ms` is zero.
    pub fn timeout_source(ms: u64) -> Result<CancelSource, WeftError> {
        weft_loop::timeout_source(ms)
    }

    /// A source owning a never-cancel token.
    #[must_use]
    pub fn never_source() -> CancelSource {
        CancelSource::never()
    }

    /// A source whose token is already cancelled with `reason`.
    pub fn cancelled_source(reason: impl Into<String>) -> CancelSource {
        CancelSource::cancelled(reason)
    }

    /// A source owning a combined token over `tokens`.
    #[must_use]
    pub fn combine_tokens(tokens: &[CancelToken]) -> CancelSource {
        CancelSource::combine(tokens)
    }

    /// A source whose token cancels when OS signal `sig` arrives (where
    /// supported).
    #[must_use]
    pub fn signal_source(sig: i32) -> CancelSource {
        weft_loop::signal_source(sig)
    }

    // -- Capability probes ----------------------------------------------

    /// `true`: fibers are always available.
    #[must_use]
    pub fn supports_fibers() -> bool {
        weft_loop::supports_fibers()
    }

    /// `true` when OS signal registration is available.
    #[must_use]
    pub fn supports_signals() -> bool {
        weft_loop::supports_signals()
    }
}
