// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-threaded cooperative scheduler: the heart of the weft runtime.
//!
//! One scheduler instance lives per thread behind a thread-local cell (the
//! runtime is single-threaded by design, so this is the process-wide
//! singleton of a one-thread process; tests get natural isolation and an
//! explicit [`reset`] hook). Each [`tick`] fires due timers, drains a
//! bounded batch of microtasks, polls pending OS signal flags, and steps
//! every live fiber once. [`run`] drives ticks until no work remains,
//! sleeping one millisecond between empty polls.
//!
//! Fibers are plain futures polled cooperatively: [`yield_now`] is the sole
//! suspension point, and cancellation of a suspended fiber rejects its
//! promise and drops the future at the next step.

#![warn(missing_docs)]

mod fiber;
mod scheduler;
mod signal;
mod sources;
mod timer;

pub use fiber::{YieldNow, current_token, spawn, yield_now};
pub use scheduler::{
    MICROTASK_BUDGET, clear_timer, fiber_count, has_pending_work, is_loop_started, microtask_len,
    now_ms, reset, run, schedule, set_interval, set_timeout, shutdown, start, stop, tick,
    timer_count,
};
pub use sources::{delay, delay_value, signal_source, timeout_source};

/// `true`: this runtime always provides suspendable fibers.
#[must_use]
pub fn supports_fibers() -> bool {
    true
}

/// `true` when OS signal handlers can be registered on this platform.
#[must_use]
pub fn supports_signals() -> bool {
    cfg!(unix)
}
