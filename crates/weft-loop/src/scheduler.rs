// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scheduler state, the thread-local singleton, and the tick driver.

use crate::fiber::{FiberRecord, step_fiber};
use crate::signal;
use crate::timer::TimerQueue;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use weft_cancel::CancelToken;
use weft_error::{guard_dispatch, signal_reason};

/// Maximum number of microtasks drained per tick; the rest carry over to
/// the next tick so a self-enqueueing task cannot starve timers or fibers.
pub const MICROTASK_BUDGET: usize = 100;

pub(crate) struct Scheduler {
    pub(crate) microtasks: VecDeque<Box<dyn FnOnce()>>,
    pub(crate) timers: TimerQueue,
    pub(crate) fibers: BTreeMap<u64, FiberRecord>,
    pub(crate) next_fiber_id: u64,
    pub(crate) current_fiber: Option<u64>,
    pub(crate) signal_watchers: Vec<(i32, CancelToken)>,
    pub(crate) running: bool,
    pub(crate) loop_started: bool,
    pub(crate) stop_requested: bool,
    pub(crate) started_at: Instant,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            microtasks: VecDeque::new(),
            timers: TimerQueue::new(),
            fibers: BTreeMap::new(),
            next_fiber_id: 1,
            current_fiber: None,
            signal_watchers: Vec::new(),
            running: false,
            loop_started: false,
            stop_requested: false,
            started_at: Instant::now(),
        }
    }

    fn has_pending_work(&self) -> bool {
        !self.microtasks.is_empty() || !self.timers.is_empty() || !self.fibers.is_empty()
    }
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::new());
}

/// Run `f` with exclusive access to the scheduler.
///
/// Never invoke user callbacks from inside `f`: every dispatch happens
/// after the borrow is released.
pub(crate) fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    SCHEDULER.with(|cell| f(&mut cell.borrow_mut()))
}

// ---------------------------------------------------------------------------
// Scheduling API
// ---------------------------------------------------------------------------

/// Enqueue a microtask. Microtasks run in FIFO order during the next tick.
pub fn schedule<F: FnOnce() + 'static>(task: F) {
    with_scheduler(|s| s.microtasks.push_back(Box::new(task)));
}

/// Schedule a one-shot timer firing after `ms` milliseconds. Returns the
/// timer id for [`clear_timer`].
pub fn set_timeout<F: FnOnce() + 'static>(callback: F, ms: u64) -> u64 {
    let mut callback = Some(callback);
    let fire_at = Instant::now() + Duration::from_millis(ms);
    let id = with_scheduler(|s| {
        s.timers.insert(
            fire_at,
            None,
            Box::new(move || {
                if let Some(cb) = callback.take() {
                    cb();
                }
            }),
        )
    });
    tracing::trace!(target: "weft.timer", timer = id, ms, "timeout scheduled");
    id
}

/// Schedule a repeating timer firing every `ms` milliseconds. Returns the
/// timer id for [`clear_timer`].
pub fn set_interval<F: FnMut() + 'static>(callback: F, ms: u64) -> u64 {
    let interval = Duration::from_millis(ms);
    let fire_at = Instant::now() + interval;
    let id = with_scheduler(|s| s.timers.insert(fire_at, Some(interval), Box::new(callback)));
    tracing::trace!(target: "weft.timer", timer = id, ms, "interval scheduled");
    id
}

/// Cancel a timer (timeout or interval). Unknown ids are a no-op.
pub fn clear_timer(id: u64) {
    with_scheduler(|s| s.timers.clear(id));
}

/// `true` while the microtask queue, the timer table, or the fiber pool is
/// non-empty.
#[must_use]
pub fn has_pending_work() -> bool {
    with_scheduler(|s| s.has_pending_work())
}

/// Milliseconds elapsed since the scheduler was created, from a monotonic
/// clock.
#[must_use]
pub fn now_ms() -> f64 {
    with_scheduler(|s| s.started_at.elapsed().as_secs_f64() * 1000.0)
}

/// Number of queued microtasks.
#[must_use]
pub fn microtask_len() -> usize {
    with_scheduler(|s| s.microtasks.len())
}

/// Number of registered timers.
#[must_use]
pub fn timer_count() -> usize {
    with_scheduler(|s| s.timers.len())
}

/// Number of live fibers.
#[must_use]
pub fn fiber_count() -> usize {
    with_scheduler(|s| s.fibers.len())
}

// ---------------------------------------------------------------------------
// Tick driver
// ---------------------------------------------------------------------------

/// Advance the loop by one tick: fire due timers, drain up to
/// [`MICROTASK_BUDGET`] microtasks, deliver pending OS signals, then step
/// every live fiber once.
///
/// Returns `true` when the tick made observable progress (fired, drained,
/// delivered, or completed/started something).
pub fn tick() -> bool {
    let now = Instant::now();
    let mut did_work = false;

    // 1. Timers, in (fire_at, id) order.
    let due = with_scheduler(|s| s.timers.take_due(now));
    for mut fired in due {
        guard_dispatch("timer callback", &mut fired.callback);
        with_scheduler(|s| s.timers.finish_fire(fired, now));
        did_work = true;
    }

    // 2. Microtasks, FIFO, bounded per tick.
    let mut drained = 0;
    while drained < MICROTASK_BUDGET {
        let Some(task) = with_scheduler(|s| s.microtasks.pop_front()) else {
            break;
        };
        guard_dispatch("microtask", task);
        drained += 1;
    }
    did_work |= drained > 0;

    // 3. Pending OS signals cancel their subscribed sources.
    for sig in signal::take_pending() {
        let tokens = with_scheduler(|s| {
            let mut hit = Vec::new();
            s.signal_watchers.retain(|(watched, token)| {
                if *watched == sig {
                    hit.push(token.clone());
                    false
                } else {
                    true
                }
            });
            hit
        });
        for token in tokens {
            tracing::debug!(target: "weft.loop", sig, "signal cancels token");
            token.cancel_with(signal_reason(sig));
            did_work = true;
        }
    }

    // 4. Fibers present at the start of this phase; newly spawned fibers
    //    start on the next tick.
    let fiber_ids: Vec<u64> = with_scheduler(|s| s.fibers.keys().copied().collect());
    for id in fiber_ids {
        did_work |= step_fiber(id);
    }

    did_work
}

/// Drive ticks until no pending work remains or [`stop`] is called.
///
/// Sleeps one millisecond between polls that made no progress, to avoid
/// busy-spinning while waiting on timers. Re-entrant calls (from inside a
/// callback or fiber) are no-ops.
pub fn run() {
    let already_running = with_scheduler(|s| {
        if s.running {
            true
        } else {
            s.running = true;
            s.stop_requested = false;
            false
        }
    });
    if already_running {
        return;
    }
    tracing::debug!(target: "weft.loop", "loop entered");
    loop {
        let did_work = tick();
        let (stopped, pending) = with_scheduler(|s| (s.stop_requested, s.has_pending_work()));
        if stopped || !pending {
            break;
        }
        if !did_work {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    with_scheduler(|s| s.running = false);
    tracing::debug!(target: "weft.loop", "loop drained");
}

/// Mark the loop as started. Idempotent; [`run`] does the actual driving.
pub fn start() {
    with_scheduler(|s| s.loop_started = true);
}

/// `true` between [`start`] and [`stop`].
#[must_use]
pub fn is_loop_started() -> bool {
    with_scheduler(|s| s.loop_started)
}

/// Stop the loop: clears the started flag and makes an in-flight [`run`]
/// return at the next tick boundary.
pub fn stop() {
    with_scheduler(|s| {
        s.loop_started = false;
        s.stop_requested = true;
    });
}

/// Flush pending work once, then stop the loop. The shutdown hook for
/// orderly process exit.
pub fn shutdown() {
    run();
    stop();
}

/// Replace the scheduler with a fresh instance, dropping all queued
/// microtasks, timers, and fibers. Intended for tests.
pub fn reset() {
    let old = SCHEDULER.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), Scheduler::new()));
    // Fiber futures may run arbitrary drop code; release them outside the
    // scheduler borrow.
    drop(old);
}
