// SPDX-License-Identifier: MIT OR Apache-2.0
//! OS signal delivery as an optional capability.
//!
//! Handlers only flip per-signal atomic flags; the scheduler polls the
//! flags each tick and cancels subscribed tokens from ordinary loop
//! context. Where registration is unsupported, callers silently skip it
//! and the rest of the runtime is unaffected.

#[cfg(unix)]
mod imp {
    use std::sync::atomic::{AtomicBool, Ordering};

    const MAX_SIGNAL: usize = 64;

    static PENDING: [AtomicBool; MAX_SIGNAL] = [const { AtomicBool::new(false) }; MAX_SIGNAL];
    static INSTALLED: [AtomicBool; MAX_SIGNAL] = [const { AtomicBool::new(false) }; MAX_SIGNAL];

    extern "C" fn on_signal(sig: libc::c_int) {
        // Async-signal-safe: a single atomic store.
        if (0..MAX_SIGNAL as libc::c_int).contains(&sig) {
            PENDING[sig as usize].store(true, Ordering::SeqCst);
        }
    }

    /// Install the flag-setting handler for `sig`. Returns `false` when the
    /// signal number is out of range or the OS refuses the handler.
    #[allow(unsafe_code)]
    pub(crate) fn install(sig: i32) -> bool {
        if !(1..MAX_SIGNAL as i32).contains(&sig) {
            return false;
        }
        if INSTALLED[sig as usize].swap(true, Ordering::SeqCst) {
            return true;
        }
        let handler = on_signal as extern "C" fn(libc::c_int);
        let previous = unsafe { libc::signal(sig, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            INSTALLED[sig as usize].store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Drain the set of signals delivered since the last poll.
    pub(crate) fn take_pending() -> Vec<i32> {
        (1..MAX_SIGNAL)
            .filter(|&i| PENDING[i].swap(false, Ordering::SeqCst))
            .map(|i| i as i32)
            .collect()
    }
}

#[cfg(not(unix))]
mod imp {
    pub(crate) fn install(_sig: i32) -> bool {
        false
    }

    pub(crate) fn take_pending() -> Vec<i32> {
        Vec::new()
    }
}

pub(crate) use imp::{install, take_pending};
