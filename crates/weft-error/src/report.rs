//! Side channel for background errors.
//!
//! Callback dispatch failures (token callbacks, timer callbacks,
//! microtasks, promise observer drains) must never destabilise runtime
//! state, so they are caught and handed to a [`BackgroundSink`] instead of
//! propagating. The default sink logs through `tracing`; tests install a
//! capturing sink.

use crate::WeftError;
use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

/// Receiver for errors that have no caller left to propagate to.
pub trait BackgroundSink {
    /// Report one background error together with the dispatch context that
    /// produced it (e.g. `"microtask"`, `"cancellation callback"`).
    fn report(&self, context: &str, error: &WeftError);
}

/// Default sink: logs every report at warn level.
pub struct TracingSink;

impl BackgroundSink for TracingSink {
    fn report(&self, context: &str, error: &WeftError) {
        tracing::warn!(target: "weft.sink", context, kind = %error.kind(), %error, "background error");
    }
}

thread_local! {
    static SINK: RefCell<Rc<dyn BackgroundSink>> = RefCell::new(Rc::new(TracingSink));
}

/// Install a sink for this thread, returning the previous one.
pub fn set_background_sink(sink: Rc<dyn BackgroundSink>) -> Rc<dyn BackgroundSink> {
    SINK.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), sink))
}

/// Report an error to the current sink.
pub fn report_background(context: &str, error: &WeftError) {
    let sink = SINK.with(|cell| Rc::clone(&cell.borrow()));
    sink.report(context, error);
}

/// Run a user callback, converting a panic into a reported background
/// error. Returns `true` when the callback completed normally.
pub fn guard_dispatch<F: FnOnce()>(context: &str, f: F) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let message = panic_message(&payload);
            report_background(context, &WeftError::failed(message));
            false
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}
