// SPDX-License-Identifier: MIT OR Apache-2.0
//! Combinators over weft promises.
//!
//! Thin but subtle: gathering (`all`, `all_entries`, `race`, `any`,
//! `all_settled`), bounded execution (`pool`, `sequence`), resilience
//! (`retry`, `timeout`), and rate shaping (`debounce`, `throttle`).
//! Validation failures (empty `race`, zero concurrency, zero attempts)
//! surface synchronously as `Err` values rather than rejected promises:
//! they are programming errors, not runtime outcomes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod pool;
mod rate;
mod retry;
mod settle;

pub use pool::{Task, pool, sequence};
pub use rate::{Debounced, Throttled, debounce, throttle};
pub use retry::{retry, timeout};
pub use settle::{SettledOutcome, all, all_entries, all_settled, any, race};
