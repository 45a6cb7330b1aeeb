// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for the weft runtime.
//!
//! A [`CancelToken`] is a one-way boolean flag with a reason and a callback
//! list, observable by any number of subscribers. A [`CancelSource`] is the
//! owning controller that can flip the flag. Combined tokens fan in any
//! number of upstream tokens and cancel as soon as the first upstream does.
//!
//! Cancellation here is cooperative throughout: flipping a token never
//! preempts anything, it only runs subscriber callbacks and lets polling
//! code observe the flag.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod source;
mod token;

pub use source::CancelSource;
pub use token::{CancelToken, Subscription};
