// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chainable deferred values for the weft runtime.
//!
//! A [`Promise`] is a three-state container (pending / fulfilled / rejected)
//! for a value that arrives later.  Consumers chain transformations with
//! [`Promise::then`] and friends; producers settle through a [`Deferred`].
//! Everything here is single-threaded (`Rc`-based, `!Send`): the weft
//! scheduler guarantees no parallel mutation, so no locks are needed.
//!
//! Settlement callback invocation is synchronous: when a producer settles,
//! registered callbacks run to completion before the settle call returns,
//! in registration order.  Callbacks registered after settlement run
//! immediately.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod deferred;
mod promise;
mod state;

pub use deferred::Deferred;
pub use promise::{Promise, PromiseFuture};
pub use state::PromiseState;
