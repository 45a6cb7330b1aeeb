// SPDX-License-Identifier: MIT OR Apache-2.0
//! The owning controller of one token.

use crate::token::CancelToken;
use std::cell::Cell;
use weft_error::WeftError;

/// Lightweight owner of a single [`CancelToken`].
///
/// The source is the only handle meant to *request* cancellation; tokens
/// handed out through [`token`](Self::token) are the observation side.
/// After [`dispose`](Self::dispose), every operation on the source fails
/// with a disposed error, while previously obtained tokens keep working.
pub struct CancelSource {
    token: CancelToken,
    disposed: Cell<bool>,
}

impl CancelSource {
    fn wrap(token: CancelToken) -> Self {
        Self {
            token,
            disposed: Cell::new(false),
        }
    }

    /// A source owning a fresh cancellable token.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(CancelToken::new())
    }

    /// A source owning a never-cancel token.
    #[must_use]
    pub fn never() -> Self {
        Self::wrap(CancelToken::never())
    }

    /// A source whose token is constructed already cancelled.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::wrap(CancelToken::precancelled(Some(reason.into())))
    }

    /// A source owning an explicitly provided token.
    ///
    /// This is the constructor the factories below build on; it also lets
    /// callers wrap combined tokens or tokens obtained elsewhere.
    #[must_use]
    pub fn from_token(token: CancelToken) -> Self {
        Self::wrap(token)
    }

    /// A source owning a combined token over `tokens`.
    #[must_use]
    pub fn combine(tokens: &[CancelToken]) -> Self {
        Self::wrap(CancelToken::combine(tokens))
    }

    /// The owned token.
    ///
    /// # Errors
    ///
    /// `Disposed` after [`dispose`](Self::dispose).
    pub fn token(&self) -> Result<CancelToken, WeftError> {
        self.check_disposed("token")?;
        Ok(self.token.clone())
    }

    /// Request cancellation with no explicit reason.
    ///
    /// # Errors
    ///
    /// `Disposed` after [`dispose`](Self::dispose).
    pub fn cancel(&self) -> Result<(), WeftError> {
        self.check_disposed("cancel")?;
        self.token.cancel();
        Ok(())
    }

    /// Request cancellation with a reason.
    ///
    /// # Errors
    ///
    /// `Disposed` after [`dispose`](Self::dispose).
    pub fn cancel_with(&self, reason: impl Into<String>) -> Result<(), WeftError> {
        self.check_disposed("cancel")?;
        self.token.cancel_with(reason);
        Ok(())
    }

    /// Whether cancellation has been requested on the owned token.
    ///
    /// # Errors
    ///
    /// `Disposed` after [`dispose`](Self::dispose).
    pub fn is_cancellation_requested(&self) -> Result<bool, WeftError> {
        self.check_disposed("is_cancellation_requested")?;
        Ok(self.token.is_cancellation_requested())
    }

    /// Mark the source disposed. Idempotent.
    pub fn dispose(&self) {
        self.disposed.set(true);
    }

    /// `true` after [`dispose`](Self::dispose).
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn check_disposed(&self, operation: &str) -> Result<(), WeftError> {
        if self.disposed.get() {
            return Err(WeftError::disposed(operation));
        }
        Ok(())
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSource")
            .field("disposed", &self.disposed.get())
            .field("token", &self.token)
            .finish()
    }
}
