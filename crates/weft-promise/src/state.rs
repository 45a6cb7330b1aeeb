// SPDX-License-Identifier: MIT OR Apache-2.0
//! Three-state settlement tag with payload.

use weft_error::WeftError;

/// Settlement state of a promise.
///
/// One-way and one-shot: once a promise leaves [`Pending`](Self::Pending),
/// the state and its payload never change again.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState<T> {
    /// Not yet settled.
    Pending,
    /// Settled with a value.
    Fulfilled(T),
    /// Settled with a rejection reason.
    Rejected(WeftError),
}

impl<T> PromiseState<T> {
    /// `true` while no settlement has happened.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// `true` once settled either way.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// `true` if settled with a value.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// `true` if settled with a rejection.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The fulfilment value.
    ///
    /// # Errors
    ///
    /// `WrongState` when the state is not [`Fulfilled`](Self::Fulfilled).
    pub fn value(&self) -> Result<&T, WeftError> {
        match self {
            Self::Fulfilled(v) => Ok(v),
            Self::Pending => Err(WeftError::wrong_state("value() on a pending promise")),
            Self::Rejected(_) => Err(WeftError::wrong_state("value() on a rejected promise")),
        }
    }

    /// The rejection reason.
    ///
    /// # Errors
    ///
    /// `WrongState` when the state is not [`Rejected`](Self::Rejected).
    pub fn rejection(&self) -> Result<&WeftError, WeftError> {
        match self {
            Self::Rejected(e) => Ok(e),
            Self::Pending => Err(WeftError::wrong_state("rejection() on a pending promise")),
            Self::Fulfilled(_) => {
                Err(WeftError::wrong_state("rejection() on a fulfilled promise"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_error::ErrorKind;

    #[test]
    fn pending_predicates() {
        let s: PromiseState<i32> = PromiseState::Pending;
        assert!(s.is_pending());
        assert!(!s.is_settled());
        assert!(!s.is_fulfilled());
        assert!(!s.is_rejected());
    }

    #[test]
    fn fulfilled_predicates_and_value() {
        let s = PromiseState::Fulfilled(7);
        assert!(s.is_settled());
        assert!(s.is_fulfilled());
        assert_eq!(s.value().unwrap(), &7);
    }

    #[test]
    fn rejected_predicates_and_reason() {
        let s: PromiseState<i32> = PromiseState::Rejected(WeftError::failed("boom"));
        assert!(s.is_settled());
        assert!(s.is_rejected());
        assert_eq!(s.rejection().unwrap(), &WeftError::failed("boom"));
    }

    #[test]
    fn wrong_state_unwraps_fail_loudly() {
        let pending: PromiseState<i32> = PromiseState::Pending;
        assert_eq!(pending.value().unwrap_err().kind(), ErrorKind::WrongState);
        assert_eq!(
            pending.rejection().unwrap_err().kind(),
            ErrorKind::WrongState
        );

        let fulfilled = PromiseState::Fulfilled(1);
        assert_eq!(
            fulfilled.rejection().unwrap_err().kind(),
            ErrorKind::WrongState
        );

        let rejected: PromiseState<i32> = PromiseState::Rejected(WeftError::cancelled());
        assert_eq!(rejected.value().unwrap_err().kind(), ErrorKind::WrongState);
    }
}
