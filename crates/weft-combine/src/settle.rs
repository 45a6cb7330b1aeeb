// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gathering combinators: all, all_entries, race, any, all_settled.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use weft_error::WeftError;
use weft_promise::{Deferred, Promise};

/// Fulfil with every input's value, in input order, once all inputs
/// fulfil; reject with the first rejection reason otherwise.
///
/// Empty input fulfils immediately with an empty vector.
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let items: Vec<Promise<T>> = promises.into_iter().collect();
    if items.is_empty() {
        return Promise::resolved(Vec::new());
    }
    let total = items.len();
    let deferred = Deferred::new();
    let results: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; total]));
    let remaining = Rc::new(Cell::new(total));
    for (index, promise) in items.into_iter().enumerate() {
        let results = Rc::clone(&results);
        let remaining = Rc::clone(&remaining);
        let deferred = deferred.clone();
        promise.on_settled(move |outcome| match outcome {
            Ok(value) => {
                results.borrow_mut()[index] = Some(value);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let values: Vec<T> = results.borrow_mut().drain(..).flatten().collect();
                    let _ = deferred.resolve(values);
                }
            }
            Err(reason) => {
                let _ = deferred.reject(reason);
            }
        });
    }
    deferred.promise()
}

/// Keyed form of [`all`]: fulfils with `(key, value)` pairs preserving the
/// input order and keys.
pub fn all_entries<K, T, I>(entries: I) -> Promise<Vec<(K, T)>>
where
    K: Clone + 'static,
    T: Clone + 'static,
    I: IntoIterator<Item = (K, Promise<T>)>,
{
    let (keys, promises): (Vec<K>, Vec<Promise<T>>) = entries.into_iter().unzip();
    all(promises).then(move |values| keys.into_iter().zip(values).collect())
}

/// Settle with the first settlement of either polarity; later settlements
/// are ignored.
///
/// # Errors
///
/// `InvalidArgument` on empty input, synchronously.
pub fn race<T, I>(promises: I) -> Result<Promise<T>, WeftError>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let items: Vec<Promise<T>> = promises.into_iter().collect();
    if items.is_empty() {
        return Err(WeftError::invalid_argument(
            "race() requires at least one promise",
        ));
    }
    let deferred = Deferred::new();
    for promise in items {
        let deferred = deferred.clone();
        promise.on_settled(move |outcome| {
            let _ = match outcome {
                Ok(value) => deferred.resolve(value),
                Err(reason) => deferred.reject(reason),
            };
        });
    }
    Ok(deferred.promise())
}

/// Fulfil with the first fulfilment; if every input rejects, reject with an
/// aggregate error whose inner list preserves input order.
///
/// # Errors
///
/// `InvalidArgument` on empty input, synchronously.
pub fn any<T, I>(promises: I) -> Result<Promise<T>, WeftError>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let items: Vec<Promise<T>> = promises.into_iter().collect();
    if items.is_empty() {
        return Err(WeftError::invalid_argument(
            "any() requires at least one promise",
        ));
    }
    let total = items.len();
    let deferred = Deferred::new();
    let reasons: Rc<RefCell<Vec<Option<WeftError>>>> = Rc::new(RefCell::new(vec![None; total]));
    let remaining = Rc::new(Cell::new(total));
    for (index, promise) in items.into_iter().enumerate() {
        let reasons = Rc::clone(&reasons);
        let remaining = Rc::clone(&remaining);
        let deferred = deferred.clone();
        promise.on_settled(move |outcome| match outcome {
            Ok(value) => {
                let _ = deferred.resolve(value);
            }
            Err(reason) => {
                reasons.borrow_mut()[index] = Some(reason);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let inner: Vec<WeftError> =
                        reasons.borrow_mut().drain(..).flatten().collect();
                    let _ = deferred.reject(WeftError::aggregate("All promises rejected", inner));
                }
            }
        });
    }
    Ok(deferred.promise())
}

/// Per-entry settlement descriptor produced by [`all_settled`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettledOutcome<T> {
    /// The entry fulfilled with this value.
    Fulfilled(T),
    /// The entry rejected with this reason.
    Rejected(WeftError),
}

impl<T> SettledOutcome<T> {
    /// `true` for a fulfilled entry.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// The fulfilment value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(v) => Some(v),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&WeftError> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(e) => Some(e),
        }
    }
}

/// Fulfil with one [`SettledOutcome`] per input, in input order, once every
/// input has settled. Never rejects.
pub fn all_settled<T, I>(promises: I) -> Promise<Vec<SettledOutcome<T>>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let items: Vec<Promise<T>> = promises.into_iter().collect();
    if items.is_empty() {
        return Promise::resolved(Vec::new());
    }
    let total = items.len();
    let deferred = Deferred::new();
    let outcomes: Rc<RefCell<Vec<Option<SettledOutcome<T>>>>> =
        Rc::new(RefCell::new(vec![None; total]));
    let remaining = Rc::new(Cell::new(total));
    for (index, promise) in items.into_iter().enumerate() {
        let outcomes = Rc::clone(&outcomes);
        let remaining = Rc::clone(&remaining);
        let deferred = deferred.clone();
        promise.on_settled(move |outcome| {
            let descriptor = match outcome {
                Ok(value) => SettledOutcome::Fulfilled(value),
                Err(reason) => SettledOutcome::Rejected(reason),
            };
            outcomes.borrow_mut()[index] = Some(descriptor);
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                let list: Vec<SettledOutcome<T>> =
                    outcomes.borrow_mut().drain(..).flatten().collect();
                let _ = deferred.resolve(list);
            }
        });
    }
    deferred.promise()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_error::ErrorKind;

    // -- all -------------------------------------------------------------

    #[test]
    fn all_preserves_order() {
        let p = all(vec![
            Promise::resolved(1),
            Promise::resolved(2),
            Promise::resolved(3),
        ]);
        assert_eq!(p.value().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn all_empty_fulfils_empty() {
        let p: Promise<Vec<i32>> = all(Vec::new());
        assert_eq!(p.value().unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn all_waits_for_every_entry() {
        let gate = Deferred::new();
        let p = all(vec![Promise::resolved(10), gate.promise()]);
        assert!(p.is_pending());
        gate.resolve(20).unwrap();
        assert_eq!(p.value().unwrap(), vec![10, 20]);
    }

    #[test]
    fn all_rejects_with_first_rejection() {
        let late = Deferred::new();
        let p = all(vec![
            Promise::resolved(1),
            Promise::rejected(WeftError::failed("early")),
            late.promise(),
        ]);
        assert_eq!(p.rejection().unwrap(), WeftError::failed("early"));
        // A later rejection is ignored.
        late.reject(WeftError::failed("late")).unwrap();
        assert_eq!(p.rejection().unwrap(), WeftError::failed("early"));
    }

    #[test]
    fn all_entries_preserves_keys() {
        let p = all_entries(vec![
            ("k1", Promise::resolved("v1")),
            ("k2", Promise::resolved("v2")),
        ]);
        assert_eq!(p.value().unwrap(), vec![("k1", "v1"), ("k2", "v2")]);
    }

    // -- race ------------------------------------------------------------

    #[test]
    fn race_empty_is_invalid_argument() {
        let err = race(Vec::<Promise<i32>>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn race_first_settlement_wins() {
        let slow = Deferred::new();
        let p = race(vec![slow.promise(), Promise::resolved(5)]).unwrap();
        assert_eq!(p.value().unwrap(), 5);
        slow.resolve(9).unwrap();
        assert_eq!(p.value().unwrap(), 5);
    }

    #[test]
    fn race_first_rejection_also_wins() {
        let slow: Deferred<i32> = Deferred::new();
        let p = race(vec![
            Promise::rejected(WeftError::failed("lost")),
            slow.promise(),
        ])
        .unwrap();
        assert_eq!(p.rejection().unwrap(), WeftError::failed("lost"));
    }

    // -- any -------------------------------------------------------------

    #[test]
    fn any_empty_is_invalid_argument() {
        let err = any(Vec::<Promise<i32>>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn any_first_fulfilment_wins_over_rejections() {
        let p = any(vec![
            Promise::rejected(WeftError::failed("nope")),
            Promise::resolved(3),
            Promise::resolved(4),
        ])
        .unwrap();
        assert_eq!(p.value().unwrap(), 3);
    }

    #[test]
    fn any_all_rejected_builds_aggregate_in_input_order() {
        let p: Promise<i32> = any(vec![
            Promise::rejected(WeftError::failed("e1")),
            Promise::rejected(WeftError::failed("e2")),
            Promise::rejected(WeftError::failed("e3")),
        ])
        .unwrap();
        let reason = p.rejection().unwrap();
        assert_eq!(reason.kind(), ErrorKind::Aggregate);
        let aggregate = reason.as_aggregate().unwrap();
        assert_eq!(aggregate.message(), "All promises rejected");
        assert_eq!(aggregate.len(), 3);
        assert_eq!(aggregate.messages(), vec!["e1", "e2", "e3"]);
    }

    // -- all_settled -----------------------------------------------------

    #[test]
    fn all_settled_records_mixed_outcomes() {
        let p = all_settled(vec![
            Promise::resolved("s1"),
            Promise::rejected(WeftError::failed("e1")),
            Promise::resolved("s2"),
        ]);
        let outcomes = p.value().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], SettledOutcome::Fulfilled("s1"));
        assert_eq!(outcomes[1], SettledOutcome::Rejected(WeftError::failed("e1")));
        assert_eq!(outcomes[2], SettledOutcome::Fulfilled("s2"));
    }

    #[test]
    fn all_settled_is_always_fulfilled() {
        let p: Promise<Vec<SettledOutcome<i32>>> = all_settled(vec![
            Promise::rejected(WeftError::failed("a")),
            Promise::rejected(WeftError::failed("b")),
        ]);
        assert!(p.is_fulfilled());
    }

    #[test]
    fn all_settled_empty_fulfils_empty() {
        let p: Promise<Vec<SettledOutcome<i32>>> = all_settled(Vec::new());
        assert_eq!(p.value().unwrap(), Vec::new());
    }

    #[test]
    fn settled_outcome_accessors() {
        let ok: SettledOutcome<i32> = SettledOutcome::Fulfilled(1);
        let ko: SettledOutcome<i32> = SettledOutcome::Rejected(WeftError::failed("x"));
        assert!(ok.is_fulfilled());
        assert_eq!(ok.value(), Some(&1));
        assert_eq!(ok.reason(), None);
        assert!(!ko.is_fulfilled());
        assert_eq!(ko.value(), None);
        assert_eq!(ko.reason(), Some(&WeftError::failed("x")));
    }
}
