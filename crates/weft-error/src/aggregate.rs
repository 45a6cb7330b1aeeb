//! Aggregate errors: an ordered list of inner errors behind one message.

use crate::{ErrorKind, WeftError};
use std::fmt;

/// An error holding an ordered list of inner [`WeftError`]s.
///
/// Produced by fan-out combinators (`any` when every input rejects) and
/// usable anywhere several independent failures need to surface as one.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateError {
    message: String,
    errors: Vec<WeftError>,
}

impl AggregateError {
    /// Create an aggregate over `errors` in the given order.
    pub fn new(message: impl Into<String>, errors: Vec<WeftError>) -> Self {
        Self {
            message: message.into(),
            errors,
        }
    }

    /// The aggregate's own message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Number of inner errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `true` when there are no inner errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The inner error at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&WeftError> {
        self.errors.get(index)
    }

    /// All inner errors, in insertion order.
    #[must_use]
    pub fn errors(&self) -> &[WeftError] {
        &self.errors
    }

    /// Messages of all inner errors, in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Inner errors of the given kind, in insertion order.
    #[must_use]
    pub fn of_kind(&self, kind: ErrorKind) -> Vec<&WeftError> {
        self.errors.iter().filter(|e| e.kind() == kind).collect()
    }

    /// `true` if any inner error has the given kind.
    #[must_use]
    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind() == kind)
    }

    /// Recursively inline nested aggregates' inner errors.
    ///
    /// The result contains no aggregate entries; the relative order of the
    /// leaf errors is preserved. Flattening an already-flat aggregate is a
    /// no-op, so the operation is idempotent.
    #[must_use]
    pub fn flatten(&self) -> AggregateError {
        fn collect(errors: &[WeftError], out: &mut Vec<WeftError>) {
            for err in errors {
                match err {
                    WeftError::Aggregate(nested) => collect(nested.errors(), out),
                    other => out.push(other.clone()),
                }
            }
        }
        let mut flat = Vec::with_capacity(self.errors.len());
        collect(&self.errors, &mut flat);
        AggregateError::new(self.message.clone(), flat)
    }

    /// Multi-line rendering listing every inner error message.
    #[must_use]
    pub fn formatted(&self) -> String {
        let mut out = format!("{} ({} inner errors)", self.message, self.len());
        for (i, err) in self.errors.iter().enumerate() {
            out.push_str(&format!("\n  [{i}] {}: {err}", err.kind()));
        }
        out
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} inner errors)", self.message, self.len())
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> AggregateError {
        AggregateError::new(
            "All promises rejected",
            vec![
                WeftError::failed("e1"),
                WeftError::cancelled_with("stop"),
                WeftError::failed("e3"),
            ],
        )
    }

    #[test]
    fn len_and_indexed_access() {
        let agg = sample();
        assert_eq!(agg.len(), 3);
        assert!(!agg.is_empty());
        assert_eq!(agg.get(0), Some(&WeftError::failed("e1")));
        assert_eq!(agg.get(3), None);
    }

    #[test]
    fn messages_preserve_order() {
        assert_eq!(sample().messages(), vec!["e1", "stop", "e3"]);
    }

    #[test]
    fn of_kind_filters() {
        let agg = sample();
        assert_eq!(agg.of_kind(ErrorKind::Failed).len(), 2);
        assert_eq!(agg.of_kind(ErrorKind::Cancelled).len(), 1);
        assert!(agg.of_kind(ErrorKind::Disposed).is_empty());
    }

    #[test]
    fn contains_kind_predicate() {
        let agg = sample();
        assert!(agg.contains_kind(ErrorKind::Cancelled));
        assert!(!agg.contains_kind(ErrorKind::WrongState));
    }

    #[test]
    fn display_counts_inner() {
        assert_eq!(
            sample().to_string(),
            "All promises rejected (3 inner errors)"
        );
    }

    #[test]
    fn formatted_lists_every_inner_error() {
        insta::assert_snapshot!(sample().formatted(), @r"
        All promises rejected (3 inner errors)
          [0] failed: e1
          [1] cancelled: stop
          [2] failed: e3
        ");
    }

    #[test]
    fn flatten_inlines_nested_aggregates() {
        let nested = AggregateError::new(
            "outer",
            vec![
                WeftError::failed("a"),
                WeftError::aggregate(
                    "mid",
                    vec![
                        WeftError::failed("b"),
                        WeftError::aggregate("deep", vec![WeftError::failed("c")]),
                    ],
                ),
                WeftError::failed("d"),
            ],
        );
        let flat = nested.flatten();
        assert_eq!(flat.messages(), vec!["a", "b", "c", "d"]);
        assert!(!flat.contains_kind(ErrorKind::Aggregate));
    }

    #[test]
    fn flatten_is_idempotent() {
        let nested = AggregateError::new(
            "outer",
            vec![WeftError::aggregate("in", vec![WeftError::failed("x")])],
        );
        let once = nested.flatten();
        assert_eq!(once.flatten(), once);
    }

    #[test]
    fn empty_aggregate() {
        let agg = AggregateError::new("nothing", vec![]);
        assert!(agg.is_empty());
        assert_eq!(agg.to_string(), "nothing (0 inner errors)");
        assert_eq!(agg.flatten(), agg);
    }

    proptest! {
        #[test]
        fn flatten_never_leaves_nested_aggregates(messages in proptest::collection::vec("[a-z]{1,8}", 0..6)) {
            // Build a two-deep aggregate from arbitrary leaf messages.
            let leaves: Vec<WeftError> = messages.iter().map(WeftError::failed).collect();
            let agg = AggregateError::new(
                "outer",
                vec![WeftError::aggregate("inner", leaves.clone())],
            );
            let flat = agg.flatten();
            prop_assert!(!flat.contains_kind(ErrorKind::Aggregate));
            prop_assert_eq!(flat.len(), leaves.len());
            prop_assert_eq!(flat.flatten(), flat);
        }
    }
}
