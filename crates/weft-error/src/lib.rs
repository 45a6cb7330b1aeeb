//! Unified error taxonomy for the weft runtime.
//!
//! Every error surfaced by the runtime is a [`WeftError`] and carries a
//! stable, machine-readable [`ErrorKind`].  Cancellation errors keep the
//! human-readable reason they were cancelled with (and the signal number,
//! when a signal did the cancelling); aggregate errors hold an ordered list
//! of inner errors with introspection helpers.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

mod aggregate;
mod report;

pub use aggregate::AggregateError;
pub use report::{
    BackgroundSink, TracingSink, guard_dispatch, report_background, set_background_sink,
};

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable, stable tag for a [`WeftError`] variant.
///
/// Each kind serialises to a `snake_case` string that will not change across
/// patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An operation was cancelled (token throw, promise cancel, fiber
    /// cancel, timeout).
    Cancelled,
    /// A collection of errors from a fan-out operation.
    Aggregate,
    /// A caller passed an argument outside the accepted domain.
    InvalidArgument,
    /// A cancellation source was used after `dispose()`.
    Disposed,
    /// A state-dependent accessor was called in the wrong state.
    WrongState,
    /// A deferred was resolved or rejected a second time.
    AlreadySettled,
    /// A generic runtime failure raised by user code.
    Failed,
}

impl ErrorKind {
    /// Stable `&'static str` representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Aggregate => "aggregate",
            Self::InvalidArgument => "invalid_argument",
            Self::Disposed => "disposed",
            Self::WrongState => "wrong_state",
            Self::AlreadySettled => "already_settled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WeftError
// ---------------------------------------------------------------------------

/// Default reason attached to a cancellation raised by a token check.
pub const TOKEN_CANCELLED_REASON: &str = "Operation was cancelled";

/// Default reason attached to a cancellation raised by `Promise::cancel`.
pub const PROMISE_CANCELLED_REASON: &str = "Promise was cancelled";

/// Cancellation reason used when a timeout of `ms` milliseconds expires.
#[must_use]
pub fn timeout_reason(ms: u64) -> String {
    format!("Timeout of {ms} milliseconds exceeded")
}

/// Cancellation reason used when OS signal `sig` is delivered.
#[must_use]
pub fn signal_reason(sig: i32) -> String {
    format!("Received signal {sig}")
}

/// Unified runtime error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeftError {
    /// The operation was cancelled.
    #[error("{reason}")]
    Cancelled {
        /// Why the cancellation happened.
        reason: String,
        /// Signal number, when an OS signal triggered the cancellation.
        code: Option<i32>,
    },

    /// Several inner errors from a fan-out operation.
    #[error(transparent)]
    Aggregate(AggregateError),

    /// A caller passed an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cancellation source was used after `dispose()`.
    #[error("cancellation source has been disposed: {0}")]
    Disposed(String),

    /// A state-dependent accessor was called in the wrong state.
    #[error("wrong state: {0}")]
    WrongState(String),

    /// A deferred was resolved or rejected a second time.
    #[error("already settled: {0}")]
    AlreadySettled(String),

    /// A generic runtime failure raised by user code.
    #[error("{0}")]
    Failed(String),
}

impl WeftError {
    /// Cancellation with the default token reason.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::cancelled_with(TOKEN_CANCELLED_REASON)
    }

    /// Cancellation with an explicit reason.
    pub fn cancelled_with(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
            code: None,
        }
    }

    /// Cancellation raised by an expired timeout of `ms` milliseconds.
    #[must_use]
    pub fn timeout(ms: u64) -> Self {
        Self::cancelled_with(timeout_reason(ms))
    }

    /// Cancellation raised by delivery of OS signal `sig`.
    ///
    /// The signal number is carried as the error code.
    #[must_use]
    pub fn signal(sig: i32) -> Self {
        Self::Cancelled {
            reason: signal_reason(sig),
            code: Some(sig),
        }
    }

    /// Aggregate error over `errors` with the given message.
    pub fn aggregate(message: impl Into<String>, errors: Vec<WeftError>) -> Self {
        Self::Aggregate(AggregateError::new(message, errors))
    }

    /// Invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Disposed-source error naming the refused operation.
    pub fn disposed(operation: impl Into<String>) -> Self {
        Self::Disposed(operation.into())
    }

    /// Wrong-state error.
    pub fn wrong_state(message: impl Into<String>) -> Self {
        Self::WrongState(message.into())
    }

    /// Already-settled error naming the refused operation.
    pub fn already_settled(operation: impl Into<String>) -> Self {
        Self::AlreadySettled(operation.into())
    }

    /// Generic runtime failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// The stable [`ErrorKind`] of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Aggregate(_) => ErrorKind::Aggregate,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Disposed(_) => ErrorKind::Disposed,
            Self::WrongState(_) => ErrorKind::WrongState,
            Self::AlreadySettled(_) => ErrorKind::AlreadySettled,
            Self::Failed(_) => ErrorKind::Failed,
        }
    }

    /// `true` if this is a cancellation error.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The cancellation reason, if this is a cancellation error.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&str> {
        match self {
            Self::Cancelled { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// The signal number, if a signal triggered this cancellation.
    #[must_use]
    pub fn signal_code(&self) -> Option<i32> {
        match self {
            Self::Cancelled { code, .. } => *code,
            _ => None,
        }
    }

    /// The inner [`AggregateError`], if this is an aggregate.
    #[must_use]
    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        match self {
            Self::Aggregate(agg) => Some(agg),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// WeftErrorDto
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`WeftError`].
///
/// Aggregate errors flatten their message into `message` and keep their
/// inner errors in `inner`; every other kind leaves `inner` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeftErrorDto {
    /// Error kind tag.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Signal number for signal-triggered cancellations.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<i32>,
    /// Inner error snapshots for aggregates.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub inner: Vec<WeftErrorDto>,
}

impl From<&WeftError> for WeftErrorDto {
    fn from(err: &WeftError) -> Self {
        let inner = match err {
            WeftError::Aggregate(agg) => agg.errors().iter().map(WeftErrorDto::from).collect(),
            _ => Vec::new(),
        };
        let message = match err {
            WeftError::Aggregate(agg) => agg.message().to_string(),
            other => other.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
            code: err.signal_code(),
            inner,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL_KINDS: &[ErrorKind] = &[
        ErrorKind::Cancelled,
        ErrorKind::Aggregate,
        ErrorKind::InvalidArgument,
        ErrorKind::Disposed,
        ErrorKind::WrongState,
        ErrorKind::AlreadySettled,
        ErrorKind::Failed,
    ];

    // -- Constructors ----------------------------------------------------

    #[test]
    fn cancelled_uses_default_reason() {
        let err = WeftError::cancelled();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.cancel_reason(), Some(TOKEN_CANCELLED_REASON));
        assert_eq!(err.signal_code(), None);
    }

    #[test]
    fn cancelled_with_keeps_reason() {
        let err = WeftError::cancelled_with("stop");
        assert_eq!(err.cancel_reason(), Some("stop"));
        assert_eq!(err.to_string(), "stop");
    }

    #[test]
    fn timeout_reason_names_milliseconds() {
        let err = WeftError::timeout(250);
        assert_eq!(err.to_string(), "Timeout of 250 milliseconds exceeded");
        assert!(err.is_cancelled());
    }

    #[test]
    fn signal_carries_code() {
        let err = WeftError::signal(15);
        assert_eq!(err.to_string(), "Received signal 15");
        assert_eq!(err.signal_code(), Some(15));
    }

    #[test]
    fn failed_displays_message_verbatim() {
        assert_eq!(WeftError::failed("boom").to_string(), "boom");
    }

    #[test]
    fn invalid_argument_display() {
        let err = WeftError::invalid_argument("concurrency must be > 0");
        assert_eq!(
            err.to_string(),
            "invalid argument: concurrency must be > 0"
        );
    }

    #[test]
    fn disposed_display_names_operation() {
        let err = WeftError::disposed("cancel");
        assert!(err.to_string().contains("disposed"));
        assert!(err.to_string().contains("cancel"));
    }

    // -- Kind mapping ----------------------------------------------------

    #[test]
    fn kind_covers_every_variant() {
        let errs = [
            WeftError::cancelled(),
            WeftError::aggregate("agg", vec![]),
            WeftError::invalid_argument("a"),
            WeftError::disposed("b"),
            WeftError::wrong_state("c"),
            WeftError::already_settled("d"),
            WeftError::failed("e"),
        ];
        let kinds: Vec<_> = errs.iter().map(WeftError::kind).collect();
        assert_eq!(kinds, ALL_KINDS);
    }

    #[test]
    fn all_kinds_have_unique_as_str() {
        let mut seen = HashSet::new();
        for kind in ALL_KINDS {
            assert!(seen.insert(kind.as_str()), "duplicate: {kind}");
        }
    }

    #[test]
    fn kind_display_matches_as_str() {
        for kind in ALL_KINDS {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn non_cancellation_has_no_reason() {
        assert_eq!(WeftError::failed("x").cancel_reason(), None);
        assert_eq!(WeftError::failed("x").signal_code(), None);
    }

    // -- Serde -----------------------------------------------------------

    #[test]
    fn kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidArgument).unwrap();
        assert_eq!(json, r#""invalid_argument""#);
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::InvalidArgument);
    }

    #[test]
    fn dto_roundtrip_simple() {
        let err = WeftError::signal(2);
        let dto = WeftErrorDto::from(&err);
        let json = serde_json::to_string(&dto).unwrap();
        let back: WeftErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dto);
        assert_eq!(back.code, Some(2));
    }

    #[test]
    fn dto_flattens_aggregate_inner() {
        let err = WeftError::aggregate(
            "All promises rejected",
            vec![WeftError::failed("e1"), WeftError::cancelled()],
        );
        let dto = WeftErrorDto::from(&err);
        assert_eq!(dto.kind, ErrorKind::Aggregate);
        assert_eq!(dto.message, "All promises rejected");
        assert_eq!(dto.inner.len(), 2);
        assert_eq!(dto.inner[0].message, "e1");
        assert_eq!(dto.inner[1].kind, ErrorKind::Cancelled);
    }

    #[test]
    fn dto_omits_empty_fields_in_json() {
        let dto = WeftErrorDto::from(&WeftError::failed("x"));
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("code"));
        assert!(!json.contains("inner"));
    }
}
