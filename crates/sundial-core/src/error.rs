//! Error types for sundial rule evaluation.
//!
//! Every failure carries enough structured detail for a caller to build a
//! diagnostic message without string-parsing: converter rejections are
//! field-addressable and keep the 1-based condition index, resolver failures
//! distinguish an unknown event name from an event that does not occur on
//! the given day, and expression faults pass the embedded evaluator's
//! diagnostics through untouched.

use std::fmt;

use thiserror::Error;

/// Why a symbolic time reference could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeFault {
    /// A clock string did not match `H:MM[:SS][ am/pm]`.
    #[error("clock string does not match H:MM[:SS][ am/pm]")]
    BadClockString,

    /// A numeric clock value was outside `[0, 86_400_000)` ms since midnight.
    #[error("clock value {0} is outside 0..86400000 milliseconds since midnight")]
    BadClockNumber(i64),

    /// The event name is not known to the almanac or custom registry.
    #[error("unknown event name")]
    UnknownEvent,

    /// The event is known but does not occur on this day (e.g. midnight sun).
    #[error("event does not occur on this day (always up: {always_up}, always down: {always_down})")]
    EventUnavailable { always_up: bool, always_down: bool },

    /// A context-indirect reference produced neither a number nor a string.
    #[error("context value is neither a number nor a string")]
    BadContextType,

    /// The wall-clock time does not exist in the evaluation timezone (DST gap).
    #[error("local time does not exist in the evaluation timezone")]
    NonexistentLocalTime,
}

/// Diagnostics passed through from the embedded expression evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpressionFault {
    pub message: String,
    pub code: Option<String>,
    pub position: Option<usize>,
    pub token: Option<String>,
    pub value: Option<String>,
}

impl ExpressionFault {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for ExpressionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        if let Some(position) = self.position {
            write!(f, " at position {position}")?;
        }
        if let Some(token) = &self.token {
            write!(f, " near '{token}'")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum RuleError {
    /// The validator/converter rejected a raw condition descriptor.
    #[error("condition {index} ({operator}): invalid {field}: {value}")]
    InvalidCondition {
        /// 1-based position of the condition in its rule set.
        index: usize,
        operator: String,
        field: String,
        value: String,
    },

    /// A symbolic time reference could not be turned into an instant.
    #[error("cannot resolve time reference '{reference}': {fault}")]
    UnresolvableTime { reference: String, fault: TimeFault },

    /// A `context` condition dereferenced to a missing or unusable value.
    #[error("context {store}/{key}: {reason}")]
    InvalidContextValue {
        store: String,
        key: String,
        reason: String,
    },

    /// The embedded expression evaluator failed.
    #[error("expression evaluation failed: {fault}")]
    ExpressionFailed { fault: ExpressionFault },

    /// An expression produced a value that is not exactly a boolean.
    #[error("expression result is not a boolean: {value}")]
    ExpressionNotBoolean { value: String },

    /// A predicate argument that must be a time value was something else.
    #[error("expression value is not a time: {value}")]
    ExpressionNotTime { value: String },

    /// `context` conditions nested past the recursion limit.
    #[error("context conditions nested deeper than {limit} levels")]
    ContextDepthExceeded { limit: usize },
}

pub type Result<T> = std::result::Result<T, RuleError>;
