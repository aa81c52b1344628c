//! # sundial-core
//!
//! Temporal rule engine: symbolic time resolution and condition evaluation.
//!
//! Conditions arrive as JSON descriptors ("before sunset minus 30 minutes",
//! "between 23:00 and 08:00", "last workday of the month") and are converted
//! into typed values once, then evaluated against arbitrary base instants in
//! a configured timezone. Astronomical events, context stores, randomness,
//! and the optional embedded expression language are injected through traits,
//! so evaluation itself is pure and deterministic.
//!
//! ## Modules
//!
//! - [`condition`] — condition data model, descriptor validation and conversion
//! - [`resolve`] — clock/solar/lunar/custom/context time resolution with offsets
//! - [`eval`] — condition evaluation, rule sets, precision-aware comparison
//! - [`calendar`] — ordinal weekday-of-month and day-pattern math
//! - [`providers`] — injection seams: almanac, context stores, RNG, expressions
//! - [`error`] — error types

pub mod calendar;
pub mod condition;
pub mod error;
pub mod eval;
mod predicates;
pub mod providers;
pub mod resolve;

pub use calendar::{DayUnit, MonthFilter, OrdinalRank};
pub use condition::{
    convert, millis_to_clock, parse_clock, validate, CompareOp, Condition, DaySelector,
    EventCatalog, OffsetSpec, Precision, SpanOp, StoreKind, TimeOperand, TimeReference,
};
pub use error::{ExpressionFault, Result, RuleError, TimeFault};
pub use eval::{Evaluator, RuleSet, MAX_CONTEXT_DEPTH};
pub use providers::{
    Almanac, ContextStore, CustomDay, CustomEventRegistry, Expression, ExpressionEngine, MoonDay,
    NoExpressions, PredicateFn, RandomSource, SolarEdge, ThreadRngSource,
};
pub use resolve::{EvalConfig, Resolver};
