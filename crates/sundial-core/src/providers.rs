//! External seams of the rule engine.
//!
//! The core performs no I/O and owns no ambient state: the astronomical
//! ephemeris, the key/value context stores, the random source behind offset
//! jitter, and the embedded expression evaluator are all injected through
//! the traits in this module. Test code (and hosts without one of these
//! capabilities) supply stubs.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde_json::Value;

use crate::condition::StoreKind;
use crate::error::{ExpressionFault, Result, RuleError};

// ── Ephemeris ───────────────────────────────────────────────────────────────

/// Lunar events for one day, plus polar visibility flags used only for
/// error reporting.
#[derive(Debug, Clone, Default)]
pub struct MoonDay {
    pub events: BTreeMap<String, Option<DateTime<Utc>>>,
    pub always_up: bool,
    pub always_down: bool,
}

/// Rise/set pair for a custom solar elevation angle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomDay {
    pub rise: Option<DateTime<Utc>>,
    pub set: Option<DateTime<Utc>>,
}

/// Black-box astronomical ephemeris.
///
/// An event mapped to `None` is known but does not occur on that day
/// (permanent midnight sun, moon below the horizon all day, and so on);
/// a name missing from the map entirely is an unknown event.
pub trait Almanac: Send + Sync {
    fn sun_events(
        &self,
        day: NaiveDate,
        latitude: f64,
        longitude: f64,
    ) -> BTreeMap<String, Option<DateTime<Utc>>>;

    fn moon_events(&self, day: NaiveDate, latitude: f64, longitude: f64) -> MoonDay;

    fn custom_events(&self, day: NaiveDate, latitude: f64, longitude: f64, angle: f64)
        -> CustomDay;
}

// ── Custom event registry ───────────────────────────────────────────────────

/// Which edge of a custom elevation crossing an event name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolarEdge {
    Rise,
    Set,
}

/// Custom solar events registered once at startup.
///
/// Each registration pins a solar elevation angle to a rise name and a set
/// name. The registry is its own namespace: custom names never collide with
/// the built-in sun event names because resolution consults this table
/// before the almanac's built-in map.
#[derive(Debug, Clone, Default)]
pub struct CustomEventRegistry {
    entries: BTreeMap<String, (f64, SolarEdge)>,
}

impl CustomEventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, angle: f64, rise_name: &str, set_name: &str) {
        self.entries
            .insert(rise_name.to_string(), (angle, SolarEdge::Rise));
        self.entries
            .insert(set_name.to_string(), (angle, SolarEdge::Set));
    }

    pub fn lookup(&self, name: &str) -> Option<(f64, SolarEdge)> {
        self.entries.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

// ── Context stores ──────────────────────────────────────────────────────────

/// Key/value lookup into the host's context stores.
///
/// `env` is expected to surface environment variables, `flow`/`global` the
/// host's scoped stores, and `msg` the message currently being routed.
/// Returning `None` means the key is absent; the evaluator decides whether
/// that is an error.
pub trait ContextStore: Send + Sync {
    fn get(&self, store: StoreKind, key: &str) -> Option<Value>;
}

// ── Randomness ──────────────────────────────────────────────────────────────

/// Injectable source for offset randomization.
pub trait RandomSource: Send + Sync {
    /// A uniform integer in `[0, bound]`.
    fn offset_jitter(&self, bound: i64) -> i64;
}

/// Default [`RandomSource`] backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn offset_jitter(&self, bound: i64) -> i64 {
        if bound <= 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=bound)
    }
}

// ── Expression engine ───────────────────────────────────────────────────────

/// A predicate callable from inside the expression language.
pub type PredicateFn = Box<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Factory for prepared expressions. One instance is prepared per
/// evaluation so predicate bindings never leak across calls.
pub trait ExpressionEngine: Send + Sync {
    fn prepare(&self, source: &str) -> Result<Box<dyn Expression>>;
}

/// A single prepared expression, bound to one evaluation.
#[async_trait]
pub trait Expression: Send {
    /// Expose a named predicate to the expression.
    fn register(&mut self, name: &str, predicate: PredicateFn);

    /// Bind a named value into the expression's scope.
    fn assign(&mut self, name: &str, value: Value);

    /// Run the expression to completion. May suspend; the caller awaits.
    async fn run(&mut self) -> std::result::Result<Value, ExpressionFault>;
}

/// Engine stub for hosts without an embedded expression language: any
/// `expression` condition fails at preparation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpressions;

impl ExpressionEngine for NoExpressions {
    fn prepare(&self, _source: &str) -> Result<Box<dyn Expression>> {
        Err(RuleError::ExpressionFailed {
            fault: ExpressionFault {
                message: "no expression engine is configured".to_string(),
                code: Some("no-engine".to_string()),
                ..ExpressionFault::default()
            },
        })
    }
}

// ── Test doubles ────────────────────────────────────────────────────────────
