//! Condition evaluation.
//!
//! The [`Evaluator`] decides whether a [`Condition`] holds at a base
//! instant. Comparisons and intervals resolve their operands through the
//! [`Resolver`] and compare at the operand's precision; `context` conditions
//! dereference a stored descriptor and recurse (bounded by
//! [`MAX_CONTEXT_DEPTH`]); `expression` conditions run through the injected
//! engine with the predicate vocabulary from [`crate::predicates`] bound in.
//!
//! Evaluation is async only because expressions may suspend. Everything
//! except the `expression` operator is also reachable through
//! [`Evaluator::evaluate_sync`].

use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::warn;

use crate::calendar::{is_even_day, is_specific_day, ordinal_day};
use crate::condition::{
    convert, CompareOp, Condition, DaySelector, EventCatalog, Precision, SpanOp, StoreKind,
    TimeOperand,
};
use crate::error::{ExpressionFault, Result, RuleError};
use crate::predicates;
use crate::providers::ExpressionEngine;
use crate::resolve::Resolver;

/// How deep `context` conditions may chain before evaluation gives up.
pub const MAX_CONTEXT_DEPTH: usize = 8;

/// Evaluates conditions against base instants.
#[derive(Clone)]
pub struct Evaluator {
    pub(crate) resolver: Resolver,
    pub(crate) catalog: Arc<EventCatalog>,
    pub(crate) engine: Arc<dyn ExpressionEngine>,
}

impl Evaluator {
    pub fn new(
        resolver: Resolver,
        catalog: Arc<EventCatalog>,
        engine: Arc<dyn ExpressionEngine>,
    ) -> Self {
        Self {
            resolver,
            catalog,
            engine,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Does `condition` hold at `base`?
    ///
    /// `index` is the condition's 1-based position in its rule set, carried
    /// into error payloads. A standalone `otherwise` is false; rule-set
    /// fallback semantics live in [`RuleSet`].
    pub async fn evaluate(
        &self,
        base: DateTime<Tz>,
        condition: &Condition,
        index: usize,
    ) -> Result<bool> {
        self.eval_owned(base, condition.clone(), index, 0).await
    }

    /// Like [`Evaluator::evaluate`], but treats any failure as a non-match.
    pub async fn evaluate_lenient(
        &self,
        base: DateTime<Tz>,
        condition: &Condition,
        index: usize,
    ) -> bool {
        match self.evaluate(base, condition, index).await {
            Ok(matched) => matched,
            Err(error) => {
                warn!(index, %error, "condition evaluation failed, treating as non-match");
                false
            }
        }
    }

    /// Synchronous evaluation for everything except `expression` conditions,
    /// which need the async engine and fail here.
    pub fn evaluate_sync(
        &self,
        base: DateTime<Tz>,
        condition: &Condition,
        index: usize,
    ) -> Result<bool> {
        self.eval_sync_depth(base, condition, index, 0)
    }

    // Recursion through `context` re-enters evaluation with an owned
    // condition, which keeps the future type nameable.
    fn eval_owned(
        &self,
        base: DateTime<Tz>,
        condition: Condition,
        index: usize,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            match condition {
                Condition::Context { store, key } => {
                    let next = self.deref_context(store, &key, index, depth)?;
                    self.eval_owned(base, next, index, depth + 1).await
                }
                Condition::Expression(source) => self.eval_expression(base, &source).await,
                other => self.eval_sync_depth(base, &other, index, depth),
            }
        })
    }

    fn eval_sync_depth(
        &self,
        base: DateTime<Tz>,
        condition: &Condition,
        index: usize,
        depth: usize,
    ) -> Result<bool> {
        match condition {
            Condition::Compare { op, operand } => {
                let target = self.resolver.resolve(base, operand)?;
                let ordering = cmp_at(base, target, operand.precision);
                Ok(match op {
                    CompareOp::Equal => ordering == Ordering::Equal,
                    CompareOp::NotEqual => ordering != Ordering::Equal,
                    CompareOp::Before => ordering == Ordering::Less,
                    CompareOp::Until => ordering != Ordering::Greater,
                    CompareOp::Since => ordering != Ordering::Less,
                    CompareOp::After => ordering == Ordering::Greater,
                })
            }
            Condition::Span { op, start, end } => self.eval_span(base, *op, start, end),
            Condition::Days { selector, exclude } => {
                let date = base.date_naive();
                let matched = match selector {
                    DaySelector::Even => is_even_day(date),
                    DaySelector::Specific { day, month } => is_specific_day(date, *day, *month),
                    DaySelector::Ordinal { rank, unit } => {
                        ordinal_day(date, *rank, *unit) == Some(date)
                    }
                };
                Ok(matched != *exclude)
            }
            Condition::Weekdays(mask) => {
                Ok(mask[base.weekday().num_days_from_sunday() as usize])
            }
            Condition::Months(mask) => Ok(mask[base.month0() as usize]),
            Condition::Context { store, key } => {
                let next = self.deref_context(*store, key, index, depth)?;
                self.eval_sync_depth(base, &next, index, depth + 1)
            }
            Condition::Expression(_) => Err(RuleError::ExpressionFailed {
                fault: ExpressionFault::message(
                    "expression conditions require asynchronous evaluation",
                ),
            }),
            Condition::Otherwise => Ok(false),
        }
    }

    fn eval_span(
        &self,
        base: DateTime<Tz>,
        op: SpanOp,
        start: &TimeOperand,
        end: &TimeOperand,
    ) -> Result<bool> {
        let s = self.resolver.resolve(base, start)?;
        let e = self.resolver.resolve(base, end)?;

        // An interval whose start does not precede its end wraps across
        // midnight ("23:00".."08:00").
        let overnight = if s.date_naive() == e.date_naive() {
            s >= e
        } else {
            s > e
        };

        let vs_start = cmp_at(base, s, start.precision);
        let vs_end = cmp_at(base, e, end.precision);
        let since_start = vs_start != Ordering::Less;
        let until_end = vs_end != Ordering::Greater;

        Ok(match (op, overnight) {
            (SpanOp::Between, false) => since_start && until_end,
            (SpanOp::Between, true) => since_start || until_end,
            (SpanOp::Outside, false) => !since_start || !until_end,
            (SpanOp::Outside, true) => !since_start && !until_end,
        })
    }

    /// Fetch and convert the condition descriptor a `context` condition
    /// points at.
    fn deref_context(
        &self,
        store: StoreKind,
        key: &str,
        index: usize,
        depth: usize,
    ) -> Result<Condition> {
        if depth >= MAX_CONTEXT_DEPTH {
            return Err(RuleError::ContextDepthExceeded {
                limit: MAX_CONTEXT_DEPTH,
            });
        }

        let invalid = |reason: &str| RuleError::InvalidContextValue {
            store: store.as_str().to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let raw = match store {
            // Environment variables hold JSON text. A missing variable falls
            // back to treating the key itself as an inline JSON literal.
            StoreKind::Env => {
                let text = match self.resolver.store.get(store, key) {
                    Some(Value::String(text)) => text,
                    Some(Value::Null) => return Err(invalid("is null")),
                    Some(other) => {
                        return convert(&other, index, &self.catalog);
                    }
                    None => key.to_string(),
                };
                serde_json::from_str(&text).map_err(|_| invalid("is not valid JSON"))?
            }
            _ => match self.resolver.store.get(store, key) {
                None => return Err(invalid("is not set")),
                Some(Value::Null) => return Err(invalid("is null")),
                Some(value) => value,
            },
        };

        convert(&raw, index, &self.catalog)
    }

    async fn eval_expression(&self, base: DateTime<Tz>, source: &str) -> Result<bool> {
        let mut expression = self.engine.prepare(source)?;
        predicates::install(expression.as_mut(), base, self);
        expression.assign("now", Value::String(base.to_rfc3339()));
        let value = expression
            .run()
            .await
            .map_err(|fault| RuleError::ExpressionFailed { fault })?;
        match value {
            Value::Bool(flag) => Ok(flag),
            other => Err(RuleError::ExpressionNotBoolean {
                value: other.to_string(),
            }),
        }
    }
}

/// Compare two instants after truncating both to `precision` in their own
/// timezone. `Millisecond` compares the raw instants.
pub(crate) fn cmp_at(a: DateTime<Tz>, b: DateTime<Tz>, precision: Precision) -> Ordering {
    if precision == Precision::Millisecond {
        return a.cmp(&b);
    }
    truncation_key(a, precision).cmp(&truncation_key(b, precision))
}

fn truncation_key(t: DateTime<Tz>, precision: Precision) -> [i64; 7] {
    let mut key = [
        i64::from(t.year()),
        i64::from(t.month()),
        i64::from(t.day()),
        i64::from(t.hour()),
        i64::from(t.minute()),
        i64::from(t.second()),
        i64::from(t.timestamp_subsec_millis()),
    ];
    let keep = match precision {
        Precision::Year => 1,
        Precision::Month => 2,
        Precision::Day => 3,
        Precision::Hour => 4,
        Precision::Minute => 5,
        Precision::Second => 6,
        Precision::Millisecond => 7,
    };
    for slot in key.iter_mut().skip(keep) {
        *slot = 0;
    }
    key
}

// ── Rule sets ───────────────────────────────────────────────────────────────

/// An ordered list of conditions converted from raw descriptors.
///
/// Inside a rule set, `otherwise` matches exactly when no earlier condition
/// matched.
#[derive(Debug, Clone)]
pub struct RuleSet {
    conditions: Vec<Condition>,
}

impl RuleSet {
    /// Convert a list of raw descriptors, indexing conditions from 1.
    pub fn from_raw(raw: &[Value], catalog: &EventCatalog) -> Result<Self> {
        let conditions = raw
            .iter()
            .enumerate()
            .map(|(i, value)| convert(value, i + 1, catalog))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Zero-based position of the first matching condition.
    pub async fn first_match(
        &self,
        evaluator: &Evaluator,
        base: DateTime<Tz>,
    ) -> Result<Option<usize>> {
        for (i, condition) in self.conditions.iter().enumerate() {
            let matched = match condition {
                // Reaching an `otherwise` means nothing before it matched.
                Condition::Otherwise => true,
                _ => evaluator.evaluate(base, condition, i + 1).await?,
            };
            if matched {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Per-condition results; `otherwise` entries report true only when no
    /// earlier condition matched.
    pub async fn matches(&self, evaluator: &Evaluator, base: DateTime<Tz>) -> Result<Vec<bool>> {
        let mut results = Vec::with_capacity(self.conditions.len());
        let mut any = false;
        for (i, condition) in self.conditions.iter().enumerate() {
            let matched = match condition {
                Condition::Otherwise => !any,
                _ => evaluator.evaluate(base, condition, i + 1).await?,
            };
            any = any || matched;
            results.push(matched);
        }
        Ok(results)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
