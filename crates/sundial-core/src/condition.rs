//! Condition data model and validator/converter.
//!
//! Raw condition descriptors arrive as [`serde_json::Value`] objects of the
//! form `{"operator": ..., "operands": ...}`. [`convert`] turns a descriptor
//! into a typed [`Condition`], rejecting every shape violation with a
//! structured error that carries the 1-based condition index, the operator,
//! and the offending field and value. [`validate`] is the cheap
//! configuration-time check. Conversion is a pure normalization:
//! `convert(c.to_raw())` reproduces `c` exactly.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::calendar::{
    month_from_name, weekday_from_name, DayUnit, MonthFilter, OrdinalRank, MONTH_NAMES,
    WEEKDAY_NAMES,
};
use crate::error::{Result, RuleError};
use crate::providers::CustomEventRegistry;

/// Offsets are clamped to five hours either way.
pub const OFFSET_LIMIT_MINUTES: i64 = 300;

static NULL_VALUE: Value = Value::Null;

/// Milliseconds in a civil day; numeric clock values live in `[0, MS_PER_DAY)`.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Built-in solar event names the almanac is expected to report.
pub const SUN_EVENT_NAMES: [&str; 14] = [
    "nadir",
    "nightEnd",
    "nauticalDawn",
    "dawn",
    "sunrise",
    "sunriseEnd",
    "goldenHourEnd",
    "solarNoon",
    "goldenHour",
    "sunsetStart",
    "sunset",
    "dusk",
    "nauticalDusk",
    "night",
];

/// Built-in lunar event names.
pub const MOON_EVENT_NAMES: [&str; 2] = ["rise", "set"];

// ── Data model ──────────────────────────────────────────────────────────────

/// Which external store a context reference reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKind {
    Env,
    Flow,
    Global,
    Msg,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Env => "env",
            StoreKind::Flow => "flow",
            StoreKind::Global => "global",
            StoreKind::Msg => "msg",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "env" => Some(StoreKind::Env),
            "flow" => Some(StoreKind::Flow),
            "global" => Some(StoreKind::Global),
            "msg" => Some(StoreKind::Msg),
            _ => None,
        }
    }
}

/// Truncation granularity applied before comparing two instants.
/// `Millisecond` means no truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Millisecond => "millisecond",
            Precision::Second => "second",
            Precision::Minute => "minute",
            Precision::Hour => "hour",
            Precision::Day => "day",
            Precision::Month => "month",
            Precision::Year => "year",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "millisecond" => Some(Precision::Millisecond),
            "second" => Some(Precision::Second),
            "minute" => Some(Precision::Minute),
            "hour" => Some(Precision::Hour),
            "day" => Some(Precision::Day),
            "month" => Some(Precision::Month),
            "year" => Some(Precision::Year),
            _ => None,
        }
    }
}

/// A symbolic pointer to a time-of-day or astronomical event, resolved
/// against a base day by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeReference {
    /// Milliseconds since local midnight.
    Clock(u32),
    Sun(String),
    Moon(String),
    Custom(String),
    /// A value fetched from an external store at resolution time.
    Context { store: StoreKind, key: String },
}

impl TimeReference {
    /// Short human-readable form used in resolver error payloads.
    pub fn describe(&self) -> String {
        match self {
            TimeReference::Clock(ms) => millis_to_clock(*ms),
            TimeReference::Sun(name) => format!("sun:{name}"),
            TimeReference::Moon(name) => format!("moon:{name}"),
            TimeReference::Custom(name) => format!("custom:{name}"),
            TimeReference::Context { store, key } => format!("{}:{key}", store.as_str()),
        }
    }
}

/// Offset in minutes applied after resolution, optionally randomized once
/// per resolution to a uniform value in `[0, |minutes|]` with the sign of
/// `minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetSpec {
    pub minutes: i32,
    pub randomize: bool,
}

/// One side of a comparison or interval: a reference plus its own offset
/// and precision.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeOperand {
    pub reference: TimeReference,
    pub offset: OffsetSpec,
    pub precision: Precision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Before,
    /// Same or before.
    Until,
    /// Same or after.
    Since,
    After,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Equal => "equal",
            CompareOp::NotEqual => "notEqual",
            CompareOp::Before => "before",
            CompareOp::Until => "until",
            CompareOp::Since => "since",
            CompareOp::After => "after",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanOp {
    Between,
    Outside,
}

impl SpanOp {
    pub fn as_str(self) -> &'static str {
        match self {
            SpanOp::Between => "between",
            SpanOp::Outside => "outside",
        }
    }
}

/// Calendar-relative day pattern for the `days` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySelector {
    Specific { day: u32, month: MonthFilter },
    Even,
    Ordinal { rank: OrdinalRank, unit: DayUnit },
}

/// A typed, validated condition ready for evaluation. Pure value semantics:
/// cheap to clone, no identity, no interior state.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        op: CompareOp,
        operand: TimeOperand,
    },
    Span {
        op: SpanOp,
        start: TimeOperand,
        end: TimeOperand,
    },
    Days {
        selector: DaySelector,
        exclude: bool,
    },
    /// Indexed Sunday(0)..Saturday(6).
    Weekdays([bool; 7]),
    /// Indexed January(0)..December(11).
    Months([bool; 12]),
    Context {
        store: StoreKind,
        key: String,
    },
    Expression(String),
    /// Matches when no sibling condition matched; see `RuleSet`.
    Otherwise,
}

impl Condition {
    pub fn operator(&self) -> &'static str {
        match self {
            Condition::Compare { op, .. } => op.as_str(),
            Condition::Span { op, .. } => op.as_str(),
            Condition::Days { .. } => "days",
            Condition::Weekdays(_) => "weekdays",
            Condition::Months(_) => "months",
            Condition::Context { .. } => "context",
            Condition::Expression(_) => "expression",
            Condition::Otherwise => "otherwise",
        }
    }

    /// Serialize back to the canonical descriptor shape. `convert` of the
    /// result reproduces `self` exactly.
    pub fn to_raw(&self) -> Value {
        match self {
            Condition::Compare { op, operand } => json!({
                "operator": op.as_str(),
                "operands": operand_to_raw(operand),
            }),
            Condition::Span { op, start, end } => json!({
                "operator": op.as_str(),
                "operands": [operand_to_raw(start), operand_to_raw(end)],
            }),
            Condition::Days { selector, exclude } => {
                let mut operands = Map::new();
                match selector {
                    DaySelector::Even => {
                        operands.insert("type".into(), json!("even"));
                    }
                    DaySelector::Specific { day, month } => {
                        operands.insert("type".into(), json!("specific"));
                        operands.insert("day".into(), json!(day));
                        let month_value = match month {
                            MonthFilter::Any => json!("any"),
                            MonthFilter::In(m) => json!(m),
                        };
                        operands.insert("month".into(), month_value);
                    }
                    DaySelector::Ordinal { rank, unit } => {
                        operands.insert("type".into(), json!(rank.as_str()));
                        operands.insert("day".into(), json!(unit.as_str()));
                    }
                }
                operands.insert("exclude".into(), json!(exclude));
                json!({ "operator": "days", "operands": operands })
            }
            Condition::Weekdays(mask) => json!({
                "operator": "weekdays",
                "operands": mask.to_vec(),
            }),
            Condition::Months(mask) => json!({
                "operator": "months",
                "operands": mask.to_vec(),
            }),
            Condition::Context { store, key } => json!({
                "operator": "context",
                "operands": { "store": store.as_str(), "key": key },
            }),
            Condition::Expression(source) => json!({
                "operator": "expression",
                "operands": source,
            }),
            Condition::Otherwise => json!({ "operator": "otherwise" }),
        }
    }
}

fn operand_to_raw(operand: &TimeOperand) -> Value {
    let mut object = Map::new();
    let (kind, value) = match &operand.reference {
        TimeReference::Clock(ms) => {
            let value = if ms % 1000 == 0 {
                json!(millis_to_clock(*ms))
            } else {
                json!(ms)
            };
            ("time", value)
        }
        TimeReference::Sun(name) => ("sun", json!(name)),
        TimeReference::Moon(name) => ("moon", json!(name)),
        TimeReference::Custom(name) => ("custom", json!(name)),
        TimeReference::Context { store, key } => (store.as_str(), json!(key)),
    };
    object.insert("type".into(), json!(kind));
    object.insert("value".into(), value);
    object.insert("offset".into(), json!(operand.offset.minutes));
    object.insert("random".into(), json!(operand.offset.randomize));
    if operand.precision != Precision::Millisecond {
        object.insert("precision".into(), json!(operand.precision.as_str()));
    }
    Value::Object(object)
}

// ── Event catalog ───────────────────────────────────────────────────────────

/// The event names the converter accepts for `sun`/`moon`/`custom` operands.
#[derive(Debug, Clone)]
pub struct EventCatalog {
    pub sun: BTreeSet<String>,
    pub moon: BTreeSet<String>,
    pub custom: BTreeSet<String>,
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self {
            sun: SUN_EVENT_NAMES.iter().map(|s| s.to_string()).collect(),
            moon: MOON_EVENT_NAMES.iter().map(|s| s.to_string()).collect(),
            custom: BTreeSet::new(),
        }
    }
}

impl EventCatalog {
    /// Built-in names plus every name in the custom registry.
    pub fn with_custom(registry: &CustomEventRegistry) -> Self {
        let mut catalog = Self::default();
        catalog
            .custom
            .extend(registry.names().map(|name| name.to_string()));
        catalog
    }
}

// ── Clock parsing ───────────────────────────────────────────────────────────

/// Parse a clock string matching `H:MM[:SS][ am/pm]` into milliseconds
/// since midnight. Hours are 0-23, or 1-12 with a meridiem suffix
/// ("12 AM" is hour 0, "1-11 PM" adds 12).
pub fn parse_clock(input: &str) -> Option<u32> {
    let lower = input.trim().to_ascii_lowercase();
    let (body, meridiem) = if let Some(stripped) = lower.strip_suffix("am") {
        (stripped.trim_end(), Some(false))
    } else if let Some(stripped) = lower.strip_suffix("pm") {
        (stripped.trim_end(), Some(true))
    } else {
        (lower.as_str(), None)
    };

    let mut parts = body.split(':');
    let hour_part = parts.next()?;
    let minute_part = parts.next()?;
    let second_part = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let hour = parse_component(hour_part, 1)?;
    let minute = parse_component(minute_part, 2)?;
    let second = match second_part {
        Some(part) => parse_component(part, 2)?,
        None => 0,
    };
    if minute > 59 || second > 59 {
        return None;
    }

    let hour = match meridiem {
        None => {
            if hour > 23 {
                return None;
            }
            hour
        }
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        }
    };

    Some(((hour * 60 + minute) * 60 + second) * 1000)
}

fn parse_component(part: &str, min_len: usize) -> Option<u32> {
    if part.len() < min_len || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Format milliseconds since midnight as `HH:MM:SS` (sub-second part dropped).
pub fn millis_to_clock(ms: u32) -> String {
    let total_seconds = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_seconds / 3600,
        (total_seconds / 60) % 60,
        total_seconds % 60
    )
}

// ── Validator / converter ───────────────────────────────────────────────────

/// Cheap configuration-time shape check.
pub fn validate(raw: &Value, index: usize, catalog: &EventCatalog) -> bool {
    convert(raw, index, catalog).is_ok()
}

/// Convert a raw condition descriptor into a typed [`Condition`].
///
/// `index` is the 1-based position of the condition in its rule set and is
/// carried on every rejection.
pub fn convert(raw: &Value, index: usize, catalog: &EventCatalog) -> Result<Condition> {
    let object = match raw.as_object() {
        Some(object) => object,
        None => return Err(invalid(index, "?", "condition", raw)),
    };
    let operator_value = object.get("operator").unwrap_or(&NULL_VALUE);
    let operator = match operator_value.as_str() {
        Some(operator) => operator,
        None => return Err(invalid(index, "?", "operator", operator_value)),
    };
    let operands = object.get("operands").unwrap_or(&NULL_VALUE);

    let compare_op = match operator {
        "equal" => Some(CompareOp::Equal),
        "notEqual" => Some(CompareOp::NotEqual),
        "before" => Some(CompareOp::Before),
        "until" => Some(CompareOp::Until),
        "since" => Some(CompareOp::Since),
        "after" => Some(CompareOp::After),
        _ => None,
    };
    if let Some(op) = compare_op {
        let operand = convert_operand(operands, index, operator, "operands", catalog)?;
        return Ok(Condition::Compare { op, operand });
    }

    match operator {
        "between" | "outside" => {
            let op = if operator == "between" {
                SpanOp::Between
            } else {
                SpanOp::Outside
            };
            let pair = match operands.as_array() {
                Some(pair) if pair.len() == 2 => pair,
                _ => return Err(invalid(index, operator, "operands", operands)),
            };
            let start = convert_operand(&pair[0], index, operator, "operands[0]", catalog)?;
            let end = convert_operand(&pair[1], index, operator, "operands[1]", catalog)?;
            Ok(Condition::Span { op, start, end })
        }
        "days" => convert_days(operands, index),
        "weekdays" => {
            let mask = convert_mask(operands, &WEEKDAY_NAMES, index, operator)?;
            let mut weekdays = [false; 7];
            weekdays.copy_from_slice(&mask);
            Ok(Condition::Weekdays(weekdays))
        }
        "months" => {
            let mask = convert_mask(operands, &MONTH_NAMES, index, operator)?;
            let mut months = [false; 12];
            months.copy_from_slice(&mask);
            Ok(Condition::Months(months))
        }
        "context" => {
            let object = operands
                .as_object()
                .ok_or_else(|| invalid(index, operator, "operands", operands))?;
            let store_value = object.get("store").unwrap_or(&NULL_VALUE);
            let store = store_value
                .as_str()
                .and_then(StoreKind::from_name)
                // `msg` is a time-reference store, not a condition store.
                .filter(|store| *store != StoreKind::Msg)
                .ok_or_else(|| invalid(index, operator, "operands.store", store_value))?;
            let key_value = object.get("key").unwrap_or(&NULL_VALUE);
            let key = key_value
                .as_str()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| invalid(index, operator, "operands.key", key_value))?;
            Ok(Condition::Context {
                store,
                key: key.to_string(),
            })
        }
        "expression" => {
            let source = operands
                .as_str()
                .filter(|source| !source.trim().is_empty())
                .ok_or_else(|| invalid(index, operator, "operands", operands))?;
            Ok(Condition::Expression(source.to_string()))
        }
        "otherwise" => Ok(Condition::Otherwise),
        _ => Err(invalid(index, operator, "operator", operator_value)),
    }
}

fn invalid(index: usize, operator: &str, field: &str, value: &Value) -> RuleError {
    RuleError::InvalidCondition {
        index,
        operator: operator.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    }
}

pub(crate) fn convert_operand(
    raw: &Value,
    index: usize,
    operator: &str,
    field: &str,
    catalog: &EventCatalog,
) -> Result<TimeOperand> {
    let object = raw
        .as_object()
        .ok_or_else(|| invalid(index, operator, field, raw))?;

    let kind_value = object.get("type").unwrap_or(&NULL_VALUE);
    let kind = kind_value
        .as_str()
        .ok_or_else(|| invalid(index, operator, &format!("{field}.type"), kind_value))?;
    let value = object.get("value").unwrap_or(&NULL_VALUE);
    let value_field = format!("{field}.value");

    let reference = match kind {
        "time" => match value {
            Value::String(text) => TimeReference::Clock(
                parse_clock(text).ok_or_else(|| invalid(index, operator, &value_field, value))?,
            ),
            Value::Number(_) => {
                let ms = value
                    .as_i64()
                    .filter(|ms| (0..MS_PER_DAY).contains(ms))
                    .ok_or_else(|| invalid(index, operator, &value_field, value))?;
                TimeReference::Clock(ms as u32)
            }
            _ => return Err(invalid(index, operator, &value_field, value)),
        },
        "sun" | "moon" | "custom" => {
            let name = value
                .as_str()
                .ok_or_else(|| invalid(index, operator, &value_field, value))?;
            let (known, make): (&BTreeSet<String>, fn(String) -> TimeReference) = match kind {
                "sun" => (&catalog.sun, TimeReference::Sun),
                "moon" => (&catalog.moon, TimeReference::Moon),
                _ => (&catalog.custom, TimeReference::Custom),
            };
            if !known.contains(name) {
                return Err(invalid(index, operator, &value_field, value));
            }
            make(name.to_string())
        }
        "env" | "flow" | "global" | "msg" => {
            let key = value
                .as_str()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| invalid(index, operator, &value_field, value))?;
            TimeReference::Context {
                store: StoreKind::from_name(kind).unwrap_or(StoreKind::Msg),
                key: key.to_string(),
            }
        }
        _ => return Err(invalid(index, operator, &format!("{field}.type"), kind_value)),
    };

    let minutes = match object.get("offset") {
        None | Some(Value::Null) => 0,
        Some(value) => value
            .as_i64()
            .filter(|minutes| minutes.abs() <= OFFSET_LIMIT_MINUTES)
            .ok_or_else(|| invalid(index, operator, &format!("{field}.offset"), value))?,
    };

    let randomize = match object.get("random") {
        None | Some(Value::Null) => false,
        Some(value) => value
            .as_bool()
            .ok_or_else(|| invalid(index, operator, &format!("{field}.random"), value))?,
    };

    let precision = match object.get("precision") {
        None | Some(Value::Null) => Precision::Millisecond,
        Some(value) => value
            .as_str()
            .and_then(Precision::from_name)
            .ok_or_else(|| invalid(index, operator, &format!("{field}.precision"), value))?,
    };

    Ok(TimeOperand {
        reference,
        offset: OffsetSpec {
            minutes: minutes as i32,
            randomize,
        },
        precision,
    })
}

fn convert_days(operands: &Value, index: usize) -> Result<Condition> {
    let operator = "days";
    let object = operands
        .as_object()
        .ok_or_else(|| invalid(index, operator, "operands", operands))?;

    let kind_value = object.get("type").unwrap_or(&NULL_VALUE);
    let kind = kind_value
        .as_str()
        .ok_or_else(|| invalid(index, operator, "operands.type", kind_value))?;

    let exclude = match object.get("exclude") {
        None => false,
        Some(value) => value
            .as_bool()
            .ok_or_else(|| invalid(index, operator, "operands.exclude", value))?,
    };

    let selector = match kind {
        "even" => DaySelector::Even,
        "specific" => {
            let day_value = object.get("day").unwrap_or(&NULL_VALUE);
            let day = day_value
                .as_u64()
                .filter(|day| (1..=31).contains(day))
                .ok_or_else(|| invalid(index, operator, "operands.day", day_value))?;
            let month = convert_month_filter(object.get("month"), index)?;
            DaySelector::Specific {
                day: day as u32,
                month,
            }
        }
        _ => {
            let rank = match kind {
                "first" => OrdinalRank::First,
                "second" => OrdinalRank::Second,
                "third" => OrdinalRank::Third,
                "fourth" => OrdinalRank::Fourth,
                "fifth" => OrdinalRank::Fifth,
                "last" => OrdinalRank::Last,
                _ => return Err(invalid(index, operator, "operands.type", kind_value)),
            };
            let day_value = object.get("day").unwrap_or(&NULL_VALUE);
            let day = day_value
                .as_str()
                .ok_or_else(|| invalid(index, operator, "operands.day", day_value))?;
            let unit = match day {
                "day" => DayUnit::Day,
                "workday" => DayUnit::Workday,
                "weekend" => DayUnit::Weekend,
                name => DayUnit::Weekday(
                    weekday_from_name(name)
                        .ok_or_else(|| invalid(index, operator, "operands.day", day_value))?,
                ),
            };
            DaySelector::Ordinal { rank, unit }
        }
    };

    Ok(Condition::Days { selector, exclude })
}

fn convert_month_filter(raw: Option<&Value>, index: usize) -> Result<MonthFilter> {
    let operator = "days";
    match raw {
        None | Some(Value::Null) => Ok(MonthFilter::Any),
        Some(value) => match value {
            Value::String(name) if name == "any" => Ok(MonthFilter::Any),
            Value::String(name) => month_from_name(name)
                .map(MonthFilter::In)
                .ok_or_else(|| invalid(index, operator, "operands.month", value)),
            Value::Number(_) => value
                .as_u64()
                .filter(|month| (1..=12).contains(month))
                .map(|month| MonthFilter::In(month as u32))
                .ok_or_else(|| invalid(index, operator, "operands.month", value)),
            _ => Err(invalid(index, operator, "operands.month", value)),
        },
    }
}

/// Accept either the canonical fixed-length boolean array or the name-keyed
/// object form. Unknown keys and non-boolean values are shape errors;
/// unlisted keys default to `false`.
fn convert_mask(
    operands: &Value,
    names: &[&str],
    index: usize,
    operator: &str,
) -> Result<Vec<bool>> {
    match operands {
        Value::Array(items) => {
            if items.len() != names.len() {
                return Err(invalid(index, operator, "operands", operands));
            }
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_bool().ok_or_else(|| {
                        invalid(index, operator, &format!("operands.{}", names[i]), item)
                    })
                })
                .collect()
        }
        Value::Object(map) => {
            let mut mask = vec![false; names.len()];
            for (key, value) in map {
                let position = names
                    .iter()
                    .position(|name| name == key)
                    .ok_or_else(|| invalid(index, operator, &format!("operands.{key}"), value))?;
                mask[position] = value.as_bool().ok_or_else(|| {
                    invalid(index, operator, &format!("operands.{key}"), value)
                })?;
            }
            Ok(mask)
        }
        _ => Err(invalid(index, operator, "operands", operands)),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn catalog() -> EventCatalog {
        EventCatalog::default()
    }

    // ── parse_clock ─────────────────────────────────────────────────────

    #[test]
    fn test_parse_clock_24h() {
        assert_eq!(parse_clock("14:20"), Some(((14 * 60 + 20) * 60) * 1000));
        assert_eq!(parse_clock("0:00"), Some(0));
        assert_eq!(parse_clock("23:59:59"), Some(86_399_000));
    }

    #[test]
    fn test_parse_clock_meridiem() {
        assert_eq!(parse_clock("2:20 PM"), parse_clock("14:20"));
        assert_eq!(parse_clock("12:00 am"), Some(0));
        assert_eq!(parse_clock("12:00 pm"), parse_clock("12:00"));
        assert_eq!(parse_clock("12:30:15 AM"), Some((30 * 60 + 15) * 1000));
    }

    #[test]
    fn test_parse_clock_rejects_malformed() {
        assert_eq!(parse_clock("24:00"), None);
        assert_eq!(parse_clock("12:60"), None);
        assert_eq!(parse_clock("0:00 pm"), None);
        assert_eq!(parse_clock("13:00 pm"), None);
        assert_eq!(parse_clock("12"), None);
        assert_eq!(parse_clock("12:0"), None);
        assert_eq!(parse_clock("+2:00"), None);
        assert_eq!(parse_clock("12:00:00:00"), None);
        assert_eq!(parse_clock(""), None);
    }

    proptest! {
        // 24-hour strings and their 12-hour meridiem spellings resolve to
        // the same milliseconds-since-midnight value.
        #[test]
        fn prop_clock_meridiem_equivalence(hour in 0u32..24, minute in 0u32..60) {
            let s24 = format!("{hour}:{minute:02}");
            let (h12, suffix) = match hour {
                0 => (12, "am"),
                12 => (12, "pm"),
                h if h > 12 => (h - 12, "pm"),
                h => (h, "am"),
            };
            let s12 = format!("{h12}:{minute:02} {suffix}");
            prop_assert_eq!(parse_clock(&s24), parse_clock(&s12));
        }
    }

    // ── convert: comparisons ────────────────────────────────────────────

    #[test]
    fn test_convert_before_with_precision() {
        let raw = serde_json::json!({
            "operator": "before",
            "operands": { "type": "time", "value": "14:20", "offset": 5, "random": false, "precision": "minute" },
        });
        let condition = convert(&raw, 1, &catalog()).unwrap();
        match condition {
            Condition::Compare { op, operand } => {
                assert_eq!(op, CompareOp::Before);
                assert_eq!(operand.reference, TimeReference::Clock(51_600_000));
                assert_eq!(operand.offset.minutes, 5);
                assert_eq!(operand.precision, Precision::Minute);
            }
            other => panic!("unexpected condition: {other:?}"),
        }
    }

    #[test]
    fn test_convert_numeric_time_value() {
        let raw = serde_json::json!({
            "operator": "equal",
            "operands": { "type": "time", "value": 3_600_000 },
        });
        let condition = convert(&raw, 1, &catalog()).unwrap();
        match condition {
            Condition::Compare { operand, .. } => {
                assert_eq!(operand.reference, TimeReference::Clock(3_600_000));
                assert_eq!(operand.precision, Precision::Millisecond);
            }
            other => panic!("unexpected condition: {other:?}"),
        }
    }

    #[test]
    fn test_convert_rejects_out_of_range_numeric_time() {
        let raw = serde_json::json!({
            "operator": "equal",
            "operands": { "type": "time", "value": 86_400_000 },
        });
        let err = convert(&raw, 2, &catalog()).unwrap_err();
        match err {
            RuleError::InvalidCondition { index, field, .. } => {
                assert_eq!(index, 2);
                assert_eq!(field, "operands.value");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_convert_sun_event_name_checked_against_catalog() {
        let good = serde_json::json!({
            "operator": "since",
            "operands": { "type": "sun", "value": "sunrise" },
        });
        assert!(convert(&good, 1, &catalog()).is_ok());

        let bad = serde_json::json!({
            "operator": "since",
            "operands": { "type": "sun", "value": "lunchtime" },
        });
        assert!(matches!(
            convert(&bad, 1, &catalog()),
            Err(RuleError::InvalidCondition { field, .. }) if field == "operands.value"
        ));
    }

    #[test]
    fn test_convert_custom_event_needs_registration() {
        let raw = serde_json::json!({
            "operator": "after",
            "operands": { "type": "custom", "value": "civicDusk" },
        });
        assert!(convert(&raw, 1, &catalog()).is_err());

        let mut registry = crate::providers::CustomEventRegistry::new();
        registry.register(-8.0, "civicDawn", "civicDusk");
        let with_custom = EventCatalog::with_custom(&registry);
        assert!(convert(&raw, 1, &with_custom).is_ok());
    }

    #[test]
    fn test_convert_store_typed_operand() {
        let raw = serde_json::json!({
            "operator": "until",
            "operands": { "type": "msg", "value": "wakeup" },
        });
        let condition = convert(&raw, 1, &catalog()).unwrap();
        match condition {
            Condition::Compare { operand, .. } => assert_eq!(
                operand.reference,
                TimeReference::Context {
                    store: StoreKind::Msg,
                    key: "wakeup".to_string(),
                }
            ),
            other => panic!("unexpected condition: {other:?}"),
        }
    }

    // ── convert: rejections carry index + field ─────────────────────────

    #[test]
    fn test_convert_unknown_operator() {
        let raw = serde_json::json!({ "operator": "frobnicate" });
        let err = convert(&raw, 3, &catalog()).unwrap_err();
        match err {
            RuleError::InvalidCondition {
                index,
                operator,
                field,
                ..
            } => {
                assert_eq!(index, 3);
                assert_eq!(operator, "frobnicate");
                assert_eq!(field, "operator");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_convert_offset_out_of_bounds() {
        let raw = serde_json::json!({
            "operator": "before",
            "operands": { "type": "time", "value": "08:00", "offset": 301 },
        });
        let err = convert(&raw, 5, &catalog()).unwrap_err();
        match err {
            RuleError::InvalidCondition {
                index,
                field,
                value,
                ..
            } => {
                assert_eq!(index, 5);
                assert_eq!(field, "operands.offset");
                assert_eq!(value, "301");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_convert_non_boolean_exclude() {
        let raw = serde_json::json!({
            "operator": "days",
            "operands": { "type": "even", "exclude": "yes" },
        });
        assert!(matches!(
            convert(&raw, 1, &catalog()),
            Err(RuleError::InvalidCondition { field, .. }) if field == "operands.exclude"
        ));
    }

    #[test]
    fn test_convert_malformed_weekday_key() {
        let raw = serde_json::json!({
            "operator": "weekdays",
            "operands": { "monday": true, "blursday": true },
        });
        assert!(matches!(
            convert(&raw, 4, &catalog()),
            Err(RuleError::InvalidCondition { index: 4, field, .. }) if field == "operands.blursday"
        ));
    }

    #[test]
    fn test_convert_non_boolean_weekday_value() {
        let raw = serde_json::json!({
            "operator": "weekdays",
            "operands": { "monday": 1 },
        });
        assert!(matches!(
            convert(&raw, 1, &catalog()),
            Err(RuleError::InvalidCondition { field, .. }) if field == "operands.monday"
        ));
    }

    #[test]
    fn test_convert_between_needs_two_operands() {
        let raw = serde_json::json!({
            "operator": "between",
            "operands": [{ "type": "time", "value": "08:00" }],
        });
        assert!(matches!(
            convert(&raw, 1, &catalog()),
            Err(RuleError::InvalidCondition { field, .. }) if field == "operands"
        ));
    }

    #[test]
    fn test_convert_context_rejects_msg_store() {
        let raw = serde_json::json!({
            "operator": "context",
            "operands": { "store": "msg", "key": "rule" },
        });
        assert!(matches!(
            convert(&raw, 1, &catalog()),
            Err(RuleError::InvalidCondition { field, .. }) if field == "operands.store"
        ));
    }

    // ── convert: masks and days ─────────────────────────────────────────

    #[test]
    fn test_convert_weekdays_object_to_mask() {
        let raw = serde_json::json!({
            "operator": "weekdays",
            "operands": { "sunday": true, "saturday": true },
        });
        let condition = convert(&raw, 1, &catalog()).unwrap();
        assert_eq!(
            condition,
            Condition::Weekdays([true, false, false, false, false, false, true])
        );
    }

    #[test]
    fn test_convert_months_array_form() {
        let mut months = vec![false; 12];
        months[0] = true;
        months[11] = true;
        let raw = serde_json::json!({ "operator": "months", "operands": months });
        let condition = convert(&raw, 1, &catalog()).unwrap();
        let mut expected = [false; 12];
        expected[0] = true;
        expected[11] = true;
        assert_eq!(condition, Condition::Months(expected));
    }

    #[test]
    fn test_convert_days_ordinal() {
        let raw = serde_json::json!({
            "operator": "days",
            "operands": { "type": "last", "day": "sunday", "exclude": false },
        });
        let condition = convert(&raw, 1, &catalog()).unwrap();
        assert_eq!(
            condition,
            Condition::Days {
                selector: DaySelector::Ordinal {
                    rank: OrdinalRank::Last,
                    unit: DayUnit::Weekday(chrono::Weekday::Sun),
                },
                exclude: false,
            }
        );
    }

    #[test]
    fn test_convert_days_specific_with_month_name() {
        let raw = serde_json::json!({
            "operator": "days",
            "operands": { "type": "specific", "day": 8, "month": "january" },
        });
        let condition = convert(&raw, 1, &catalog()).unwrap();
        assert_eq!(
            condition,
            Condition::Days {
                selector: DaySelector::Specific {
                    day: 8,
                    month: MonthFilter::In(1),
                },
                exclude: false,
            }
        );
    }

    // ── round-trip normalization ────────────────────────────────────────

    #[test]
    fn test_convert_is_idempotent_across_operators() {
        let samples = vec![
            serde_json::json!({ "operator": "equal",
                "operands": { "type": "time", "value": "2:20 PM", "offset": -15, "random": true, "precision": "day" } }),
            serde_json::json!({ "operator": "between", "operands": [
                { "type": "time", "value": "23:00" },
                { "type": "time", "value": "08:00" },
            ] }),
            serde_json::json!({ "operator": "since",
                "operands": { "type": "sun", "value": "sunset", "offset": 30 } }),
            serde_json::json!({ "operator": "until",
                "operands": { "type": "moon", "value": "rise" } }),
            serde_json::json!({ "operator": "after",
                "operands": { "type": "flow", "value": "quietStart" } }),
            serde_json::json!({ "operator": "days",
                "operands": { "type": "first", "day": "workday", "exclude": true } }),
            serde_json::json!({ "operator": "days",
                "operands": { "type": "specific", "day": 29, "month": 2 } }),
            serde_json::json!({ "operator": "weekdays",
                "operands": { "monday": true, "friday": true } }),
            serde_json::json!({ "operator": "months",
                "operands": { "june": true } }),
            serde_json::json!({ "operator": "context",
                "operands": { "store": "global", "key": "nightRule" } }),
            serde_json::json!({ "operator": "expression", "operands": "payload.enabled" }),
            serde_json::json!({ "operator": "otherwise" }),
        ];
        let catalog = catalog();
        for raw in samples {
            let once = convert(&raw, 1, &catalog).unwrap();
            let twice = convert(&once.to_raw(), 1, &catalog).unwrap();
            assert_eq!(once, twice, "normalization not idempotent for {raw}");
        }
    }
}
