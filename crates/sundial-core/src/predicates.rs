//! Predicate vocabulary bound into every prepared expression.
//!
//! Each predicate takes an optional reference time as its first argument:
//! `null` (or omission) means the evaluation base instant, an RFC 3339
//! string is parsed and shifted into the evaluation timezone, and anything
//! else is rejected. Time operands may be full descriptor objects or bare
//! clock scalars, which are treated as `{"type": "time", "value": ...}`.

use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::{json, Value};

use crate::calendar::{
    is_even_day, is_specific_day, month_from_name, ordinal_day, weekday_from_name, DayUnit,
    MonthFilter, OrdinalRank,
};
use crate::condition::{convert, convert_operand, CompareOp, Condition, EventCatalog, SpanOp};
use crate::error::{Result, RuleError};
use crate::eval::Evaluator;
use crate::providers::Expression;

/// Register the full predicate set on a prepared expression.
pub(crate) fn install(expression: &mut dyn Expression, base: DateTime<Tz>, evaluator: &Evaluator) {
    install_compare(expression, base, evaluator, "isSame", CompareOp::Equal);
    install_compare(expression, base, evaluator, "isBefore", CompareOp::Before);
    install_compare(expression, base, evaluator, "isAfter", CompareOp::After);
    install_span(expression, base, evaluator, "isBetween", SpanOp::Between);
    install_span(expression, base, evaluator, "isOutside", SpanOp::Outside);
    install_ordinal(expression, base, evaluator, "isFirstDay", OrdinalRank::First);
    install_ordinal(expression, base, evaluator, "isSecondDay", OrdinalRank::Second);
    install_ordinal(expression, base, evaluator, "isThirdDay", OrdinalRank::Third);
    install_ordinal(expression, base, evaluator, "isFourthDay", OrdinalRank::Fourth);
    install_ordinal(expression, base, evaluator, "isFifthDay", OrdinalRank::Fifth);
    install_ordinal(expression, base, evaluator, "isLastDay", OrdinalRank::Last);

    let timezone = evaluator.resolver().config().timezone;
    expression.register(
        "isEvenDay",
        Box::new(move |args| {
            let t = time_arg(args, timezone, base)?;
            Ok(Value::Bool(is_even_day(t.date_naive())))
        }),
    );

    expression.register(
        "isSpecificDay",
        Box::new(move |args| {
            let t = time_arg(args, timezone, base)?;
            let day = args
                .get(1)
                .and_then(Value::as_u64)
                .filter(|day| (1..=31).contains(day))
                .ok_or_else(|| bad_argument("isSpecificDay", "day", args.get(1)))?;
            let month = month_arg(args.get(2), "isSpecificDay")?;
            Ok(Value::Bool(is_specific_day(
                t.date_naive(),
                day as u32,
                month,
            )))
        }),
    );

    install_mask(expression, base, evaluator, "matchesWeekdays", "weekdays");
    install_mask(expression, base, evaluator, "matchesMonths", "months");

    let e = evaluator.clone();
    expression.register(
        "evaluateCondition",
        Box::new(move |args| {
            let t = time_arg(args, e.resolver().config().timezone, base)?;
            let raw = args.get(1).cloned().unwrap_or(Value::Null);
            let condition = convert(&raw, 0, e.catalog())?;
            e.evaluate_sync(t, &condition, 0).map(Value::Bool)
        }),
    );
}

fn install_compare(
    expression: &mut dyn Expression,
    base: DateTime<Tz>,
    evaluator: &Evaluator,
    name: &'static str,
    op: CompareOp,
) {
    let e = evaluator.clone();
    expression.register(
        name,
        Box::new(move |args| {
            let t = time_arg(args, e.resolver().config().timezone, base)?;
            let operand = operand_arg(args.get(1), e.catalog(), name)?;
            let condition = Condition::Compare { op, operand };
            e.evaluate_sync(t, &condition, 0).map(Value::Bool)
        }),
    );
}

fn install_span(
    expression: &mut dyn Expression,
    base: DateTime<Tz>,
    evaluator: &Evaluator,
    name: &'static str,
    op: SpanOp,
) {
    let e = evaluator.clone();
    expression.register(
        name,
        Box::new(move |args| {
            let t = time_arg(args, e.resolver().config().timezone, base)?;
            let start = operand_arg(args.get(1), e.catalog(), name)?;
            let end = operand_arg(args.get(2), e.catalog(), name)?;
            let condition = Condition::Span { op, start, end };
            e.evaluate_sync(t, &condition, 0).map(Value::Bool)
        }),
    );
}

fn install_ordinal(
    expression: &mut dyn Expression,
    base: DateTime<Tz>,
    evaluator: &Evaluator,
    name: &'static str,
    rank: OrdinalRank,
) {
    let timezone = evaluator.resolver().config().timezone;
    expression.register(
        name,
        Box::new(move |args| {
            let t = time_arg(args, timezone, base)?;
            let unit = unit_arg(args.get(1), name)?;
            let date = t.date_naive();
            Ok(Value::Bool(ordinal_day(date, rank, unit) == Some(date)))
        }),
    );
}

fn install_mask(
    expression: &mut dyn Expression,
    base: DateTime<Tz>,
    evaluator: &Evaluator,
    name: &'static str,
    operator: &'static str,
) {
    let e = evaluator.clone();
    expression.register(
        name,
        Box::new(move |args| {
            let t = time_arg(args, e.resolver().config().timezone, base)?;
            let operands = args.get(1).cloned().unwrap_or(Value::Null);
            let raw = json!({ "operator": operator, "operands": operands });
            let condition = convert(&raw, 0, e.catalog())?;
            e.evaluate_sync(t, &condition, 0).map(Value::Bool)
        }),
    );
}

// ── Argument parsing ────────────────────────────────────────────────────────

fn time_arg(args: &[Value], timezone: Tz, base: DateTime<Tz>) -> Result<DateTime<Tz>> {
    match args.first() {
        None | Some(Value::Null) => Ok(base),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&timezone))
            .map_err(|_| RuleError::ExpressionNotTime {
                value: Value::String(text.clone()).to_string(),
            }),
        Some(other) => Err(RuleError::ExpressionNotTime {
            value: other.to_string(),
        }),
    }
}

fn operand_arg(
    arg: Option<&Value>,
    catalog: &EventCatalog,
    name: &str,
) -> Result<crate::condition::TimeOperand> {
    let raw = arg.cloned().unwrap_or(Value::Null);
    let wrapped = match raw {
        Value::Object(_) => raw,
        Value::String(_) | Value::Number(_) => json!({ "type": "time", "value": raw }),
        other => {
            return Err(RuleError::ExpressionNotTime {
                value: other.to_string(),
            })
        }
    };
    convert_operand(&wrapped, 0, name, "operands", catalog)
}

fn unit_arg(arg: Option<&Value>, name: &str) -> Result<DayUnit> {
    match arg {
        None | Some(Value::Null) => Ok(DayUnit::Day),
        Some(Value::String(text)) => match text.as_str() {
            "day" => Ok(DayUnit::Day),
            "workday" => Ok(DayUnit::Workday),
            "weekend" => Ok(DayUnit::Weekend),
            other => weekday_from_name(other)
                .map(DayUnit::Weekday)
                .ok_or_else(|| bad_argument(name, "day", arg)),
        },
        Some(_) => Err(bad_argument(name, "day", arg)),
    }
}

fn month_arg(arg: Option<&Value>, name: &str) -> Result<MonthFilter> {
    match arg {
        None | Some(Value::Null) => Ok(MonthFilter::Any),
        Some(Value::String(text)) if text == "any" => Ok(MonthFilter::Any),
        Some(Value::String(text)) => month_from_name(text)
            .map(MonthFilter::In)
            .ok_or_else(|| bad_argument(name, "month", arg)),
        Some(value @ Value::Number(_)) => value
            .as_u64()
            .filter(|month| (1..=12).contains(month))
            .map(|month| MonthFilter::In(month as u32))
            .ok_or_else(|| bad_argument(name, "month", arg)),
        Some(_) => Err(bad_argument(name, "month", arg)),
    }
}

fn bad_argument(name: &str, field: &str, value: Option<&Value>) -> RuleError {
    RuleError::InvalidCondition {
        index: 0,
        operator: name.to_string(),
        field: field.to_string(),
        value: value.cloned().unwrap_or(Value::Null).to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
