//! Typed compute steps for catalog keywords.
//!
//! Each [`Rule`] variant fixes the tuple of input kinds and the output kind of
//! one compute step. A keyword carries a list of rules and the evaluator picks
//! the first one whose inputs match the runtime kinds of the popped operands.

use chrono::{NaiveDateTime, TimeDelta};

use crate::formula::value::{Value, ValueKind};

/// One input-kinds → output-kind mapping with its compute step.
///
/// Steps producing times or durations return `None` on overflow or on
/// non-finite input; the evaluator turns that into the undefined sentinel.
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    NumberToNumber(fn(f64) -> f64),
    NumberNumberToNumber(fn(f64, f64) -> f64),
    NumberNumberToBool(fn(f64, f64) -> bool),
    BoolBoolToBool(fn(bool, bool) -> bool),
    TextTextToBool(fn(&str, &str) -> bool),
    TextTextToText(fn(&str, &str) -> String),
    NumberToDuration(fn(f64) -> Option<TimeDelta>),
    DurationToNumber(fn(TimeDelta) -> f64),
    DurationToDuration(fn(TimeDelta) -> Option<TimeDelta>),
    NumberDurationToDuration(fn(f64, TimeDelta) -> Option<TimeDelta>),
    DurationNumberToDuration(fn(TimeDelta, f64) -> Option<TimeDelta>),
    DurationDurationToDuration(fn(TimeDelta, TimeDelta) -> Option<TimeDelta>),
    DurationDurationToBool(fn(TimeDelta, TimeDelta) -> bool),
    TimeDurationToTime(fn(NaiveDateTime, TimeDelta) -> Option<NaiveDateTime>),
    TimeTimeToDuration(fn(NaiveDateTime, NaiveDateTime) -> TimeDelta),
    TimeTimeToBool(fn(NaiveDateTime, NaiveDateTime) -> bool),
}

impl Rule {
    /// Operand kinds, in source order.
    pub fn inputs(&self) -> &'static [ValueKind] {
        use ValueKind::*;
        match self {
            Rule::NumberToNumber(_) | Rule::NumberToDuration(_) => &[Number],
            Rule::NumberNumberToNumber(_) | Rule::NumberNumberToBool(_) => &[Number, Number],
            Rule::BoolBoolToBool(_) => &[Boolean, Boolean],
            Rule::TextTextToBool(_) | Rule::TextTextToText(_) => &[Text, Text],
            Rule::DurationToNumber(_) | Rule::DurationToDuration(_) => &[Duration],
            Rule::DurationNumberToDuration(_) => &[Duration, Number],
            Rule::NumberDurationToDuration(_) => &[Number, Duration],
            Rule::DurationDurationToDuration(_) | Rule::DurationDurationToBool(_) => {
                &[Duration, Duration]
            }
            Rule::TimeDurationToTime(_) => &[Time, Duration],
            Rule::TimeTimeToDuration(_) | Rule::TimeTimeToBool(_) => &[Time, Time],
        }
    }

    pub fn output(&self) -> ValueKind {
        match self {
            Rule::NumberToNumber(_)
            | Rule::NumberNumberToNumber(_)
            | Rule::DurationToNumber(_) => ValueKind::Number,
            Rule::NumberNumberToBool(_)
            | Rule::BoolBoolToBool(_)
            | Rule::TextTextToBool(_)
            | Rule::DurationDurationToBool(_)
            | Rule::TimeTimeToBool(_) => ValueKind::Boolean,
            Rule::TextTextToText(_) => ValueKind::Text,
            Rule::NumberToDuration(_)
            | Rule::DurationToDuration(_)
            | Rule::DurationNumberToDuration(_)
            | Rule::NumberDurationToDuration(_)
            | Rule::DurationDurationToDuration(_)
            | Rule::TimeTimeToDuration(_) => ValueKind::Duration,
            Rule::TimeDurationToTime(_) => ValueKind::Time,
        }
    }

    /// Apply the rule if the operands fit its inputs.
    ///
    /// With `coerce` off only exact kinds match. With it on, booleans are
    /// accepted as numbers and sentinel numbers as booleans.
    pub fn apply(&self, args: &[Value], coerce: bool) -> Option<Value> {
        let value = match (self, args) {
            (Rule::NumberToNumber(f), [a]) => Value::Number(f(number(a, coerce)?)),
            (Rule::NumberNumberToNumber(f), [a, b]) => {
                Value::Number(f(number(a, coerce)?, number(b, coerce)?))
            }
            (Rule::NumberNumberToBool(f), [a, b]) => {
                Value::Boolean(f(number(a, coerce)?, number(b, coerce)?))
            }
            (Rule::BoolBoolToBool(f), [a, b]) => {
                Value::Boolean(f(boolean(a, coerce)?, boolean(b, coerce)?))
            }
            (Rule::TextTextToBool(f), [a, b]) => Value::Boolean(f(a.as_text()?, b.as_text()?)),
            (Rule::TextTextToText(f), [a, b]) => Value::Text(f(a.as_text()?, b.as_text()?)),
            (Rule::NumberToDuration(f), [a]) => or_undefined(f(number(a, coerce)?)),
            (Rule::DurationToNumber(f), [a]) => Value::Number(f(a.as_duration()?)),
            (Rule::DurationToDuration(f), [a]) => or_undefined(f(a.as_duration()?)),
            (Rule::DurationNumberToDuration(f), [a, b]) => {
                or_undefined(f(a.as_duration()?, number(b, coerce)?))
            }
            (Rule::NumberDurationToDuration(f), [a, b]) => {
                or_undefined(f(number(a, coerce)?, b.as_duration()?))
            }
            (Rule::DurationDurationToDuration(f), [a, b]) => {
                or_undefined(f(a.as_duration()?, b.as_duration()?))
            }
            (Rule::DurationDurationToBool(f), [a, b]) => {
                Value::Boolean(f(a.as_duration()?, b.as_duration()?))
            }
            (Rule::TimeDurationToTime(f), [a, b]) => {
                or_undefined(f(a.as_time()?, b.as_duration()?))
            }
            (Rule::TimeTimeToDuration(f), [a, b]) => {
                Value::Duration(f(a.as_time()?, b.as_time()?))
            }
            (Rule::TimeTimeToBool(f), [a, b]) => Value::Boolean(f(a.as_time()?, b.as_time()?)),
            _ => return None,
        };
        Some(value)
    }
}

fn number(value: &Value, coerce: bool) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Boolean(_) if coerce => value.as_number(),
        _ => None,
    }
}

fn boolean(value: &Value, coerce: bool) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Number(_) if coerce => value.as_bool(),
        _ => None,
    }
}

fn or_undefined<T: Into<Value>>(result: Option<T>) -> Value {
    result.map(Into::into).unwrap_or_else(Value::undefined)
}

/// Converts a fractional count of `unit_ms` milliseconds into a duration.
pub(crate) fn duration_from_units(count: f64, unit_ms: f64) -> Option<TimeDelta> {
    let millis = count * unit_ms;
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis.round() as i64)
}
