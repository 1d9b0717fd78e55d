//! Runtime values carried by literals, variables and the evaluation stack.

use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};

/// Numeric sentinel standing in for boolean `true`.
pub const TRUE: f64 = 1.0;

/// Numeric sentinel standing in for boolean `false`.
pub const FALSE: f64 = 0.0;

/// The closed set of value kinds the evaluator dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Boolean,
    Text,
    Time,
    Duration,
}

impl ValueKind {
    pub fn label(&self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Text => "text",
            ValueKind::Time => "time",
            ValueKind::Duration => "duration",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single value of one of the supported kinds.
///
/// Booleans interoperate with numbers through the [`TRUE`] and [`FALSE`]
/// sentinels, so `true == 1` holds and comparisons can feed arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Text(String),
    /// Absolute point in time, without a zone.
    Time(NaiveDateTime),
    Duration(TimeDelta),
}

impl Value {
    /// The "not-a-number" sentinel used for unset variables and numeric anomalies.
    pub fn undefined() -> Self {
        Value::Number(f64::NAN)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Text(_) => ValueKind::Text,
            Value::Time(_) => ValueKind::Time,
            Value::Duration(_) => ValueKind::Duration,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Numeric view: numbers as-is, booleans as their sentinels.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Boolean(b) => Some(if *b { TRUE } else { FALSE }),
            _ => None,
        }
    }

    /// Boolean view: booleans as-is, numbers only when they equal a sentinel.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Number(n) if *n == TRUE => Some(true),
            Value::Number(n) if *n == FALSE => Some(false),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Time(t) => write!(f, "{}", t),
            Value::Duration(d) => write!(f, "{}", d),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::Time(t)
    }
}

impl From<TimeDelta> for Value {
    fn from(d: TimeDelta) -> Self {
        Value::Duration(d)
    }
}
