//! Foreign-language surface exported through UniFFI.
//!
//! Hosts hold a [`Formula`] behind an `Arc`, so the wrapped [`Expression`]
//! sits behind a mutex. Calls on one instance are serialised; separate
//! instances are independent.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime};

use crate::error::FormulaResult;
use crate::formula::{Expression, Value};

/// A compiled formula owned by the host.
#[derive(Debug)]
pub struct Formula {
    inner: Mutex<Expression>,
}

impl Formula {
    pub fn new(text: String) -> FormulaResult<Self> {
        Ok(Self {
            inner: Mutex::new(Expression::parse(&text)?),
        })
    }

    fn expression(&self) -> MutexGuard<'_, Expression> {
        // mutations never leave the expression half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_text(&self, text: String) -> FormulaResult<()> {
        self.expression().set_formula(&text)
    }

    pub fn text(&self) -> Option<String> {
        self.expression().formula().map(str::to_string)
    }

    pub fn postfix(&self) -> Option<String> {
        self.expression().postfix()
    }

    pub fn variables(&self) -> FormulaResult<Vec<String>> {
        let expression = self.expression();
        let names = expression.variables()?;
        Ok(names.into_iter().map(str::to_string).collect())
    }

    pub fn bind_number(&self, name: String, value: f64) {
        self.expression().bind(&name, value);
    }

    pub fn bind_bool(&self, name: String, value: bool) {
        self.expression().bind(&name, value);
    }

    pub fn bind_text(&self, name: String, value: String) {
        self.expression().bind(&name, value);
    }

    /// Bind a point in time, read as UTC wall-clock time.
    ///
    /// Times outside the representable range bind the undefined value.
    pub fn bind_time(&self, name: String, value: SystemTime) {
        let value = match naive_utc(value) {
            Some(time) => Value::Time(time),
            None => {
                tracing::debug!(variable = %name, "time out of range, binding undefined");
                Value::undefined()
            }
        };
        self.expression().bind(&name, value);
    }

    pub fn variable_value(&self, name: String) -> f64 {
        self.expression().variable_value(&name)
    }

    pub fn evaluate_number(&self) -> FormulaResult<f64> {
        self.expression().evaluate_number()
    }

    pub fn evaluate_bool(&self) -> FormulaResult<bool> {
        self.expression().evaluate_bool()
    }

    pub fn clear_variables(&self) {
        self.expression().clear_variables();
    }

    pub fn clear(&self) {
        self.expression().clear();
    }
}

fn naive_utc(value: SystemTime) -> Option<NaiveDateTime> {
    let (secs, nanos) = match value.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).ok()?, after.subsec_nanos()),
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => (-secs, 0),
                nanos => (-secs - 1, 1_000_000_000 - nanos),
            }
        }
    };
    DateTime::from_timestamp(secs, nanos).map(|time| time.naive_utc())
}
