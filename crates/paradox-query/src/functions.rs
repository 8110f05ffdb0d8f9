//! Scalar functions callable from expressions.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{Datelike, Timelike};
use paradox_format::{Value, ValueKind};
use rust_decimal::prelude::ToPrimitive;

use crate::context::EvalContext;
use crate::error::{QueryError, QueryResult};

pub trait ScalarFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Accepted argument counts.
    fn arity(&self) -> RangeInclusive<usize>;

    /// Result kind for the given argument kinds, when it is known without evaluating.
    fn return_kind(&self, _args: &[Option<ValueKind>]) -> Option<ValueKind> {
        None
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> QueryResult<Value>;
}

type BuiltinFn = fn(&[Value], &EvalContext) -> QueryResult<Value>;

struct Builtin {
    name: &'static str,
    arity: RangeInclusive<usize>,
    kind: Option<ValueKind>,
    call: BuiltinFn,
}

impl ScalarFunction for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> RangeInclusive<usize> {
        self.arity.clone()
    }

    fn return_kind(&self, args: &[Option<ValueKind>]) -> Option<ValueKind> {
        // `None` here means "same as the first argument".
        self.kind.or_else(|| args.first().copied().flatten())
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> QueryResult<Value> {
        (self.call)(args, ctx)
    }
}

/// Functions available to a catalog, looked up by case-insensitive name.
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn ScalarFunction>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for builtin in builtins() {
            registry.register(Arc::new(builtin));
        }
        registry
    }

    /// Add `function`, replacing any function of the same name.
    pub fn register(&mut self, function: Arc<dyn ScalarFunction>) {
        self.functions
            .insert(function.name().to_ascii_uppercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ScalarFunction>> {
        self.functions.get(&name.to_ascii_uppercase())
    }
}

fn builtins() -> Vec<Builtin> {
    vec![
        Builtin {
            name: "UPPER",
            arity: 1..=1,
            kind: Some(ValueKind::Text),
            call: |args, _| map_text(&args[0], |s| s.to_uppercase()),
        },
        Builtin {
            name: "LOWER",
            arity: 1..=1,
            kind: Some(ValueKind::Text),
            call: |args, _| map_text(&args[0], |s| s.to_lowercase()),
        },
        Builtin {
            name: "TRIM",
            arity: 1..=1,
            kind: Some(ValueKind::Text),
            call: |args, _| map_text(&args[0], |s| s.trim().to_string()),
        },
        Builtin {
            name: "LENGTH",
            arity: 1..=1,
            kind: Some(ValueKind::Integer),
            call: length,
        },
        Builtin {
            name: "SUBSTRING",
            arity: 2..=3,
            kind: Some(ValueKind::Text),
            call: substring,
        },
        Builtin {
            name: "ABS",
            arity: 1..=1,
            kind: None,
            call: abs,
        },
        Builtin {
            name: "ROUND",
            arity: 1..=2,
            kind: None,
            call: round,
        },
        Builtin {
            name: "COALESCE",
            arity: 1..=usize::MAX,
            kind: None,
            call: |args, _| {
                Ok(args
                    .iter()
                    .find(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(Value::Null))
            },
        },
        Builtin {
            name: "YEAR",
            arity: 1..=1,
            kind: Some(ValueKind::Integer),
            call: |args, _| date_part(&args[0], "YEAR", |d| d.year().into()),
        },
        Builtin {
            name: "MONTH",
            arity: 1..=1,
            kind: Some(ValueKind::Integer),
            call: |args, _| date_part(&args[0], "MONTH", |d| d.month().into()),
        },
        Builtin {
            name: "DAY",
            arity: 1..=1,
            kind: Some(ValueKind::Integer),
            call: |args, _| date_part(&args[0], "DAY", |d| d.day().into()),
        },
        Builtin {
            name: "HOUR",
            arity: 1..=1,
            kind: Some(ValueKind::Integer),
            call: hour,
        },
    ]
}

fn expect_text<'a>(value: &'a Value, function: &str) -> QueryResult<Option<&'a str>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(QueryError::eval(format!(
            "{function} expects text, got {}",
            other.kind()
        ))),
    }
}

fn expect_integer(value: &Value, function: &str) -> QueryResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(*v)),
        Value::Decimal(d) if d.fract().is_zero() => Ok(d.to_i64()),
        Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Ok(Some(*n as i64)),
        other => Err(QueryError::eval(format!(
            "{function} expects an integer, got {other}"
        ))),
    }
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> QueryResult<Value> {
    Ok(match value {
        Value::Null => Value::Null,
        Value::Text(s) => Value::from(f(s)),
        other => Value::from(f(&other.to_string())),
    })
}

fn length(args: &[Value], _: &EvalContext) -> QueryResult<Value> {
    Ok(match &args[0] {
        Value::Null => Value::Null,
        Value::Binary(b) => Value::Integer(b.len() as i64),
        Value::Text(s) => Value::Integer(s.chars().count() as i64),
        other => Value::Integer(other.to_string().chars().count() as i64),
    })
}

/// `SUBSTRING(text, start [, length])` with a 1-based `start`.
fn substring(args: &[Value], _: &EvalContext) -> QueryResult<Value> {
    let Some(text) = expect_text(&args[0], "SUBSTRING")? else {
        return Ok(Value::Null);
    };
    let Some(start) = expect_integer(&args[1], "SUBSTRING")? else {
        return Ok(Value::Null);
    };
    let len = match args.get(2) {
        Some(v) => match expect_integer(v, "SUBSTRING")? {
            Some(len) if len < 0 => {
                return Err(QueryError::eval("SUBSTRING length must not be negative"))
            }
            Some(len) => Some(len as usize),
            None => return Ok(Value::Null),
        },
        None => None,
    };
    let skip = usize::try_from(start.saturating_sub(1)).unwrap_or(0);
    let chars = text.chars().skip(skip);
    let out: String = match len {
        Some(len) => chars.take(len).collect(),
        None => chars.collect(),
    };
    Ok(Value::from(out))
}

fn abs(args: &[Value], _: &EvalContext) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Integer(v) => v
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| QueryError::eval("integer overflow in ABS")),
        Value::Number(v) => Ok(Value::Number(v.abs())),
        Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
        other => Err(QueryError::eval(format!(
            "ABS expects a number, got {}",
            other.kind()
        ))),
    }
}

fn round(args: &[Value], _: &EvalContext) -> QueryResult<Value> {
    let places = match args.get(1) {
        Some(v) => match expect_integer(v, "ROUND")? {
            Some(places) => places,
            None => return Ok(Value::Null),
        },
        None => 0,
    };
    let places = places.clamp(0, 28) as u32;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Integer(v) => Ok(Value::Integer(*v)),
        Value::Decimal(d) => Ok(Value::Decimal(d.round_dp(places))),
        Value::Number(v) => {
            let factor = 10f64.powi(places as i32);
            Ok(Value::Number((v * factor).round() / factor))
        }
        other => Err(QueryError::eval(format!(
            "ROUND expects a number, got {}",
            other.kind()
        ))),
    }
}

fn date_part(
    value: &Value,
    function: &str,
    part: impl Fn(&chrono::NaiveDate) -> i64,
) -> QueryResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Date(d) => Ok(Value::Integer(part(d))),
        Value::Timestamp(ts) => Ok(Value::Integer(part(&ts.date()))),
        other => Err(QueryError::eval(format!(
            "{function} expects a date, got {}",
            other.kind()
        ))),
    }
}

fn hour(args: &[Value], _: &EvalContext) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Time(t) => Ok(Value::Integer(t.hour().into())),
        Value::Timestamp(ts) => Ok(Value::Integer(ts.hour().into())),
        other => Err(QueryError::eval(format!(
            "HOUR expects a time, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use paradox_format::Decimal;

    fn call(name: &str, args: &[Value]) -> QueryResult<Value> {
        let registry = FunctionRegistry::with_builtins();
        registry
            .get(name)
            .unwrap()
            .call(args, &EvalContext::default())
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.get("upper").is_some());
        assert!(registry.get("NOPE").is_none());
    }

    #[test]
    fn text_functions() {
        assert_eq!(call("UPPER", &[Value::from("straße")]).unwrap(), Value::from("STRASSE"));
        assert_eq!(call("TRIM", &[Value::from("  x ")]).unwrap(), Value::from("x"));
        assert_eq!(call("LENGTH", &[Value::from("Мир")]).unwrap(), Value::Integer(3));
        assert_eq!(
            call("SUBSTRING", &[Value::from("Paradox"), Value::Integer(3), Value::Integer(3)])
                .unwrap(),
            Value::from("rad")
        );
        assert_eq!(call("UPPER", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn numeric_and_date_functions() {
        assert_eq!(call("ABS", &[Value::Integer(-4)]).unwrap(), Value::Integer(4));
        assert!(call("ABS", &[Value::Integer(i64::MIN)]).is_err());
        assert_eq!(
            call("ROUND", &[Value::Decimal(Decimal::new(12345, 3)), Value::Integer(1)]).unwrap(),
            Value::Decimal(Decimal::new(123, 1))
        );
        let date = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(call("YEAR", &[Value::Date(date)]).unwrap(), Value::Integer(1999));
        assert!(call("YEAR", &[Value::from("1999")]).is_err());
        assert_eq!(
            call("COALESCE", &[Value::Null, Value::Integer(2)]).unwrap(),
            Value::Integer(2)
        );
    }
}
