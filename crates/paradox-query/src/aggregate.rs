//! Aggregate functions and their accumulators.
//!
//! Every accumulator is seeded from a single input value and combined with [`Accumulator::merge`];
//! the resolved [`Accumulator::value`] does not depend on the order rows were merged in.

use std::cmp::Ordering;

use paradox_format::{Decimal, Value, ValueKind};
use rust_decimal::prelude::ToPrimitive;

use crate::collation::Locale;
use crate::compare::compare_total;
use crate::error::{QueryError, QueryResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }

    /// Whether an argument of `kind` is accepted.
    pub fn accepts(self, kind: ValueKind) -> bool {
        match self {
            AggregateFunc::Count => true,
            AggregateFunc::Sum | AggregateFunc::Avg => kind.is_numeric() || kind == ValueKind::Null,
            AggregateFunc::Min | AggregateFunc::Max => kind != ValueKind::Binary,
        }
    }

    pub(crate) fn result_kind(self, arg: Option<ValueKind>) -> Option<ValueKind> {
        match self {
            AggregateFunc::Count => Some(ValueKind::Integer),
            AggregateFunc::Sum => arg,
            AggregateFunc::Avg => match arg {
                Some(ValueKind::Decimal) => Some(ValueKind::Decimal),
                _ => Some(ValueKind::Number),
            },
            AggregateFunc::Min | AggregateFunc::Max => arg,
        }
    }
}

/// Exact running sum over integers, decimals and doubles.
///
/// Integers are summed in `i128`, decimals in [`Decimal`], and doubles as a list of
/// non-overlapping partials so the final double is the correctly rounded total.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SumState {
    integers: i128,
    decimals: Option<Decimal>,
    partials: Vec<f64>,
    /// Running sum of infinities and NaNs, which the partials cannot hold.
    special: Option<f64>,
    has_float: bool,
    count: u64,
}

impl SumState {
    fn add(&mut self, value: &Value) -> QueryResult<()> {
        match value {
            Value::Null => return Ok(()),
            Value::Integer(v) => self.add_integer(i128::from(*v)),
            Value::Decimal(d) => self.add_decimal(*d),
            Value::Number(f) => {
                self.has_float = true;
                self.add_float(*f);
            }
            other => {
                return Err(QueryError::eval(format!(
                    "cannot sum {} values",
                    other.kind()
                )))
            }
        }
        self.count += 1;
        Ok(())
    }

    fn add_integer(&mut self, v: i128) {
        match self.integers.checked_add(v) {
            Some(sum) => self.integers = sum,
            None => self.add_float(v as f64),
        }
    }

    fn add_decimal(&mut self, d: Decimal) {
        match self.decimals {
            None => self.decimals = Some(d),
            Some(sum) => match sum.checked_add(d) {
                Some(sum) => self.decimals = Some(sum),
                None => {
                    self.has_float = true;
                    self.add_float(d.to_f64().unwrap_or(f64::NAN));
                }
            },
        }
    }

    fn add_float(&mut self, value: f64) {
        if !value.is_finite() {
            self.special = Some(self.special.unwrap_or(0.0) + value);
            return;
        }
        let mut x = value;
        let mut kept = 0;
        for j in 0..self.partials.len() {
            let mut y = self.partials[j];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        self.partials.truncate(kept);
        self.partials.push(x);
    }

    fn merge(&mut self, other: SumState) {
        self.add_integer(other.integers);
        if let Some(d) = other.decimals {
            self.add_decimal(d);
        }
        for partial in other.partials {
            self.add_float(partial);
        }
        if let Some(special) = other.special {
            self.add_float(special);
        }
        self.has_float |= other.has_float;
        self.count += other.count;
    }

    /// Correctly rounded sum of the doubles seen so far.
    fn float_total(&self) -> f64 {
        if let Some(special) = self.special {
            return special;
        }
        let p = &self.partials;
        let Some(mut n) = p.len().checked_sub(1) else {
            return 0.0;
        };
        let mut hi = p[n];
        let mut lo = 0.0;
        while n > 0 {
            let x = hi;
            n -= 1;
            let y = p[n];
            hi = x + y;
            lo = y - (hi - x);
            if lo != 0.0 {
                break;
            }
        }
        // Round half to even when the remaining partials would tip the result.
        if n > 0 && ((lo < 0.0 && p[n - 1] < 0.0) || (lo > 0.0 && p[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            if y == x - hi {
                hi = x;
            }
        }
        hi
    }

    fn exact_total(&self) -> Option<Decimal> {
        let integers = Decimal::try_from_i128_with_scale(self.integers, 0).ok()?;
        match self.decimals {
            Some(d) => d.checked_add(integers),
            None => Some(integers),
        }
    }

    fn total(&self) -> Value {
        if self.count == 0 {
            return Value::Null;
        }
        if !self.has_float && self.partials.is_empty() && self.special.is_none() {
            if self.decimals.is_none() {
                if let Ok(v) = i64::try_from(self.integers) {
                    return Value::Integer(v);
                }
            }
            if let Some(d) = self.exact_total() {
                return Value::Decimal(d);
            }
        }
        Value::Number(self.total_f64())
    }

    fn total_f64(&self) -> f64 {
        let mut all = self.clone();
        all.add_float(self.integers as f64);
        if let Some(d) = self.decimals {
            all.add_float(d.to_f64().unwrap_or(f64::NAN));
        }
        all.float_total()
    }
}

/// Running state of one aggregate cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Accumulator {
    Count(u64),
    Sum(SumState),
    Avg(SumState),
    Min { best: Option<Value>, locale: Locale },
    Max { best: Option<Value>, locale: Locale },
}

impl Accumulator {
    /// Accumulator that has seen no input.
    pub fn empty(func: AggregateFunc, locale: Locale) -> Self {
        match func {
            AggregateFunc::Count => Accumulator::Count(0),
            AggregateFunc::Sum => Accumulator::Sum(SumState::default()),
            AggregateFunc::Avg => Accumulator::Avg(SumState::default()),
            AggregateFunc::Min => Accumulator::Min { best: None, locale },
            AggregateFunc::Max => Accumulator::Max { best: None, locale },
        }
    }

    /// Accumulator holding a single input value. `value` is `None` for `COUNT(*)`.
    pub fn seed(func: AggregateFunc, value: Option<&Value>, locale: Locale) -> QueryResult<Self> {
        let present = value.filter(|v| !v.is_null());
        Ok(match func {
            AggregateFunc::Count => Accumulator::Count(match value {
                None => 1,
                Some(_) => u64::from(present.is_some()),
            }),
            AggregateFunc::Sum | AggregateFunc::Avg => {
                let mut state = SumState::default();
                if let Some(v) = present {
                    state.add(v)?;
                }
                if func == AggregateFunc::Sum {
                    Accumulator::Sum(state)
                } else {
                    Accumulator::Avg(state)
                }
            }
            AggregateFunc::Min => Accumulator::Min {
                best: present.cloned(),
                locale,
            },
            AggregateFunc::Max => Accumulator::Max {
                best: present.cloned(),
                locale,
            },
        })
    }

    /// Fold `other` (an accumulator of the same function) into `self`.
    pub fn merge(&mut self, other: Accumulator) -> QueryResult<()> {
        match (self, other) {
            (Accumulator::Count(a), Accumulator::Count(b)) => *a += b,
            (Accumulator::Sum(a), Accumulator::Sum(b)) | (Accumulator::Avg(a), Accumulator::Avg(b)) => {
                a.merge(b)
            }
            (Accumulator::Min { best, locale }, Accumulator::Min { best: other, .. }) => {
                keep_extreme(best, other, locale, Ordering::Less)
            }
            (Accumulator::Max { best, locale }, Accumulator::Max { best: other, .. }) => {
                keep_extreme(best, other, locale, Ordering::Greater)
            }
            (this, other) => {
                return Err(QueryError::eval(format!(
                    "cannot merge {} into {}",
                    other.func().name(),
                    this.func().name()
                )))
            }
        }
        Ok(())
    }

    pub fn func(&self) -> AggregateFunc {
        match self {
            Accumulator::Count(_) => AggregateFunc::Count,
            Accumulator::Sum(_) => AggregateFunc::Sum,
            Accumulator::Avg(_) => AggregateFunc::Avg,
            Accumulator::Min { .. } => AggregateFunc::Min,
            Accumulator::Max { .. } => AggregateFunc::Max,
        }
    }

    /// Resolved result. Aggregates over no non-NULL input are NULL, except COUNT which is 0.
    pub fn value(&self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Integer(i64::try_from(*n).unwrap_or(i64::MAX)),
            Accumulator::Sum(state) => state.total(),
            Accumulator::Avg(state) => average(state),
            Accumulator::Min { best, .. } | Accumulator::Max { best, .. } => {
                best.clone().unwrap_or_default()
            }
        }
    }
}

fn keep_extreme(best: &mut Option<Value>, other: Option<Value>, locale: &Locale, wanted: Ordering) {
    let Some(other) = other else {
        return;
    };
    match best {
        Some(current) if compare_total(&other, current, locale) != wanted => {}
        _ => *best = Some(other),
    }
}

fn average(state: &SumState) -> Value {
    if state.count == 0 {
        return Value::Null;
    }
    let exact_decimal = state.decimals.is_some() && !state.has_float && state.special.is_none();
    if exact_decimal {
        if let Some(avg) = state
            .exact_total()
            .and_then(|total| total.checked_div(Decimal::from(state.count)))
        {
            return Value::Decimal(avg);
        }
    }
    Value::Number(state.total_f64() / state.count as f64)
}
