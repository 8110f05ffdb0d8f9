//! Ordering and equality between [`Value`]s.
//!
//! [`compare`] implements predicate semantics: NULL is incomparable and mismatched kinds either
//! coerce (numbers across representations, text parsed as a number or date) or are incomparable.
//! [`compare_keys`] and [`compare_total`] are total orders for grouping, DISTINCT and MIN/MAX.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use paradox_format::{Decimal, Value, ValueKind};
use rust_decimal::prelude::ToPrimitive;

use crate::collation::Locale;

/// Predicate ordering of two values; `None` when either side is NULL or the kinds are
/// incomparable.
pub fn compare(a: &Value, b: &Value, locale: &Locale) -> Option<Ordering> {
    use Value::*;
    match (a, b) {
        (Null, _) | (_, Null) => None,
        (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
        (Text(a), Text(b)) => Some(locale.compare(a, b)),
        (Binary(a), Binary(b)) => Some(a.cmp(b)),
        (Time(a), Time(b)) => Some(a.cmp(b)),
        (Date(_) | Timestamp(_), Date(_) | Timestamp(_)) => {
            Some(as_timestamp(a)?.cmp(&as_timestamp(b)?))
        }
        _ if a.kind().is_numeric() && b.kind().is_numeric() => Some(compare_numeric(a, b)),
        (Text(text), other) => coerce_text(text, other.kind()).and_then(|v| compare(&v, other, locale)),
        (other, Text(text)) => coerce_text(text, other.kind()).and_then(|v| compare(other, &v, locale)),
        _ => None,
    }
}

/// `true` when [`compare`] reports the values equal. NULL never equals anything.
pub fn equals(a: &Value, b: &Value, locale: &Locale) -> bool {
    compare(a, b, locale) == Some(Ordering::Equal)
}

/// Total order for group keys and DISTINCT: NULL equals NULL and sorts first; numbers compare
/// across representations, dates against timestamps; other kind mismatches order by kind. Text is
/// never coerced here, so `"1"` and `1` stay distinct keys.
pub fn compare_keys(a: &Value, b: &Value, locale: &Locale) -> Ordering {
    use Value::*;
    let (fa, fb) = (family(a.kind()), family(b.kind()));
    if fa != fb {
        return fa.cmp(&fb);
    }
    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Boolean(a), Boolean(b)) => a.cmp(b),
        (Text(a), Text(b)) => locale.compare(a, b),
        (Binary(a), Binary(b)) => a.cmp(b),
        (Time(a), Time(b)) => a.cmp(b),
        _ if fa == Family::Numeric => compare_numeric(a, b),
        _ => match (as_timestamp(a), as_timestamp(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a.kind().cmp(&b.kind()),
        },
    }
}

/// [`compare_keys`] refined by an exact tie-break, so only indistinguishable values are equal.
pub fn compare_total(a: &Value, b: &Value, locale: &Locale) -> Ordering {
    compare_keys(a, b, locale).then_with(|| {
        a.kind().cmp(&b.kind()).then_with(|| match (a, b) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.scale().cmp(&b.scale()),
            _ => Ordering::Equal,
        })
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Family {
    Null,
    Boolean,
    Numeric,
    Text,
    Temporal,
    Time,
    Binary,
}

fn family(kind: ValueKind) -> Family {
    match kind {
        ValueKind::Null => Family::Null,
        ValueKind::Boolean => Family::Boolean,
        ValueKind::Integer | ValueKind::Number | ValueKind::Decimal => Family::Numeric,
        ValueKind::Text => Family::Text,
        ValueKind::Date | ValueKind::Timestamp => Family::Temporal,
        ValueKind::Time => Family::Time,
        ValueKind::Binary => Family::Binary,
    }
}

fn as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        Value::Timestamp(ts) => Some(*ts),
        _ => None,
    }
}

fn exact(value: &Value) -> Option<Decimal> {
    match value {
        Value::Integer(v) => Some(Decimal::from(*v)),
        Value::Decimal(d) => Some(*d),
        _ => None,
    }
}

/// Both operands must be numeric. Integers and decimals compare exactly against each other and
/// against doubles, so the order stays transitive across representations. NaN sorts last.
fn compare_numeric(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
        _ => match (exact(a), exact(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(a), None) => cmp_exact_float(a, b.as_f64().unwrap_or(f64::NAN)),
            (None, Some(b)) => cmp_exact_float(b, a.as_f64().unwrap_or(f64::NAN)).reverse(),
            (None, None) => Ordering::Equal,
        },
    }
}

/// Smallest power of two above every finite [`Decimal`].
const DECIMAL_BOUND: f64 = 79_228_162_514_264_337_593_543_950_336.0;

fn cmp_exact_float(d: Decimal, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Less;
    }
    if f >= DECIMAL_BOUND {
        return Ordering::Less;
    }
    if f <= -DECIMAL_BOUND {
        return Ordering::Greater;
    }
    // Integral parts are exact in i128 on both sides.
    let whole = d.trunc().to_i128().unwrap_or_default();
    let ordering = whole.cmp(&(f.trunc() as i128));
    if ordering != Ordering::Equal {
        return ordering;
    }
    let (d_frac, f_frac) = (d.fract(), f.fract());
    match Decimal::from_f64_retain(f_frac).map(|f_frac| d_frac.cmp(&f_frac)) {
        Some(Ordering::Equal) | None => {
            let d_frac = d_frac.to_f64().unwrap_or_default();
            OrderedFloat(d_frac).cmp(&OrderedFloat(f_frac))
        }
        Some(ordering) => ordering,
    }
}

/// Parse `text` into a value of `target`'s family, if it reads as one.
pub(crate) fn coerce_text(text: &str, target: ValueKind) -> Option<Value> {
    let text = text.trim();
    match target {
        ValueKind::Integer | ValueKind::Decimal | ValueKind::Number => {
            if let Ok(v) = text.parse::<i64>() {
                Some(Value::Integer(v))
            } else if let Ok(d) = Decimal::from_str(text) {
                Some(Value::Decimal(d))
            } else {
                text.parse::<f64>().ok().map(Value::Number)
            }
        }
        ValueKind::Date | ValueKind::Timestamp => parse_timestamp(text)
            .map(Value::Timestamp)
            .or_else(|| parse_date(text).map(Value::Date)),
        ValueKind::Time => ["%H:%M:%S%.f", "%H:%M"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
            .map(Value::Time),
        _ => None,
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
