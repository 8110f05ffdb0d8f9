//! Scalar expressions: column references, literals, function calls and arithmetic.

use std::fmt;
use std::sync::Arc;

use chrono::{Days, NaiveDate, NaiveDateTime};
use paradox_format::{Decimal, Value, ValueKind};

use crate::aggregate::AggregateFunc;
use crate::compare::coerce_text;
use crate::context::EvalContext;
use crate::error::{QueryError, QueryResult};
use crate::functions::ScalarFunction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Concat => "||",
        }
    }
}

/// An unbound expression as produced by a query parser.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A column of one of the query's tables, optionally qualified by table name or alias.
    ///
    /// Inside a second-pass output column an unqualified name refers to another output column.
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Only valid as the whole expression of an output column. `arg: None` is `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
    },
    /// Position of another output column; only valid inside a second-pass output column.
    OutputRef(usize),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn negate(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Negate,
            expr: Box::new(expr),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn aggregate(func: AggregateFunc, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(arg)),
        }
    }

    pub fn count_star() -> Self {
        Expr::Aggregate {
            func: AggregateFunc::Count,
            arg: None,
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Call { args, .. } => args.iter().any(Expr::contains_aggregate),
            Expr::UnaryOp { expr, .. } => expr.contains_aggregate(),
            Expr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Column { .. } | Expr::Literal(_) | Expr::OutputRef(_) => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column {
                table: Some(table),
                name,
            } => write!(f, "{table}.{name}"),
            Expr::Column { table: None, name } => f.write_str(name),
            Expr::Literal(Value::Text(s)) => write!(f, "'{s}'"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::UnaryOp {
                op: UnaryOp::Negate,
                expr,
            } => write!(f, "-{expr}"),
            Expr::BinaryOp { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::Aggregate { func, arg: Some(arg) } => write!(f, "{}({arg})", func.name()),
            Expr::Aggregate { func, arg: None } => write!(f, "{}(*)", func.name()),
            Expr::OutputRef(index) => write!(f, "#{index}"),
        }
    }
}

/// An expression whose column references are resolved to row positions.
#[derive(Clone)]
pub(crate) enum BoundExpr {
    Column {
        index: usize,
        kind: ValueKind,
    },
    Literal(Value),
    Call {
        function: Arc<dyn ScalarFunction>,
        args: Vec<BoundExpr>,
        kind: Option<ValueKind>,
    },
    Negate(Box<BoundExpr>),
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
}

impl fmt::Debug for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpr::Column { index, kind } => write!(f, "Column({index}: {kind})"),
            BoundExpr::Literal(v) => write!(f, "Literal({v:?})"),
            BoundExpr::Call { function, args, .. } => {
                f.debug_tuple(function.name()).field(args).finish()
            }
            BoundExpr::Negate(expr) => f.debug_tuple("Negate").field(expr).finish(),
            BoundExpr::Binary { op, left, right } => {
                f.debug_tuple("Binary").field(op).field(left).field(right).finish()
            }
        }
    }
}

impl BoundExpr {
    pub(crate) fn call(function: Arc<dyn ScalarFunction>, args: Vec<BoundExpr>) -> Self {
        let arg_kinds: Vec<_> = args.iter().map(BoundExpr::kind).collect();
        let kind = function.return_kind(&arg_kinds);
        BoundExpr::Call {
            function,
            args,
            kind,
        }
    }

    /// Result kind when it is known without evaluating.
    pub(crate) fn kind(&self) -> Option<ValueKind> {
        match self {
            BoundExpr::Column { kind, .. } => Some(*kind),
            BoundExpr::Literal(Value::Null) => None,
            BoundExpr::Literal(v) => Some(v.kind()),
            BoundExpr::Call { kind, .. } => *kind,
            BoundExpr::Negate(expr) => expr.kind(),
            BoundExpr::Binary { op, left, right } => binary_kind(*op, left.kind(), right.kind()),
        }
    }

    pub(crate) fn is_constant(&self) -> bool {
        match self {
            BoundExpr::Column { .. } => false,
            BoundExpr::Literal(_) => true,
            BoundExpr::Call { args, .. } => args.iter().all(BoundExpr::is_constant),
            BoundExpr::Negate(expr) => expr.is_constant(),
            BoundExpr::Binary { left, right, .. } => left.is_constant() && right.is_constant(),
        }
    }

    pub(crate) fn eval(&self, row: &[Value], ctx: &EvalContext) -> QueryResult<Value> {
        match self {
            BoundExpr::Column { index, .. } => Ok(row.get(*index).cloned().unwrap_or_default()),
            BoundExpr::Literal(v) => Ok(v.clone()),
            BoundExpr::Call { function, args, .. } => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(row, ctx))
                    .collect::<QueryResult<Vec<_>>>()?;
                function.call(&args, ctx)
            }
            BoundExpr::Negate(expr) => negate(expr.eval(row, ctx)?),
            BoundExpr::Binary { op, left, right } => {
                let left = left.eval(row, ctx)?;
                let right = right.eval(row, ctx)?;
                binary(*op, left, right)
            }
        }
    }
}

/// Operand kinds that arithmetic rejects outright.
pub(crate) fn rejects_arithmetic(kind: ValueKind) -> bool {
    matches!(kind, ValueKind::Boolean | ValueKind::Binary | ValueKind::Time)
}

fn binary_kind(op: BinaryOp, left: Option<ValueKind>, right: Option<ValueKind>) -> Option<ValueKind> {
    use ValueKind::*;
    if op == BinaryOp::Concat {
        return Some(Text);
    }
    match (op, left?, right?) {
        (BinaryOp::Add | BinaryOp::Subtract, Date, Integer) => Some(Date),
        (BinaryOp::Add | BinaryOp::Subtract, Timestamp, Integer) => Some(Timestamp),
        (BinaryOp::Add, Integer, Date) => Some(Date),
        (BinaryOp::Subtract, Date, Date) => Some(Integer),
        (BinaryOp::Subtract, Timestamp, Timestamp) => Some(Number),
        (_, l, r) if l.is_numeric() && r.is_numeric() => Some(match (op, l, r) {
            (_, Number, _) | (_, _, Number) => Number,
            (BinaryOp::Divide, _, _) => Decimal,
            (_, Integer, Integer) => Integer,
            _ => Decimal,
        }),
        _ => None,
    }
}

enum Numeric {
    Int(i64),
    Dec(Decimal),
    Float(f64),
}

fn numeric(value: &Value, op: &str) -> QueryResult<Numeric> {
    match value {
        Value::Integer(v) => Ok(Numeric::Int(*v)),
        Value::Decimal(d) => Ok(Numeric::Dec(*d)),
        Value::Number(n) => Ok(Numeric::Float(*n)),
        Value::Text(text) => match coerce_text(text, ValueKind::Number) {
            Some(v) => numeric(&v, op),
            None => Err(QueryError::eval(format!(
                "cannot use text {text:?} as a number in {op}"
            ))),
        },
        other => Err(QueryError::eval(format!(
            "operator {op} does not accept {}",
            other.kind()
        ))),
    }
}

fn to_decimal(n: &Numeric) -> Option<Decimal> {
    match n {
        Numeric::Int(v) => Some(Decimal::from(*v)),
        Numeric::Dec(d) => Some(*d),
        Numeric::Float(_) => None,
    }
}

fn to_f64(n: &Numeric) -> f64 {
    match n {
        Numeric::Int(v) => *v as f64,
        Numeric::Dec(d) => rust_decimal::prelude::ToPrimitive::to_f64(d).unwrap_or(f64::NAN),
        Numeric::Float(f) => *f,
    }
}

fn negate(value: Value) -> QueryResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(match numeric(&value, "-")? {
        Numeric::Int(v) => v
            .checked_neg()
            .map(Value::Integer)
            .unwrap_or_else(|| Value::Decimal(-Decimal::from(v))),
        Numeric::Dec(d) => Value::Decimal(-d),
        Numeric::Float(f) => Value::Number(-f),
    })
}

pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> QueryResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Concat {
        return Ok(Value::from(format!("{left}{right}")));
    }
    if let Some(value) = temporal(op, &left, &right)? {
        return Ok(value);
    }

    let symbol = op.symbol();
    let l = numeric(&left, symbol)?;
    let r = numeric(&right, symbol)?;

    if op == BinaryOp::Divide && to_f64(&r) == 0.0 {
        return Err(QueryError::eval("division by zero"));
    }

    if let (Numeric::Int(a), Numeric::Int(b)) = (&l, &r) {
        let checked = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Subtract => a.checked_sub(*b),
            BinaryOp::Multiply => a.checked_mul(*b),
            _ => None,
        };
        if let Some(v) = checked {
            return Ok(Value::Integer(v));
        }
    }

    if let (Some(a), Some(b)) = (to_decimal(&l), to_decimal(&r)) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide => a.checked_div(b),
            BinaryOp::Concat => None,
        };
        if let Some(d) = exact {
            return Ok(Value::Decimal(d));
        }
    }

    let (a, b) = (to_f64(&l), to_f64(&r));
    Ok(Value::Number(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Concat => unreachable!("handled above"),
    }))
}

fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    let step = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(step)
    } else {
        date.checked_sub_days(step)
    }
}

fn shift_timestamp(ts: NaiveDateTime, days: i64) -> Option<NaiveDateTime> {
    let step = Days::new(days.unsigned_abs());
    if days >= 0 {
        ts.checked_add_days(step)
    } else {
        ts.checked_sub_days(step)
    }
}

/// Date arithmetic in whole days; `None` when neither operand is temporal.
fn temporal(op: BinaryOp, left: &Value, right: &Value) -> QueryResult<Option<Value>> {
    let out_of_range = || {
        QueryError::eval(format!(
            "date arithmetic out of range: {left} {} {right}",
            op.symbol()
        ))
    };
    let value = match (op, left, right) {
        (BinaryOp::Add, Value::Date(d), Value::Integer(n))
        | (BinaryOp::Add, Value::Integer(n), Value::Date(d)) => {
            Value::Date(shift_days(*d, *n).ok_or_else(out_of_range)?)
        }
        (BinaryOp::Subtract, Value::Date(d), Value::Integer(n)) => {
            let n = n.checked_neg().ok_or_else(out_of_range)?;
            Value::Date(shift_days(*d, n).ok_or_else(out_of_range)?)
        }
        (BinaryOp::Add, Value::Timestamp(ts), Value::Integer(n)) => {
            Value::Timestamp(shift_timestamp(*ts, *n).ok_or_else(out_of_range)?)
        }
        (BinaryOp::Subtract, Value::Timestamp(ts), Value::Integer(n)) => {
            let n = n.checked_neg().ok_or_else(out_of_range)?;
            Value::Timestamp(shift_timestamp(*ts, n).ok_or_else(out_of_range)?)
        }
        (BinaryOp::Subtract, Value::Date(a), Value::Date(b)) => {
            Value::Integer(a.signed_duration_since(*b).num_days())
        }
        (BinaryOp::Subtract, Value::Timestamp(a), Value::Timestamp(b)) => {
            Value::Number(a.signed_duration_since(*b).num_milliseconds() as f64 / 86_400_000.0)
        }
        _ if left.kind().is_temporal() || right.kind().is_temporal() => {
            return Err(QueryError::eval(format!(
                "operator {} does not accept {} and {}",
                op.symbol(),
                left.kind(),
                right.kind()
            )))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}
