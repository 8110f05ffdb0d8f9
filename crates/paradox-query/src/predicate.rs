//! Row predicates for join conditions and filters.

use std::cmp::Ordering;

use paradox_format::Value;

use crate::compare::{compare, equals};
use crate::context::EvalContext;
use crate::error::QueryResult;
use crate::expr::{BoundExpr, Expr};
use crate::like::{LikePattern, DEFAULT_LIKE_ESCAPE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::Less => ordering == Ordering::Less,
            CompareOp::LessEqual => ordering != Ordering::Greater,
            CompareOp::Greater => ordering == Ordering::Greater,
            CompareOp::GreaterEqual => ordering != Ordering::Less,
        }
    }
}

/// An unbound condition tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Always true; the condition of a cross join.
    True,
    Compare {
        op: CompareOp,
        left: Expr,
        right: Expr,
    },
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
    },
    Like {
        expr: Expr,
        pattern: String,
        /// Character that makes the next pattern character literal; `None` disables escaping.
        escape: Option<char>,
        case_sensitive: bool,
    },
    In {
        expr: Expr,
        list: Vec<Expr>,
    },
    IsNull {
        expr: Expr,
        negated: bool,
    },
    /// At least two children.
    And(Vec<Predicate>),
    /// At least two children.
    Or(Vec<Predicate>),
    /// True when an odd number of children are true. At least two children.
    Xor(Vec<Predicate>),
    /// Exactly one child.
    Not(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Predicate::Compare { op, left, right }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Predicate::compare(CompareOp::Equal, left, right)
    }

    pub fn between(expr: Expr, low: Expr, high: Expr) -> Self {
        Predicate::Between { expr, low, high }
    }

    /// Case-insensitive `LIKE` with the default `\` escape.
    pub fn like(expr: Expr, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            expr,
            pattern: pattern.into(),
            escape: Some(DEFAULT_LIKE_ESCAPE),
            case_sensitive: false,
        }
    }

    pub fn in_list(expr: Expr, list: Vec<Expr>) -> Self {
        Predicate::In { expr, list }
    }

    pub fn is_null(expr: Expr) -> Self {
        Predicate::IsNull {
            expr,
            negated: false,
        }
    }

    pub fn is_not_null(expr: Expr) -> Self {
        Predicate::IsNull {
            expr,
            negated: true,
        }
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::And(children)
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Or(children)
    }

    pub fn xor(children: Vec<Predicate>) -> Self {
        Predicate::Xor(children)
    }

    pub fn not(child: Predicate) -> Self {
        Predicate::Not(vec![child])
    }
}

#[derive(Debug, Clone)]
pub(crate) enum BoundPredicate {
    True,
    Compare {
        op: CompareOp,
        left: BoundExpr,
        right: BoundExpr,
    },
    Between {
        expr: BoundExpr,
        low: BoundExpr,
        high: BoundExpr,
    },
    Like {
        expr: BoundExpr,
        pattern: LikePattern,
        case_sensitive: bool,
    },
    In {
        expr: BoundExpr,
        list: Vec<BoundExpr>,
    },
    IsNull {
        expr: BoundExpr,
        negated: bool,
    },
    And(Vec<BoundPredicate>),
    Or(Vec<BoundPredicate>),
    Xor(Vec<BoundPredicate>),
    Not(Box<BoundPredicate>),
}

impl BoundPredicate {
    pub(crate) fn eval(&self, row: &[Value], ctx: &EvalContext) -> QueryResult<bool> {
        let locale = &ctx.locale;
        Ok(match self {
            BoundPredicate::True => true,
            BoundPredicate::Compare { op, left, right } => {
                let left = left.eval(row, ctx)?;
                let right = right.eval(row, ctx)?;
                compare(&left, &right, locale).is_some_and(|ord| op.holds(ord))
            }
            BoundPredicate::Between { expr, low, high } => {
                let value = expr.eval(row, ctx)?;
                let low = low.eval(row, ctx)?;
                let high = high.eval(row, ctx)?;
                compare(&value, &low, locale).is_some_and(|ord| ord != Ordering::Less)
                    && compare(&value, &high, locale).is_some_and(|ord| ord != Ordering::Greater)
            }
            BoundPredicate::Like {
                expr,
                pattern,
                case_sensitive,
            } => match expr.eval(row, ctx)? {
                Value::Null => false,
                Value::Text(text) => pattern.matches(&text, *case_sensitive, locale),
                other => pattern.matches(&other.to_string(), *case_sensitive, locale),
            },
            BoundPredicate::In { expr, list } => {
                let value = expr.eval(row, ctx)?;
                if value.is_null() {
                    return Ok(false);
                }
                for candidate in list {
                    if equals(&value, &candidate.eval(row, ctx)?, locale) {
                        return Ok(true);
                    }
                }
                false
            }
            BoundPredicate::IsNull { expr, negated } => expr.eval(row, ctx)?.is_null() != *negated,
            BoundPredicate::And(children) => {
                for child in children {
                    if !child.eval(row, ctx)? {
                        return Ok(false);
                    }
                }
                true
            }
            BoundPredicate::Or(children) => {
                for child in children {
                    if child.eval(row, ctx)? {
                        return Ok(true);
                    }
                }
                false
            }
            BoundPredicate::Xor(children) => {
                let mut odd = false;
                for child in children {
                    odd ^= child.eval(row, ctx)?;
                }
                odd
            }
            BoundPredicate::Not(child) => !child.eval(row, ctx)?,
        })
    }
}
