//! Grouping and aggregation.
//!
//! Each input row becomes a grouping-phase row: plain cells hold values, aggregate cells hold an
//! [`Accumulator`] seeded from that row, and second-pass cells are left empty. A row whose key
//! matches an earlier group merges its accumulators into that group and is dropped. Once input
//! ends, groups are resolved into result-phase rows: accumulators become values, then
//! second-pass columns are evaluated over the finished row.

use std::collections::BTreeMap;

use paradox_format::{Row, Value};

use crate::aggregate::Accumulator;
use crate::context::EvalContext;
use crate::distinct::KeyRow;
use crate::error::QueryResult;
use crate::plan::BoundColumn;

/// One cell of a grouping-phase row.
#[derive(Debug, Clone)]
enum GroupCell {
    Value(Value),
    Accumulator(Accumulator),
    /// Second-pass column, evaluated after resolution.
    Deferred,
}

#[derive(Debug)]
struct GroupRow {
    cells: Vec<GroupCell>,
}

impl GroupRow {
    fn from_input(columns: &[BoundColumn], row: &[Value], ctx: &EvalContext) -> QueryResult<Self> {
        let cells = columns
            .iter()
            .map(|column| {
                Ok(match column {
                    BoundColumn::Scalar(expr) => GroupCell::Value(expr.eval(row, ctx)?),
                    BoundColumn::Aggregate { func, arg } => {
                        let value = arg.as_ref().map(|arg| arg.eval(row, ctx)).transpose()?;
                        GroupCell::Accumulator(Accumulator::seed(*func, value.as_ref(), ctx.locale)?)
                    }
                    BoundColumn::Deferred(_) => GroupCell::Deferred,
                })
            })
            .collect::<QueryResult<_>>()?;
        Ok(Self { cells })
    }

    /// The single group of an ungrouped aggregate over no rows.
    fn empty(columns: &[BoundColumn], ctx: &EvalContext) -> QueryResult<Self> {
        let cells = columns
            .iter()
            .map(|column| {
                Ok(match column {
                    // Constant columns keep their value; anything reading a table is NULL.
                    BoundColumn::Scalar(expr) if expr.is_constant() => {
                        GroupCell::Value(expr.eval(&[], ctx)?)
                    }
                    BoundColumn::Scalar(_) => GroupCell::Value(Value::Null),
                    BoundColumn::Aggregate { func, .. } => {
                        GroupCell::Accumulator(Accumulator::empty(*func, ctx.locale))
                    }
                    BoundColumn::Deferred(_) => GroupCell::Deferred,
                })
            })
            .collect::<QueryResult<_>>()?;
        Ok(Self { cells })
    }

    fn key(&self, keys: &[usize], ctx: &EvalContext) -> KeyRow {
        let values = keys
            .iter()
            .map(|&k| match &self.cells[k] {
                GroupCell::Value(v) => v.clone(),
                _ => Value::Null,
            })
            .collect();
        KeyRow::new(values, ctx.locale)
    }

    fn merge(&mut self, other: GroupRow) -> QueryResult<()> {
        for (cell, incoming) in self.cells.iter_mut().zip(other.cells) {
            if let (GroupCell::Accumulator(acc), GroupCell::Accumulator(next)) = (cell, incoming) {
                acc.merge(next)?;
            }
        }
        Ok(())
    }

    /// Convert into a result-phase row.
    fn resolve(self, columns: &[BoundColumn], ctx: &EvalContext) -> QueryResult<Row> {
        let mut row: Row = self
            .cells
            .into_iter()
            .map(|cell| match cell {
                GroupCell::Value(v) => v,
                GroupCell::Accumulator(acc) => acc.value(),
                GroupCell::Deferred => Value::Null,
            })
            .collect();
        evaluate_deferred(&mut row, columns, ctx)?;
        Ok(row)
    }
}

/// Fill second-pass cells of a result-phase row.
pub(crate) fn evaluate_deferred(
    row: &mut Row,
    columns: &[BoundColumn],
    ctx: &EvalContext,
) -> QueryResult<()> {
    for (i, column) in columns.iter().enumerate() {
        if let BoundColumn::Deferred(expr) = column {
            let value = expr.eval(row, ctx)?;
            row[i] = value;
        }
    }
    Ok(())
}

/// Group `rows` by the output columns at `keys` and resolve every group.
///
/// Groups come out in the order their first row arrived. With no keys, all rows form one group,
/// which exists even when `rows` is empty.
pub(crate) fn group_rows<I>(
    rows: I,
    columns: &[BoundColumn],
    keys: &[usize],
    ctx: &EvalContext,
) -> QueryResult<Vec<Row>>
where
    I: Iterator<Item = QueryResult<Row>>,
{
    let token = ctx.cancellation();
    let mut groups: Vec<GroupRow> = Vec::new();
    let mut index: BTreeMap<KeyRow, usize> = BTreeMap::new();
    let mut input_rows = 0usize;

    for row in rows {
        token.check()?;
        let row = row?;
        input_rows += 1;
        let group = GroupRow::from_input(columns, &row, ctx)?;
        let key = group.key(keys, ctx);
        match index.get(&key) {
            Some(&existing) => groups[existing].merge(group)?,
            None => {
                index.insert(key, groups.len());
                groups.push(group);
            }
        }
    }

    if groups.is_empty() && keys.is_empty() {
        groups.push(GroupRow::empty(columns, ctx)?);
    }
    log::debug!("grouped {input_rows} row(s) into {} group(s)", groups.len());

    groups
        .into_iter()
        .map(|group| {
            token.check()?;
            group.resolve(columns, ctx)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateFunc;
    use crate::cancel::CancellationToken;
    use crate::expr::{BinaryOp, BoundExpr};
    use paradox_format::ValueKind;
    use pretty_assertions::assert_eq;

    fn col(index: usize) -> BoundExpr {
        BoundExpr::Column {
            index,
            kind: ValueKind::Integer,
        }
    }

    fn input(rows: &[(Value, i64)]) -> Vec<QueryResult<Row>> {
        rows.iter()
            .map(|(k, v)| Ok(vec![k.clone(), Value::Integer(*v)]))
            .collect()
    }

    fn key_sum_count() -> Vec<BoundColumn> {
        vec![
            BoundColumn::Scalar(col(0)),
            BoundColumn::Aggregate {
                func: AggregateFunc::Sum,
                arg: Some(col(1)),
            },
            BoundColumn::Aggregate {
                func: AggregateFunc::Count,
                arg: None,
            },
        ]
    }

    #[test]
    fn groups_in_first_seen_order_with_null_keys_together() {
        let rows = input(&[
            (Value::from("b"), 1),
            (Value::Null, 10),
            (Value::from("a"), 2),
            (Value::from("b"), 3),
            (Value::Null, 20),
        ]);
        let out = group_rows(rows.into_iter(), &key_sum_count(), &[0], &EvalContext::default())
            .unwrap();
        assert_eq!(
            out,
            vec![
                vec![Value::from("b"), Value::Integer(4), Value::Integer(2)],
                vec![Value::Null, Value::Integer(30), Value::Integer(2)],
                vec![Value::from("a"), Value::Integer(2), Value::Integer(1)],
            ]
        );
    }

    #[test]
    fn empty_input_without_keys_yields_one_group() {
        let columns = vec![
            BoundColumn::Scalar(BoundExpr::Literal(Value::from("all"))),
            BoundColumn::Aggregate {
                func: AggregateFunc::Count,
                arg: None,
            },
            BoundColumn::Aggregate {
                func: AggregateFunc::Sum,
                arg: Some(col(1)),
            },
        ];
        let out = group_rows(std::iter::empty(), &columns, &[], &EvalContext::default()).unwrap();
        assert_eq!(out, vec![vec![Value::from("all"), Value::Integer(0), Value::Null]]);

        let keyed = group_rows(std::iter::empty(), &key_sum_count(), &[0], &EvalContext::default())
            .unwrap();
        assert!(keyed.is_empty());
    }

    #[test]
    fn second_pass_sees_resolved_aggregates() {
        let mut columns = key_sum_count();
        columns.push(BoundColumn::Deferred(BoundExpr::Binary {
            op: BinaryOp::Divide,
            left: Box::new(col(1)),
            right: Box::new(col(2)),
        }));
        let rows = input(&[(Value::Integer(1), 3), (Value::Integer(1), 4)]);
        let out = group_rows(rows.into_iter(), &columns, &[0], &EvalContext::default()).unwrap();
        assert_eq!(out[0][3], Value::Decimal(paradox_format::Decimal::new(35, 1)));
    }

    #[test]
    fn cancellation_is_polled_per_row() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = EvalContext::default().with_cancellation(token);
        let rows = input(&[(Value::Integer(1), 1)]);
        let err = group_rows(rows.into_iter(), &key_sum_count(), &[0], &ctx).unwrap_err();
        assert!(err.is_cancelled());
    }
}
