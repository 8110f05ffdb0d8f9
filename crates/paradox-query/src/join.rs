//! Nested-loop joins.
//!
//! A join stage combines the rows produced so far (the left side, `left_width` values wide) with
//! the rows of the next table (the right side). Every output row is laid out `[left..., right...]`
//! whatever the join kind. One stage drives the loop with one side and probes the other, which is
//! materialized on first use:
//!
//! | kind         | driver | probe | unmatched rows emitted                 |
//! |--------------|--------|-------|----------------------------------------|
//! | INNER, CROSS | left   | right | none                                   |
//! | LEFT         | left   | right | driver rows, right side NULL           |
//! | RIGHT        | right  | left  | driver rows, left side NULL            |
//! | FULL         | left   | right | driver rows, then unmatched probe rows |

use paradox_format::{Row, Value};

use crate::context::EvalContext;
use crate::error::{QueryError, QueryResult};
use crate::plan::JoinKind;
use crate::predicate::BoundPredicate;
use crate::source::RowStream;

enum Probe<'q> {
    Pending(RowStream<'q>),
    Ready(Vec<Row>),
}

pub(crate) struct NestedLoopJoin<'q> {
    kind: JoinKind,
    condition: Option<&'q BoundPredicate>,
    ctx: EvalContext,
    driver: RowStream<'q>,
    probe: Probe<'q>,
    left_width: usize,
    /// Combined row being assembled; cloned for every emitted row.
    scratch: Vec<Value>,
    /// Whether `scratch` holds a driver row whose probe loop is in progress.
    active: bool,
    probe_pos: usize,
    driver_matched: bool,
    /// FULL only: probe rows matched by any driver row.
    probe_matched: Vec<bool>,
    /// FULL only: position of the next probe row to check once the driver is exhausted.
    trailing: Option<usize>,
    done: bool,
}

impl<'q> NestedLoopJoin<'q> {
    pub(crate) fn new(
        kind: JoinKind,
        condition: Option<&'q BoundPredicate>,
        left: RowStream<'q>,
        left_width: usize,
        right: RowStream<'q>,
        right_width: usize,
        ctx: EvalContext,
    ) -> Self {
        let (driver, probe) = match kind {
            JoinKind::Right => (right, left),
            _ => (left, right),
        };
        Self {
            kind,
            condition,
            ctx,
            driver,
            probe: Probe::Pending(probe),
            left_width,
            scratch: vec![Value::Null; left_width + right_width],
            active: false,
            probe_pos: 0,
            driver_matched: false,
            probe_matched: Vec::new(),
            trailing: None,
            done: false,
        }
    }

    fn drives_right(&self) -> bool {
        self.kind == JoinKind::Right
    }

    fn driver_slot(&mut self) -> &mut [Value] {
        if self.drives_right() {
            &mut self.scratch[self.left_width..]
        } else {
            &mut self.scratch[..self.left_width]
        }
    }

    fn probe_slot(&mut self) -> &mut [Value] {
        if self.drives_right() {
            &mut self.scratch[..self.left_width]
        } else {
            &mut self.scratch[self.left_width..]
        }
    }

    fn materialize_probe(&mut self) -> QueryResult<()> {
        if let Probe::Pending(stream) = &mut self.probe {
            let token = self.ctx.cancellation();
            let mut rows = Vec::new();
            for row in stream {
                token.check()?;
                rows.push(row?);
            }
            log::trace!("{} join: materialized {} probe row(s)", self.kind.name(), rows.len());
            if self.kind == JoinKind::Full {
                self.probe_matched = vec![false; rows.len()];
            }
            self.probe = Probe::Ready(rows);
        }
        Ok(())
    }

    fn probe_rows(&self) -> &[Row] {
        match &self.probe {
            Probe::Ready(rows) => rows,
            Probe::Pending(_) => &[],
        }
    }

    fn step(&mut self) -> QueryResult<Option<Row>> {
        self.materialize_probe()?;
        let token = self.ctx.cancellation().clone();

        loop {
            if let Some(pos) = self.trailing {
                let next = (pos..self.probe_matched.len()).find(|&i| !self.probe_matched[i]);
                let Some(i) = next else {
                    return Ok(None);
                };
                token.check()?;
                self.trailing = Some(i + 1);
                let row = self.probe_rows()[i].clone();
                self.driver_slot().fill(Value::Null);
                copy_row(self.probe_slot(), &row)?;
                return Ok(Some(self.scratch.clone()));
            }

            if !self.active {
                match self.driver.next() {
                    Some(row) => {
                        let row = row?;
                        copy_row(self.driver_slot(), &row)?;
                        self.active = true;
                        self.probe_pos = 0;
                        self.driver_matched = false;
                    }
                    None if self.kind == JoinKind::Full => {
                        self.trailing = Some(0);
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            while self.probe_pos < self.probe_rows().len() {
                token.check()?;
                let pos = self.probe_pos;
                self.probe_pos += 1;
                let Probe::Ready(rows) = &self.probe else {
                    break;
                };
                let probe_slot = if self.kind == JoinKind::Right {
                    &mut self.scratch[..self.left_width]
                } else {
                    &mut self.scratch[self.left_width..]
                };
                copy_row(probe_slot, &rows[pos])?;

                let matched = match self.condition {
                    Some(condition) => condition.eval(&self.scratch, &self.ctx)?,
                    None => true,
                };
                if matched {
                    self.driver_matched = true;
                    if let Some(flag) = self.probe_matched.get_mut(pos) {
                        *flag = true;
                    }
                    return Ok(Some(self.scratch.clone()));
                }
            }

            self.active = false;
            let pads = matches!(self.kind, JoinKind::Left | JoinKind::Right | JoinKind::Full);
            if pads && !self.driver_matched {
                self.probe_slot().fill(Value::Null);
                return Ok(Some(self.scratch.clone()));
            }
        }
    }
}

fn copy_row(slot: &mut [Value], row: &[Value]) -> QueryResult<()> {
    if slot.len() != row.len() {
        return Err(QueryError::eval(format!(
            "join input row has {} value(s), expected {}",
            row.len(),
            slot.len()
        )));
    }
    slot.clone_from_slice(row);
    Ok(())
}

impl Iterator for NestedLoopJoin<'_> {
    type Item = QueryResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::expr::BoundExpr;
    use crate::predicate::CompareOp;
    use paradox_format::ValueKind;
    use pretty_assertions::assert_eq;

    fn stream(values: &[i64]) -> RowStream<'static> {
        let rows: Vec<QueryResult<Row>> = values.iter().map(|v| Ok(vec![Value::Integer(*v)])).collect();
        Box::new(rows.into_iter())
    }

    fn equal_columns() -> BoundPredicate {
        BoundPredicate::Compare {
            op: CompareOp::Equal,
            left: BoundExpr::Column {
                index: 0,
                kind: ValueKind::Integer,
            },
            right: BoundExpr::Column {
                index: 1,
                kind: ValueKind::Integer,
            },
        }
    }

    fn run(kind: JoinKind, left: &[i64], right: &[i64]) -> Vec<(Option<i64>, Option<i64>)> {
        let condition = equal_columns();
        let join = NestedLoopJoin::new(
            kind,
            Some(&condition),
            stream(left),
            1,
            stream(right),
            1,
            EvalContext::default(),
        );
        let int = |v: &Value| match v {
            Value::Integer(i) => Some(*i),
            _ => None,
        };
        join.map(|row| {
            let row = row.unwrap();
            (int(&row[0]), int(&row[1]))
        })
        .collect()
    }

    #[test]
    fn inner_keeps_matches_only() {
        assert_eq!(
            run(JoinKind::Inner, &[1, 2, 2, 3], &[2, 3, 4]),
            vec![(Some(2), Some(2)), (Some(2), Some(2)), (Some(3), Some(3))]
        );
    }

    #[test]
    fn left_pads_unmatched_left_rows() {
        assert_eq!(
            run(JoinKind::Left, &[1, 2], &[2, 4]),
            vec![(Some(1), None), (Some(2), Some(2))]
        );
    }

    #[test]
    fn right_pads_unmatched_right_rows_and_keeps_column_order() {
        assert_eq!(
            run(JoinKind::Right, &[1, 2], &[2, 4]),
            vec![(Some(2), Some(2)), (None, Some(4))]
        );
    }

    #[test]
    fn full_emits_both_unmatched_sides() {
        assert_eq!(
            run(JoinKind::Full, &[1, 2], &[2, 4, 5]),
            vec![(Some(1), None), (Some(2), Some(2)), (None, Some(4)), (None, Some(5))]
        );
    }

    #[test]
    fn cross_without_condition_is_the_full_product() {
        let join = NestedLoopJoin::new(
            JoinKind::Cross,
            None,
            stream(&[1, 2, 3]),
            1,
            stream(&[1, 2]),
            1,
            EvalContext::default(),
        );
        assert_eq!(join.count(), 6);
    }

    #[test]
    fn emitted_rows_do_not_alias_the_scratch_buffer() {
        let join = NestedLoopJoin::new(
            JoinKind::Cross,
            None,
            stream(&[1]),
            1,
            stream(&[7, 8]),
            1,
            EvalContext::default(),
        );
        let rows: Vec<Row> = join.map(Result::unwrap).collect();
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(1), Value::Integer(7)],
                vec![Value::Integer(1), Value::Integer(8)],
            ]
        );
    }

    #[test]
    fn cancellation_stops_the_inner_loop() {
        let token = CancellationToken::new();
        let ctx = EvalContext::default().with_cancellation(token.clone());
        let mut join = NestedLoopJoin::new(
            JoinKind::Cross,
            None,
            stream(&[1, 2]),
            1,
            stream(&[1, 2, 3]),
            1,
            ctx,
        );
        assert!(join.next().unwrap().is_ok());
        token.cancel();
        assert!(join.next().unwrap().unwrap_err().is_cancelled());
        assert!(join.next().is_none());
    }

    #[test]
    fn mismatched_row_width_is_an_error() {
        let wide: Vec<QueryResult<Row>> = vec![Ok(vec![Value::Integer(1), Value::Integer(2)])];
        let mut join = NestedLoopJoin::new(
            JoinKind::Left,
            None,
            stream(&[1]),
            1,
            Box::new(wide.into_iter()),
            1,
            EvalContext::default(),
        );
        let err = join.next().unwrap().unwrap_err();
        assert!(matches!(err, QueryError::Evaluation(_)), "{err:?}");
        assert!(join.next().is_none());
    }
}
