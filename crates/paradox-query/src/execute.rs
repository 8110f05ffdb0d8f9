//! The execution pipeline behind [`BoundQuery::execute`].
//!
//! Stages, each pulling from the one before it:
//!
//! 1. scan of the first table, under its projection mask;
//! 2. one [`NestedLoopJoin`] per further table;
//! 3. the post-join filter;
//! 4. either projection (ungrouped) or grouping and aggregation, which drains its input on the
//!    first pull;
//! 5. DISTINCT over the visible columns;
//! 6. removal of hidden columns.

use paradox_format::{Row, Value};

use crate::context::EvalContext;
use crate::cursor::RowCursor;
use crate::distinct::DistinctFilter;
use crate::error::{QueryError, QueryResult};
use crate::grouping::{evaluate_deferred, group_rows};
use crate::join::NestedLoopJoin;
use crate::plan::{BoundColumn, BoundQuery};
use crate::source::RowStream;

impl BoundQuery {
    /// Start executing the query. Rows are produced as the returned cursor is pulled; cancelling
    /// `ctx`'s token (or the cursor) stops it with [`QueryError::Cancelled`].
    pub fn execute(&self, ctx: &EvalContext) -> QueryResult<RowCursor<'_>> {
        let token = ctx.cancellation().clone();
        token.check()?;

        let mut tables = self.tables.iter();
        let first = tables
            .next()
            .ok_or_else(|| QueryError::plan("query has no tables"))?;
        log::debug!(
            "executing query: {} table(s) starting at {}",
            self.tables.len(),
            first.label
        );

        let base_token = token.clone();
        let mut stream: RowStream<'_> = Box::new(first.source.scan(&first.mask)?.map(move |row| {
            base_token.check()?;
            row
        }));
        let mut width = first.width;
        for table in tables {
            log::trace!("{} join with {}", table.join.name(), table.label);
            let right = table.source.scan(&table.mask)?;
            stream = Box::new(NestedLoopJoin::new(
                table.join,
                table.condition.as_ref(),
                stream,
                width,
                right,
                table.width,
                ctx.clone(),
            ));
            width += table.width;
        }

        if let Some(filter) = &self.filter {
            let filter_ctx = ctx.clone();
            stream = Box::new(stream.filter_map(move |row| match row {
                Ok(row) => match filter.eval(&row, &filter_ctx) {
                    Ok(true) => Some(Ok(row)),
                    Ok(false) => None,
                    Err(err) => Some(Err(err)),
                },
                Err(err) => Some(Err(err)),
            }));
        }

        let mut rows: RowStream<'_> = if self.grouped {
            Box::new(Grouped {
                input: Some(stream),
                columns: &self.columns,
                keys: &self.group_keys,
                ctx: ctx.clone(),
                output: Vec::new().into_iter(),
            })
        } else {
            let project_ctx = ctx.clone();
            let columns = &self.columns;
            Box::new(stream.map(move |row| project(columns, &row?, &project_ctx)))
        };

        if self.distinct {
            let mut seen = DistinctFilter::new(&self.hidden, ctx.locale);
            rows = Box::new(rows.filter(move |row| match row {
                Ok(row) => seen.insert(row),
                Err(_) => true,
            }));
        }

        if self.hidden.iter().any(|&hidden| hidden) {
            let hidden = &self.hidden;
            rows = Box::new(rows.map(move |row| {
                row.map(|row| {
                    row.into_iter()
                        .zip(hidden)
                        .filter(|(_, hidden)| !**hidden)
                        .map(|(value, _)| value)
                        .collect()
                })
            }));
        }

        Ok(RowCursor::new(self.column_names(), rows, token))
    }
}

/// Output row of an ungrouped query.
fn project(columns: &[BoundColumn], row: &[Value], ctx: &EvalContext) -> QueryResult<Row> {
    let mut out = columns
        .iter()
        .map(|column| match column {
            BoundColumn::Scalar(expr) => expr.eval(row, ctx),
            // Aggregates always make a query grouped.
            BoundColumn::Aggregate { .. } | BoundColumn::Deferred(_) => Ok(Value::Null),
        })
        .collect::<QueryResult<Row>>()?;
    evaluate_deferred(&mut out, columns, ctx)?;
    Ok(out)
}

/// Grouping stage: drains its input on the first pull, then hands out the groups.
struct Grouped<'q> {
    input: Option<RowStream<'q>>,
    columns: &'q [BoundColumn],
    keys: &'q [usize],
    ctx: EvalContext,
    output: std::vec::IntoIter<Row>,
}

impl Iterator for Grouped<'_> {
    type Item = QueryResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(input) = self.input.take() {
            match group_rows(input, self.columns, self.keys, &self.ctx) {
                Ok(groups) => self.output = groups.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
        self.output.next().map(Ok)
    }
}
