//! Result cursors.

use paradox_format::Row;

use crate::cancel::CancellationToken;
use crate::error::QueryResult;
use crate::source::RowStream;

/// Forward-only cursor over the rows of an executing query.
///
/// The cancellation token is checked before every row. After the first error (including
/// [`QueryError::Cancelled`](crate::QueryError::Cancelled)) the cursor yields nothing more.
pub struct RowCursor<'q> {
    names: Vec<String>,
    rows: RowStream<'q>,
    token: CancellationToken,
    produced: usize,
    done: bool,
}

impl<'q> RowCursor<'q> {
    pub(crate) fn new(names: Vec<String>, rows: RowStream<'q>, token: CancellationToken) -> Self {
        Self {
            names,
            rows,
            token,
            produced: 0,
            done: false,
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Stop the query; the next pull fails with `Cancelled`.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A handle that cancels this cursor from another thread.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drain the remaining rows into a cursor with positional access.
    pub fn into_scrollable(self) -> QueryResult<ScrollableCursor> {
        let names = self.names.clone();
        let rows = self.collect::<QueryResult<Vec<_>>>()?;
        Ok(ScrollableCursor::new(names, rows))
    }

    fn finish(&mut self) {
        self.done = true;
        log::debug!("cursor finished after {} row(s)", self.produced);
    }
}

impl Iterator for RowCursor<'_> {
    type Item = QueryResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(err) = self.token.check() {
            self.finish();
            return Some(Err(err));
        }
        match self.rows.next() {
            Some(Ok(row)) => {
                self.produced += 1;
                Some(Ok(row))
            }
            Some(Err(err)) => {
                self.finish();
                Some(Err(err))
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

impl std::fmt::Debug for RowCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("names", &self.names)
            .field("produced", &self.produced)
            .field("done", &self.done)
            .finish()
    }
}

/// A fully materialized result with a current position.
///
/// Positions are zero-based; before the first move the cursor sits before the first row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollableCursor {
    names: Vec<String>,
    rows: Vec<Row>,
    position: Option<usize>,
}

impl ScrollableCursor {
    pub fn new(names: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            names,
            rows,
            position: None,
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Move to `index`. Out of range leaves the position unchanged and returns `None`.
    pub fn absolute(&mut self, index: usize) -> Option<&Row> {
        let row = self.rows.get(index)?;
        self.position = Some(index);
        Some(row)
    }

    /// Move by `offset` rows from the current position (from before the first row when none).
    pub fn relative(&mut self, offset: isize) -> Option<&Row> {
        let target = match self.position {
            Some(pos) => pos.checked_add_signed(offset)?,
            None if offset > 0 => offset.unsigned_abs() - 1,
            None => return None,
        };
        self.absolute(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use paradox_format::Value;

    fn rows(n: i64) -> RowStream<'static> {
        Box::new((0..n).map(|i| Ok(vec![Value::Integer(i)])))
    }

    #[test]
    fn cancel_fails_the_next_pull() {
        let mut cursor = RowCursor::new(vec!["n".into()], rows(10), CancellationToken::new());
        assert!(cursor.next().unwrap().is_ok());
        cursor.cancel();
        assert!(cursor.next().unwrap().unwrap_err().is_cancelled());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn errors_fuse_the_cursor() {
        let stream: RowStream<'static> = Box::new(
            vec![
                Ok(vec![Value::Integer(1)]),
                Err(QueryError::eval("boom")),
                Ok(vec![Value::Integer(2)]),
            ]
            .into_iter(),
        );
        let mut cursor = RowCursor::new(vec!["n".into()], stream, CancellationToken::new());
        assert!(cursor.next().unwrap().is_ok());
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn scrollable_positions() {
        let cursor = RowCursor::new(vec!["n".into()], rows(3), CancellationToken::new());
        let mut scroll = cursor.into_scrollable().unwrap();
        assert_eq!(scroll.len(), 3);
        assert_eq!(scroll.position(), None);
        assert_eq!(scroll.relative(1), Some(&vec![Value::Integer(0)]));
        assert_eq!(scroll.relative(2), Some(&vec![Value::Integer(2)]));
        assert_eq!(scroll.relative(1), None);
        assert_eq!(scroll.position(), Some(2));
        assert_eq!(scroll.relative(-2), Some(&vec![Value::Integer(0)]));
        assert_eq!(scroll.relative(-1), None);
        assert_eq!(scroll.absolute(1), Some(&vec![Value::Integer(1)]));
        assert_eq!(scroll.get(5), None);
    }
}
