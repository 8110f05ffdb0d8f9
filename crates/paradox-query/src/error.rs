use paradox_format::{FormatError, ValueKind};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {column}{}", table_suffix(.table))]
    UnknownColumn {
        table: Option<String>,
        column: String,
    },

    #[error("ambiguous column {column}: present in tables {candidates:?}")]
    AmbiguousColumn {
        column: String,
        candidates: Vec<String>,
    },

    #[error("type mismatch in {context}: {kind} is not supported")]
    TypeMismatch { context: String, kind: ValueKind },

    #[error("column {column} must be a group key or an aggregate")]
    UngroupedColumn { column: String },

    #[error("invalid query: {0}")]
    InvalidPlan(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("query cancelled")]
    Cancelled,
}

fn table_suffix(table: &Option<String>) -> String {
    match table {
        Some(table) => format!(" in table {table}"),
        None => String::new(),
    }
}

impl QueryError {
    /// `true` for [`QueryError::Cancelled`], which callers should not report as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }

    /// `true` for errors raised while binding a query, before any row is read.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownTable(_)
                | QueryError::UnknownColumn { .. }
                | QueryError::AmbiguousColumn { .. }
                | QueryError::TypeMismatch { .. }
                | QueryError::UngroupedColumn { .. }
                | QueryError::InvalidPlan(_)
        )
    }

    pub(crate) fn plan(message: impl Into<String>) -> Self {
        QueryError::InvalidPlan(message.into())
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        QueryError::Evaluation(message.into())
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = QueryError::UnknownColumn {
            table: Some("ORDERS".into()),
            column: "Qty".into(),
        };
        assert_eq!(err.to_string(), "unknown column: Qty in table ORDERS");
        assert!(err.is_semantic());
        assert!(!err.is_cancelled());

        let err = QueryError::TypeMismatch {
            context: "SUM".into(),
            kind: ValueKind::Text,
        };
        assert_eq!(err.to_string(), "type mismatch in SUM: TEXT is not supported");
    }

    #[test]
    fn cancellation_is_not_semantic() {
        assert!(QueryError::Cancelled.is_cancelled());
        assert!(!QueryError::Cancelled.is_semantic());
    }
}
