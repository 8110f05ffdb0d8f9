//! Relational execution over Paradox tables.
//!
//! A query arrives as a [`QuerySpec`] (tables with join kinds and conditions, a filter, output
//! columns, group keys, DISTINCT). [`QuerySpec::bind`] checks it against a [`Catalog`] of
//! [`TableSource`]s and resolves every column reference, so semantic errors surface before any
//! table is read. [`BoundQuery::execute`] then returns a pull-based [`RowCursor`]:
//!
//! ```no_run
//! use paradox_query::{Catalog, EvalContext, Expr, Predicate, QuerySpec, TableRef};
//! use paradox_format::{OpenOptions, ParadoxTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let table = ParadoxTable::open("CUSTOMER.DB", &OpenOptions::default())?;
//! let catalog = Catalog::new().with_table(table);
//! let query = QuerySpec::from_table(TableRef::new("CUSTOMER"))
//!     .filter(Predicate::like(Expr::column("Name"), "sm%"))
//!     .select(Expr::column("Name"))
//!     .bind(&catalog)?;
//! for row in query.execute(&EvalContext::default())? {
//!     println!("{:?}", row?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Comparison semantics (NULL handling, cross-kind numeric comparison, collation) live in
//! [`compare`]; they are shared by predicates, grouping, DISTINCT and MIN/MAX.

mod aggregate;
mod cancel;
mod collation;
mod compare;
mod context;
mod cursor;
mod distinct;
mod error;
mod execute;
mod expr;
mod functions;
mod grouping;
mod join;
mod like;
mod plan;
mod predicate;
mod source;

pub use aggregate::{Accumulator, AggregateFunc, SumState};
pub use cancel::CancellationToken;
pub use collation::{CollationStrength, Locale};
pub use compare::{compare, compare_keys, compare_total, equals};
pub use context::EvalContext;
pub use cursor::{RowCursor, ScrollableCursor};
pub use error::{QueryError, QueryResult};
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use functions::{FunctionRegistry, ScalarFunction};
pub use like::{LikePattern, DEFAULT_LIKE_ESCAPE};
pub use plan::{BoundQuery, JoinKind, OutputColumn, QuerySpec, TableRef};
pub use predicate::{CompareOp, Predicate};
pub use source::{Catalog, ColumnMeta, MemoryTable, RowStream, TableSource};

pub use paradox_format::{Decimal, Row, Value, ValueKind};
