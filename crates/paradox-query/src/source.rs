//! Tables a query can read, and the catalog that names them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use paradox_format::{ParadoxTable, Row, Value, ValueKind};

use crate::error::{QueryError, QueryResult};
use crate::functions::{FunctionRegistry, ScalarFunction};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ValueKind,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

pub type RowStream<'a> = Box<dyn Iterator<Item = QueryResult<Row>> + 'a>;

/// A row-producing table.
pub trait TableSource: Send + Sync {
    fn name(&self) -> &str;

    fn columns(&self) -> Vec<ColumnMeta>;

    /// Stream every row. Columns whose `mask` entry is `false` may be returned as NULL.
    fn scan(&self, mask: &[bool]) -> QueryResult<RowStream<'_>>;
}

impl TableSource for ParadoxTable {
    fn name(&self) -> &str {
        ParadoxTable::name(self)
    }

    fn columns(&self) -> Vec<ColumnMeta> {
        self.schema()
            .fields()
            .iter()
            .map(|field| ColumnMeta::new(field.name.clone(), field.value_kind()))
            .collect()
    }

    fn scan(&self, mask: &[bool]) -> QueryResult<RowStream<'_>> {
        let rows = ParadoxTable::scan(self, Some(mask))?;
        Ok(Box::new(rows.map(|row| row.map_err(QueryError::from))))
    }
}

/// Rows held in memory, for derived data and tests.
#[derive(Clone, Debug)]
pub struct MemoryTable {
    name: String,
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
}

impl MemoryTable {
    /// Fails when a row's width differs from the column count or a non-NULL value's kind differs
    /// from its column's.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMeta>, rows: Vec<Row>) -> QueryResult<Self> {
        let name = name.into();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(QueryError::plan(format!(
                    "row {i} of table {name} has {} values, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (value, column) in row.iter().zip(&columns) {
                if !value.is_null() && value.kind() != column.kind {
                    return Err(QueryError::TypeMismatch {
                        context: format!("row {i} of {name}.{}", column.name),
                        kind: value.kind(),
                    });
                }
            }
        }
        Ok(Self {
            name,
            columns,
            rows,
        })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TableSource for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<ColumnMeta> {
        self.columns.clone()
    }

    fn scan(&self, mask: &[bool]) -> QueryResult<RowStream<'_>> {
        let mask = mask.to_vec();
        Ok(Box::new(self.rows.iter().map(move |row| {
            Ok(row
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    if mask.get(i).copied().unwrap_or(false) {
                        value.clone()
                    } else {
                        Value::Null
                    }
                })
                .collect())
        })))
    }
}

/// Named tables plus the scalar functions queries may call.
#[derive(Clone, Default)]
pub struct Catalog {
    /// Keyed by uppercased name.
    tables: BTreeMap<String, Arc<dyn TableSource>>,
    functions: FunctionRegistry,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("functions", &self.functions)
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` under its own name. Names are case-insensitive; a table with the same
    /// name is replaced.
    pub fn add_table(&mut self, table: Arc<dyn TableSource>) {
        let key = table.name().to_uppercase();
        if self.tables.insert(key, table).is_some() {
            log::debug!("catalog: replaced an existing table");
        }
    }

    pub fn with_table(mut self, table: impl TableSource + 'static) -> Self {
        self.add_table(Arc::new(table));
        self
    }

    pub fn table(&self, name: &str) -> QueryResult<&Arc<dyn TableSource>> {
        self.tables
            .get(&name.to_uppercase())
            .ok_or_else(|| QueryError::UnknownTable(name.to_string()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(|table| table.name())
    }

    pub fn register_function(&mut self, function: Arc<dyn ScalarFunction>) {
        self.functions.register(function);
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}
