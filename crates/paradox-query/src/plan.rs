//! Query descriptions and binding.
//!
//! A [`QuerySpec`] is what a parser hands over: tables with join kinds and conditions, a filter,
//! output columns, group keys and a DISTINCT flag. [`BoundQuery::bind`] resolves every column
//! reference to its position in the combined row and rejects invalid queries before any table is
//! read.

use std::sync::Arc;

use paradox_format::ValueKind;

use crate::aggregate::AggregateFunc;
use crate::error::{QueryError, QueryResult};
use crate::expr::{rejects_arithmetic, BinaryOp, BoundExpr, Expr, UnaryOp};
use crate::like::LikePattern;
use crate::predicate::{BoundPredicate, Predicate};
use crate::source::{Catalog, ColumnMeta, TableSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Cross,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn name(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Cross => "CROSS",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }
}

/// One table of a query. The join kind and condition describe how it joins the tables before it
/// and are ignored on the first table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
    pub join: JoinKind,
    pub condition: Option<Predicate>,
}

impl TableRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            join: JoinKind::Inner,
            condition: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn join(mut self, kind: JoinKind, condition: Option<Predicate>) -> Self {
        self.join = kind;
        self.condition = condition;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputColumn {
    pub expr: Expr,
    pub name: Option<String>,
    /// Computed (and usable by second-pass columns and DISTINCT bookkeeping) but not returned.
    pub hidden: bool,
    /// Evaluated over the other output columns after grouping and aggregation.
    pub second_pass: bool,
}

impl OutputColumn {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            name: None,
            hidden: false,
            second_pass: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn second_pass(mut self) -> Self {
        self.second_pass = true;
        self
    }

    fn display_name(&self) -> String {
        match (&self.name, &self.expr) {
            (Some(name), _) => name.clone(),
            (None, Expr::Column { name, .. }) => name.clone(),
            (None, expr) => expr.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySpec {
    pub tables: Vec<TableRef>,
    pub filter: Option<Predicate>,
    pub columns: Vec<OutputColumn>,
    /// Positions in `columns` of the group keys.
    pub group_by: Vec<usize>,
    pub distinct: bool,
}

impl QuerySpec {
    pub fn from_table(table: TableRef) -> Self {
        Self {
            tables: vec![table],
            ..Self::default()
        }
    }

    pub fn join(mut self, kind: JoinKind, table: TableRef, condition: Option<Predicate>) -> Self {
        self.tables.push(table.join(kind, condition));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn column(mut self, column: OutputColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn select(self, expr: Expr) -> Self {
        self.column(OutputColumn::new(expr))
    }

    pub fn group_by(mut self, keys: impl IntoIterator<Item = usize>) -> Self {
        self.group_by.extend(keys);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn bind(&self, catalog: &Catalog) -> QueryResult<BoundQuery> {
        BoundQuery::bind(self, catalog)
    }
}

/// An output column after binding.
#[derive(Debug, Clone)]
pub(crate) enum BoundColumn {
    /// Evaluated against the combined row.
    Scalar(BoundExpr),
    /// `arg: None` is `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<BoundExpr>,
    },
    /// Evaluated against the resolved output row.
    Deferred(BoundExpr),
}

#[derive(Clone)]
pub(crate) struct BoundTable {
    pub(crate) source: Arc<dyn TableSource>,
    pub(crate) label: String,
    pub(crate) join: JoinKind,
    pub(crate) condition: Option<BoundPredicate>,
    pub(crate) width: usize,
    pub(crate) mask: Vec<bool>,
}

impl std::fmt::Debug for BoundTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundTable")
            .field("label", &self.label)
            .field("join", &self.join)
            .field("condition", &self.condition)
            .field("mask", &self.mask)
            .finish()
    }
}

/// A validated query, ready to execute any number of times.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    pub(crate) tables: Vec<BoundTable>,
    pub(crate) filter: Option<BoundPredicate>,
    pub(crate) columns: Vec<BoundColumn>,
    pub(crate) names: Vec<String>,
    pub(crate) kinds: Vec<Option<ValueKind>>,
    pub(crate) hidden: Vec<bool>,
    pub(crate) group_keys: Vec<usize>,
    pub(crate) grouped: bool,
    pub(crate) distinct: bool,
}

struct ScopeTable {
    label: String,
    name: String,
    columns: Vec<ColumnMeta>,
    offset: usize,
}

struct Binder<'a> {
    catalog: &'a Catalog,
    scope: Vec<ScopeTable>,
    /// Tables (a prefix of `scope`) that references may currently resolve against.
    visible: usize,
    masks: Vec<Vec<bool>>,
}

impl<'a> Binder<'a> {
    fn resolve_column(&mut self, table: Option<&str>, name: &str) -> QueryResult<BoundExpr> {
        let mut found: Vec<(usize, usize)> = Vec::new();
        for (t, scope) in self.scope[..self.visible].iter().enumerate() {
            if let Some(qualifier) = table {
                let matches = scope.label.eq_ignore_ascii_case(qualifier)
                    || scope.name.eq_ignore_ascii_case(qualifier);
                if !matches {
                    continue;
                }
            }
            if let Some(c) = scope
                .columns
                .iter()
                .position(|column| column.name.eq_ignore_ascii_case(name))
            {
                found.push((t, c));
            }
        }

        match found.as_slice() {
            [] => Err(QueryError::UnknownColumn {
                table: table.map(str::to_string),
                column: name.to_string(),
            }),
            [(t, c)] => {
                let scope = &self.scope[*t];
                self.masks[*t][*c] = true;
                Ok(BoundExpr::Column {
                    index: scope.offset + c,
                    kind: scope.columns[*c].kind,
                })
            }
            many => Err(QueryError::AmbiguousColumn {
                column: name.to_string(),
                candidates: many
                    .iter()
                    .map(|(t, _)| self.scope[*t].label.clone())
                    .collect(),
            }),
        }
    }

    fn bind_expr(&mut self, expr: &Expr) -> QueryResult<BoundExpr> {
        match expr {
            Expr::Column { table, name } => self.resolve_column(table.as_deref(), name),
            Expr::Literal(v) => Ok(BoundExpr::Literal(v.clone())),
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.bind_expr(arg))
                    .collect::<QueryResult<Vec<_>>>()?;
                bind_call(self.catalog, name, args)
            }
            Expr::UnaryOp {
                op: UnaryOp::Negate,
                expr,
            } => {
                let expr = self.bind_expr(expr)?;
                check_arithmetic("-", &expr)?;
                Ok(BoundExpr::Negate(Box::new(expr)))
            }
            Expr::BinaryOp { op, left, right } => {
                let left = self.bind_expr(left)?;
                let right = self.bind_expr(right)?;
                bind_binary(*op, left, right)
            }
            Expr::Aggregate { func, .. } => Err(QueryError::plan(format!(
                "{} is only allowed as a whole output column; use a second-pass column to combine aggregates",
                func.name()
            ))),
            Expr::OutputRef(index) => Err(QueryError::plan(format!(
                "output column reference #{index} is only allowed in a second-pass column"
            ))),
        }
    }

    fn bind_predicate(&mut self, predicate: &Predicate) -> QueryResult<BoundPredicate> {
        Ok(match predicate {
            Predicate::True => BoundPredicate::True,
            Predicate::Compare { op, left, right } => BoundPredicate::Compare {
                op: *op,
                left: self.bind_expr(left)?,
                right: self.bind_expr(right)?,
            },
            Predicate::Between { expr, low, high } => BoundPredicate::Between {
                expr: self.bind_expr(expr)?,
                low: self.bind_expr(low)?,
                high: self.bind_expr(high)?,
            },
            Predicate::Like {
                expr,
                pattern,
                escape,
                case_sensitive,
            } => BoundPredicate::Like {
                expr: self.bind_expr(expr)?,
                pattern: LikePattern::compile(pattern, *escape),
                case_sensitive: *case_sensitive,
            },
            Predicate::In { expr, list } => BoundPredicate::In {
                expr: self.bind_expr(expr)?,
                list: list
                    .iter()
                    .map(|item| self.bind_expr(item))
                    .collect::<QueryResult<_>>()?,
            },
            Predicate::IsNull { expr, negated } => BoundPredicate::IsNull {
                expr: self.bind_expr(expr)?,
                negated: *negated,
            },
            Predicate::And(children) => BoundPredicate::And(self.bind_children("AND", children)?),
            Predicate::Or(children) => BoundPredicate::Or(self.bind_children("OR", children)?),
            Predicate::Xor(children) => BoundPredicate::Xor(self.bind_children("XOR", children)?),
            Predicate::Not(children) => match children.as_slice() {
                [child] => BoundPredicate::Not(Box::new(self.bind_predicate(child)?)),
                _ => {
                    return Err(QueryError::plan(format!(
                        "NOT takes exactly one operand, got {}",
                        children.len()
                    )))
                }
            },
        })
    }

    fn bind_children(&mut self, op: &str, children: &[Predicate]) -> QueryResult<Vec<BoundPredicate>> {
        if children.len() < 2 {
            return Err(QueryError::plan(format!(
                "{op} takes at least two operands, got {}",
                children.len()
            )));
        }
        children
            .iter()
            .map(|child| self.bind_predicate(child))
            .collect()
    }
}

fn bind_call(catalog: &Catalog, name: &str, args: Vec<BoundExpr>) -> QueryResult<BoundExpr> {
    let function = catalog
        .functions()
        .get(name)
        .ok_or_else(|| QueryError::plan(format!("unknown function {name}")))?;
    if !function.arity().contains(&args.len()) {
        return Err(QueryError::plan(format!(
            "{} does not accept {} arguments",
            function.name(),
            args.len()
        )));
    }
    Ok(BoundExpr::call(function.clone(), args))
}

fn check_arithmetic(symbol: &str, operand: &BoundExpr) -> QueryResult<()> {
    match operand.kind() {
        Some(kind) if rejects_arithmetic(kind) => Err(QueryError::TypeMismatch {
            context: format!("operator {symbol}"),
            kind,
        }),
        _ => Ok(()),
    }
}

fn bind_binary(op: BinaryOp, left: BoundExpr, right: BoundExpr) -> QueryResult<BoundExpr> {
    if op != BinaryOp::Concat {
        check_arithmetic(op.symbol(), &left)?;
        check_arithmetic(op.symbol(), &right)?;
    }
    Ok(BoundExpr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// Bind a second-pass expression against the output columns bound so far.
fn bind_second_pass(
    catalog: &Catalog,
    expr: &Expr,
    spec: &QuerySpec,
    kinds: &[Option<ValueKind>],
) -> QueryResult<BoundExpr> {
    let output_ref = |index: usize| -> QueryResult<BoundExpr> {
        let Some(target) = spec.columns.get(index) else {
            return Err(QueryError::plan(format!(
                "second-pass reference #{index} is out of range ({} output columns)",
                spec.columns.len()
            )));
        };
        if target.second_pass {
            return Err(QueryError::plan(format!(
                "second-pass column cannot reference second-pass column {}",
                target.display_name()
            )));
        }
        Ok(BoundExpr::Column {
            index,
            kind: kinds[index].unwrap_or(ValueKind::Null),
        })
    };

    match expr {
        Expr::OutputRef(index) => output_ref(*index),
        Expr::Column { table: None, name } => {
            let index = spec
                .columns
                .iter()
                .position(|column| column.display_name().eq_ignore_ascii_case(name))
                .ok_or_else(|| QueryError::UnknownColumn {
                    table: None,
                    column: name.clone(),
                })?;
            output_ref(index)
        }
        Expr::Column { table: Some(_), .. } => Err(QueryError::plan(format!(
            "second-pass column {expr} must reference output columns, not table columns"
        ))),
        Expr::Literal(v) => Ok(BoundExpr::Literal(v.clone())),
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|arg| bind_second_pass(catalog, arg, spec, kinds))
                .collect::<QueryResult<Vec<_>>>()?;
            bind_call(catalog, name, args)
        }
        Expr::UnaryOp {
            op: UnaryOp::Negate,
            expr,
        } => {
            let expr = bind_second_pass(catalog, expr, spec, kinds)?;
            check_arithmetic("-", &expr)?;
            Ok(BoundExpr::Negate(Box::new(expr)))
        }
        Expr::BinaryOp { op, left, right } => {
            let left = bind_second_pass(catalog, left, spec, kinds)?;
            let right = bind_second_pass(catalog, right, spec, kinds)?;
            bind_binary(*op, left, right)
        }
        Expr::Aggregate { func, .. } => Err(QueryError::plan(format!(
            "second-pass columns cannot contain {}; aggregate in a separate output column",
            func.name()
        ))),
    }
}

impl BoundQuery {
    pub fn bind(spec: &QuerySpec, catalog: &Catalog) -> QueryResult<Self> {
        if spec.tables.is_empty() {
            return Err(QueryError::plan("query has no tables"));
        }
        if spec.columns.is_empty() {
            return Err(QueryError::plan("query has no output columns"));
        }

        let mut scope = Vec::with_capacity(spec.tables.len());
        let mut sources = Vec::with_capacity(spec.tables.len());
        let mut offset = 0;
        for table in &spec.tables {
            let source = catalog.table(&table.table)?.clone();
            let columns = source.columns();
            let label = table.alias.clone().unwrap_or_else(|| source.name().to_string());
            if scope
                .iter()
                .any(|other: &ScopeTable| other.label.eq_ignore_ascii_case(&label))
            {
                return Err(QueryError::plan(format!(
                    "table name {label} is used twice; give one an alias"
                )));
            }
            let width = columns.len();
            scope.push(ScopeTable {
                label,
                name: source.name().to_string(),
                offset,
                columns,
            });
            offset += width;
            sources.push(source);
        }

        let masks = scope.iter().map(|t| vec![false; t.columns.len()]).collect();
        let mut binder = Binder {
            catalog,
            visible: scope.len(),
            scope,
            masks,
        };

        // Join conditions only see the tables joined so far.
        let mut conditions = Vec::with_capacity(spec.tables.len());
        for (i, table) in spec.tables.iter().enumerate() {
            let condition = match (&table.condition, i) {
                (Some(_), 0) => {
                    return Err(QueryError::plan(format!(
                        "the first table {} cannot have a join condition",
                        binder.scope[0].label
                    )))
                }
                (Some(_), _) if table.join == JoinKind::Cross => {
                    return Err(QueryError::plan("CROSS JOIN cannot have a condition"))
                }
                (Some(condition), _) => {
                    binder.visible = i + 1;
                    Some(binder.bind_predicate(condition)?)
                }
                (None, _) => None,
            };
            conditions.push(condition);
        }
        binder.visible = binder.scope.len();

        let filter = spec
            .filter
            .as_ref()
            .map(|filter| binder.bind_predicate(filter))
            .transpose()?;

        // First pass: everything except second-pass columns.
        let mut columns: Vec<Option<BoundColumn>> = Vec::with_capacity(spec.columns.len());
        let mut kinds: Vec<Option<ValueKind>> = Vec::with_capacity(spec.columns.len());
        for column in &spec.columns {
            if column.second_pass {
                columns.push(None);
                kinds.push(None);
                continue;
            }
            let (bound, kind) = match &column.expr {
                Expr::Aggregate { func, arg } => {
                    let arg = match arg {
                        Some(arg) if arg.contains_aggregate() => {
                            return Err(QueryError::plan(format!(
                                "aggregate functions cannot be nested: {}",
                                column.expr
                            )))
                        }
                        Some(arg) => Some(binder.bind_expr(arg)?),
                        None if *func != AggregateFunc::Count => {
                            return Err(QueryError::plan(format!(
                                "{}(*) is not supported",
                                func.name()
                            )))
                        }
                        None => None,
                    };
                    let arg_kind = arg.as_ref().and_then(BoundExpr::kind);
                    if let Some(kind) = arg_kind {
                        if !func.accepts(kind) {
                            return Err(QueryError::TypeMismatch {
                                context: column.expr.to_string(),
                                kind,
                            });
                        }
                    }
                    (
                        BoundColumn::Aggregate { func: *func, arg },
                        func.result_kind(arg_kind),
                    )
                }
                expr => {
                    let bound = binder.bind_expr(expr)?;
                    let kind = bound.kind();
                    (BoundColumn::Scalar(bound), kind)
                }
            };
            columns.push(Some(bound));
            kinds.push(kind);
        }

        // Second pass: expressions over the other output columns.
        let mut resolved = Vec::with_capacity(columns.len());
        for (i, (column, spec_column)) in columns.into_iter().zip(&spec.columns).enumerate() {
            match column {
                Some(column) => resolved.push(column),
                None => {
                    let bound = bind_second_pass(catalog, &spec_column.expr, spec, &kinds)?;
                    kinds[i] = bound.kind();
                    resolved.push(BoundColumn::Deferred(bound));
                }
            }
        }
        let columns = resolved;

        let has_aggregate = columns
            .iter()
            .any(|c| matches!(c, BoundColumn::Aggregate { .. }));
        let grouped = has_aggregate || !spec.group_by.is_empty();

        let mut group_keys = Vec::with_capacity(spec.group_by.len());
        for &key in &spec.group_by {
            match columns.get(key) {
                Some(BoundColumn::Scalar(_)) => {
                    if !group_keys.contains(&key) {
                        group_keys.push(key);
                    }
                }
                Some(_) => {
                    return Err(QueryError::plan(format!(
                        "group key #{key} ({}) must be a plain output column",
                        spec.columns[key].display_name()
                    )))
                }
                None => {
                    return Err(QueryError::plan(format!(
                        "group key #{key} is out of range ({} output columns)",
                        spec.columns.len()
                    )))
                }
            }
        }

        if grouped {
            for (i, (column, spec_column)) in columns.iter().zip(&spec.columns).enumerate() {
                if let BoundColumn::Scalar(expr) = column {
                    if !spec_column.hidden && !group_keys.contains(&i) && !expr.is_constant() {
                        return Err(QueryError::UngroupedColumn {
                            column: spec_column.display_name(),
                        });
                    }
                }
            }
        }

        let Binder { scope, masks, .. } = binder;
        let tables = sources
            .into_iter()
            .zip(scope)
            .zip(masks)
            .zip(spec.tables.iter().zip(conditions))
            .map(|(((source, scope), mask), (table, condition))| BoundTable {
                source,
                label: scope.label,
                join: table.join,
                condition,
                width: scope.columns.len(),
                mask,
            })
            .collect::<Vec<_>>();

        let query = BoundQuery {
            names: spec.columns.iter().map(OutputColumn::display_name).collect(),
            hidden: spec.columns.iter().map(|c| c.hidden).collect(),
            kinds,
            tables,
            filter,
            columns,
            group_keys,
            grouped,
            distinct: spec.distinct,
        };
        log::debug!(
            "bound query over {} table(s): {} output column(s), grouped={}, distinct={}",
            query.tables.len(),
            query.columns.len(),
            query.grouped,
            query.distinct
        );
        Ok(query)
    }

    /// Names of the columns returned by the query.
    pub fn column_names(&self) -> Vec<String> {
        self.visible(&self.names).cloned().collect()
    }

    /// Kinds of the returned columns, where they are known before execution.
    pub fn column_kinds(&self) -> Vec<Option<ValueKind>> {
        self.visible(&self.kinds).copied().collect()
    }

    fn visible<'s, T>(&'s self, items: &'s [T]) -> impl Iterator<Item = &'s T> + 's {
        items
            .iter()
            .zip(&self.hidden)
            .filter(|(_, hidden)| !**hidden)
            .map(|(item, _)| item)
    }

    /// Per-table projection masks: which columns the query reads.
    pub fn projection_masks(&self) -> Vec<(&str, &[bool])> {
        self.tables
            .iter()
            .map(|table| (table.label.as_str(), table.mask.as_slice()))
            .collect()
    }

    pub fn is_grouped(&self) -> bool {
        self.grouped
    }
}
